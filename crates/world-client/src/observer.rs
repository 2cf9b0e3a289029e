//! Third-person movement controller for the avatar the world streams around.
//!
//! WASD moves relative to the view yaw, Shift runs, mouse look orbits the
//! camera. The observer's position feeds both the chunk tracker and the
//! avatar's movement tracking.

use bevy::ecs::message::MessageReader;
use bevy::input::mouse::MouseMotion;
use bevy::prelude::*;
use bevy::window::{CursorGrabMode, CursorOptions, PrimaryWindow};

/// Plugin for observer movement and the follow camera.
pub struct ObserverPlugin;

impl Plugin for ObserverPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ObserverSettings>()
            .add_systems(Startup, (spawn_observer, grab_cursor))
            .add_systems(
                Update,
                (
                    cursor_grab_system,
                    observer_look.run_if(cursor_is_grabbed),
                    observer_movement,
                    follow_camera,
                )
                    .chain(),
            );
    }
}

/// Settings for observer movement.
#[derive(Resource)]
pub struct ObserverSettings {
    /// Walking speed in meters per second.
    pub walk_speed: f32,
    /// Speed while Shift is held.
    pub run_speed: f32,
    /// Mouse sensitivity for look rotation.
    pub mouse_sensitivity: f32,
    /// Camera distance behind the observer.
    pub camera_distance: f32,
    /// Camera height above the observer.
    pub camera_height: f32,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            walk_speed: 1.5,
            run_speed: 4.5,
            mouse_sensitivity: 0.002,
            camera_distance: 4.0,
            camera_height: 2.0,
        }
    }
}

/// The moving observer. Its `Transform` translation is the world position.
#[derive(Component, Default)]
pub struct Observer {
    /// Heading in radians; 0 faces +Z.
    pub yaw: f32,
    /// Camera pitch in radians.
    pub pitch: f32,
}

/// Marker for the follow camera.
#[derive(Component)]
pub struct FollowCamera;

fn spawn_observer(mut commands: Commands) {
    commands.spawn((Observer::default(), Transform::default()));
    commands.spawn((
        Camera3d::default(),
        FollowCamera,
        Transform::from_xyz(0.0, 2.0, -4.0).looking_at(Vec3::Y, Vec3::Y),
    ));
}

/// Grab the cursor on startup.
fn grab_cursor(
    mut cursor: Single<&mut CursorOptions>,
    mut window: Single<&mut Window, With<PrimaryWindow>>,
) {
    set_cursor_grab(&mut cursor, &mut window, true);
}

fn set_cursor_grab(cursor: &mut CursorOptions, window: &mut Window, grabbed: bool) {
    if grabbed {
        cursor.grab_mode = CursorGrabMode::Locked;
        cursor.visible = false;
        let center = Vec2::new(window.width() / 2.0, window.height() / 2.0);
        window.set_cursor_position(Some(center));
    } else {
        cursor.grab_mode = CursorGrabMode::None;
        cursor.visible = true;
    }
}

#[allow(clippy::needless_pass_by_value)]
fn cursor_is_grabbed(cursor: Single<&CursorOptions>) -> bool {
    cursor.grab_mode == CursorGrabMode::Locked
}

/// ESC releases the cursor, left-click grabs it again.
#[allow(clippy::needless_pass_by_value)]
fn cursor_grab_system(
    keyboard: Res<ButtonInput<KeyCode>>,
    mouse: Res<ButtonInput<MouseButton>>,
    mut cursor: Single<&mut CursorOptions>,
    mut window: Single<&mut Window, With<PrimaryWindow>>,
) {
    let is_grabbed = cursor.grab_mode == CursorGrabMode::Locked;
    if keyboard.just_pressed(KeyCode::Escape) && is_grabbed {
        set_cursor_grab(&mut cursor, &mut window, false);
    } else if mouse.just_pressed(MouseButton::Left) && !is_grabbed {
        set_cursor_grab(&mut cursor, &mut window, true);
    }
}

#[allow(clippy::needless_pass_by_value)]
fn observer_look(
    mut mouse_motion: MessageReader<MouseMotion>,
    settings: Res<ObserverSettings>,
    mut observer: Single<&mut Observer>,
) {
    let mut delta = Vec2::ZERO;
    for event in mouse_motion.read() {
        delta += event.delta;
    }
    if delta == Vec2::ZERO {
        return;
    }
    observer.yaw -= delta.x * settings.mouse_sensitivity;
    observer.pitch = (observer.pitch + delta.y * settings.mouse_sensitivity).clamp(-0.6, 1.2);
}

/// Handle WASD movement with Shift to run.
#[allow(clippy::needless_pass_by_value)]
fn observer_movement(
    time: Res<Time>,
    keyboard: Res<ButtonInput<KeyCode>>,
    settings: Res<ObserverSettings>,
    mut observer: Single<(&Observer, &mut Transform)>,
) {
    let (observer, transform) = &mut *observer;
    let forward = Quat::from_rotation_y(observer.yaw) * Vec3::Z;
    let left = Quat::from_rotation_y(observer.yaw) * Vec3::X;

    let mut movement = Vec3::ZERO;
    if keyboard.pressed(KeyCode::KeyW) {
        movement += forward;
    }
    if keyboard.pressed(KeyCode::KeyS) {
        movement -= forward;
    }
    if keyboard.pressed(KeyCode::KeyA) {
        movement += left;
    }
    if keyboard.pressed(KeyCode::KeyD) {
        movement -= left;
    }
    if movement == Vec3::ZERO {
        return;
    }

    let running = keyboard.pressed(KeyCode::ShiftLeft) || keyboard.pressed(KeyCode::ShiftRight);
    let speed = if running {
        settings.run_speed
    } else {
        settings.walk_speed
    };
    transform.translation += movement.normalize() * speed * time.delta_secs();
    transform.rotation = Quat::from_rotation_y(observer.yaw);
}

/// Keep the camera behind the observer.
#[allow(clippy::needless_pass_by_value)]
fn follow_camera(
    settings: Res<ObserverSettings>,
    observer: Single<(&Observer, &Transform), Without<FollowCamera>>,
    mut camera: Single<&mut Transform, With<FollowCamera>>,
) {
    let (observer, target) = *observer;
    let orbit = Quat::from_rotation_y(observer.yaw) * Quat::from_rotation_x(observer.pitch);
    let offset = orbit * Vec3::new(0.0, 0.0, -settings.camera_distance);
    let focus = target.translation + Vec3::Y * 1.2;
    camera.translation = focus + offset + Vec3::Y * (settings.camera_height - 1.2);
    camera.look_at(focus, Vec3::Y);
}
