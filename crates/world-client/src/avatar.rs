//! Drives the demo avatar from the observer and draws its skeleton.

use std::sync::Arc;

use avatar_rig::{Avatar, BlendConfig, Emote, LocomotionNames, SpringSettings};
use bevy::prelude::*;

use crate::observer::Observer;
use crate::rig_demo::{demo_library, demo_model};

/// Seconds a jump plays before it ends on its own.
const JUMP_DURATION: f32 = 0.8;

/// Plugin for the avatar runtime.
pub struct AvatarPlugin;

impl Plugin for AvatarPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_avatar).add_systems(
            Update,
            (avatar_actions, tick_avatar, draw_skeleton)
                .chain()
                .run_if(resource_exists::<AvatarRuntime>),
        );
    }
}

/// The bound avatar the scene is driving.
#[derive(Resource)]
pub struct AvatarRuntime {
    avatar: Avatar,
}

fn spawn_avatar(mut commands: Commands) {
    let library = demo_library(&LocomotionNames::default());
    let model = match demo_model() {
        Ok(model) => model,
        Err(e) => {
            tracing::error!("Failed to build demo rig: {}", e);
            return;
        }
    };
    match Avatar::new(
        model,
        Arc::new(library),
        BlendConfig::default(),
        SpringSettings::default(),
    ) {
        Ok(avatar) => {
            tracing::info!(
                "Avatar bound: dialect '{}', height {:.2}",
                avatar.bound().dialect(),
                avatar.bound().height()
            );
            commands.insert_resource(AvatarRuntime { avatar });
        }
        Err(e) => tracing::error!("Failed to bind avatar: {}", e),
    }
}

/// Keyboard actions: Space jumps, C crouches, F flies, V dances,
/// E cycles emotes, H toggles decapitation.
#[allow(clippy::needless_pass_by_value)]
fn avatar_actions(keyboard: Res<ButtonInput<KeyCode>>, mut runtime: ResMut<AvatarRuntime>) {
    let avatar = &mut runtime.avatar;
    if keyboard.just_pressed(KeyCode::KeyH) {
        if avatar.bound().is_decapitated() {
            avatar.undecapitate();
        } else {
            avatar.decapitate();
        }
    }

    let state = avatar.state_mut();
    if keyboard.just_pressed(KeyCode::Space) && !state.jump.active {
        state.jump.start();
    } else if state.jump.active && state.jump.time > JUMP_DURATION {
        state.jump.stop();
    }
    if keyboard.just_pressed(KeyCode::KeyC) {
        state.crouching = !state.crouching;
    }
    if keyboard.just_pressed(KeyCode::KeyF) {
        state.fly.toggle();
    }
    if keyboard.just_pressed(KeyCode::KeyV) {
        if state.dance.active {
            state.dance.stop();
        } else {
            state.dance.start(None);
        }
    }
    if keyboard.just_pressed(KeyCode::KeyE) {
        state.emote = match state.emote {
            None => Some(Emote::Joy),
            Some(Emote::Joy) => Some(Emote::Angry),
            Some(Emote::Angry) => Some(Emote::Sorrow),
            Some(_) => None,
        };
    }
}

#[allow(clippy::needless_pass_by_value)]
fn tick_avatar(
    time: Res<Time>,
    mut runtime: ResMut<AvatarRuntime>,
    observer: Single<(&Observer, &Transform)>,
) {
    let (observer, transform) = *observer;
    let now = time.elapsed_secs_f64();
    let dt = time.delta_secs();
    let avatar = &mut runtime.avatar;
    avatar.set_placement(transform.translation, observer.yaw, dt, now);
    avatar.update(now, dt);
}

/// Draw bones as lines from each joint to its parent.
#[allow(clippy::needless_pass_by_value)]
fn draw_skeleton(runtime: Res<AvatarRuntime>, mut gizmos: Gizmos) {
    let avatar = &runtime.avatar;
    let skeleton = avatar.bound().skeleton();
    let hair = avatar.bound().hair_bones();
    for index in 0..skeleton.len() {
        let Some(parent) = skeleton.parent(index) else {
            continue;
        };
        let from = Vec3::from(avatar.bone_world(parent).translation);
        let to = Vec3::from(avatar.bone_world(index).translation);
        let in_hair = hair
            .iter()
            .any(|&root| index == root || skeleton.is_descendant_of(index, root));
        let color = if in_hair {
            Color::srgb(0.95, 0.75, 0.3)
        } else {
            Color::srgb(0.85, 0.85, 0.9)
        };
        gizmos.line(from, to, color);
    }
}
