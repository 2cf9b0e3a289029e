//! Per-avatar mutable animation state.
//!
//! Action timers count seconds since the action started (or, for flight,
//! since it was last toggled). The blend tree reads them and writes only
//! the smoothing accumulators.

use glam::{Quat, Vec3};

use crate::expression::{Emote, SpeechInput};

/// An on/off action with a running clock.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActionTimer {
    pub active: bool,
    pub time: f32,
    /// Set once the action first starts; `time` before that is meaningless.
    pub engaged: bool,
}

impl ActionTimer {
    pub fn start(&mut self) {
        self.active = true;
        self.engaged = true;
        self.time = 0.0;
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.time = 0.0;
    }

    /// Flip the state and restart the clock.
    pub fn toggle(&mut self) {
        self.active = !self.active;
        self.engaged |= self.active;
        self.time = 0.0;
    }

    pub fn tick(&mut self, dt: f32) {
        self.time += dt;
    }
}

/// An action that plays a specific named clip, such as a dance or a sit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedAction {
    pub active: bool,
    pub time: f32,
    /// Clip name; `None` picks the first clip tagged for the role.
    pub animation: Option<String>,
}

impl NamedAction {
    pub fn start(&mut self, animation: Option<String>) {
        self.active = true;
        self.time = 0.0;
        self.animation = animation;
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.time = 0.0;
    }
}

/// Grab direction for the activate action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ActivateDirection {
    #[default]
    Forward,
    Down,
    Up,
    Left,
    Right,
}

impl ActivateDirection {
    /// Clip name in the default clip table.
    #[must_use]
    pub fn clip_name(self) -> &'static str {
        match self {
            Self::Forward => "grab_forward",
            Self::Down => "grab_down",
            Self::Up => "grab_up",
            Self::Left => "grab_left",
            Self::Right => "grab_right",
        }
    }

    /// Playback speed applied to the activate clock.
    #[must_use]
    pub fn speed(self) -> f32 {
        match self {
            Self::Down => 1.7,
            _ => 1.2,
        }
    }
}

/// The activate (grab) action.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActivateAction {
    pub active: bool,
    pub time: f32,
    pub direction: ActivateDirection,
}

/// Look-at target for the neck and head, in canonical avatar space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EyeTarget {
    pub enabled: bool,
    pub position: Vec3,
}

/// Accumulators the blend tree and expression layer carry between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothing {
    /// Current mirror blend factor in `[0, 1]`.
    pub mirror_factor: f32,
    pub mirror_start: f32,
    pub mirror_target: f32,
    /// Time the backward classification last flipped.
    pub mirror_changed_at: f64,
    pub is_backward: bool,
    /// Eye-target blend: last applied neck rotation, the rotation the
    /// current transition started from, and when it started.
    pub eye_rotation: Quat,
    pub eye_start: Quat,
    pub eye_active: bool,
    pub eye_changed_at: f64,
    /// Low-passed fake speech amplitude.
    pub fake_speech: f32,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self {
            mirror_factor: 0.0,
            mirror_start: 0.0,
            mirror_target: 0.0,
            mirror_changed_at: f64::NEG_INFINITY,
            is_backward: false,
            eye_rotation: Quat::IDENTITY,
            eye_start: Quat::IDENTITY,
            eye_active: false,
            eye_changed_at: f64::NEG_INFINITY,
            fake_speech: 0.0,
        }
    }
}

/// Everything the blend tree needs to know about one avatar.
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarState {
    /// Velocity in avatar-local space (+Z forward, +X left), units/s.
    pub velocity: Vec3,
    pub jump: ActionTimer,
    pub charge_jump: ActionTimer,
    pub fall_loop: ActionTimer,
    pub naruto_run: ActionTimer,
    pub fly: ActionTimer,
    pub sit: NamedAction,
    pub dance: NamedAction,
    pub throw: NamedAction,
    pub use_action: NamedAction,
    pub aim: NamedAction,
    pub activate: ActivateAction,
    /// Seconds spent standing since the last crouch, capped at the blend
    /// config's crouch window. Zero means fully crouched.
    pub crouch_time: f32,
    pub crouching: bool,
    /// Clock time the avatar last moved.
    pub last_move_time: f64,
    pub eye_target: EyeTarget,
    pub speech: SpeechInput,
    pub emote: Option<Emote>,
    pub smoothing: Smoothing,
    last_position: Option<Vec3>,
}

impl Default for AvatarState {
    fn default() -> Self {
        Self {
            velocity: Vec3::ZERO,
            jump: ActionTimer::default(),
            charge_jump: ActionTimer::default(),
            fall_loop: ActionTimer::default(),
            naruto_run: ActionTimer::default(),
            fly: ActionTimer::default(),
            sit: NamedAction::default(),
            dance: NamedAction::default(),
            throw: NamedAction::default(),
            use_action: NamedAction::default(),
            aim: NamedAction::default(),
            activate: ActivateAction::default(),
            crouch_time: f32::MAX,
            crouching: false,
            last_move_time: 0.0,
            eye_target: EyeTarget::default(),
            speech: SpeechInput::default(),
            emote: None,
            smoothing: Smoothing::default(),
            last_position: None,
        }
    }
}

impl AvatarState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Horizontal speed in units/s.
    #[must_use]
    pub fn horizontal_speed(&self) -> f32 {
        Vec3::new(self.velocity.x, 0.0, self.velocity.z).length()
    }

    /// Advance every running action clock by `dt` seconds.
    pub fn tick(&mut self, dt: f32, crouch_max_time: f32) {
        for timer in [
            &mut self.jump,
            &mut self.charge_jump,
            &mut self.fall_loop,
            &mut self.naruto_run,
            &mut self.fly,
        ] {
            timer.tick(dt);
        }
        for action in [
            &mut self.sit,
            &mut self.dance,
            &mut self.throw,
            &mut self.use_action,
            &mut self.aim,
        ] {
            if action.active {
                action.time += dt;
            }
        }
        if self.activate.active {
            self.activate.time += dt;
        }
        self.update_crouch(dt, crouch_max_time);
    }

    /// Move the crouch clock toward zero while crouching and back up to
    /// `crouch_max_time` while standing.
    pub fn update_crouch(&mut self, dt: f32, crouch_max_time: f32) {
        let time = self.crouch_time.min(crouch_max_time);
        self.crouch_time = if self.crouching {
            (time - dt).max(0.0)
        } else {
            (time + dt).min(crouch_max_time)
        };
    }

    /// Derive local velocity from the avatar's world position and yaw.
    ///
    /// `yaw` rotates avatar-local +Z into world forward about +Y.
    pub fn track_movement(&mut self, position: Vec3, yaw: f32, dt: f32, now: f64) {
        if let Some(last) = self.last_position
            && dt > 0.0
        {
            let world = (position - last) / dt;
            self.velocity = Quat::from_rotation_y(-yaw) * world;
        }
        self.last_position = Some(position);
        self.mark_moving(now);
    }

    /// Reset the idle clock while the avatar is moving.
    pub fn mark_moving(&mut self, now: f64) {
        if self.horizontal_speed() > 1e-3 {
            self.last_move_time = now;
        }
    }
}
