//! Pose Blend Tree.
//!
//! Every tick the tree builds a canonical [`Pose`] in four stages:
//!
//! 1. **Locomotion base**: a 7-way blend of idle, direction, mirrored
//!    direction and run clips, computed for the upright and crouch clip sets
//!    and cross-faded by the crouch factor
//! 2. **Exclusive override**: the highest-priority active action whose clip
//!    exists replaces the base on the bones it drives
//! 3. **Additive layers**: use/aim deltas, the flight cross-fade and the
//!    activate (grab) cross-fade
//! 4. **Hips**: the hips position is flattened and rescaled by avatar height
//!
//! Rotation channels blend with slerp and position channels with lerp,
//! through the same generic code path.

use std::collections::HashSet;
use std::f32::consts::{FRAC_PI_2, PI, TAU};
use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::bone::{CanonicalBone, CanonicalMap};
use crate::clip::{AnimationClip, Channel, ClipTags};
use crate::easing::CubicBezier;
use crate::library::ClipLibrary;
use crate::state::{AvatarState, Smoothing};

/// Heading of each direction slot: left, right, forward, backward.
const DIRECTION_ANGLES: [f32; 4] = [FRAC_PI_2, -FRAC_PI_2, 0.0, PI];
const BACKWARD: usize = 3;
/// Heading each mirrored clip stands in for: the left reverse clip covers
/// the right side and vice versa.
const MIRROR_ANGLES: [f32; 2] = [-FRAC_PI_2, FRAC_PI_2];

/// Canonical per-bone output of one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pose {
    /// Rotation of each driven bone in canonical space. Bones absent here
    /// keep their bind pose.
    pub rotations: CanonicalMap<Quat>,
    /// Hips offset: horizontal components are zero, vertical is already in
    /// avatar units.
    pub hips_position: Option<Vec3>,
}

/// Roles an action clip can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipRole {
    Jump,
    ChargeJump,
    Sit,
    NarutoRun,
    Dance,
    Throw,
    FallLoop,
    Float,
    Use,
    Aim,
    Activate,
}

impl ClipRole {
    /// Whether a clip's tags mark it for this role.
    #[must_use]
    pub fn matches(self, tags: &ClipTags) -> bool {
        match self {
            Self::Jump => tags.is_jump,
            Self::ChargeJump => tags.is_charge_jump,
            Self::Sit => tags.is_sitting,
            Self::NarutoRun => tags.is_naruto_run,
            Self::Dance => tags.is_dance,
            Self::Throw => tags.is_throw,
            Self::FallLoop => tags.is_fall_loop,
            Self::Float => tags.is_float,
            Self::Use => tags.is_use,
            Self::Aim => tags.is_aim,
            Self::Activate => tags.is_activate,
        }
    }
}

/// Speed thresholds and transition windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendConfig {
    pub idle_speed: f32,
    pub walk_speed: f32,
    pub run_speed: f32,
    /// Seconds to fully enter or leave a crouch.
    pub crouch_max_time: f32,
    /// Seconds the aim clock is normalized by.
    pub aim_max_time: f32,
    /// Seconds the mirror factor takes to settle after a backward flip.
    pub mirror_transition: f32,
    /// Exponent applied to the mirror transition progress.
    pub mirror_exponent: f32,
    /// Headings within this angle of straight back count as backward.
    pub backward_angle: f32,
    /// Seconds of the flight cross-fade.
    pub fly_window: f32,
    /// Hips height, as a fraction of avatar height, while jumping.
    pub jump_hips_height: f32,
    pub naruto_run_speed: f32,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            idle_speed: 0.0,
            walk_speed: 0.25,
            run_speed: 0.7,
            crouch_max_time: 0.2,
            aim_max_time: 1.0,
            mirror_transition: 0.15,
            mirror_exponent: 0.5,
            backward_angle: 0.4 * PI,
            fly_window: 1.0,
            jump_hips_height: 0.55,
            naruto_run_speed: 4.0,
        }
    }
}

/// Clip names of one set of direction clips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionNames {
    pub left: String,
    pub right: String,
    pub forward: String,
    pub backward: String,
    /// Left strafe played in reverse; stands in for the right side when
    /// moving backward.
    pub mirror_left: String,
    pub mirror_right: String,
}

impl DirectionNames {
    fn new(names: [&str; 6]) -> Self {
        let [left, right, forward, backward, mirror_left, mirror_right] = names.map(String::from);
        Self {
            left,
            right,
            forward,
            backward,
            mirror_left,
            mirror_right,
        }
    }

    fn directions(&self) -> [&str; 4] {
        [
            self.left.as_str(),
            self.right.as_str(),
            self.forward.as_str(),
            self.backward.as_str(),
        ]
    }

    fn mirrors(&self) -> [&str; 2] {
        [self.mirror_left.as_str(), self.mirror_right.as_str()]
    }

    /// Phase-lock the forward group and the backward group.
    fn phase_lock(&self, library: &mut ClipLibrary, factor: f32) {
        library.phase_lock(
            &[self.forward.as_str(), self.left.as_str(), self.right.as_str()],
            factor,
        );
        library.phase_lock(
            &[
                self.backward.as_str(),
                self.mirror_left.as_str(),
                self.mirror_right.as_str(),
            ],
            factor,
        );
    }
}

/// Names of the locomotion clips in the clip table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocomotionNames {
    pub walk: DirectionNames,
    pub run: DirectionNames,
    pub crouch: DirectionNames,
    pub idle: String,
    pub crouch_idle: String,
}

impl Default for LocomotionNames {
    fn default() -> Self {
        Self {
            walk: DirectionNames::new([
                "left strafe walking.fbx",
                "right strafe walking.fbx",
                "walking.fbx",
                "walking backwards.fbx",
                "left strafe walking reverse.fbx",
                "right strafe walking reverse.fbx",
            ]),
            run: DirectionNames::new([
                "left strafe.fbx",
                "right strafe.fbx",
                "Fast Run.fbx",
                "running backwards.fbx",
                "left strafe reverse.fbx",
                "right strafe reverse.fbx",
            ]),
            crouch: DirectionNames::new([
                "Crouched Sneaking Left.fbx",
                "Crouched Sneaking Right.fbx",
                "Sneaking Forward.fbx",
                "Sneaking Forward reverse.fbx",
                "Crouched Sneaking Left reverse.fbx",
                "Crouched Sneaking Right reverse.fbx",
            ]),
            idle: "idle.fbx".to_owned(),
            crouch_idle: "Crouch Idle.fbx".to_owned(),
        }
    }
}

impl LocomotionNames {
    /// Normalize durations so each direction group cycles in step. Run this
    /// once while building the library, before sharing it.
    pub fn phase_lock(&self, library: &mut ClipLibrary) {
        self.walk.phase_lock(library, 1.0);
        self.run.phase_lock(library, 1.0);
        self.crouch.phase_lock(library, 0.5);
    }
}

/// A value that can be sampled from a clip channel and blended.
trait Blendable: Copy {
    const NEUTRAL: Self;

    fn blend(self, other: Self, t: f32) -> Self;

    fn sample(clip: &AnimationClip, bone: CanonicalBone, t: f32) -> Option<Self>;

    /// Drop components the moving blend must not contribute.
    fn flatten(self) -> Self {
        self
    }
}

impl Blendable for Quat {
    const NEUTRAL: Self = Quat::IDENTITY;

    fn blend(self, other: Self, t: f32) -> Self {
        self.slerp(other, t)
    }

    fn sample(clip: &AnimationClip, bone: CanonicalBone, t: f32) -> Option<Self> {
        clip.sample_rotation(bone, t)
    }
}

impl Blendable for Vec3 {
    const NEUTRAL: Self = Vec3::ZERO;

    fn blend(self, other: Self, t: f32) -> Self {
        self.lerp(other, t)
    }

    fn sample(clip: &AnimationClip, bone: CanonicalBone, t: f32) -> Option<Self> {
        clip.sample_position(bone, t)
    }

    fn flatten(self) -> Self {
        Vec3::new(0.0, self.y, 0.0)
    }
}

/// Signed shortest angle from `a` to `b`, in `[-π, π)`.
#[must_use]
pub fn angle_difference(a: f32, b: f32) -> f32 {
    (b - a + PI).rem_euclid(TAU) - PI
}

/// Wrap a clock reading into a clip's duration before narrowing to `f32`.
fn wrap_clock(clip: &AnimationClip, t: f64) -> f32 {
    if clip.duration > 0.0 {
        t.rem_euclid(f64::from(clip.duration)) as f32
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Direction(usize),
    Mirror(usize),
}

/// Direction clips selected for the current heading.
#[derive(Debug, Clone, Copy)]
struct Selection {
    closest: [usize; 2],
    mirrored: [Slot; 2],
    angle_factor: f32,
}

impl Selection {
    fn for_heading(heading: f32) -> Self {
        let distance = |i: usize| angle_difference(heading, DIRECTION_ANGLES[i]).abs();
        let mut order = [0, 1, 2, 3];
        // Stable: equidistant clips keep declaration order.
        order.sort_by(|&a, &b| distance(a).total_cmp(&distance(b)));
        let closest = [order[0], order[1]];

        let mirrored = if closest.contains(&BACKWARD) {
            closest.map(|i| {
                if i == BACKWARD {
                    return Slot::Direction(i);
                }
                MIRROR_ANGLES
                    .iter()
                    .position(|&m| angle_difference(m, DIRECTION_ANGLES[i]).abs() < 1e-4)
                    .map_or(Slot::Direction(i), Slot::Mirror)
            })
        } else {
            closest.map(Slot::Direction)
        };

        let between =
            angle_difference(DIRECTION_ANGLES[closest[0]], DIRECTION_ANGLES[closest[1]]).abs();
        let angle_factor = if between > f32::EPSILON {
            ((between - distance(closest[0])) / between).clamp(0.0, 1.0)
        } else {
            1.0
        };

        Self {
            closest,
            mirrored,
            angle_factor,
        }
    }
}

/// Four direction clips plus their two mirrored stand-ins.
#[derive(Debug, Clone)]
struct DirectionSet {
    directions: [Arc<AnimationClip>; 4],
    mirrors: [Arc<AnimationClip>; 2],
}

impl DirectionSet {
    fn resolve(library: &ClipLibrary, names: &DirectionNames) -> Option<Self> {
        let lookup = |name: &str| {
            let clip = library.get(name).cloned();
            if clip.is_none() {
                tracing::warn!("Blend: locomotion clip '{}' not in library", name);
            }
            clip
        };
        let [l, r, f, b] = names.directions().map(lookup);
        let [ml, mr] = names.mirrors().map(lookup);
        Some(Self {
            directions: [l?, r?, f?, b?],
            mirrors: [ml?, mr?],
        })
    }

    fn clip(&self, slot: Slot) -> &AnimationClip {
        match slot {
            Slot::Direction(i) => &self.directions[i],
            Slot::Mirror(i) => &self.mirrors[i],
        }
    }

    fn sample<T: Blendable>(
        &self,
        bone: CanonicalBone,
        selection: &Selection,
        mirror_factor: f32,
        now: f64,
    ) -> Option<T> {
        let sample = |slot: Slot| {
            let clip = self.clip(slot);
            T::sample(clip, bone, wrap_clock(clip, now))
        };
        let [c1, c2] = selection.closest.map(|i| sample(Slot::Direction(i)));
        let [m1, m2] = selection.mirrored.map(sample);
        if c1.is_none() && c2.is_none() && m1.is_none() && m2.is_none() {
            return None;
        }
        let or = |v: Option<T>| v.unwrap_or(T::NEUTRAL);
        let af = selection.angle_factor;
        let direct = or(c2).blend(or(c1), af);
        let mirrored = or(m2).blend(or(m1), af);
        Some(direct.blend(mirrored, mirror_factor))
    }
}

/// Idle plus walk and run direction sets for one stance.
#[derive(Debug, Clone)]
struct Tier {
    idle: Option<Arc<AnimationClip>>,
    walk: Option<DirectionSet>,
    run: Option<DirectionSet>,
}

/// Per-evaluation blend weights shared by every bone.
#[derive(Debug, Clone, Copy)]
struct Frame {
    now: f64,
    idle_time: f64,
    selection: Selection,
    mirror_factor: f32,
    idle_walk: f32,
    walk_run: f32,
    crouch: f32,
}

impl Tier {
    fn sample<T: Blendable>(&self, bone: CanonicalBone, frame: &Frame) -> Option<T> {
        let idle = self
            .idle
            .as_ref()
            .and_then(|clip| T::sample(clip, bone, wrap_clock(clip, frame.idle_time)));
        let moving = |set: &Option<DirectionSet>| {
            set.as_ref().and_then(|s| {
                s.sample::<T>(bone, &frame.selection, frame.mirror_factor, frame.now)
            })
        };
        let walk = moving(&self.walk);
        let run = moving(&self.run);
        if idle.is_none() && walk.is_none() && run.is_none() {
            return None;
        }
        let moving = match (walk, run) {
            (Some(w), Some(r)) => w.blend(r, frame.walk_run),
            (Some(v), None) | (None, Some(v)) => v,
            (None, None) => return idle,
        };
        Some(
            idle.unwrap_or(T::NEUTRAL)
                .blend(moving.flatten(), frame.idle_walk),
        )
    }
}

/// Per-avatar blend tree over a shared clip library.
#[derive(Debug, Clone)]
pub struct BlendTree {
    library: Arc<ClipLibrary>,
    config: BlendConfig,
    height: f32,
    upright: Tier,
    crouch: Tier,
    warned: HashSet<ClipRole>,
    mirror_factor: f32,
}

impl BlendTree {
    /// Build a tree using the default locomotion clip names.
    #[must_use]
    pub fn new(library: Arc<ClipLibrary>, height: f32, config: BlendConfig) -> Self {
        Self::with_names(library, height, config, &LocomotionNames::default())
    }

    #[must_use]
    pub fn with_names(
        library: Arc<ClipLibrary>,
        height: f32,
        config: BlendConfig,
        names: &LocomotionNames,
    ) -> Self {
        let idle = library.get(&names.idle).cloned();
        if idle.is_none() {
            tracing::warn!("Blend: idle clip '{}' not in library", names.idle);
        }
        let upright = Tier {
            idle,
            walk: DirectionSet::resolve(&library, &names.walk),
            run: DirectionSet::resolve(&library, &names.run),
        };
        let crouch = Tier {
            idle: library.get(&names.crouch_idle).cloned(),
            walk: DirectionSet::resolve(&library, &names.crouch),
            run: None,
        };
        Self {
            library,
            config,
            height,
            upright,
            crouch,
            warned: HashSet::new(),
            mirror_factor: 0.0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &BlendConfig {
        &self.config
    }

    #[must_use]
    pub fn library(&self) -> &Arc<ClipLibrary> {
        &self.library
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Mirror factor used by the last evaluation.
    #[must_use]
    pub fn mirror_factor(&self) -> f32 {
        self.mirror_factor
    }

    /// Roles that were requested without a matching clip.
    pub fn warned_missing(&self) -> impl Iterator<Item = ClipRole> + '_ {
        self.warned.iter().copied()
    }

    /// Produce this tick's canonical pose. `now` is the clock in seconds.
    pub fn evaluate(&mut self, state: &mut AvatarState, now: f64) -> Pose {
        let config = self.config;
        let speed = state.horizontal_speed();
        let heading = state.velocity.x.atan2(state.velocity.z);
        let mirror_factor = self.update_mirror(&mut state.smoothing, heading, now);

        let ramp = |lo: f32, hi: f32| {
            if hi > lo {
                ((speed - lo) / (hi - lo)).clamp(0.0, 1.0)
            } else if speed >= hi {
                1.0
            } else {
                0.0
            }
        };
        let frame = Frame {
            now,
            idle_time: now - state.last_move_time,
            selection: Selection::for_heading(heading),
            mirror_factor,
            idle_walk: ramp(config.idle_speed, config.walk_speed),
            walk_run: ramp(config.walk_speed, config.run_speed),
            crouch: if config.crouch_max_time > 0.0 {
                (1.0 - state.crouch_time / config.crouch_max_time).clamp(0.0, 1.0)
            } else {
                0.0
            },
        };

        let mut pose = Pose::default();
        for &bone in CanonicalBone::ALL {
            if let Some(rotation) = self.locomotion::<Quat>(bone, &frame) {
                pose.rotations.insert(bone, rotation.normalize());
            }
        }
        let hips_tracked = self
            .upright
            .idle
            .as_ref()
            .is_some_and(|clip| clip.has_track(CanonicalBone::Hips, Channel::Position));
        if hips_tracked {
            pose.hips_position = self.locomotion::<Vec3>(CanonicalBone::Hips, &frame);
        }

        let jumping = self.apply_override(state, &mut pose) == Some(ClipRole::Jump);
        self.apply_use_layer(state, &mut pose);
        self.apply_fly(state, now, &mut pose);
        self.apply_activate(state, &mut pose);

        if jumping {
            pose.hips_position = Some(Vec3::new(0.0, self.height * config.jump_hips_height, 0.0));
        } else if let Some(hips) = pose.hips_position.as_mut() {
            *hips = Vec3::new(0.0, hips.y * self.height, 0.0);
        }
        pose
    }

    fn update_mirror(&mut self, smoothing: &mut Smoothing, heading: f32, now: f64) -> f32 {
        let config = &self.config;
        let is_backward = angle_difference(heading, PI).abs() < config.backward_angle;
        if is_backward != smoothing.is_backward {
            smoothing.is_backward = is_backward;
            smoothing.mirror_start = smoothing.mirror_factor;
            smoothing.mirror_target = if is_backward { 1.0 } else { 0.0 };
            smoothing.mirror_changed_at = now;
        }
        let elapsed = (now - smoothing.mirror_changed_at) as f32;
        let progress = if config.mirror_transition > 0.0 {
            (elapsed / config.mirror_transition).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let eased = progress.powf(config.mirror_exponent);
        smoothing.mirror_factor =
            smoothing.mirror_start + (smoothing.mirror_target - smoothing.mirror_start) * eased;
        self.mirror_factor = smoothing.mirror_factor;
        self.mirror_factor
    }

    fn locomotion<T: Blendable>(&self, bone: CanonicalBone, frame: &Frame) -> Option<T> {
        let upright = self.upright.sample::<T>(bone, frame);
        if frame.crouch <= 0.0 {
            return upright;
        }
        match (upright, self.crouch.sample::<T>(bone, frame)) {
            (Some(u), Some(c)) => Some(u.blend(c, frame.crouch)),
            (None, Some(c)) => Some(T::NEUTRAL.blend(c, frame.crouch)),
            (u, None) => u,
        }
    }

    fn warn_missing(&mut self, role: ClipRole) {
        if self.warned.insert(role) {
            tracing::warn!("Blend: no clip for {:?}, falling back", role);
        }
    }

    /// Clip by explicit name, or the first clip tagged for `role`.
    fn action_clip(&self, role: ClipRole, name: Option<&str>) -> Option<Arc<AnimationClip>> {
        match name {
            Some(name) => self.library.get(name).cloned(),
            None => self.library.find(|clip| role.matches(&clip.tags)).cloned(),
        }
    }

    /// Replace the base with the highest-priority active action that has a
    /// clip. Returns the role that won.
    fn apply_override(&mut self, state: &AvatarState, pose: &mut Pose) -> Option<ClipRole> {
        let tiers = [
            (ClipRole::Jump, state.jump.active, None),
            (ClipRole::ChargeJump, state.charge_jump.active, None),
            (ClipRole::Sit, state.sit.active, state.sit.animation.as_deref()),
            (ClipRole::NarutoRun, state.naruto_run.active, None),
            (ClipRole::Dance, state.dance.active, state.dance.animation.as_deref()),
            (ClipRole::Throw, state.throw.active, state.throw.animation.as_deref()),
            (ClipRole::FallLoop, state.fall_loop.active, None),
        ];

        for (role, active, name) in tiers {
            if !active {
                continue;
            }
            let Some(clip) = self.action_clip(role, name) else {
                self.warn_missing(role);
                continue;
            };
            let t = match role {
                ClipRole::Jump => state.jump.time * 0.6 + 0.7,
                ClipRole::ChargeJump => state.charge_jump.time,
                ClipRole::Sit => 1.0,
                ClipRole::NarutoRun => {
                    clip.wrap(state.naruto_run.time * self.config.naruto_run_speed)
                }
                ClipRole::Dance => clip.wrap(state.dance.time),
                ClipRole::Throw => state.throw.time,
                _ => clip.wrap(state.fall_loop.time),
            };
            write_clip(&clip, t, pose);

            if role == ClipRole::NarutoRun {
                let lean = Quat::from_rotation_x(0.1 * PI);
                for bone in [CanonicalBone::Chest, CanonicalBone::UpperChest] {
                    if let Some(rotation) = pose.rotations.get_mut(bone) {
                        *rotation = lean * *rotation;
                    }
                }
            }
            return Some(role);
        }
        None
    }

    /// Use and aim clips modify only the joints they drive, as a delta from
    /// the idle clip's first frame.
    fn apply_use_layer(&mut self, state: &AvatarState, pose: &mut Pose) {
        let (role, action) = if state.use_action.active {
            (ClipRole::Use, &state.use_action)
        } else if state.aim.active {
            (ClipRole::Aim, &state.aim)
        } else {
            return;
        };
        let Some(clip) = self.action_clip(role, action.animation.as_deref()) else {
            self.warn_missing(role);
            return;
        };
        let t = match role {
            ClipRole::Use if clip.tags.is_combo => action.time.min(clip.duration),
            ClipRole::Use => clip.wrap(action.time),
            _ => clip.wrap(action.time / self.config.aim_max_time.max(f32::EPSILON)),
        };
        let idle = self.upright.idle.clone();

        for track in clip.tracks() {
            let bone = track.bone;
            match track.channel() {
                Channel::Rotation => {
                    let Some(layer) = clip.sample_rotation(bone, t) else {
                        continue;
                    };
                    let idle0 = idle
                        .as_ref()
                        .and_then(|c| c.sample_rotation(bone, 0.0))
                        .unwrap_or(Quat::IDENTITY);
                    let base = pose.rotations.get(bone).copied().unwrap_or(Quat::IDENTITY);
                    pose.rotations
                        .insert(bone, (layer * idle0.inverse() * base).normalize());
                }
                Channel::Position if bone == CanonicalBone::Hips => {
                    let (Some(layer), Some(hips)) =
                        (clip.sample_position(bone, t), pose.hips_position.as_mut())
                    else {
                        continue;
                    };
                    let idle0 = idle
                        .as_ref()
                        .and_then(|c| c.sample_position(bone, 0.0))
                        .unwrap_or(Vec3::ZERO);
                    *hips = *hips - idle0 + layer;
                }
                Channel::Position => {}
            }
        }
    }

    /// Cross-fade into the float pose when entering flight, out when leaving.
    fn apply_fly(&mut self, state: &AvatarState, now: f64, pose: &mut Pose) {
        if !state.fly.engaged {
            return;
        }
        let window = self.config.fly_window.max(f32::EPSILON);
        let progress = state.fly.time / window;
        let factor = match (state.fly.active, progress < 1.0) {
            (true, true) => CubicBezier::EASE_OUT.ease(progress),
            (true, false) => 1.0,
            (false, true) => 1.0 - CubicBezier::EASE_OUT.ease(progress),
            (false, false) => return,
        };
        if factor <= 0.0 {
            return;
        }
        let Some(clip) = self.action_clip(ClipRole::Float, None) else {
            self.warn_missing(ClipRole::Float);
            return;
        };
        blend_clip(&clip, wrap_clock(&clip, now), factor, pose);
    }

    fn apply_activate(&mut self, state: &AvatarState, pose: &mut Pose) {
        let activate = state.activate;
        if !activate.active {
            return;
        }
        let Some(clip) = self.library.get(activate.direction.clip_name()).cloned() else {
            self.warn_missing(ClipRole::Activate);
            return;
        };
        let t = activate.time * activate.direction.speed();
        let factor = CubicBezier::EASE_OUT.ease(t).min(1.0);
        blend_clip(&clip, t, factor, pose);
    }
}

/// Overwrite every channel the clip drives.
fn write_clip(clip: &AnimationClip, t: f32, pose: &mut Pose) {
    for track in clip.tracks() {
        match track.channel() {
            Channel::Rotation => {
                if let Some(rotation) = clip.sample_rotation(track.bone, t) {
                    pose.rotations.insert(track.bone, rotation);
                }
            }
            Channel::Position if track.bone == CanonicalBone::Hips => {
                pose.hips_position = clip.sample_position(track.bone, t);
            }
            Channel::Position => {}
        }
    }
}

/// Move every channel the clip drives toward it by `factor`.
fn blend_clip(clip: &AnimationClip, t: f32, factor: f32, pose: &mut Pose) {
    for track in clip.tracks() {
        match track.channel() {
            Channel::Rotation => {
                if let Some(target) = clip.sample_rotation(track.bone, t) {
                    let base = pose
                        .rotations
                        .get(track.bone)
                        .copied()
                        .unwrap_or(Quat::IDENTITY);
                    pose.rotations
                        .insert(track.bone, base.slerp(target, factor).normalize());
                }
            }
            Channel::Position if track.bone == CanonicalBone::Hips => {
                if let Some(target) = clip.sample_position(track.bone, t) {
                    let base = pose.hips_position.unwrap_or(target);
                    pose.hips_position = Some(base.lerp(target, factor));
                }
            }
            Channel::Position => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::Track;

    #[test]
    fn angle_difference_wraps() {
        assert!((angle_difference(0.0, FRAC_PI_2) - FRAC_PI_2).abs() < 1e-6);
        assert!((angle_difference(PI * 0.9, -PI * 0.9) - PI * 0.2).abs() < 1e-5);
        assert!(angle_difference(0.3, 0.3).abs() < 1e-6);
    }

    #[test]
    fn selection_prefers_closest_pair() {
        let forward_left = Selection::for_heading(0.3);
        assert_eq!(forward_left.closest, [2, 0]);
        assert_eq!(forward_left.mirrored, [Slot::Direction(2), Slot::Direction(0)]);
        assert!((forward_left.angle_factor - (FRAC_PI_2 - 0.3) / FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn backward_pairs_use_mirrors() {
        let back_left = Selection::for_heading(PI * 0.8);
        assert_eq!(back_left.closest, [BACKWARD, 0]);
        // Left side swapped for the clip matching +π/2: the right reverse.
        assert_eq!(back_left.mirrored, [Slot::Direction(BACKWARD), Slot::Mirror(1)]);
    }

    #[test]
    fn diagonal_heading_blends_evenly() {
        let diagonal = Selection::for_heading(PI / 4.0);
        let mut closest = diagonal.closest;
        closest.sort_unstable();
        assert_eq!(closest, [0, 2]);
        assert!((diagonal.angle_factor - 0.5).abs() < 1e-5);
    }

    fn library(extra: Vec<AnimationClip>) -> Arc<ClipLibrary> {
        let idle = AnimationClip::new(
            "idle.fbx",
            1.0,
            vec![
                Track::rotation(CanonicalBone::Spine, vec![0.0], vec![Quat::from_rotation_x(0.2)]),
                Track::position(CanonicalBone::Hips, vec![0.0], vec![Vec3::new(0.1, 0.5, 0.2)]),
            ],
        );
        let mut clips = vec![idle];
        clips.extend(extra);
        Arc::new(ClipLibrary::new(clips))
    }

    #[test]
    fn idle_only_library_yields_idle_pose() {
        let mut tree = BlendTree::new(library(Vec::new()), 2.0, BlendConfig::default());
        let mut state = AvatarState::new();
        let pose = tree.evaluate(&mut state, 3.0);
        let spine = pose.rotations.get(CanonicalBone::Spine).unwrap();
        assert!(spine.abs_diff_eq(Quat::from_rotation_x(0.2), 1e-5));
        // Hips are flattened and scaled by height.
        assert!(pose.hips_position.unwrap().abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn use_layer_applies_delta_from_idle() {
        let mut tags = ClipTags::default();
        tags.is_use = true;
        let swing = AnimationClip::new(
            "swing",
            1.0,
            vec![Track::rotation(CanonicalBone::Spine, vec![0.0], vec![Quat::from_rotation_x(0.5)])],
        )
        .with_tags(tags);
        let mut tree = BlendTree::new(library(vec![swing]), 1.0, BlendConfig::default());
        let mut state = AvatarState::new();
        state.use_action.start(None);
        let pose = tree.evaluate(&mut state, 0.0);
        let spine = pose.rotations.get(CanonicalBone::Spine).unwrap();
        // use * idle0⁻¹ * base with base == idle0 leaves the use rotation.
        assert!(spine.abs_diff_eq(Quat::from_rotation_x(0.5), 1e-5));
    }

    #[test]
    fn missing_override_warns_once_and_falls_through() {
        let mut tags = ClipTags::default();
        tags.is_sitting = true;
        let sit = AnimationClip::new(
            "sit",
            2.0,
            vec![Track::rotation(CanonicalBone::Spine, vec![0.0], vec![Quat::from_rotation_z(1.0)])],
        )
        .with_tags(tags);
        let mut tree = BlendTree::new(library(vec![sit]), 1.0, BlendConfig::default());
        let mut state = AvatarState::new();
        state.jump.start();
        state.sit.start(None);
        for i in 0..5 {
            let pose = tree.evaluate(&mut state, f64::from(i) * 0.1);
            let spine = pose.rotations.get(CanonicalBone::Spine).unwrap();
            assert!(spine.abs_diff_eq(Quat::from_rotation_z(1.0), 1e-5));
        }
        assert_eq!(tree.warned_missing().collect::<Vec<_>>(), vec![ClipRole::Jump]);
    }

    #[test]
    fn charge_jump_ranks_between_jump_and_sit() {
        let pose_clip = |name: &str, rotation: Quat, tags: ClipTags| {
            AnimationClip::new(
                name,
                2.0,
                vec![Track::rotation(CanonicalBone::Spine, vec![0.0], vec![rotation])],
            )
            .with_tags(tags)
        };
        let clips = vec![
            pose_clip("jump", Quat::from_rotation_z(1.0), ClipTags { is_jump: true, ..ClipTags::default() }),
            pose_clip(
                "charge",
                Quat::from_rotation_y(1.0),
                ClipTags { is_charge_jump: true, ..ClipTags::default() },
            ),
            pose_clip("sit", Quat::from_rotation_x(1.0), ClipTags { is_sitting: true, ..ClipTags::default() }),
        ];
        let mut tree = BlendTree::new(library(clips), 1.0, BlendConfig::default());
        let mut state = AvatarState::new();
        let spine = |pose: &Pose| *pose.rotations.get(CanonicalBone::Spine).unwrap();

        state.sit.start(None);
        state.charge_jump.start();
        assert!(spine(&tree.evaluate(&mut state, 0.0)).abs_diff_eq(Quat::from_rotation_y(1.0), 1e-5));

        state.jump.start();
        assert!(spine(&tree.evaluate(&mut state, 0.0)).abs_diff_eq(Quat::from_rotation_z(1.0), 1e-5));
    }

    #[test]
    fn fly_fades_in_and_out() {
        let mut tags = ClipTags::default();
        tags.is_float = true;
        let float = AnimationClip::new(
            "float",
            1.0,
            vec![Track::rotation(CanonicalBone::Spine, vec![0.0], vec![Quat::IDENTITY])],
        )
        .with_tags(tags);
        let mut tree = BlendTree::new(library(vec![float]), 1.0, BlendConfig::default());
        let mut state = AvatarState::new();
        let idle = Quat::from_rotation_x(0.2);
        let angle = |pose: &Pose| pose.rotations.get(CanonicalBone::Spine).unwrap().angle_between(Quat::IDENTITY);

        state.fly.toggle();
        let start = angle(&tree.evaluate(&mut state, 0.0));
        assert!((start - idle.angle_between(Quat::IDENTITY)).abs() < 1e-4);
        state.fly.time = 2.0;
        assert!(angle(&tree.evaluate(&mut state, 0.0)) < 1e-4);

        state.fly.toggle();
        state.fly.time = 0.5;
        let leaving = angle(&tree.evaluate(&mut state, 0.0));
        assert!(leaving > 0.0 && leaving < 0.2);
    }

    #[test]
    fn never_flown_avatar_skips_fly_layer() {
        let float = AnimationClip::new(
            "float",
            1.0,
            vec![Track::rotation(CanonicalBone::Spine, vec![0.0], vec![Quat::from_rotation_z(1.0)])],
        )
        .with_tags(ClipTags {
            is_float: true,
            ..ClipTags::default()
        });
        let mut tree = BlendTree::new(library(vec![float]), 1.0, BlendConfig::default());
        let mut state = AvatarState::new();
        let pose = tree.evaluate(&mut state, 0.0);
        let spine = pose.rotations.get(CanonicalBone::Spine).unwrap();
        assert!(spine.abs_diff_eq(Quat::from_rotation_x(0.2), 1e-5));

        let mut bare = BlendTree::new(library(vec![]), 1.0, BlendConfig::default());
        bare.evaluate(&mut AvatarState::new(), 0.0);
        assert_eq!(bare.warned_missing().count(), 0);
    }
}
