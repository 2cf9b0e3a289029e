//! Per-avatar tick pipeline.
//!
//! One [`Avatar::update`] runs the stages in a fixed order: action clocks,
//! blend tree, eye target, retargeting onto the rig, spring bones (which
//! see this tick's pose), then facial expressions.

use std::sync::Arc;

use glam::{Affine3A, Quat, Vec3};

use crate::binder::{BoundAvatar, ImportedModel, bind_avatar};
use crate::blend::{BlendConfig, BlendTree, Pose};
use crate::bone::CanonicalBone;
use crate::easing::CubicBezier;
use crate::error::BindingError;
use crate::expression::ExpressionLayer;
use crate::library::ClipLibrary;
use crate::spring::{SecondaryMotion, SpringSettings};
use crate::state::AvatarState;

/// Largest angle from straight ahead the head will turn toward.
const EYE_TARGET_LIMIT: f32 = 0.4 * std::f32::consts::PI;
/// Seconds to acquire or release an eye target.
const EYE_TARGET_BLEND: f64 = 2.0;

/// A bound rig with everything needed to animate it.
#[derive(Debug)]
pub struct Avatar {
    bound: BoundAvatar,
    blend: BlendTree,
    state: AvatarState,
    secondary: SecondaryMotion,
    expressions: ExpressionLayer,
    position: Vec3,
    yaw: f32,
    pose: Pose,
}

impl Avatar {
    /// Bind `model` and prepare its blend tree, springs and expressions.
    pub fn new(
        model: ImportedModel,
        library: Arc<ClipLibrary>,
        config: BlendConfig,
        springs: SpringSettings,
    ) -> Result<Self, BindingError> {
        let bound = bind_avatar(model)?;
        let blend = BlendTree::new(library, bound.height(), config);
        let root = Affine3A::from_quat(bound.normalization());
        let secondary =
            SecondaryMotion::new(bound.secondary_motion(), bound.skeleton(), root, springs);
        let expressions =
            ExpressionLayer::new(bound.expressions().clone(), bound.skinned_meshes());
        Ok(Self {
            bound,
            blend,
            state: AvatarState::new(),
            secondary,
            expressions,
            position: Vec3::ZERO,
            yaw: 0.0,
            pose: Pose::default(),
        })
    }

    #[must_use]
    pub fn bound(&self) -> &BoundAvatar {
        &self.bound
    }

    #[must_use]
    pub fn state(&self) -> &AvatarState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AvatarState {
        &mut self.state
    }

    #[must_use]
    pub fn blend_tree(&self) -> &BlendTree {
        &self.blend
    }

    #[must_use]
    pub fn secondary_motion(&self) -> &SecondaryMotion {
        &self.secondary
    }

    /// Pose produced by the last update.
    #[must_use]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Morph weights per skinned mesh from the last update.
    #[must_use]
    pub fn morph_weights(&self) -> &[Vec<f32>] {
        self.expressions.morph_weights()
    }

    /// Place the avatar in the world. Feeds movement tracking as well.
    pub fn set_placement(&mut self, position: Vec3, yaw: f32, dt: f32, now: f64) {
        self.state.track_movement(position, yaw, dt, now);
        self.position = position;
        self.yaw = yaw;
    }

    /// Skeleton space to world space.
    #[must_use]
    pub fn root_transform(&self) -> Affine3A {
        Affine3A::from_rotation_translation(
            Quat::from_rotation_y(self.yaw) * self.bound.normalization(),
            self.position,
        )
    }

    /// World transform of a source bone.
    #[must_use]
    pub fn bone_world(&self, index: usize) -> Affine3A {
        self.root_transform() * self.bound.skeleton().world(index)
    }

    pub fn decapitate(&mut self) {
        self.bound.decapitate();
    }

    pub fn undecapitate(&mut self) {
        self.bound.undecapitate();
    }

    /// Run one simulation tick. `now` is the clock in seconds, `dt` the
    /// time since the previous tick.
    pub fn update(&mut self, now: f64, dt: f32) {
        self.state.tick(dt, self.blend.config().crouch_max_time);

        let mut pose = self.blend.evaluate(&mut self.state, now);
        self.apply_eye_target(&mut pose, now);
        self.bound.apply_pose(&pose);
        self.pose = pose;

        let root = self.root_transform();
        let horizontal = self.state.horizontal_speed();
        let vertical = self.state.velocity.y;
        self.secondary
            .update(self.bound.skeleton_mut(), root, dt, horizontal, vertical);

        self.expressions.evaluate(&mut self.state, now);
    }

    fn apply_eye_target(&mut self, pose: &mut Pose, now: f64) {
        let target = self.state.eye_target;
        let look = if target.enabled {
            self.bound
                .canonical_position(CanonicalBone::Head)
                .and_then(|head| look_rotation(target.position - head))
        } else {
            None
        };

        let smoothing = &mut self.state.smoothing;
        let active = look.is_some();
        if active != smoothing.eye_active {
            smoothing.eye_active = active;
            smoothing.eye_start = smoothing.eye_rotation;
            smoothing.eye_changed_at = now;
        }
        let progress = ((now - smoothing.eye_changed_at) / EYE_TARGET_BLEND).clamp(0.0, 1.0);
        let eased = CubicBezier::EASE_OUT.ease(progress as f32);
        let rotation = smoothing
            .eye_start
            .slerp(look.unwrap_or(Quat::IDENTITY), eased);
        smoothing.eye_rotation = rotation;

        if rotation.abs_diff_eq(Quat::IDENTITY, 1e-6) {
            return;
        }
        let bone = if self.bound.binding(CanonicalBone::Neck).is_some() {
            CanonicalBone::Neck
        } else {
            CanonicalBone::Head
        };
        let base = pose.rotations.get(bone).copied().unwrap_or(Quat::IDENTITY);
        pose.rotations.insert(bone, (rotation * base).normalize());
    }
}

/// Yaw then pitch toward `direction`, if it lies within the turn limit.
fn look_rotation(direction: Vec3) -> Option<Quat> {
    let direction = direction.try_normalize()?;
    if direction.angle_between(Vec3::Z) > EYE_TARGET_LIMIT {
        return None;
    }
    let yaw = direction.x.atan2(direction.z);
    let pitch = -direction.y.atan2(Vec3::new(direction.x, 0.0, direction.z).length());
    Some(Quat::from_rotation_y(yaw) * Quat::from_rotation_x(pitch))
}
