//! Secondary Motion Layer: spring-bone chains such as hair.
//!
//! The layer consumes chain topology as plain data and runs a verlet tail
//! simulation at a fixed sub-step rate. Each joint's rotation is written as
//! `animated * offset`, so the layer only ever adds rotation on top of
//! whatever the blend tree produced this tick.

use glam::{Affine3A, Quat, Vec3};

use crate::skeleton::Skeleton;
use crate::timestep::FixedTimeStep;

/// Tail length for joints with no child bone.
const LEAF_TAIL_LENGTH: f32 = 0.07;

/// Simulation rate and coefficient scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringSettings {
    pub frame_rate: f32,
    pub max_substeps: usize,
    /// Multiplier applied to every chain's authored drag.
    pub drag_scale: f32,
}

impl Default for SpringSettings {
    fn default() -> Self {
        Self {
            frame_rate: 60.0,
            max_substeps: 8,
            drag_scale: 0.7,
        }
    }
}

/// A collision sphere attached to a bone.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SphereCollider {
    /// Center in the bone's local space.
    pub offset: Vec3,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColliderGroup {
    pub bone: usize,
    pub colliders: Vec<SphereCollider>,
}

/// Authored parameters of one spring chain.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpringChainDesc {
    pub name: String,
    /// Each root and all of its descendants become joints.
    pub roots: Vec<usize>,
    pub stiffness: f32,
    pub gravity_power: f32,
    pub gravity_dir: Vec3,
    pub drag: f32,
    pub hit_radius: f32,
    /// Indices into [`SecondaryMotionDesc::collider_groups`].
    pub collider_groups: Vec<usize>,
}

impl SpringChainDesc {
    /// Defaults for hair found on a model without spring metadata.
    #[must_use]
    pub fn hair(name: impl Into<String>, root: usize) -> Self {
        Self {
            name: name.into(),
            roots: vec![root],
            stiffness: 0.5,
            gravity_power: 0.2,
            gravity_dir: Vec3::NEG_Y,
            drag: 0.3,
            hit_radius: 0.02,
            collider_groups: Vec::new(),
        }
    }
}

/// Spring-chain topology of a model.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SecondaryMotionDesc {
    pub chains: Vec<SpringChainDesc>,
    pub collider_groups: Vec<ColliderGroup>,
}

#[derive(Debug, Clone)]
struct Joint {
    bone: usize,
    /// Rest tail direction in the bone's local frame.
    axis: Vec3,
    length: f32,
    current_tail: Vec3,
    prev_tail: Vec3,
    /// Last rotation the blend tree left on the bone.
    animated: Quat,
    offset: Quat,
    written: Option<Quat>,
}

#[derive(Debug, Clone)]
struct Chain {
    stiffness: f32,
    drag: f32,
    gravity: Vec3,
    hit_radius: f32,
    collider_groups: Vec<usize>,
    joints: Vec<Joint>,
}

/// Runtime state for every spring chain of one avatar.
#[derive(Debug, Clone)]
pub struct SecondaryMotion {
    settings: SpringSettings,
    timestep: FixedTimeStep,
    chains: Vec<Chain>,
    collider_groups: Vec<ColliderGroup>,
}

impl SecondaryMotion {
    /// Build chains from `desc` against the skeleton's current pose.
    /// `root` maps skeleton space into world space.
    #[must_use]
    pub fn new(
        desc: &SecondaryMotionDesc,
        skeleton: &Skeleton,
        root: Affine3A,
        settings: SpringSettings,
    ) -> Self {
        let collider_groups: Vec<_> = desc
            .collider_groups
            .iter()
            .filter(|group| group.bone < skeleton.len())
            .cloned()
            .collect();

        let mut chains = Vec::with_capacity(desc.chains.len());
        for chain in &desc.chains {
            let mut joints = Vec::new();
            for &chain_root in &chain.roots {
                if chain_root >= skeleton.len() {
                    tracing::warn!("Spring: chain '{}' root {} out of range", chain.name, chain_root);
                    continue;
                }
                for &bone in skeleton.order() {
                    if bone == chain_root || skeleton.is_descendant_of(bone, chain_root) {
                        joints.push(rest_joint(skeleton, root, bone));
                    }
                }
            }
            chains.push(Chain {
                stiffness: chain.stiffness,
                drag: chain.drag,
                gravity: chain.gravity_dir.normalize_or_zero() * chain.gravity_power,
                hit_radius: chain.hit_radius,
                collider_groups: chain
                    .collider_groups
                    .iter()
                    .copied()
                    .filter(|&g| g < collider_groups.len())
                    .collect(),
                joints,
            });
        }

        tracing::debug!(
            "Spring: {} chains, {} joints",
            chains.len(),
            chains.iter().map(|c| c.joints.len()).sum::<usize>()
        );

        Self {
            timestep: FixedTimeStep::new(settings.frame_rate, settings.max_substeps),
            settings,
            chains,
            collider_groups,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SpringSettings {
        &self.settings
    }

    #[must_use]
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.chains.iter().map(|c| c.joints.len()).sum()
    }

    /// Current simulated tail of every joint, in world space.
    pub fn tails(&self) -> impl Iterator<Item = (usize, Vec3)> + '_ {
        self.chains
            .iter()
            .flat_map(|c| c.joints.iter().map(|j| (j.bone, j.current_tail)))
    }

    /// Stiffness multiplier for the avatar's current speed. Faster
    /// horizontal motion stiffens chains; vertical motion relaxes them.
    #[must_use]
    pub fn stiffness_scale(horizontal_speed: f32, vertical_speed: f32) -> f32 {
        let speed = (horizontal_speed * 2.0 - vertical_speed.abs() * 0.5).clamp(0.0, 4.0);
        0.1 + 0.1 * speed * speed
    }

    /// Advance the simulation by `dt` seconds and write joint rotations.
    /// Returns the number of fixed sub-steps that ran.
    pub fn update(
        &mut self,
        skeleton: &mut Skeleton,
        root: Affine3A,
        dt: f32,
        horizontal_speed: f32,
        vertical_speed: f32,
    ) -> usize {
        for joint in self.chains.iter_mut().flat_map(|c| c.joints.iter_mut()) {
            let local = skeleton.local(joint.bone).rotation;
            if joint.written != Some(local) {
                joint.animated = local;
            }
        }

        let steps = self.timestep.advance(dt);
        let step = self.timestep.step();
        let stiffness_scale = Self::stiffness_scale(horizontal_speed, vertical_speed);
        let drag_scale = self.settings.drag_scale;

        for _ in 0..steps {
            for chain in &mut self.chains {
                let stiffness = chain.stiffness * stiffness_scale;
                let drag = (chain.drag * drag_scale).clamp(0.0, 1.0);
                let spheres = world_spheres(
                    skeleton,
                    root,
                    &self.collider_groups,
                    &chain.collider_groups,
                    chain.hit_radius,
                );
                for joint in &mut chain.joints {
                    simulate_joint(
                        joint,
                        skeleton,
                        root,
                        step,
                        stiffness,
                        drag,
                        chain.gravity,
                        &spheres,
                    );
                }
            }
        }

        if steps == 0 {
            for joint in self.chains.iter_mut().flat_map(|c| c.joints.iter_mut()) {
                let rotation = joint.animated * joint.offset;
                if joint.written != Some(rotation) {
                    skeleton.local_mut(joint.bone).rotation = rotation;
                    skeleton.update_subtree(joint.bone);
                    joint.written = Some(rotation);
                }
            }
        }
        steps
    }

    /// Snap every tail back to the current pose.
    pub fn reset(&mut self, skeleton: &Skeleton, root: Affine3A) {
        self.timestep.reset();
        for joint in self.chains.iter_mut().flat_map(|c| c.joints.iter_mut()) {
            let fresh = rest_joint(skeleton, root, joint.bone);
            *joint = Joint {
                written: joint.written,
                ..fresh
            };
        }
    }
}

fn parent_world_rotation(skeleton: &Skeleton, root: Affine3A, bone: usize) -> Quat {
    let skeleton_rotation = skeleton
        .parent(bone)
        .map_or(Quat::IDENTITY, |p| skeleton.world_rotation(p));
    Quat::from_mat3a(&root.matrix3).normalize() * skeleton_rotation
}

fn rest_joint(skeleton: &Skeleton, root: Affine3A, bone: usize) -> Joint {
    let position = root.transform_point3(skeleton.world_position(bone));
    let local = skeleton.local(bone).rotation;
    let frame = parent_world_rotation(skeleton, root, bone) * local;

    let tail = match skeleton.children(bone).first() {
        Some(&child) => root.transform_point3(skeleton.world_position(child)),
        None => {
            let parent = skeleton
                .parent(bone)
                .map_or(position - Vec3::Y, |p| {
                    root.transform_point3(skeleton.world_position(p))
                });
            position + (position - parent).normalize_or(Vec3::Y) * LEAF_TAIL_LENGTH
        }
    };
    let delta = tail - position;
    let length = delta.length();
    let axis = (frame.inverse() * delta).normalize_or(Vec3::Y);
    Joint {
        bone,
        axis,
        length: if length > f32::EPSILON { length } else { LEAF_TAIL_LENGTH },
        current_tail: tail,
        prev_tail: tail,
        animated: local,
        offset: Quat::IDENTITY,
        written: None,
    }
}

fn world_spheres(
    skeleton: &Skeleton,
    root: Affine3A,
    groups: &[ColliderGroup],
    indices: &[usize],
    hit_radius: f32,
) -> Vec<(Vec3, f32)> {
    indices
        .iter()
        .flat_map(|&g| {
            let group = &groups[g];
            let world = root * skeleton.world(group.bone);
            group
                .colliders
                .iter()
                .map(move |c| (world.transform_point3(c.offset), c.radius + hit_radius))
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn simulate_joint(
    joint: &mut Joint,
    skeleton: &mut Skeleton,
    root: Affine3A,
    step: f32,
    stiffness: f32,
    drag: f32,
    gravity: Vec3,
    spheres: &[(Vec3, f32)],
) {
    // Parents earlier in the chain have already been written this step.
    skeleton.local_mut(joint.bone).rotation = joint.animated;
    skeleton.update_subtree(joint.bone);

    let position = root.transform_point3(skeleton.world_position(joint.bone));
    let frame = parent_world_rotation(skeleton, root, joint.bone) * joint.animated;

    let inertia = (joint.current_tail - joint.prev_tail) * (1.0 - drag);
    let restore = frame * joint.axis * stiffness * step;
    let mut next = joint.current_tail + inertia + restore + gravity * step;
    next = position + (next - position).normalize_or(frame * joint.axis) * joint.length;

    for &(center, radius) in spheres {
        let away = next - center;
        if away.length_squared() < radius * radius {
            next = center + away.normalize_or(Vec3::Y) * radius;
            next = position + (next - position).normalize_or(frame * joint.axis) * joint.length;
        }
    }

    joint.prev_tail = joint.current_tail;
    joint.current_tail = next;

    let direction = (frame.inverse() * (next - position)).normalize_or(joint.axis);
    joint.offset = Quat::from_rotation_arc(joint.axis, direction);
    let rotation = joint.animated * joint.offset;
    skeleton.local_mut(joint.bone).rotation = rotation;
    skeleton.update_subtree(joint.bone);
    joint.written = Some(rotation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Bone;
    use crate::transform::Transform;

    /// Head with a two-bone strand hanging sideways along +X.
    fn strand() -> Skeleton {
        Skeleton::new(vec![
            Bone::new("Head", None, Transform::from_translation(Vec3::new(0.0, 1.6, 0.0))),
            Bone::new("HairA", Some(0), Transform::from_translation(Vec3::new(0.05, 0.1, 0.0))),
            Bone::new("HairB", Some(1), Transform::from_translation(Vec3::new(0.1, 0.0, 0.0))),
            Bone::new("HairC", Some(2), Transform::from_translation(Vec3::new(0.1, 0.0, 0.0))),
        ])
        .unwrap()
    }

    fn desc() -> SecondaryMotionDesc {
        SecondaryMotionDesc {
            chains: vec![SpringChainDesc::hair("hair", 1)],
            collider_groups: Vec::new(),
        }
    }

    #[test]
    fn chains_collect_descendants() {
        let skeleton = strand();
        let motion = SecondaryMotion::new(&desc(), &skeleton, Affine3A::IDENTITY, SpringSettings::default());
        assert_eq!(motion.chain_count(), 1);
        assert_eq!(motion.joint_count(), 3);
    }

    #[test]
    fn zero_steps_leave_pose_untouched() {
        let mut skeleton = strand();
        let before = skeleton.world_position(3);
        let mut motion =
            SecondaryMotion::new(&desc(), &skeleton, Affine3A::IDENTITY, SpringSettings::default());
        assert_eq!(motion.update(&mut skeleton, Affine3A::IDENTITY, 0.001, 0.0, 0.0), 0);
        assert!(skeleton.world_position(3).abs_diff_eq(before, 1e-6));
    }

    #[test]
    fn gravity_pulls_strand_down_and_preserves_length() {
        let mut skeleton = strand();
        let mut motion =
            SecondaryMotion::new(&desc(), &skeleton, Affine3A::IDENTITY, SpringSettings::default());
        let start = skeleton.world_position(3);
        for _ in 0..120 {
            motion.update(&mut skeleton, Affine3A::IDENTITY, 1.0 / 60.0, 0.0, 0.0);
        }
        let end = skeleton.world_position(3);
        assert!(end.y < start.y - 0.01);
        let segment = skeleton.world_position(2).distance(skeleton.world_position(3));
        assert!((segment - 0.1).abs() < 1e-4);
    }

    #[test]
    fn frame_rate_jitter_does_not_change_step_count() {
        let mut a = strand();
        let mut b = strand();
        let mut steady = SecondaryMotion::new(&desc(), &a, Affine3A::IDENTITY, SpringSettings::default());
        let mut jittery = SecondaryMotion::new(&desc(), &b, Affine3A::IDENTITY, SpringSettings::default());
        let frames = [0.010, 0.023, 0.017, 0.016, 0.009, 0.025];
        let mut steady_steps = 0;
        let mut jitter_steps = 0;
        for i in 0..60 {
            steady_steps += steady.update(&mut a, Affine3A::IDENTITY, 0.1 / 6.0, 0.0, 0.0);
            jitter_steps += jittery.update(&mut b, Affine3A::IDENTITY, frames[i % frames.len()], 0.0, 0.0);
        }
        assert!(steady_steps.abs_diff(jitter_steps) <= 1);
    }

    #[test]
    fn speed_stiffens_chains() {
        assert!(SecondaryMotion::stiffness_scale(2.0, 0.0) > SecondaryMotion::stiffness_scale(0.0, 0.0));
        assert!((SecondaryMotion::stiffness_scale(0.0, 3.0) - 0.1).abs() < 1e-6);
        assert!((SecondaryMotion::stiffness_scale(10.0, 0.0) - 1.7).abs() < 1e-6);
    }

    #[test]
    fn animated_rotation_is_kept_under_offset() {
        let mut skeleton = strand();
        let mut motion =
            SecondaryMotion::new(&desc(), &skeleton, Affine3A::IDENTITY, SpringSettings::default());
        motion.update(&mut skeleton, Affine3A::IDENTITY, 1.0 / 60.0, 0.0, 0.0);
        // A new animated value replaces the stored base.
        let animated = Quat::from_rotation_z(0.3);
        skeleton.local_mut(1).rotation = animated;
        motion.update(&mut skeleton, Affine3A::IDENTITY, 1.0 / 60.0, 0.0, 0.0);
        let joint = &motion.chains[0].joints[0];
        assert!(joint.animated.abs_diff_eq(animated, 1e-6));
    }
}
