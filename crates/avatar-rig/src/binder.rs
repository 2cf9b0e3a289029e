//! Skeleton Binder: maps an imported rig onto the canonical skeleton.
//!
//! Binding runs once per avatar. It resolves canonical bones through the
//! naming dialects, infers the rig's axis convention from its bind pose and
//! computes one pre-rotation per bound bone. A canonical rotation `A` is
//! then retargeted as `Q⁻¹·A·Q·initial`, so the identity pose reproduces the
//! bind pose exactly.
//!
//! Spaces used here:
//! - *skeleton space*: bone world transforms with the armature node reset
//!   to identity
//! - *canonical space*: skeleton space rotated by the normalization `F`
//!   derived from the flip flags (+Y up, facing +Z, left hand on +X)

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Affine3A, Quat, Vec3};

use crate::blend::Pose;
use crate::bone::{CanonicalBone, CanonicalMap, Side};
use crate::error::BindingError;
use crate::expression::ExpressionBindings;
use crate::naming::{GenericTokens, NamingDialect, builtin_dialects};
use crate::skeleton::Skeleton;
use crate::spring::{SecondaryMotionDesc, SpringChainDesc};
use crate::transform::Transform;

/// A mesh skinned to the shared skeleton.
#[derive(Debug, Clone, Default)]
pub struct SkinnedMesh {
    pub name: String,
    /// Skeleton bone indices used as joints.
    pub joints: Vec<usize>,
    /// Morph target names, indexed like the mesh's morph weights.
    pub morph_targets: Vec<String>,
}

/// Output of an external model loader.
#[derive(Debug, Clone)]
pub struct ImportedModel {
    pub skeleton: Skeleton,
    pub skinned_meshes: Vec<SkinnedMesh>,
    /// Transform of the non-bone node the skeleton roots hang from.
    pub armature: Transform,
    /// VRM humanoid extension: canonical bone to skeleton index.
    pub humanoid: Option<Vec<(CanonicalBone, usize)>>,
    /// Blend-shape presets from the model's extension block.
    pub expressions: Option<ExpressionBindings>,
    /// Spring-bone metadata from the model's extension block.
    pub secondary_motion: Option<SecondaryMotionDesc>,
}

impl ImportedModel {
    /// A model with just a skeleton and skinned meshes.
    #[must_use]
    pub fn new(skeleton: Skeleton, skinned_meshes: Vec<SkinnedMesh>) -> Self {
        Self {
            skeleton,
            skinned_meshes,
            armature: Transform::IDENTITY,
            humanoid: None,
            expressions: None,
            secondary_motion: None,
        }
    }
}

/// Orientation conventions inferred from the bind pose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlipFlags {
    /// The rig faces -Z: its left wrist lies on -X relative to the head.
    pub flip_z: bool,
    /// The armature's up axis points along depth (Z-up authoring).
    pub flip_y: bool,
    /// The upper leg's local forward axis does not point up.
    pub flip_leg: bool,
}

impl FlipFlags {
    /// Rotation taking skeleton space into canonical space.
    #[must_use]
    pub fn normalization(self) -> Quat {
        let mut q = Quat::IDENTITY;
        if self.flip_y {
            q = Quat::from_rotation_x(-FRAC_PI_2) * q;
        }
        if self.flip_z {
            q = Quat::from_rotation_y(PI) * q;
        }
        q
    }
}

/// One canonical bone bound to a source bone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneBinding {
    pub bone: CanonicalBone,
    /// Index into the source skeleton.
    pub source: usize,
    /// Frame change from canonical space into the source parent's space.
    pub pre_rotation: Quat,
    /// Bind-pose local transform.
    pub initial: Transform,
}

impl BoneBinding {
    /// Local rotation that realizes the canonical rotation `animation`.
    #[must_use]
    pub fn retarget(&self, animation: Quat) -> Quat {
        let q = self.pre_rotation;
        (q.inverse() * animation * q * self.initial.rotation).normalize()
    }
}

/// A rig bound to the canonical skeleton.
#[derive(Debug, Clone)]
pub struct BoundAvatar {
    skeleton: Skeleton,
    skinned_meshes: Vec<SkinnedMesh>,
    armature: Transform,
    bindings: CanonicalMap<BoneBinding>,
    flip: FlipFlags,
    normalization: Quat,
    dialect: &'static str,
    height: f32,
    shoulder_width: f32,
    eye_to_hips: Vec3,
    hips_rest: Vec3,
    hair_bones: Vec<usize>,
    expressions: ExpressionBindings,
    secondary_motion: SecondaryMotionDesc,
    decapitated: bool,
}

/// Bind an imported model.
///
/// Fails if the model has no skinned mesh or if any of
/// [`CanonicalBone::REQUIRED`] cannot be resolved. Other missing bones are
/// logged and left unbound.
pub fn bind_avatar(model: ImportedModel) -> Result<BoundAvatar, BindingError> {
    let ImportedModel {
        skeleton,
        skinned_meshes,
        armature,
        humanoid,
        expressions,
        secondary_motion,
    } = model;

    if skinned_meshes.is_empty() {
        return Err(BindingError::NoSkinnedMesh);
    }

    let (dialect, sources) = resolve_bones(&skeleton, humanoid.as_deref());

    let missing: Vec<_> = CanonicalBone::REQUIRED
        .into_iter()
        .filter(|bone| !sources.contains(*bone))
        .collect();
    if !missing.is_empty() {
        return Err(BindingError::MissingRequiredBones(missing));
    }
    for bone in CanonicalBone::ALL {
        if !sources.contains(*bone) {
            tracing::warn!("Binder: no source bone for '{}'", bone);
        }
    }

    let flip = infer_flip_flags(&skeleton, &armature, &sources);
    let normalization = flip.normalization();
    tracing::info!(
        "Binder: {} bones via '{}' dialect, flip_z={} flip_y={} flip_leg={}",
        sources.len(),
        dialect,
        flip.flip_z,
        flip.flip_y,
        flip.flip_leg
    );

    let canonical = |index: usize| normalization * skeleton.world_position(index);

    let mut bindings = CanonicalMap::new();
    for (bone, &source) in sources.iter() {
        let parent_rotation = skeleton
            .parent(source)
            .map_or(Quat::IDENTITY, |p| skeleton.world_rotation(p));
        let swing = axis_swing(bone, source, &skeleton, &sources, flip, canonical);
        bindings.insert(
            bone,
            BoneBinding {
                bone,
                source,
                pre_rotation: (swing * normalization * parent_rotation).normalize(),
                initial: *skeleton.local(source),
            },
        );
    }

    let position_of = |bone: CanonicalBone| sources.get(bone).map(|&i| canonical(i));
    let hips_rest = position_of(CanonicalBone::Hips).unwrap_or_default();
    let head = position_of(CanonicalBone::Head).unwrap_or_default();
    let lowest_foot = [CanonicalBone::LeftFoot, CanonicalBone::RightFoot]
        .into_iter()
        .filter_map(position_of)
        .map(|p| p.y)
        .fold(f32::INFINITY, f32::min);
    let height = head.y - lowest_foot.min(head.y);
    let height = if height > f32::EPSILON { height } else { 1.0 };
    let shoulder_width = match (
        position_of(CanonicalBone::LeftUpperArm),
        position_of(CanonicalBone::RightUpperArm),
    ) {
        (Some(l), Some(r)) => l.distance(r),
        _ => 0.0,
    };
    let eyes = match (
        position_of(CanonicalBone::LeftEye),
        position_of(CanonicalBone::RightEye),
    ) {
        (Some(l), Some(r)) => (l + r) * 0.5,
        _ => head,
    };

    let hair_bones = find_hair_bones(&skeleton, sources.get(CanonicalBone::Head).copied());
    let secondary_motion = secondary_motion.unwrap_or_else(|| SecondaryMotionDesc {
        chains: hair_bones
            .iter()
            .map(|&root| SpringChainDesc::hair(skeleton.bone(root).name.clone(), root))
            .collect(),
        collider_groups: Vec::new(),
    });
    let expressions =
        expressions.unwrap_or_else(|| ExpressionBindings::from_morph_names(&skinned_meshes));

    Ok(BoundAvatar {
        skeleton,
        skinned_meshes,
        armature,
        bindings,
        flip,
        normalization,
        dialect,
        height,
        shoulder_width,
        eye_to_hips: hips_rest - eyes,
        hips_rest,
        hair_bones,
        expressions,
        secondary_motion,
        decapitated: false,
    })
}

/// Pick the dialect resolving the most bones, then fill gaps generically.
fn resolve_bones(
    skeleton: &Skeleton,
    humanoid: Option<&[(CanonicalBone, usize)]>,
) -> (&'static str, CanonicalMap<usize>) {
    let (dialect, best) = if let Some(humanoid) = humanoid {
        let valid = humanoid
            .iter()
            .copied()
            .filter(|&(_, index)| index < skeleton.len())
            .collect();
        ("vrm-humanoid", valid)
    } else {
        builtin_dialects()
            .into_iter()
            .rev()
            .map(|d| (d.name(), d.resolve_skeleton(skeleton)))
            .max_by_key(|(_, resolved)| resolved.len())
            .unwrap_or(("none", Vec::new()))
    };

    let mut sources = CanonicalMap::new();
    let mut used = vec![false; skeleton.len()];
    for (bone, index) in best {
        if !used[index] && !sources.contains(bone) {
            sources.insert(bone, index);
            used[index] = true;
        }
    }
    for (bone, index) in GenericTokens.resolve_skeleton(skeleton) {
        if !used[index] && !sources.contains(bone) {
            sources.insert(bone, index);
            used[index] = true;
        }
    }
    (dialect, sources)
}

/// Infer the rig's conventions. The vertical flip comes from the armature;
/// the other two are measured with that flip already undone.
fn infer_flip_flags(
    skeleton: &Skeleton,
    armature: &Transform,
    sources: &CanonicalMap<usize>,
) -> FlipFlags {
    let flip_y = (armature.rotation * Vec3::Y).z < -0.5;
    let upright = FlipFlags {
        flip_y,
        ..FlipFlags::default()
    }
    .normalization();

    let position = |bone: CanonicalBone| {
        sources
            .get(bone)
            .map(|&i| upright * skeleton.world_position(i))
    };
    let flip_z = match (position(CanonicalBone::LeftHand), position(CanonicalBone::Head)) {
        (Some(wrist), Some(head)) => (wrist - head).x < 0.0,
        _ => false,
    };
    let flip_leg = sources
        .get(CanonicalBone::LeftUpperLeg)
        .is_some_and(|&i| (upright * skeleton.world_rotation(i) * Vec3::NEG_Z).y < 0.5);
    FlipFlags {
        flip_z,
        flip_y,
        flip_leg,
    }
}

/// Swing aligning a limb bone's actual direction with its canonical axis,
/// so canonical twist rotates about the real bone.
fn axis_swing(
    bone: CanonicalBone,
    source: usize,
    skeleton: &Skeleton,
    sources: &CanonicalMap<usize>,
    flip: FlipFlags,
    canonical: impl Fn(usize) -> Vec3,
) -> Quat {
    let (axis, child) = if bone.is_arm() {
        let axis = match bone.side() {
            Some(Side::Left) => Vec3::X,
            _ => Vec3::NEG_X,
        };
        let child = match bone {
            CanonicalBone::LeftUpperArm => CanonicalBone::LeftLowerArm,
            CanonicalBone::LeftLowerArm => CanonicalBone::LeftHand,
            CanonicalBone::LeftHand => CanonicalBone::LeftMiddleProximal,
            CanonicalBone::RightUpperArm => CanonicalBone::RightLowerArm,
            CanonicalBone::RightLowerArm => CanonicalBone::RightHand,
            _ => CanonicalBone::RightMiddleProximal,
        };
        (axis, child)
    } else if flip.flip_leg && bone.is_leg() {
        let child = match bone {
            CanonicalBone::LeftUpperLeg => CanonicalBone::LeftLowerLeg,
            CanonicalBone::LeftLowerLeg => CanonicalBone::LeftFoot,
            CanonicalBone::RightUpperLeg => CanonicalBone::RightLowerLeg,
            _ => CanonicalBone::RightFoot,
        };
        (Vec3::NEG_Y, child)
    } else {
        return Quat::IDENTITY;
    };

    let child_index = sources
        .get(child)
        .copied()
        .or_else(|| skeleton.children(source).first().copied());
    let Some(child_index) = child_index else {
        return Quat::IDENTITY;
    };
    let direction = canonical(child_index) - canonical(source);
    if direction.length_squared() < 1e-12 {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(direction.normalize(), axis)
}

/// Hair roots: walk each tail bone named like hair up to the child of Head.
fn find_hair_bones(skeleton: &Skeleton, head: Option<usize>) -> Vec<usize> {
    let Some(head) = head else {
        return Vec::new();
    };
    let mut roots = Vec::new();
    for tail in skeleton.tails() {
        if !skeleton.bone(tail).name.to_ascii_lowercase().contains("hair") {
            continue;
        }
        let mut current = Some(tail);
        while let Some(index) = current {
            if skeleton.parent(index) == Some(head) {
                if !roots.contains(&index) {
                    roots.push(index);
                }
                break;
            }
            current = skeleton.parent(index);
        }
    }
    roots
}

impl BoundAvatar {
    #[must_use]
    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }

    #[must_use]
    pub fn skinned_meshes(&self) -> &[SkinnedMesh] {
        &self.skinned_meshes
    }

    /// The armature transform as imported, before it was reset.
    #[must_use]
    pub fn armature(&self) -> &Transform {
        &self.armature
    }

    #[must_use]
    pub fn flip_flags(&self) -> FlipFlags {
        self.flip
    }

    /// Name of the naming dialect the bones were resolved with.
    #[must_use]
    pub fn dialect(&self) -> &'static str {
        self.dialect
    }

    #[must_use]
    pub fn binding(&self, bone: CanonicalBone) -> Option<&BoneBinding> {
        self.bindings.get(bone)
    }

    #[must_use]
    pub fn bindings(&self) -> &CanonicalMap<BoneBinding> {
        &self.bindings
    }

    /// Head height above the lowest foot.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.height
    }

    #[must_use]
    pub fn shoulder_width(&self) -> f32 {
        self.shoulder_width
    }

    /// Offset from the eyes to the hips in canonical space.
    #[must_use]
    pub fn eye_to_hips(&self) -> Vec3 {
        self.eye_to_hips
    }

    /// Hair chain roots (direct children of Head).
    #[must_use]
    pub fn hair_bones(&self) -> &[usize] {
        &self.hair_bones
    }

    #[must_use]
    pub fn expressions(&self) -> &ExpressionBindings {
        &self.expressions
    }

    #[must_use]
    pub fn secondary_motion(&self) -> &SecondaryMotionDesc {
        &self.secondary_motion
    }

    /// Rotation taking skeleton space into canonical space.
    #[must_use]
    pub fn normalization(&self) -> Quat {
        self.normalization
    }

    /// World transform of a source bone in canonical space.
    #[must_use]
    pub fn canonical_world(&self, index: usize) -> Affine3A {
        Affine3A::from_quat(self.normalization) * self.skeleton.world(index)
    }

    /// Canonical-space position of a bound bone.
    #[must_use]
    pub fn canonical_position(&self, bone: CanonicalBone) -> Option<Vec3> {
        let binding = self.bindings.get(bone)?;
        Some(self.normalization * self.skeleton.world_position(binding.source))
    }

    /// Write a canonical pose onto the source skeleton and refresh world
    /// transforms. Bones absent from the pose return to their bind rotation.
    pub fn apply_pose(&mut self, pose: &Pose) {
        for (bone, binding) in self.bindings.iter() {
            let rotation = pose
                .rotations
                .get(bone)
                .map_or(binding.initial.rotation, |&a| binding.retarget(a));
            self.skeleton.local_mut(binding.source).rotation = rotation;
        }

        if let Some(hips) = self.bindings.get(CanonicalBone::Hips) {
            let translation = match pose.hips_position {
                Some(p) => {
                    let target = Vec3::new(self.hips_rest.x + p.x, p.y, self.hips_rest.z + p.z);
                    let skeleton_space = self.normalization.inverse() * target;
                    let parent_world = self
                        .skeleton
                        .parent(hips.source)
                        .map_or(Affine3A::IDENTITY, |p| self.skeleton.world(p));
                    parent_world.inverse().transform_point3(skeleton_space)
                }
                None => hips.initial.translation,
            };
            self.skeleton.local_mut(hips.source).translation = translation;
        }

        self.skeleton.update_world();
    }

    /// Hide the head for first-person views.
    pub fn decapitate(&mut self) {
        if self.decapitated {
            return;
        }
        if let Some(head) = self.bindings.get(CanonicalBone::Head) {
            self.skeleton.local_mut(head.source).scale = Vec3::ZERO;
            self.skeleton.update_subtree(head.source);
            self.decapitated = true;
        }
    }

    pub fn undecapitate(&mut self) {
        if !self.decapitated {
            return;
        }
        if let Some(head) = self.bindings.get(CanonicalBone::Head) {
            self.skeleton.local_mut(head.source).scale = head.initial.scale;
            self.skeleton.update_subtree(head.source);
        }
        self.decapitated = false;
    }

    #[must_use]
    pub fn is_decapitated(&self) -> bool {
        self.decapitated
    }
}
