#![allow(dead_code)]

use std::f32::consts::{FRAC_PI_2, PI};

use avatar_rig::{
    AnimationClip, Bone, CanonicalBone, ClipLibrary, ImportedModel, Skeleton, SkinnedMesh, Track,
    Transform,
};
use glam::{Quat, Vec3};

/// How the fixture rig is authored.
#[derive(Debug, Clone, Copy, Default)]
pub struct Convention {
    /// Rig faces -Z, so its left hand lies on -X.
    pub facing_back: bool,
    /// Skeleton content is Z-up under an armature rotated back to Y-up.
    pub z_up: bool,
}

/// (name, parent, local translation) of a Mixamo-named humanoid, +Y up,
/// facing +Z, left on +X. Head sits at 1.6 and feet at 0.05.
const LAYOUT: &[(&str, Option<&str>, [f32; 3])] = &[
    ("mixamorig:Hips", None, [0.0, 1.0, 0.0]),
    ("mixamorig:Spine", Some("mixamorig:Hips"), [0.0, 0.1, 0.0]),
    ("mixamorig:Spine1", Some("mixamorig:Spine"), [0.0, 0.15, 0.0]),
    ("mixamorig:Spine2", Some("mixamorig:Spine1"), [0.0, 0.15, 0.0]),
    ("mixamorig:Neck", Some("mixamorig:Spine2"), [0.0, 0.1, 0.0]),
    ("mixamorig:Head", Some("mixamorig:Neck"), [0.0, 0.1, 0.0]),
    ("mixamorig:LeftEye", Some("mixamorig:Head"), [0.03, 0.05, 0.08]),
    ("mixamorig:RightEye", Some("mixamorig:Head"), [-0.03, 0.05, 0.08]),
    ("Hair_01", Some("mixamorig:Head"), [0.0, 0.1, -0.05]),
    ("Hair_02", Some("Hair_01"), [0.0, -0.1, -0.02]),
    ("mixamorig:LeftShoulder", Some("mixamorig:Spine2"), [0.05, 0.08, 0.0]),
    ("mixamorig:LeftArm", Some("mixamorig:LeftShoulder"), [0.1, 0.0, 0.0]),
    ("mixamorig:LeftForeArm", Some("mixamorig:LeftArm"), [0.25, 0.0, 0.0]),
    ("mixamorig:LeftHand", Some("mixamorig:LeftForeArm"), [0.25, 0.0, 0.0]),
    ("mixamorig:LeftHandMiddle1", Some("mixamorig:LeftHand"), [0.08, 0.0, 0.0]),
    ("mixamorig:RightShoulder", Some("mixamorig:Spine2"), [-0.05, 0.08, 0.0]),
    ("mixamorig:RightArm", Some("mixamorig:RightShoulder"), [-0.1, 0.0, 0.0]),
    ("mixamorig:RightForeArm", Some("mixamorig:RightArm"), [-0.25, 0.0, 0.0]),
    ("mixamorig:RightHand", Some("mixamorig:RightForeArm"), [-0.25, 0.0, 0.0]),
    ("mixamorig:RightHandMiddle1", Some("mixamorig:RightHand"), [-0.08, 0.0, 0.0]),
    ("mixamorig:LeftUpLeg", Some("mixamorig:Hips"), [0.1, -0.05, 0.0]),
    ("mixamorig:LeftLeg", Some("mixamorig:LeftUpLeg"), [0.0, -0.45, 0.0]),
    ("mixamorig:LeftFoot", Some("mixamorig:LeftLeg"), [0.0, -0.45, 0.0]),
    ("mixamorig:LeftToeBase", Some("mixamorig:LeftFoot"), [0.0, -0.05, 0.1]),
    ("mixamorig:RightUpLeg", Some("mixamorig:Hips"), [-0.1, -0.05, 0.0]),
    ("mixamorig:RightLeg", Some("mixamorig:RightUpLeg"), [0.0, -0.45, 0.0]),
    ("mixamorig:RightFoot", Some("mixamorig:RightLeg"), [0.0, -0.45, 0.0]),
    ("mixamorig:RightToeBase", Some("mixamorig:RightFoot"), [0.0, -0.05, 0.1]),
];

/// Build the fixture rig. `jitter` rotations, cycled through, perturb
/// every bone's bind rotation.
pub fn humanoid(convention: Convention, jitter: &[Quat]) -> ImportedModel {
    humanoid_without(convention, jitter, &[])
}

/// Like [`humanoid`], leaving out the named bones (and their subtrees).
pub fn humanoid_without(convention: Convention, jitter: &[Quat], skip: &[&str]) -> ImportedModel {
    let mut names: Vec<&str> = Vec::new();
    let mut bones = Vec::new();
    for (i, &(name, parent, translation)) in LAYOUT.iter().enumerate() {
        let Some(parent) = parent.map_or(Some(None), |p| names.iter().position(|&n| n == p).map(Some))
        else {
            continue;
        };
        if skip.contains(&name) {
            continue;
        }
        let mut rotation = if jitter.is_empty() {
            Quat::IDENTITY
        } else {
            jitter[i % jitter.len()]
        };
        let mut translation = Vec3::from_array(translation);
        if parent.is_none() {
            let mut authoring = Quat::IDENTITY;
            if convention.facing_back {
                authoring = Quat::from_rotation_y(PI) * authoring;
            }
            if convention.z_up {
                authoring = Quat::from_rotation_x(FRAC_PI_2) * authoring;
            }
            rotation = authoring * rotation;
            translation = authoring * translation;
        }
        names.push(name);
        bones.push(Bone::new(
            name,
            parent,
            Transform::from_translation(translation).with_rotation(rotation),
        ));
    }
    let skeleton = Skeleton::new(bones).unwrap();
    let mesh = SkinnedMesh {
        name: "Body".to_owned(),
        joints: (0..skeleton.len()).collect(),
        morph_targets: vec!["Fcl_MTH_A".to_owned(), "Fcl_EYE_Close".to_owned()],
    };
    let mut model = ImportedModel::new(skeleton, vec![mesh]);
    if convention.z_up {
        model.armature = Transform::from_rotation(Quat::from_rotation_x(-FRAC_PI_2));
    }
    model
}

/// Constant-rotation clip over every canonical bone in `bones`.
pub fn pose_clip(name: &str, duration: f32, bones: &[(CanonicalBone, Quat)]) -> AnimationClip {
    let tracks = bones
        .iter()
        .map(|&(bone, rotation)| Track::rotation(bone, vec![0.0], vec![rotation]))
        .collect();
    AnimationClip::new(name, duration, tracks)
}

/// Library holding an identity idle clip over every canonical bone.
pub fn rest_library() -> ClipLibrary {
    let bones: Vec<_> = CanonicalBone::ALL
        .iter()
        .map(|&bone| (bone, Quat::IDENTITY))
        .collect();
    ClipLibrary::new([pose_clip("idle.fbx", 1.0, &bones)])
}
