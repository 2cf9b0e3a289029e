//! Procedural demo content: a VRoid-named rig and a small locomotion library.
//!
//! The rig is authored facing -Z so binding has to infer the horizontal
//! flip. Clips are sampled sine gaits on canonical bones.

use std::f32::consts::TAU;

use avatar_rig::{
    AnimationClip, Bone, CanonicalBone, ClipLibrary, ClipTags, ImportedModel, LocomotionNames,
    RigResult, Skeleton, SkinnedMesh, Track, Transform,
};
use glam::{Quat, Vec3};

/// Keyframes per cycle.
const KEYS: usize = 16;

/// (name, parent, translation) facing +Z with left on +X, before the
/// authoring flip is applied to the root.
const RIG: &[(&str, Option<&str>, [f32; 3])] = &[
    ("J_Bip_C_Hips", None, [0.0, 0.95, 0.0]),
    ("J_Bip_C_Spine", Some("J_Bip_C_Hips"), [0.0, 0.1, 0.0]),
    ("J_Bip_C_Chest", Some("J_Bip_C_Spine"), [0.0, 0.12, 0.0]),
    ("J_Bip_C_UpperChest", Some("J_Bip_C_Chest"), [0.0, 0.12, 0.0]),
    ("J_Bip_C_Neck", Some("J_Bip_C_UpperChest"), [0.0, 0.14, 0.0]),
    ("J_Bip_C_Head", Some("J_Bip_C_Neck"), [0.0, 0.1, 0.0]),
    ("J_Adj_L_FaceEye", Some("J_Bip_C_Head"), [0.03, 0.06, 0.08]),
    ("J_Adj_R_FaceEye", Some("J_Bip_C_Head"), [-0.03, 0.06, 0.08]),
    ("J_Sec_Hair1_01", Some("J_Bip_C_Head"), [0.0, 0.12, -0.06]),
    ("J_Sec_Hair2_01", Some("J_Sec_Hair1_01"), [0.0, -0.1, -0.03]),
    ("J_Sec_Hair3_01", Some("J_Sec_Hair2_01"), [0.0, -0.1, -0.01]),
    ("J_Bip_L_Shoulder", Some("J_Bip_C_UpperChest"), [0.04, 0.1, 0.0]),
    ("J_Bip_L_UpperArm", Some("J_Bip_L_Shoulder"), [0.1, 0.0, 0.0]),
    ("J_Bip_L_LowerArm", Some("J_Bip_L_UpperArm"), [0.24, 0.0, 0.0]),
    ("J_Bip_L_Hand", Some("J_Bip_L_LowerArm"), [0.23, 0.0, 0.0]),
    ("J_Bip_L_Middle1", Some("J_Bip_L_Hand"), [0.08, 0.0, 0.0]),
    ("J_Bip_R_Shoulder", Some("J_Bip_C_UpperChest"), [-0.04, 0.1, 0.0]),
    ("J_Bip_R_UpperArm", Some("J_Bip_R_Shoulder"), [-0.1, 0.0, 0.0]),
    ("J_Bip_R_LowerArm", Some("J_Bip_R_UpperArm"), [-0.24, 0.0, 0.0]),
    ("J_Bip_R_Hand", Some("J_Bip_R_LowerArm"), [-0.23, 0.0, 0.0]),
    ("J_Bip_R_Middle1", Some("J_Bip_R_Hand"), [-0.08, 0.0, 0.0]),
    ("J_Bip_L_UpperLeg", Some("J_Bip_C_Hips"), [0.09, -0.05, 0.0]),
    ("J_Bip_L_LowerLeg", Some("J_Bip_L_UpperLeg"), [0.0, -0.42, 0.0]),
    ("J_Bip_L_Foot", Some("J_Bip_L_LowerLeg"), [0.0, -0.42, 0.0]),
    ("J_Bip_L_ToeBase", Some("J_Bip_L_Foot"), [0.0, -0.05, 0.1]),
    ("J_Bip_R_UpperLeg", Some("J_Bip_C_Hips"), [-0.09, -0.05, 0.0]),
    ("J_Bip_R_LowerLeg", Some("J_Bip_R_UpperLeg"), [0.0, -0.42, 0.0]),
    ("J_Bip_R_Foot", Some("J_Bip_R_LowerLeg"), [0.0, -0.42, 0.0]),
    ("J_Bip_R_ToeBase", Some("J_Bip_R_Foot"), [0.0, -0.05, 0.1]),
];

const MORPHS: &[&str] = &[
    "Fcl_MTH_A",
    "Fcl_MTH_I",
    "Fcl_MTH_U",
    "Fcl_MTH_E",
    "Fcl_MTH_O",
    "Fcl_EYE_Close",
    "Fcl_ALL_Joy",
    "Fcl_ALL_Angry",
];

/// Build the demo rig.
pub fn demo_model() -> RigResult<ImportedModel> {
    let flip = Quat::from_rotation_y(std::f32::consts::PI);
    let mut names: Vec<&str> = Vec::with_capacity(RIG.len());
    let mut bones = Vec::with_capacity(RIG.len());
    for &(name, parent, translation) in RIG {
        let parent = parent.and_then(|p| names.iter().position(|&n| n == p));
        let mut local = Transform::from_translation(Vec3::from_array(translation));
        if parent.is_none() {
            local.translation = flip * local.translation;
            local.rotation = flip;
        }
        names.push(name);
        bones.push(Bone::new(name, parent, local));
    }
    let skeleton = Skeleton::new(bones)?;
    let mesh = SkinnedMesh {
        name: "Body".to_owned(),
        joints: (0..skeleton.len()).collect(),
        morph_targets: MORPHS.iter().map(|&m| m.to_owned()).collect(),
    };
    Ok(ImportedModel::new(skeleton, vec![mesh]))
}

/// Sample `pose` over one cycle into a clip.
fn cycle(
    name: &str,
    duration: f32,
    hips_height: impl Fn(f32) -> f32,
    pose: impl Fn(f32) -> Vec<(CanonicalBone, Quat)>,
) -> AnimationClip {
    let times: Vec<f32> = (0..=KEYS)
        .map(|i| duration * i as f32 / KEYS as f32)
        .collect();
    let mut rotations: Vec<(CanonicalBone, Vec<Quat>)> = Vec::new();
    let mut hips = Vec::with_capacity(times.len());
    for &t in &times {
        let phase = t / duration * TAU;
        hips.push(Vec3::new(0.0, hips_height(phase), 0.0));
        for (bone, rotation) in pose(phase) {
            match rotations.iter_mut().find(|(b, _)| *b == bone) {
                Some((_, values)) => values.push(rotation),
                None => rotations.push((bone, vec![rotation])),
            }
        }
    }
    let mut tracks: Vec<Track> = rotations
        .into_iter()
        .map(|(bone, values)| Track::rotation(bone, times.clone(), values))
        .collect();
    tracks.push(Track::position(CanonicalBone::Hips, times, hips));
    AnimationClip::new(name, duration, tracks)
}

/// Legs swing about `axis` by `stride`; arms hang and counter-swing.
fn gait(phase: f32, axis: Vec3, stride: f32, knee: f32, lean: f32) -> Vec<(CanonicalBone, Quat)> {
    let swing = phase.sin() * stride;
    let bend = |offset: f32| knee * (0.5 - 0.5 * (phase + offset).cos());
    vec![
        (CanonicalBone::Spine, Quat::from_rotation_x(lean)),
        (CanonicalBone::LeftUpperLeg, Quat::from_axis_angle(axis, -swing)),
        (CanonicalBone::RightUpperLeg, Quat::from_axis_angle(axis, swing)),
        (CanonicalBone::LeftLowerLeg, Quat::from_rotation_x(bend(0.0))),
        (CanonicalBone::RightLowerLeg, Quat::from_rotation_x(bend(std::f32::consts::PI))),
        (
            CanonicalBone::LeftUpperArm,
            Quat::from_rotation_x(swing * 0.6) * Quat::from_rotation_z(-1.25),
        ),
        (
            CanonicalBone::RightUpperArm,
            Quat::from_rotation_x(-swing * 0.6) * Quat::from_rotation_z(1.25),
        ),
    ]
}

fn hang() -> Vec<(CanonicalBone, Quat)> {
    gait(0.0, Vec3::X, 0.0, 0.0, 0.0)
}

/// Direction slots in `[left, right, forward, backward, mirror_left, mirror_right]` order.
fn direction_set(
    names: [&str; 6],
    duration: f32,
    stride: f32,
    knee: f32,
    lean: f32,
    hips: f32,
) -> Vec<AnimationClip> {
    let slots = [
        (Vec3::Z, 1.0, 0.0),
        (Vec3::Z, -1.0, 0.0),
        (Vec3::X, 1.0, lean),
        (Vec3::X, -1.0, -lean * 0.5),
        (Vec3::Z, 1.0, 0.0),
        (Vec3::Z, -1.0, 0.0),
    ];
    names
        .into_iter()
        .zip(slots)
        .enumerate()
        .map(|(i, (name, (axis, direction, lean)))| {
            // Reversed strafes play the cycle backwards.
            let reverse = if i >= 4 { -1.0 } else { 1.0 };
            cycle(
                name,
                duration,
                move |phase| hips + 0.015 * (2.0 * phase).cos(),
                move |phase| gait(reverse * phase, axis, stride * direction, knee, lean),
            )
        })
        .collect()
}

/// Build the demo clip library, phase-locked.
pub fn demo_library(names: &LocomotionNames) -> ClipLibrary {
    fn slot_names(set: &avatar_rig::blend::DirectionNames) -> [&str; 6] {
        [
            set.left.as_str(),
            set.right.as_str(),
            set.forward.as_str(),
            set.backward.as_str(),
            set.mirror_left.as_str(),
            set.mirror_right.as_str(),
        ]
    }

    let mut clips = vec![
        cycle(&names.idle, 3.0, |phase| 0.61 + 0.004 * phase.sin(), |phase| {
            let mut pose = hang();
            pose[0].1 = Quat::from_rotation_x(0.02 * phase.sin());
            pose
        }),
        cycle(&names.crouch_idle, 3.0, |_| 0.42, |_| {
            let mut pose = gait(0.0, Vec3::X, 0.0, 0.0, 0.3);
            pose[1].1 = Quat::from_rotation_x(-1.1);
            pose[2].1 = Quat::from_rotation_x(-1.1);
            pose[3].1 = Quat::from_rotation_x(1.6);
            pose[4].1 = Quat::from_rotation_x(1.6);
            pose
        }),
    ];
    clips.extend(direction_set(slot_names(&names.walk), 1.1, 0.45, 0.6, 0.05, 0.61));
    clips.extend(direction_set(slot_names(&names.run), 0.7, 0.8, 1.2, 0.2, 0.6));
    clips.extend(direction_set(slot_names(&names.crouch), 1.4, 0.35, 1.5, 0.35, 0.43));

    clips.push(
        cycle("jump.fbx", 0.8, |_| 0.55, |_| {
            let mut pose = gait(0.0, Vec3::X, 0.0, 0.9, 0.1);
            pose[5].1 = Quat::from_rotation_z(-0.3);
            pose[6].1 = Quat::from_rotation_z(0.3);
            pose
        })
        .with_tags(ClipTags {
            is_jump: true,
            ..ClipTags::default()
        }),
    );
    clips.push(
        cycle("dancing.fbx", 1.2, |phase| 0.6 + 0.03 * (2.0 * phase).sin(), |phase| {
            let mut pose = gait(phase, Vec3::Z, 0.2, 0.4, 0.0);
            pose[0].1 = Quat::from_rotation_y(0.4 * phase.sin());
            pose[5].1 = Quat::from_rotation_z(-1.0 + 0.3 * phase.cos());
            pose[6].1 = Quat::from_rotation_z(1.0 - 0.3 * phase.cos());
            pose
        })
        .with_tags(ClipTags {
            is_dance: true,
            ..ClipTags::default()
        }),
    );
    clips.push(
        cycle("treading water.fbx", 2.0, |_| 0.6, |phase| {
            gait(phase, Vec3::X, 0.25, 0.5, 0.1)
        })
        .with_tags(ClipTags {
            is_float: true,
            ..ClipTags::default()
        }),
    );

    let mut library = ClipLibrary::new(clips);
    names.phase_lock(&mut library);
    tracing::info!("Built demo clip library: {} clips", library.len());
    library
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_rig_binds_with_flip() {
        let avatar = avatar_rig::bind_avatar(demo_model().unwrap()).unwrap();
        assert_eq!(avatar.dialect(), "vroid");
        assert!(avatar.flip_flags().flip_z);
        assert_eq!(avatar.hair_bones().len(), 1);
    }

    #[test]
    fn library_covers_every_locomotion_slot() {
        let names = LocomotionNames::default();
        let library = demo_library(&names);
        for set in [&names.walk, &names.run, &names.crouch] {
            for name in [&set.left, &set.right, &set.forward, &set.backward] {
                assert!(library.get(name).is_some(), "{name}");
            }
        }
        assert!(library.find(|clip| clip.tags.is_jump).is_some());
    }
}
