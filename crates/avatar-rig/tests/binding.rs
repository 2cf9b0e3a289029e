mod common;

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use avatar_rig::{
    BindingError, BlendConfig, BlendTree, BoundAvatar, CanonicalBone, Pose, bind_avatar,
};
use common::{Convention, humanoid, humanoid_without, rest_library};
use glam::{Affine3A, Quat, Vec3};
use proptest::prelude::*;

const CONVENTIONS: [Convention; 4] = [
    Convention {
        facing_back: false,
        z_up: false,
    },
    Convention {
        facing_back: true,
        z_up: false,
    },
    Convention {
        facing_back: false,
        z_up: true,
    },
    Convention {
        facing_back: true,
        z_up: true,
    },
];

fn worlds(avatar: &BoundAvatar) -> Vec<Affine3A> {
    (0..avatar.skeleton().len())
        .map(|i| avatar.skeleton().world(i))
        .collect()
}

fn identity_pose(avatar: &BoundAvatar) -> Pose {
    let mut pose = Pose::default();
    for (bone, _) in avatar.bindings().iter() {
        pose.rotations.insert(bone, Quat::IDENTITY);
    }
    pose
}

fn assert_same_worlds(a: &[Affine3A], b: &[Affine3A]) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!(x.abs_diff_eq(*y, 1e-4), "bone {i}: {x:?} != {y:?}");
    }
}

#[test]
fn flip_flags_follow_authoring_convention() {
    for convention in CONVENTIONS {
        let avatar = bind_avatar(humanoid(convention, &[])).unwrap();
        let flags = avatar.flip_flags();
        assert_eq!(flags.flip_z, convention.facing_back, "{convention:?}");
        assert_eq!(flags.flip_y, convention.z_up, "{convention:?}");
        assert_eq!(avatar.dialect(), "mixamo");
    }
}

#[test]
fn canonical_space_is_upright_and_left_handed_on_x() {
    for convention in CONVENTIONS {
        let avatar = bind_avatar(humanoid(convention, &[])).unwrap();
        let head = avatar.canonical_position(CanonicalBone::Head).unwrap();
        let hips = avatar.canonical_position(CanonicalBone::Hips).unwrap();
        let left = avatar.canonical_position(CanonicalBone::LeftHand).unwrap();
        assert!(head.y > hips.y, "{convention:?}");
        assert!(left.x > head.x, "{convention:?}");
    }
}

#[test]
fn metrics_come_from_bind_pose() {
    let avatar = bind_avatar(humanoid(Convention::default(), &[])).unwrap();
    assert!((avatar.height() - 1.55).abs() < 1e-5);
    assert!((avatar.shoulder_width() - 0.3).abs() < 1e-5);
    assert!(avatar.eye_to_hips().y < -0.5);
}

#[test]
fn identity_pose_reproduces_bind_pose() {
    for convention in CONVENTIONS {
        let mut avatar = bind_avatar(humanoid(convention, &[])).unwrap();
        let before = worlds(&avatar);
        let pose = identity_pose(&avatar);
        avatar.apply_pose(&pose);
        assert_same_worlds(&before, &worlds(&avatar));
    }
}

#[test]
fn canonical_hips_rotation_turns_whole_rig() {
    for convention in CONVENTIONS {
        let mut avatar = bind_avatar(humanoid(convention, &[])).unwrap();
        let rest = avatar.canonical_position(CanonicalBone::LeftHand).unwrap()
            - avatar.canonical_position(CanonicalBone::Hips).unwrap();
        let turn = Quat::from_rotation_y(FRAC_PI_2);
        let mut pose = identity_pose(&avatar);
        pose.rotations.insert(CanonicalBone::Hips, turn);
        avatar.apply_pose(&pose);
        let turned = avatar.canonical_position(CanonicalBone::LeftHand).unwrap()
            - avatar.canonical_position(CanonicalBone::Hips).unwrap();
        assert!(turned.abs_diff_eq(turn * rest, 1e-4), "{convention:?}");
    }
}

#[test]
fn canonical_arm_rotation_lowers_t_pose_arm() {
    for convention in CONVENTIONS {
        let mut avatar = bind_avatar(humanoid(convention, &[])).unwrap();
        let mut pose = identity_pose(&avatar);
        pose.rotations
            .insert(CanonicalBone::LeftUpperArm, Quat::from_rotation_z(-FRAC_PI_2));
        avatar.apply_pose(&pose);
        let arm = avatar.canonical_position(CanonicalBone::LeftHand).unwrap()
            - avatar.canonical_position(CanonicalBone::LeftUpperArm).unwrap();
        assert!(arm.abs_diff_eq(Vec3::new(0.0, -0.5, 0.0), 1e-4), "{convention:?}: {arm}");
    }
}

#[test]
fn hips_position_is_placed_in_canonical_space() {
    for convention in CONVENTIONS {
        let mut avatar = bind_avatar(humanoid(convention, &[])).unwrap();
        let mut pose = identity_pose(&avatar);
        pose.hips_position = Some(Vec3::new(0.0, 0.7, 0.0));
        avatar.apply_pose(&pose);
        let hips = avatar.canonical_position(CanonicalBone::Hips).unwrap();
        assert!(hips.abs_diff_eq(Vec3::new(0.0, 0.7, 0.0), 1e-4), "{convention:?}: {hips}");
    }
}

#[test]
fn missing_required_bone_fails() {
    let model = humanoid_without(Convention::default(), &[], &["mixamorig:LeftHand"]);
    let error = bind_avatar(model).unwrap_err();
    assert_eq!(
        error,
        BindingError::MissingRequiredBones(vec![CanonicalBone::LeftHand])
    );
}

#[test]
fn missing_optional_bone_is_left_unbound() {
    let model = humanoid_without(Convention::default(), &[], &["mixamorig:LeftEye"]);
    let mut avatar = bind_avatar(model).unwrap();
    assert!(avatar.binding(CanonicalBone::LeftEye).is_none());
    let mut pose = identity_pose(&avatar);
    pose.rotations.insert(CanonicalBone::LeftEye, Quat::from_rotation_y(0.3));
    avatar.apply_pose(&pose);
}

#[test]
fn model_without_skinned_mesh_fails() {
    let mut model = humanoid(Convention::default(), &[]);
    model.skinned_meshes.clear();
    assert_eq!(bind_avatar(model).unwrap_err(), BindingError::NoSkinnedMesh);
}

#[test]
fn hair_seeds_default_spring_chain() {
    let avatar = bind_avatar(humanoid(Convention::default(), &[])).unwrap();
    let hair = avatar.skeleton().find("Hair_01").unwrap();
    assert_eq!(avatar.hair_bones(), &[hair]);
    let chains = &avatar.secondary_motion().chains;
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].roots, vec![hair]);
    assert!((chains[0].stiffness - 0.5).abs() < 1e-6);
}

#[test]
fn decapitate_hides_head_until_restored() {
    let mut avatar = bind_avatar(humanoid(Convention::default(), &[])).unwrap();
    let head = avatar.binding(CanonicalBone::Head).unwrap().source;
    let eye = avatar.skeleton().find("mixamorig:LeftEye").unwrap();
    let head_position = avatar.skeleton().world_position(head);

    avatar.decapitate();
    assert!(avatar.is_decapitated());
    assert_eq!(avatar.skeleton().local(head).scale, Vec3::ZERO);
    // Children collapse onto the head.
    assert!(avatar.skeleton().world_position(eye).abs_diff_eq(head_position, 1e-6));

    avatar.undecapitate();
    assert_eq!(avatar.skeleton().local(head).scale, Vec3::ONE);
    assert!(!avatar.skeleton().world_position(eye).abs_diff_eq(head_position, 1e-3));
}

fn small_rotation() -> impl Strategy<Value = Quat> {
    (-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0, -0.6f32..0.6).prop_map(|(x, y, z, angle)| {
        let axis = Vec3::new(x, y, z).try_normalize().unwrap_or(Vec3::Y);
        Quat::from_axis_angle(axis, angle)
    })
}

proptest! {
    #[test]
    fn rest_clip_round_trips_random_bind_poses(
        jitter in prop::collection::vec(small_rotation(), 1..12),
        facing_back in any::<bool>(),
        z_up in any::<bool>(),
    ) {
        let model = humanoid(Convention { facing_back, z_up }, &jitter);
        let mut avatar = bind_avatar(model).unwrap();
        let before = worlds(&avatar);

        let library = Arc::new(rest_library());
        let mut tree = BlendTree::new(library, avatar.height(), BlendConfig::default());
        let mut state = avatar_rig::AvatarState::new();
        let pose = tree.evaluate(&mut state, 0.0);
        prop_assert!(pose.hips_position.is_none());
        avatar.apply_pose(&pose);

        for (i, (x, y)) in before.iter().zip(worlds(&avatar)).enumerate() {
            prop_assert!(x.abs_diff_eq(y, 1e-4), "bone {}", i);
        }
    }
}
