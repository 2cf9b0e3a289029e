//! Bone naming dialects.
//!
//! Imported rigs name their joints in incompatible ways. Each dialect turns
//! a source bone name into a [`CanonicalBone`]; the binder scores every
//! dialect against a skeleton and keeps the best one, then lets the generic
//! token matcher fill any remaining gaps.

use std::collections::HashMap;

use crate::bone::{CanonicalBone, Limb, Side};
use crate::skeleton::Skeleton;

/// A convention for naming skeleton joints.
pub trait NamingDialect {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Resolve one source bone name.
    fn resolve(&self, bone_name: &str) -> Option<CanonicalBone>;

    /// Resolve a whole skeleton. The first bone in parent-before-child order
    /// wins when several names map to the same canonical bone.
    fn resolve_skeleton(&self, skeleton: &Skeleton) -> Vec<(CanonicalBone, usize)> {
        let mut seen = HashMap::new();
        for &index in skeleton.order() {
            if let Some(bone) = self.resolve(&skeleton.bone(index).name) {
                seen.entry(bone).or_insert(index);
            }
        }
        sorted(seen)
    }
}

fn sorted(map: HashMap<CanonicalBone, usize>) -> Vec<(CanonicalBone, usize)> {
    let mut resolved: Vec<_> = map.into_iter().collect();
    resolved.sort_unstable();
    resolved
}

/// Central (unsided) joint for a side-neutral name fragment.
fn central(fragment: &str) -> Option<CanonicalBone> {
    Some(match fragment {
        "hips" | "hip" | "pelvis" => CanonicalBone::Hips,
        "spine" => CanonicalBone::Spine,
        "chest" | "spine1" => CanonicalBone::Chest,
        "upperchest" | "spine2" => CanonicalBone::UpperChest,
        "neck" => CanonicalBone::Neck,
        "head" => CanonicalBone::Head,
        _ => return None,
    })
}

fn finger_index(word: &str) -> Option<u8> {
    Some(match word {
        "thumb" => 0,
        "index" | "indexfinger" => 1,
        "middle" | "middlefinger" => 2,
        "ring" | "ringfinger" => 3,
        "little" | "littlefinger" | "pinky" => 4,
        _ => return None,
    })
}

/// Mixamo rigs: `mixamorig:LeftForeArm`, `mixamorigHips`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mixamo;

impl Mixamo {
    fn limb(rest: &str) -> Option<Limb> {
        Some(match rest {
            "Shoulder" => Limb::Shoulder,
            "Arm" => Limb::UpperArm,
            "ForeArm" => Limb::LowerArm,
            "Hand" => Limb::Hand,
            "UpLeg" => Limb::UpperLeg,
            "Leg" => Limb::LowerLeg,
            "Foot" => Limb::Foot,
            "ToeBase" => Limb::Toes,
            "Eye" => Limb::Eye,
            _ => {
                let finger = rest.strip_prefix("Hand")?;
                let digit_at = finger.find(|c: char| c.is_ascii_digit())?;
                let (word, digit) = finger.split_at(digit_at);
                let segment = digit.parse::<u8>().ok()?.checked_sub(1)?;
                Limb::Finger {
                    finger: finger_index(&word.to_ascii_lowercase())?,
                    segment,
                }
            }
        })
    }
}

impl NamingDialect for Mixamo {
    fn name(&self) -> &'static str {
        "mixamo"
    }

    fn resolve(&self, bone_name: &str) -> Option<CanonicalBone> {
        let rest = bone_name.strip_prefix("mixamorig")?;
        let rest = rest.strip_prefix(':').unwrap_or(rest);
        if let Some(limb) = rest.strip_prefix("Left") {
            return CanonicalBone::sided(Self::limb(limb)?, Side::Left);
        }
        if let Some(limb) = rest.strip_prefix("Right") {
            return CanonicalBone::sided(Self::limb(limb)?, Side::Right);
        }
        central(&rest.to_ascii_lowercase())
    }
}

/// VRoid-style tag prefixes: `J_Bip_C_Hips`, `J_Bip_L_UpperArm`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VroidTagged;

impl NamingDialect for VroidTagged {
    fn name(&self) -> &'static str {
        "vroid"
    }

    fn resolve(&self, bone_name: &str) -> Option<CanonicalBone> {
        if let Some(eye) = bone_name.strip_prefix("J_Adj_") {
            return match eye {
                "L_FaceEye" => Some(CanonicalBone::LeftEye),
                "R_FaceEye" => Some(CanonicalBone::RightEye),
                _ => None,
            };
        }
        let tagged = bone_name.strip_prefix("J_Bip_")?;
        let (tag, rest) = tagged.split_once('_')?;
        let side = match tag {
            "C" => return central(&rest.to_ascii_lowercase()),
            "L" => Side::Left,
            "R" => Side::Right,
            _ => return None,
        };
        let limb = match rest {
            "Shoulder" => Limb::Shoulder,
            "UpperArm" => Limb::UpperArm,
            "LowerArm" => Limb::LowerArm,
            "Hand" => Limb::Hand,
            "UpperLeg" => Limb::UpperLeg,
            "LowerLeg" => Limb::LowerLeg,
            "Foot" => Limb::Foot,
            "ToeBase" => Limb::Toes,
            _ => {
                let digit_at = rest.find(|c: char| c.is_ascii_digit())?;
                let (word, digit) = rest.split_at(digit_at);
                Limb::Finger {
                    finger: finger_index(&word.to_ascii_lowercase())?,
                    segment: digit.parse::<u8>().ok()?.checked_sub(1)?,
                }
            }
        };
        CanonicalBone::sided(limb, side)
    }
}

/// Token matcher for ad-hoc names: `LeftArm`, `upperarm_l`, `Arm.L`,
/// `Left_elbow`, `Bip01 L Thigh`.
///
/// Finger segment numbers are normalized per finger against the lowest
/// number seen in the skeleton, so both `thumb0..2` and `thumb1..3` work.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericTokens;

/// A name split into side, body-part key and trailing segment number.
#[derive(Debug, PartialEq, Eq)]
struct Tokens {
    side: Option<Side>,
    key: String,
    number: Option<u8>,
}

fn tokenize(bone_name: &str) -> Tokens {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in bone_name.chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        // Split camel case and letter/digit boundaries.
        let boundary = (c.is_ascii_uppercase() && prev_lower)
            || (c.is_ascii_digit() && current.chars().last().is_some_and(|l| l.is_ascii_alphabetic()));
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c.to_ascii_lowercase());
        prev_lower = c.is_ascii_lowercase();
    }
    if !current.is_empty() {
        words.push(current);
    }

    let mut side = None;
    let mut number = None;
    let mut key = String::new();
    for word in words {
        match word.as_str() {
            "l" | "left" => side = Some(Side::Left),
            "r" | "right" => side = Some(Side::Right),
            "mixamorig" | "bip" | "bip01" | "bip001" | "def" | "j" | "armature" => {}
            w if w.chars().all(|c| c.is_ascii_digit()) => number = w.parse().ok(),
            w => key.push_str(w),
        }
    }
    if side.is_none() {
        for (prefix, s) in [("left", Side::Left), ("right", Side::Right)] {
            if let Some(rest) = key.strip_prefix(prefix) {
                key = rest.to_owned();
                side = Some(s);
                break;
            }
        }
    }
    Tokens { side, key, number }
}

fn generic_limb(key: &str) -> Option<Limb> {
    Some(match key {
        "eye" => Limb::Eye,
        "shoulder" | "clavicle" | "collar" => Limb::Shoulder,
        "upperarm" | "arm" | "uparm" => Limb::UpperArm,
        "lowerarm" | "forearm" | "elbow" | "lowarm" => Limb::LowerArm,
        "hand" | "wrist" => Limb::Hand,
        "upperleg" | "upleg" | "thigh" | "leg" => Limb::UpperLeg,
        "lowerleg" | "knee" | "calf" | "shin" => Limb::LowerLeg,
        "foot" | "ankle" => Limb::Foot,
        "toe" | "toes" | "toebase" => Limb::Toes,
        _ => return None,
    })
}

fn generic_finger(key: &str) -> Option<u8> {
    let key = key.strip_prefix("hand").unwrap_or(key);
    finger_index(key)
}

impl NamingDialect for GenericTokens {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn resolve(&self, bone_name: &str) -> Option<CanonicalBone> {
        let tokens = tokenize(bone_name);
        match tokens.side {
            None => match tokens.number {
                Some(n) if tokens.key == "spine" => central(&format!("spine{n}")),
                _ => central(&tokens.key),
            },
            Some(side) => {
                if let Some(finger) = generic_finger(&tokens.key) {
                    // Without skeleton context, assume one-based numbering.
                    let segment = tokens.number.unwrap_or(1).saturating_sub(1);
                    return CanonicalBone::sided(Limb::Finger { finger, segment }, side);
                }
                CanonicalBone::sided(generic_limb(&tokens.key)?, side)
            }
        }
    }

    fn resolve_skeleton(&self, skeleton: &Skeleton) -> Vec<(CanonicalBone, usize)> {
        let tokens: Vec<Tokens> = skeleton
            .bones()
            .iter()
            .map(|bone| tokenize(&bone.name))
            .collect();

        // Lowest segment number per (side, finger).
        let mut base: HashMap<(Side, u8), u8> = HashMap::new();
        for t in &tokens {
            if let (Some(side), Some(finger)) = (t.side, generic_finger(&t.key)) {
                let number = t.number.unwrap_or(1);
                let entry = base.entry((side, finger)).or_insert(number);
                *entry = (*entry).min(number);
            }
        }

        let mut seen = HashMap::new();
        for &index in skeleton.order() {
            let t = &tokens[index];
            let resolved = match (t.side, generic_finger(&t.key)) {
                (Some(side), Some(finger)) => {
                    let number = t.number.unwrap_or(1);
                    let lowest = base.get(&(side, finger)).copied().unwrap_or(number);
                    CanonicalBone::sided(
                        Limb::Finger {
                            finger,
                            segment: number - lowest,
                        },
                        side,
                    )
                }
                _ => self.resolve(&skeleton.bone(index).name),
            };
            if let Some(bone) = resolved {
                seen.entry(bone).or_insert(index);
            }
        }
        sorted(seen)
    }
}

/// All built-in dialects, most specific first.
#[must_use]
pub fn builtin_dialects() -> [&'static dyn NamingDialect; 3] {
    [&Mixamo, &VroidTagged, &GenericTokens]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Bone;
    use crate::transform::Transform;

    #[test]
    fn mixamo_names() {
        assert_eq!(Mixamo.resolve("mixamorig:Hips"), Some(CanonicalBone::Hips));
        assert_eq!(Mixamo.resolve("mixamorigSpine2"), Some(CanonicalBone::UpperChest));
        assert_eq!(Mixamo.resolve("mixamorigLeftForeArm"), Some(CanonicalBone::LeftLowerArm));
        assert_eq!(Mixamo.resolve("mixamorigRightLeg"), Some(CanonicalBone::RightLowerLeg));
        assert_eq!(
            Mixamo.resolve("mixamorig:RightHandPinky3"),
            Some(CanonicalBone::RightLittleDistal)
        );
        assert_eq!(Mixamo.resolve("Hips"), None);
    }

    #[test]
    fn vroid_names() {
        assert_eq!(VroidTagged.resolve("J_Bip_C_UpperChest"), Some(CanonicalBone::UpperChest));
        assert_eq!(VroidTagged.resolve("J_Bip_L_UpperArm"), Some(CanonicalBone::LeftUpperArm));
        assert_eq!(VroidTagged.resolve("J_Bip_R_Index2"), Some(CanonicalBone::RightIndexIntermediate));
        assert_eq!(VroidTagged.resolve("J_Adj_L_FaceEye"), Some(CanonicalBone::LeftEye));
        assert_eq!(VroidTagged.resolve("J_Sec_Hair1_01"), None);
    }

    #[test]
    fn generic_names() {
        let g = GenericTokens;
        assert_eq!(g.resolve("Left_arm"), Some(CanonicalBone::LeftUpperArm));
        assert_eq!(g.resolve("upperarm_r"), Some(CanonicalBone::RightUpperArm));
        assert_eq!(g.resolve("Forearm.L"), Some(CanonicalBone::LeftLowerArm));
        assert_eq!(g.resolve("Bip01 R Thigh"), Some(CanonicalBone::RightUpperLeg));
        assert_eq!(g.resolve("Right_ankle"), Some(CanonicalBone::RightFoot));
        assert_eq!(g.resolve("LeftToeBase"), Some(CanonicalBone::LeftToes));
        assert_eq!(g.resolve("Spine1"), Some(CanonicalBone::Chest));
        assert_eq!(g.resolve("Head"), Some(CanonicalBone::Head));
        assert_eq!(g.resolve("HairFront"), None);
    }

    #[test]
    fn generic_normalizes_zero_based_thumbs() {
        let bones = vec![
            Bone::new("Left_wrist", None, Transform::IDENTITY),
            Bone::new("Left_thumb0", Some(0), Transform::IDENTITY),
            Bone::new("Left_thumb1", Some(1), Transform::IDENTITY),
            Bone::new("Left_thumb2", Some(2), Transform::IDENTITY),
        ];
        let skeleton = Skeleton::new(bones).unwrap();
        let resolved = GenericTokens.resolve_skeleton(&skeleton);
        assert!(resolved.contains(&(CanonicalBone::LeftThumbProximal, 1)));
        assert!(resolved.contains(&(CanonicalBone::LeftThumbDistal, 3)));
    }

    #[test]
    fn generic_unnumbered_finger_root_is_proximal() {
        let bones = vec![
            Bone::new("Hips", None, Transform::IDENTITY),
            Bone::new("LeftHand", Some(0), Transform::IDENTITY),
            Bone::new("LeftThumb", Some(1), Transform::IDENTITY),
            Bone::new("LeftThumb2", Some(2), Transform::IDENTITY),
            Bone::new("LeftThumb3", Some(3), Transform::IDENTITY),
        ];
        let skeleton = Skeleton::new(bones).unwrap();
        let resolved = GenericTokens.resolve_skeleton(&skeleton);
        assert!(resolved.contains(&(CanonicalBone::LeftThumbProximal, 2)));
        assert!(resolved.contains(&(CanonicalBone::LeftThumbIntermediate, 3)));
        assert!(resolved.contains(&(CanonicalBone::LeftThumbDistal, 4)));
    }
}
