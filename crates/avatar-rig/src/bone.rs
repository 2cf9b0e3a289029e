//! Canonical humanoid bone vocabulary.
//!
//! Clips, blend targets and bindings all address bones through
//! [`CanonicalBone`]. The hierarchy and names follow the VRM humanoid
//! layout. The canonical frame is +Y up with the avatar facing +Z, so the
//! avatar's left hand lies on +X.

use std::fmt;

macro_rules! canonical_bones {
    ($($variant:ident => $vrm:literal, $parent:expr;)*) => {
        /// A stable identifier for one humanoid joint.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum CanonicalBone {
            $($variant,)*
        }

        impl CanonicalBone {
            /// Every canonical bone, parents before children.
            pub const ALL: &'static [CanonicalBone] = &[$(CanonicalBone::$variant,)*];

            /// Number of canonical bones.
            pub const COUNT: usize = Self::ALL.len();

            /// The VRM humanoid name, e.g. `leftUpperArm`.
            #[must_use]
            pub const fn vrm_name(self) -> &'static str {
                match self {
                    $(CanonicalBone::$variant => $vrm,)*
                }
            }

            /// Canonical parent joint, `None` for the hips.
            #[must_use]
            pub const fn parent(self) -> Option<CanonicalBone> {
                #[allow(clippy::enum_glob_use)]
                use CanonicalBone::*;
                match self {
                    $($variant => $parent,)*
                }
            }

            /// Look up a bone by its VRM humanoid name.
            #[must_use]
            pub fn from_vrm_name(name: &str) -> Option<CanonicalBone> {
                match name {
                    $($vrm => Some(CanonicalBone::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

canonical_bones! {
    Hips => "hips", None;
    Spine => "spine", Some(Hips);
    Chest => "chest", Some(Spine);
    UpperChest => "upperChest", Some(Chest);
    Neck => "neck", Some(UpperChest);
    Head => "head", Some(Neck);
    LeftEye => "leftEye", Some(Head);
    RightEye => "rightEye", Some(Head);

    LeftShoulder => "leftShoulder", Some(UpperChest);
    LeftUpperArm => "leftUpperArm", Some(LeftShoulder);
    LeftLowerArm => "leftLowerArm", Some(LeftUpperArm);
    LeftHand => "leftHand", Some(LeftLowerArm);
    RightShoulder => "rightShoulder", Some(UpperChest);
    RightUpperArm => "rightUpperArm", Some(RightShoulder);
    RightLowerArm => "rightLowerArm", Some(RightUpperArm);
    RightHand => "rightHand", Some(RightLowerArm);

    LeftThumbProximal => "leftThumbProximal", Some(LeftHand);
    LeftThumbIntermediate => "leftThumbIntermediate", Some(LeftThumbProximal);
    LeftThumbDistal => "leftThumbDistal", Some(LeftThumbIntermediate);
    LeftIndexProximal => "leftIndexProximal", Some(LeftHand);
    LeftIndexIntermediate => "leftIndexIntermediate", Some(LeftIndexProximal);
    LeftIndexDistal => "leftIndexDistal", Some(LeftIndexIntermediate);
    LeftMiddleProximal => "leftMiddleProximal", Some(LeftHand);
    LeftMiddleIntermediate => "leftMiddleIntermediate", Some(LeftMiddleProximal);
    LeftMiddleDistal => "leftMiddleDistal", Some(LeftMiddleIntermediate);
    LeftRingProximal => "leftRingProximal", Some(LeftHand);
    LeftRingIntermediate => "leftRingIntermediate", Some(LeftRingProximal);
    LeftRingDistal => "leftRingDistal", Some(LeftRingIntermediate);
    LeftLittleProximal => "leftLittleProximal", Some(LeftHand);
    LeftLittleIntermediate => "leftLittleIntermediate", Some(LeftLittleProximal);
    LeftLittleDistal => "leftLittleDistal", Some(LeftLittleIntermediate);

    RightThumbProximal => "rightThumbProximal", Some(RightHand);
    RightThumbIntermediate => "rightThumbIntermediate", Some(RightThumbProximal);
    RightThumbDistal => "rightThumbDistal", Some(RightThumbIntermediate);
    RightIndexProximal => "rightIndexProximal", Some(RightHand);
    RightIndexIntermediate => "rightIndexIntermediate", Some(RightIndexProximal);
    RightIndexDistal => "rightIndexDistal", Some(RightIndexIntermediate);
    RightMiddleProximal => "rightMiddleProximal", Some(RightHand);
    RightMiddleIntermediate => "rightMiddleIntermediate", Some(RightMiddleProximal);
    RightMiddleDistal => "rightMiddleDistal", Some(RightMiddleIntermediate);
    RightRingProximal => "rightRingProximal", Some(RightHand);
    RightRingIntermediate => "rightRingIntermediate", Some(RightRingProximal);
    RightRingDistal => "rightRingDistal", Some(RightRingIntermediate);
    RightLittleProximal => "rightLittleProximal", Some(RightHand);
    RightLittleIntermediate => "rightLittleIntermediate", Some(RightLittleProximal);
    RightLittleDistal => "rightLittleDistal", Some(RightLittleIntermediate);

    LeftUpperLeg => "leftUpperLeg", Some(Hips);
    LeftLowerLeg => "leftLowerLeg", Some(LeftUpperLeg);
    LeftFoot => "leftFoot", Some(LeftLowerLeg);
    LeftToes => "leftToes", Some(LeftFoot);
    RightUpperLeg => "rightUpperLeg", Some(Hips);
    RightLowerLeg => "rightLowerLeg", Some(RightUpperLeg);
    RightFoot => "rightFoot", Some(RightLowerLeg);
    RightToes => "rightToes", Some(RightFoot);
}

/// Body side of a sided bone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// Side-neutral part of a sided bone, used by naming dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limb {
    Eye,
    Shoulder,
    UpperArm,
    LowerArm,
    Hand,
    UpperLeg,
    LowerLeg,
    Foot,
    Toes,
    /// A finger segment: `finger` 0..5 is thumb to little, `segment` 0..3 is
    /// proximal to distal.
    Finger { finger: u8, segment: u8 },
}

impl CanonicalBone {
    /// Bones that [`bind_avatar`](crate::bind_avatar) refuses to work without.
    pub const REQUIRED: [CanonicalBone; 6] = [
        CanonicalBone::Hips,
        CanonicalBone::Head,
        CanonicalBone::LeftHand,
        CanonicalBone::RightHand,
        CanonicalBone::LeftFoot,
        CanonicalBone::RightFoot,
    ];

    /// Dense index into [`CanonicalBone::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Combine a limb part and a side into a canonical bone.
    #[must_use]
    pub fn sided(limb: Limb, side: Side) -> Option<CanonicalBone> {
        #[allow(clippy::enum_glob_use)]
        use CanonicalBone::*;
        let (left, right) = match limb {
            Limb::Eye => (LeftEye, RightEye),
            Limb::Shoulder => (LeftShoulder, RightShoulder),
            Limb::UpperArm => (LeftUpperArm, RightUpperArm),
            Limb::LowerArm => (LeftLowerArm, RightLowerArm),
            Limb::Hand => (LeftHand, RightHand),
            Limb::UpperLeg => (LeftUpperLeg, RightUpperLeg),
            Limb::LowerLeg => (LeftLowerLeg, RightLowerLeg),
            Limb::Foot => (LeftFoot, RightFoot),
            Limb::Toes => (LeftToes, RightToes),
            Limb::Finger { finger, segment } => {
                if finger > 4 || segment > 2 {
                    return None;
                }
                let offset = usize::from(finger) * 3 + usize::from(segment);
                (
                    Self::ALL[LeftThumbProximal.index() + offset],
                    Self::ALL[RightThumbProximal.index() + offset],
                )
            }
        };
        Some(match side {
            Side::Left => left,
            Side::Right => right,
        })
    }

    /// Which side of the body this bone is on, if any.
    #[must_use]
    pub fn side(self) -> Option<Side> {
        let name = self.vrm_name();
        if name.starts_with("left") {
            Some(Side::Left)
        } else if name.starts_with("right") {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// The same joint on the opposite side; unsided bones map to themselves.
    #[must_use]
    pub fn mirror(self) -> CanonicalBone {
        let name = self.vrm_name();
        let mirrored = if let Some(rest) = name.strip_prefix("left") {
            format!("right{rest}")
        } else if let Some(rest) = name.strip_prefix("right") {
            format!("left{rest}")
        } else {
            return self;
        };
        Self::from_vrm_name(&mirrored).unwrap_or(self)
    }

    /// True for upper arm, lower arm and hand on either side.
    #[must_use]
    pub fn is_arm(self) -> bool {
        matches!(
            self,
            CanonicalBone::LeftUpperArm
                | CanonicalBone::LeftLowerArm
                | CanonicalBone::LeftHand
                | CanonicalBone::RightUpperArm
                | CanonicalBone::RightLowerArm
                | CanonicalBone::RightHand
        )
    }

    /// True for upper and lower leg on either side.
    #[must_use]
    pub fn is_leg(self) -> bool {
        matches!(
            self,
            CanonicalBone::LeftUpperLeg
                | CanonicalBone::LeftLowerLeg
                | CanonicalBone::RightUpperLeg
                | CanonicalBone::RightLowerLeg
        )
    }
}

impl fmt::Display for CanonicalBone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.vrm_name())
    }
}

/// Fixed-size map with exactly one slot per canonical bone.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalMap<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for CanonicalMap<T> {
    fn default() -> Self {
        Self {
            slots: std::iter::repeat_with(|| None)
                .take(CanonicalBone::COUNT)
                .collect(),
        }
    }
}

impl<T> CanonicalMap<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, bone: CanonicalBone) -> Option<&T> {
        self.slots[bone.index()].as_ref()
    }

    pub fn get_mut(&mut self, bone: CanonicalBone) -> Option<&mut T> {
        self.slots[bone.index()].as_mut()
    }

    /// Store a value, returning the previous one.
    pub fn insert(&mut self, bone: CanonicalBone, value: T) -> Option<T> {
        self.slots[bone.index()].replace(value)
    }

    pub fn remove(&mut self, bone: CanonicalBone) -> Option<T> {
        self.slots[bone.index()].take()
    }

    #[must_use]
    pub fn contains(&self, bone: CanonicalBone) -> bool {
        self.slots[bone.index()].is_some()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupied slots in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (CanonicalBone, &T)> {
        CanonicalBone::ALL
            .iter()
            .zip(&self.slots)
            .filter_map(|(bone, slot)| slot.as_ref().map(|value| (*bone, value)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (CanonicalBone, &mut T)> {
        CanonicalBone::ALL
            .iter()
            .zip(&mut self.slots)
            .filter_map(|(bone, slot)| slot.as_mut().map(|value| (*bone, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_precede_children() {
        for bone in CanonicalBone::ALL {
            if let Some(parent) = bone.parent() {
                assert!(parent.index() < bone.index(), "{bone} before {parent}");
            }
        }
    }

    #[test]
    fn indices_match_table_order() {
        for (i, bone) in CanonicalBone::ALL.iter().enumerate() {
            assert_eq!(bone.index(), i);
        }
    }

    #[test]
    fn mirror_swaps_sides() {
        assert_eq!(CanonicalBone::LeftUpperArm.mirror(), CanonicalBone::RightUpperArm);
        assert_eq!(CanonicalBone::RightRingDistal.mirror(), CanonicalBone::LeftRingDistal);
        assert_eq!(CanonicalBone::Spine.mirror(), CanonicalBone::Spine);
    }

    #[test]
    fn sided_fingers() {
        let bone = CanonicalBone::sided(Limb::Finger { finger: 2, segment: 1 }, Side::Right);
        assert_eq!(bone, Some(CanonicalBone::RightMiddleIntermediate));
        assert_eq!(CanonicalBone::sided(Limb::Finger { finger: 5, segment: 0 }, Side::Left), None);
    }

    #[test]
    fn map_has_one_slot_per_bone() {
        let mut map = CanonicalMap::new();
        assert!(map.is_empty());
        assert_eq!(map.insert(CanonicalBone::Head, 1), None);
        assert_eq!(map.insert(CanonicalBone::Head, 2), Some(1));
        assert_eq!(map.len(), 1);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(CanonicalBone::Head, &2)]);
    }
}
