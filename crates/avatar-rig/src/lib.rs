//! Humanoid avatar runtime: rig binding, pose blending and secondary motion.
//!
//! This crate takes an imported humanoid rig in any of several skeleton
//! conventions, binds it to a canonical bone vocabulary, and drives it every
//! simulation tick from a library of canonical animation clips. All
//! functions are synchronous and allocation-light; the caller owns the tick
//! loop and any parallelism across avatars.
//!
//! # Design principles
//!
//! - **Synchronous**: No async, no threading primitives
//! - **Arena skeletons**: Bones reference parents by index, never by pointer
//! - **Injected clips**: The [`ClipLibrary`] is built once and shared read-only
//!
//! # Key functions
//!
//! - [`bind_avatar`]: Resolve canonical bones and corrective pre-rotations
//! - [`BlendTree::evaluate`]: Produce a canonical [`Pose`] for one tick
//! - [`BoundAvatar::apply_pose`]: Retarget a canonical pose onto the rig
//! - [`SecondaryMotion::update`]: Step spring-bone chains at a fixed rate
//! - [`ExpressionLayer::evaluate`]: Viseme, blink and emote morph weights

mod error;

pub mod avatar;
pub mod binder;
pub mod blend;
pub mod bone;
pub mod clip;
pub mod easing;
pub mod expression;
pub mod library;
pub mod naming;
pub mod skeleton;
pub mod spring;
pub mod state;
pub mod timestep;
pub mod transform;

pub use avatar::Avatar;
pub use binder::{BoneBinding, BoundAvatar, FlipFlags, ImportedModel, SkinnedMesh, bind_avatar};
pub use blend::{BlendConfig, BlendTree, ClipRole, LocomotionNames, Pose};
pub use bone::{CanonicalBone, CanonicalMap, Limb, Side};
pub use clip::{AnimationClip, Channel, ClipTags, Keyframes, Track};
pub use easing::CubicBezier;
pub use error::{BindingError, RigError, RigResult};
pub use expression::{Emote, ExpressionBindings, ExpressionLayer, ExpressionPreset, SpeechInput};
pub use library::{ClipLibrary, RawClip, RawTrack};
pub use skeleton::{Bone, Skeleton};
pub use spring::{SecondaryMotion, SecondaryMotionDesc, SpringChainDesc, SpringSettings};
pub use state::{ActivateDirection, AvatarState};
pub use timestep::FixedTimeStep;
pub use transform::Transform;
