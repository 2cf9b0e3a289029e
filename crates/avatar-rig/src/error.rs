//! Error types for rig binding and clip ingestion.

use crate::bone::CanonicalBone;

/// Result type for fallible rig operations.
pub type RigResult<T> = Result<T, RigError>;

/// Failure to bind an imported model to the canonical skeleton.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    /// The model contains no skinned mesh to drive.
    #[error("model has no skinned meshes")]
    NoSkinnedMesh,
    /// Bones the runtime cannot work without were not found.
    #[error("required bones could not be resolved: {0:?}")]
    MissingRequiredBones(Vec<CanonicalBone>),
}

/// Errors produced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum RigError {
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// Bone `index` names a parent that does not exist.
    #[error("bone {index} has invalid parent {parent}")]
    InvalidParent { index: usize, parent: usize },

    /// The parent links do not form a forest.
    #[error("skeleton parent links contain a cycle")]
    Cycle,

    /// A clip or clip table could not be ingested.
    #[error("failed to load {what}: {reason}")]
    Load { what: String, reason: String },
}
