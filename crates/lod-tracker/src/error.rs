//! Error types for octree construction and chunk data production.

use crate::node::NodeKey;

/// Result type for octree construction.
pub type OctreeResult<T> = Result<T, StructuralError>;

/// An octree invariant was violated.
///
/// Construction never produces these for valid input; they exist so that
/// a broken invariant fails loudly instead of streaming overlapping chunks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    /// Two nodes were created for the same cube.
    #[error("node already exists: {0}")]
    DuplicateNode(NodeKey),

    /// A leaf cube contains another leaf cube.
    #[error("leaf node {outer} contains leaf node {inner}")]
    NestedLeaf { outer: NodeKey, inner: NodeKey },

    /// The maximum LOD must be a power of two.
    #[error("max lod {0} is not a power of two")]
    InvalidMaxLod(u32),
}

/// Why a chunk data request did not produce data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    /// The request was cancelled because its chunk left the tracked set.
    #[error("chunk request aborted")]
    Aborted,

    /// The producer attached to the request failed.
    #[error("chunk producer failed: {0}")]
    Producer(String),
}

impl ChunkError {
    /// Wrap any displayable producer failure.
    pub fn producer(error: impl std::fmt::Display) -> Self {
        Self::Producer(error.to_string())
    }

    /// Whether this is a cancellation rather than a genuine failure.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}
