//! Octree level-of-detail construction and chunk streaming.
//!
//! The world is a lattice of cubic chunks. Around the observer's cell this
//! crate builds an octree whose leaves are unit chunks close by and
//! coarser chunks further out, then diffs that leaf set every time the
//! observer changes cell. Consumers receive [`ChunkEvent`]s over a channel
//! and attach async producers to the chunk [`DataRequest`]s they care about.
//!
//! # Design principles
//!
//! - **Executor-agnostic**: The tracker hands out futures; the caller spawns them
//! - **Structured keys**: Nodes are identified by [`NodeKey`], never by strings
//! - **One request per chunk**: A chunk key has at most one live [`DataRequest`]
//! - **Cooperative cancellation**: Every request carries its own [`AbortSignal`]
//!
//! # Key functions
//!
//! - [`construct_octree_for_leaf`]: Leaf chunks around an observer cell
//! - [`LodChunkTracker::update`]: Diff the tracked set for a new position
//! - [`LodChunkTracker::poll`]: Apply finished data requests
//! - [`LodChunkTracker::into_service`]: Run the tracker as a task

mod error;

pub mod config;
pub mod node;
pub mod octree;
pub mod request;
pub mod signal;
pub mod task;
pub mod tracker;

pub use config::TrackerConfig;
pub use error::{ChunkError, OctreeResult, StructuralError};
pub use node::{LOD_CORNERS, LodChunk, NodeKey};
pub use octree::{Octree, OctreeNode, construct_octree_for_leaf};
pub use request::DataRequest;
pub use signal::{AbortController, AbortSignal};
pub use task::Task;
pub use tracker::{ChunkEvent, LodChunkTracker, TrackerHandle};
