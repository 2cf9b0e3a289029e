//! The diff produced by one tracker pass.

use std::collections::HashMap;
use std::sync::Arc;

use glam::IVec3;

use crate::node::{LodChunk, NodeKey};

/// Leaves entering and leaving the tracked set when the observer moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: u64,
    /// Observer cell the pass was computed for.
    pub center: IVec3,
    /// Every leaf of the new octree.
    pub leaves: Arc<[LodChunk]>,
    pub entered: Vec<LodChunk>,
    pub exited: Vec<LodChunk>,
}

impl Task {
    /// Diff `leaves` against the previous pass. A chunk whose neighbor LODs
    /// changed counts as leaving and re-entering.
    #[must_use]
    pub fn diff(id: u64, center: IVec3, previous: &[LodChunk], leaves: Arc<[LodChunk]>) -> Self {
        let old = index(previous);
        let new = index(&leaves);
        let entered = leaves
            .iter()
            .filter(|chunk| !old.get(&chunk.key()).is_some_and(|o| o.lod_equals(chunk)))
            .copied()
            .collect();
        let exited = previous
            .iter()
            .filter(|chunk| !new.get(&chunk.key()).is_some_and(|n| n.lod_equals(chunk)))
            .copied()
            .collect();
        Self {
            id,
            center,
            leaves,
            entered,
            exited,
        }
    }

    /// Nothing entered or left.
    #[must_use]
    pub fn is_nop(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

fn index(chunks: &[LodChunk]) -> HashMap<NodeKey, &LodChunk> {
    chunks.iter().map(|chunk| (chunk.key(), chunk)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::construct_octree_for_leaf;

    #[test]
    fn same_center_is_nop() {
        let leaves: Arc<[LodChunk]> = construct_octree_for_leaf(IVec3::ZERO, 1, 2).unwrap().into();
        let task = Task::diff(1, IVec3::ZERO, &leaves, leaves.clone());
        assert!(task.is_nop());
    }

    #[test]
    fn neighbor_lod_change_reenters() {
        let a = LodChunk {
            min: IVec3::ZERO,
            lod: 1,
            lod_array: [1; 8],
        };
        let mut b = a;
        b.lod_array[7] = 2;
        let task = Task::diff(2, IVec3::ZERO, &[a], Arc::from([b]));
        assert_eq!(task.entered, vec![b]);
        assert_eq!(task.exited, vec![a]);
    }
}
