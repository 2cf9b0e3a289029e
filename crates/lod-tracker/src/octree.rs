//! Octree construction around an observer cell.
//!
//! Every lod-1 cell in the cubic neighborhood of the observer is inserted
//! and linked upward to the `max_lod` node that holds it. Whenever a parent
//! gains its first child, the remaining seven slots are filled with leaves
//! one level down, so the leaves of the finished tree exactly partition the
//! union of the `max_lod` root cubes: unit cells near the observer,
//! progressively coarser cells further out.

use std::collections::HashMap;

use glam::IVec3;

use crate::error::{OctreeResult, StructuralError};
use crate::node::{LOD_CORNERS, LodChunk, NodeKey};

/// One cube of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OctreeNode {
    pub key: NodeKey,
    pub is_leaf: bool,
    /// Arena indices of the eight children, in [`NodeKey::child_index`] order.
    pub children: [Option<usize>; 8],
    pub lod_array: [u32; 8],
}

impl OctreeNode {
    fn new(key: NodeKey, is_leaf: bool) -> Self {
        Self {
            key,
            is_leaf,
            children: [None; 8],
            lod_array: [key.lod; 8],
        }
    }

    #[must_use]
    pub fn chunk(&self) -> LodChunk {
        LodChunk {
            min: self.key.min,
            lod: self.key.lod,
            lod_array: self.lod_array,
        }
    }
}

/// Arena-backed octree with a structured key index.
#[derive(Debug, Clone, Default)]
pub struct Octree {
    nodes: Vec<OctreeNode>,
    index: HashMap<NodeKey, usize>,
    max_lod: u32,
}

impl Octree {
    /// Build the tree for the `2 * inner_radius + 1` cube of cells centred
    /// on `center`, with roots of edge `max_lod`.
    pub fn construct(center: IVec3, inner_radius: i32, max_lod: u32) -> OctreeResult<Self> {
        if !max_lod.is_power_of_two() {
            return Err(StructuralError::InvalidMaxLod(max_lod));
        }
        let mut tree = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            max_lod,
        };

        let radius = IVec3::splat(inner_radius.max(0));
        let (lo, hi) = (center - radius, center + radius);
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                for z in lo.z..=hi.z {
                    tree.insert_upwards(IVec3::new(x, y, z))?;
                }
            }
        }

        #[cfg(debug_assertions)]
        tree.validate()?;

        tree.assign_lod_arrays();
        Ok(tree)
    }

    fn create(&mut self, key: NodeKey, is_leaf: bool) -> OctreeResult<usize> {
        if self.index.contains_key(&key) {
            return Err(StructuralError::DuplicateNode(key));
        }
        let i = self.nodes.len();
        self.nodes.push(OctreeNode::new(key, is_leaf));
        self.index.insert(key, i);
        Ok(i)
    }

    fn get_or_create(&mut self, key: NodeKey) -> OctreeResult<usize> {
        match self.index.get(&key) {
            Some(&i) => Ok(i),
            None => self.create(key, key.lod == 1),
        }
    }

    fn ensure_children(&mut self, parent: usize) -> OctreeResult<()> {
        let key = self.nodes[parent].key;
        for slot in 0..8 {
            if self.nodes[parent].children[slot].is_none() {
                let child = self.create(NodeKey::new(key.child_min(slot), key.lod / 2), true)?;
                self.nodes[parent].children[slot] = Some(child);
            }
        }
        Ok(())
    }

    fn insert_upwards(&mut self, cell: IVec3) -> OctreeResult<()> {
        let mut node = self.get_or_create(NodeKey::new(cell, 1))?;
        let mut lod = 2;
        while lod <= self.max_lod {
            let child_min = self.nodes[node].key.min;
            let parent_key = NodeKey::aligned(child_min, lod);
            let parent = self.get_or_create(parent_key)?;
            self.nodes[parent].is_leaf = false;

            let slot = parent_key.child_index(child_min);
            if self.nodes[parent].children[slot].is_none() {
                self.nodes[parent].children[slot] = Some(node);
                self.ensure_children(parent)?;
            }
            node = parent;
            lod *= 2;
        }
        Ok(())
    }

    /// Leaf holding `cell`, if any.
    #[must_use]
    pub fn leaf_at(&self, cell: IVec3) -> Option<&OctreeNode> {
        let mut lod = 1;
        while lod <= self.max_lod {
            if let Some(node) = self.get(NodeKey::aligned(cell, lod)) {
                if node.is_leaf {
                    return Some(node);
                }
            }
            lod *= 2;
        }
        None
    }

    fn assign_lod_arrays(&mut self) {
        for i in 0..self.nodes.len() {
            let key = self.nodes[i].key;
            let mut lod_array = [key.lod; 8];
            for (slot, offset) in lod_array.iter_mut().zip(LOD_CORNERS) {
                let corner = key.min + offset * key.lod as i32;
                if let Some(leaf) = self.leaf_at(corner) {
                    *slot = leaf.key.lod;
                }
            }
            self.nodes[i].lod_array = lod_array;
        }
    }

    /// Check that no key is duplicated and no leaf nests inside another.
    pub fn validate(&self) -> OctreeResult<()> {
        for (i, node) in self.nodes.iter().enumerate() {
            if self.index.get(&node.key) != Some(&i) {
                return Err(StructuralError::DuplicateNode(node.key));
            }
        }

        let leaves: Vec<&OctreeNode> = self.leaves().collect();
        for outer in &leaves {
            for child in outer.children.iter().flatten() {
                let child = &self.nodes[*child];
                if child.is_leaf {
                    return Err(StructuralError::NestedLeaf {
                        outer: outer.key,
                        inner: child.key,
                    });
                }
            }
        }
        // Every lattice point of a nested leaf lies inside its container,
        // so probing each leaf's coarser ancestors is enough.
        for inner in &leaves {
            let mut lod = inner.key.lod * 2;
            while lod <= self.max_lod {
                if let Some(outer) = self.get(NodeKey::aligned(inner.key.min, lod)) {
                    if outer.is_leaf {
                        return Err(StructuralError::NestedLeaf {
                            outer: outer.key,
                            inner: inner.key,
                        });
                    }
                }
                lod *= 2;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: NodeKey) -> Option<&OctreeNode> {
        self.index.get(&key).map(|&i| &self.nodes[i])
    }

    #[must_use]
    pub fn max_lod(&self) -> u32 {
        self.max_lod
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &OctreeNode> {
        self.nodes.iter()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &OctreeNode> {
        self.nodes.iter().filter(|node| node.is_leaf)
    }

    /// Nodes of edge `max_lod`.
    pub fn roots(&self) -> impl Iterator<Item = &OctreeNode> {
        self.nodes
            .iter()
            .filter(move |node| node.key.lod == self.max_lod)
    }

    /// Leaves as chunks, sorted by key for stable diffing.
    #[must_use]
    pub fn leaf_chunks(&self) -> Vec<LodChunk> {
        let mut chunks: Vec<LodChunk> = self.leaves().map(OctreeNode::chunk).collect();
        chunks.sort_by_key(|chunk| (chunk.min.to_array(), chunk.lod));
        chunks
    }

    #[cfg(test)]
    fn insert_raw(&mut self, key: NodeKey, is_leaf: bool) {
        let i = self.nodes.len();
        self.nodes.push(OctreeNode::new(key, is_leaf));
        self.index.insert(key, i);
    }
}

/// Leaf chunks of the octree around `center`.
pub fn construct_octree_for_leaf(
    center: IVec3,
    inner_radius: i32,
    max_lod: u32,
) -> OctreeResult<Vec<LodChunk>> {
    Octree::construct(center, inner_radius, max_lod).map(|tree| tree.leaf_chunks())
}
