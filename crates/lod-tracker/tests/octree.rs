use std::collections::HashSet;

use glam::IVec3;
use lod_tracker::{NodeKey, Octree, construct_octree_for_leaf};
use proptest::prelude::*;

fn center() -> impl Strategy<Value = IVec3> {
    (-20i32..20, -20i32..20, -20i32..20).prop_map(|(x, y, z)| IVec3::new(x, y, z))
}

proptest! {
    #[test]
    fn leaves_partition_the_root_cubes(
        center in center(),
        radius in 0i32..=2,
        lods in 1u32..=4,
    ) {
        let max_lod = 1 << (lods - 1);
        let tree = Octree::construct(center, radius, max_lod).unwrap();
        prop_assert!(tree.validate().is_ok());

        let leaves = tree.leaf_chunks();
        let keys: HashSet<NodeKey> = leaves.iter().map(|chunk| chunk.key()).collect();
        prop_assert_eq!(keys.len(), leaves.len());

        // No leaf holds another leaf.
        for a in &leaves {
            for b in &leaves {
                if a.key() != b.key() {
                    prop_assert!(!a.key().contains(&b.key()), "{} holds {}", a.key(), b.key());
                }
            }
        }

        // Leaves tile the roots exactly.
        let roots: Vec<NodeKey> = tree.roots().map(|node| node.key).collect();
        let covered: u64 = leaves.iter().map(|chunk| chunk.key().volume()).sum();
        prop_assert_eq!(covered, roots.len() as u64 * u64::from(max_lod).pow(3));
        for chunk in &leaves {
            prop_assert!(roots.iter().any(|root| root.contains(&chunk.key())));
        }

        // The whole neighborhood is at full detail.
        for x in -radius..=radius {
            for y in -radius..=radius {
                for z in -radius..=radius {
                    let cell = center + IVec3::new(x, y, z);
                    prop_assert!(keys.contains(&NodeKey::new(cell, 1)), "cell {} missing", cell);
                }
            }
        }
    }

    #[test]
    fn lod_arrays_report_neighbor_leaves(center in center(), lods in 2u32..=3) {
        let max_lod = 1 << (lods - 1);
        let tree = Octree::construct(center, 1, max_lod).unwrap();
        for node in tree.leaves() {
            for (lod, offset) in node.lod_array.iter().zip(lod_tracker::LOD_CORNERS) {
                let corner = node.key.min + offset * node.key.lod as i32;
                let expected = tree.leaf_at(corner).map_or(node.key.lod, |leaf| leaf.key.lod);
                prop_assert_eq!(*lod, expected);
            }
            // The own corner always samples the node itself.
            prop_assert_eq!(node.lod_array[0], node.key.lod);
        }
    }
}

#[test]
fn construction_is_deterministic() {
    let a = construct_octree_for_leaf(IVec3::new(3, -1, 7), 2, 4).unwrap();
    let b = construct_octree_for_leaf(IVec3::new(3, -1, 7), 2, 4).unwrap();
    assert_eq!(a, b);
}

#[test]
fn observer_on_root_boundary_spans_several_roots() {
    let tree = Octree::construct(IVec3::ZERO, 1, 4).unwrap();
    // Cells -1..=1 straddle the root boundary at 0 on every axis.
    assert_eq!(tree.roots().count(), 8);
}
