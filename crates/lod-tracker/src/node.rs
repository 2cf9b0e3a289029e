//! Octree node identity and the chunks handed to consumers.

use std::fmt;

use glam::{IVec3, Vec3};

/// Corner offsets, in units of the node's LOD, sampled for seam stitching.
pub const LOD_CORNERS: [IVec3; 8] = [
    IVec3::new(0, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(1, 0, 1),
    IVec3::new(0, 1, 0),
    IVec3::new(1, 1, 0),
    IVec3::new(0, 1, 1),
    IVec3::new(1, 1, 1),
];

/// Identity of an octree cube: its minimum lattice corner and edge length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub min: IVec3,
    /// Edge length in cells, always a power of two.
    pub lod: u32,
}

impl NodeKey {
    #[must_use]
    pub const fn new(min: IVec3, lod: u32) -> Self {
        Self { min, lod }
    }

    /// The cube of edge `lod` aligned to the `lod` lattice that holds `cell`.
    #[must_use]
    pub fn aligned(cell: IVec3, lod: u32) -> Self {
        let size = lod as i32;
        Self {
            min: IVec3::new(
                cell.x.div_euclid(size) * size,
                cell.y.div_euclid(size) * size,
                cell.z.div_euclid(size) * size,
            ),
            lod,
        }
    }

    /// Exclusive maximum corner.
    #[must_use]
    pub fn max(&self) -> IVec3 {
        self.min + IVec3::splat(self.lod as i32)
    }

    #[must_use]
    pub fn contains_point(&self, point: IVec3) -> bool {
        point.cmpge(self.min).all() && point.cmplt(self.max()).all()
    }

    /// Whether `other`'s minimum corner lies inside this cube.
    #[must_use]
    pub fn contains(&self, other: &NodeKey) -> bool {
        self.contains_point(other.min)
    }

    /// Slot of `child` among this node's eight children.
    #[must_use]
    pub fn child_index(&self, child: IVec3) -> usize {
        let half = (self.lod / 2) as i32;
        let center = self.min + IVec3::splat(half);
        usize::from(child.x >= center.x)
            + 2 * usize::from(child.y >= center.y)
            + 4 * usize::from(child.z >= center.z)
    }

    /// Minimum corner of child slot `index`.
    #[must_use]
    pub fn child_min(&self, index: usize) -> IVec3 {
        let half = (self.lod / 2) as i32;
        let offset = IVec3::new((index & 1) as i32, ((index >> 1) & 1) as i32, (index >> 2) as i32);
        self.min + offset * half
    }

    /// Number of lod-1 cells covered.
    #[must_use]
    pub fn volume(&self) -> u64 {
        u64::from(self.lod).pow(3)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}:{}", self.min.x, self.min.y, self.min.z, self.lod)
    }
}

/// A leaf of the tracked octree, as streamed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LodChunk {
    pub min: IVec3,
    pub lod: u32,
    /// LOD of the leaf containing each of [`LOD_CORNERS`], scaled by `lod`.
    /// Corners outside every leaf report this chunk's own LOD.
    pub lod_array: [u32; 8],
}

impl LodChunk {
    #[must_use]
    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.min, self.lod)
    }

    /// Same cube and same neighbor LODs, so existing mesh data stays valid.
    #[must_use]
    pub fn lod_equals(&self, other: &LodChunk) -> bool {
        self.key() == other.key() && self.lod_array == other.lod_array
    }

    #[must_use]
    pub fn contains_point(&self, point: IVec3) -> bool {
        self.key().contains_point(point)
    }

    /// Debug name of the chunk.
    #[must_use]
    pub fn name(&self) -> String {
        format!("chunk:{}:{}:{}", self.min.x, self.min.y, self.min.z)
    }

    /// World-space minimum corner.
    #[must_use]
    pub fn world_min(&self, chunk_size: f32) -> Vec3 {
        self.min.as_vec3() * chunk_size
    }

    /// World-space edge length.
    #[must_use]
    pub fn world_size(&self, chunk_size: f32) -> f32 {
        self.lod as f32 * chunk_size
    }
}
