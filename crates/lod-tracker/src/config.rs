//! Tracker tunables.

use glam::{IVec3, Vec3};

/// Settings for a [`LodChunkTracker`](crate::LodChunkTracker).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// World-space edge length of a lod-1 chunk.
    pub chunk_size: f32,
    /// Number of LOD levels. The coarsest chunk spans `2^(lods-1)` cells.
    pub lods: u32,
    /// Radius, in cells, of the lod-1 neighborhood around the observer.
    pub min_lod_range: i32,
    /// Track the vertical axis too. When false every chunk sits at `y = 0`.
    pub track_y: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16.0,
            lods: 1,
            min_lod_range: 2,
            track_y: false,
        }
    }
}

impl TrackerConfig {
    /// Edge length, in cells, of the coarsest octree node.
    #[must_use]
    pub fn max_lod(&self) -> u32 {
        1 << self.lods.saturating_sub(1).min(30)
    }

    /// Lattice cell containing a world position.
    #[must_use]
    pub fn cell_of(&self, position: Vec3) -> IVec3 {
        let cell = (position / self.chunk_size).floor();
        IVec3::new(
            cell.x as i32,
            if self.track_y { cell.y as i32 } else { 0 },
            cell.z as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_lod_doubles_per_level() {
        let mut config = TrackerConfig::default();
        assert_eq!(config.max_lod(), 1);
        config.lods = 3;
        assert_eq!(config.max_lod(), 4);
        config.lods = 0;
        assert_eq!(config.max_lod(), 1);
    }

    #[test]
    fn cells_floor_toward_negative_infinity() {
        let config = TrackerConfig::default();
        assert_eq!(config.cell_of(Vec3::new(-0.5, 40.0, 16.0)), IVec3::new(-1, 0, 1));
        let tracked = TrackerConfig {
            track_y: true,
            ..config
        };
        assert_eq!(tracked.cell_of(Vec3::new(0.0, 40.0, 15.9)), IVec3::new(0, 2, 0));
    }
}
