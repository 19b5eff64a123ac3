//! Chunk coordinates, world identity, and the toroidal world descriptor.
//!
//! Worlds wrap in X and Y and have a fixed, unwrapped height in Z. All
//! extents are measured in chunks.

use serde::{Deserialize, Serialize};

/// Identifies a chunk's position in a world, in chunk-grid units.
///
/// X and Y wrap modulo the world extents; Z is bounded by the world height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkIndex {
    /// Chunk-grid X coordinate (wraps).
    pub x: i32,
    /// Chunk-grid Y coordinate (wraps).
    pub y: i32,
    /// Chunk-grid Z coordinate (height layer).
    pub z: i32,
}

impl ChunkIndex {
    /// Creates a new chunk index.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Opaque identifier of a world owned by the chunk authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(pub u32);

/// Size descriptor of a toroidal world.
///
/// `width` is the X wrap extent, `depth` the Y wrap extent, and `height`
/// the number of Z layers. Two planets are the same binding only if every
/// field matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Planet {
    /// World identity handed to the chunk authority.
    pub id: WorldId,
    /// X extent in chunks.
    pub width: i32,
    /// Y extent in chunks.
    pub depth: i32,
    /// Number of Z layers in chunks.
    pub height: i32,
}

impl Planet {
    /// Construct a new planet descriptor.
    ///
    /// # Panics
    ///
    /// Panics if any extent is not positive.
    pub fn new(id: WorldId, width: i32, depth: i32, height: i32) -> Self {
        assert!(
            width > 0 && depth > 0 && height > 0,
            "Planet extents must be positive, got {width}x{depth}x{height}"
        );
        Self {
            id,
            width,
            depth,
            height,
        }
    }

    /// Wraps an X coordinate into `[0, width)`.
    #[inline]
    pub fn wrap_x(&self, x: i32) -> i32 {
        x.rem_euclid(self.width)
    }

    /// Wraps a Y coordinate into `[0, depth)`.
    #[inline]
    pub fn wrap_y(&self, y: i32) -> i32 {
        y.rem_euclid(self.depth)
    }

    /// Wraps X and Y of `index` into the world; Z is not wrapped.
    pub fn wrap(&self, index: ChunkIndex) -> ChunkIndex {
        ChunkIndex::new(self.wrap_x(index.x), self.wrap_y(index.y), index.z)
    }

    /// Returns `true` if `z` is a valid height layer.
    #[inline]
    pub fn contains_z(&self, z: i32) -> bool {
        (0..self.height).contains(&z)
    }

    /// Column separation of two chunk indices along X and Y, each the short
    /// way around the torus. Always non-negative.
    pub fn column_separation(&self, a: ChunkIndex, b: ChunkIndex) -> (i64, i64) {
        (
            torus_delta(a.x, b.x, self.width),
            torus_delta(a.y, b.y, self.depth),
        )
    }

    /// Squared distance between two chunk indices, taking the short way
    /// around the torus in X and Y.
    pub fn wrapped_distance_sq(&self, a: ChunkIndex, b: ChunkIndex) -> u64 {
        let dx = torus_delta(a.x, b.x, self.width);
        let dy = torus_delta(a.y, b.y, self.depth);
        let dz = i64::from(a.z) - i64::from(b.z);
        (dx * dx + dy * dy + dz * dz) as u64
    }
}

/// Shortest separation of two coordinates on a ring of `extent` cells.
fn torus_delta(a: i32, b: i32, extent: i32) -> i64 {
    let d = (i64::from(a) - i64::from(b)).rem_euclid(i64::from(extent));
    d.min(i64::from(extent) - d)
}
