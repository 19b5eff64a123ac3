//! Shared chunk handle with bounds-checked block and metadata access.
//!
//! A [`Chunk`] is handed out by the chunk authority as `Arc<Chunk>` and may be
//! read and written from several threads at once, so its voxel state lives
//! behind a lock. Its index and world never change after creation.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::FxHashMap;

use crate::chunk::{BlockId, CHUNK_SHIFT_X, CHUNK_SHIFT_Y, CHUNK_SIZE, ChunkData};
use crate::index::{ChunkIndex, WorldId};

/// Mutable voxel state of a chunk.
#[derive(Debug, Default)]
struct ChunkVoxels {
    blocks: ChunkData,
    /// Sparse per-block metadata keyed by linear block index; absent means 0.
    meta: FxHashMap<u16, i32>,
}

/// A chunk of blocks belonging to one world.
///
/// Local coordinates are `u8` values in `[0, 32)`. Out-of-range reads return
/// air (or 0 metadata) and out-of-range writes are ignored with a warning.
#[derive(Debug)]
pub struct Chunk {
    index: ChunkIndex,
    world: WorldId,
    voxels: RwLock<ChunkVoxels>,
}

impl Chunk {
    /// Creates an all-air chunk.
    pub fn new(world: WorldId, index: ChunkIndex) -> Self {
        Self {
            index,
            world,
            voxels: RwLock::new(ChunkVoxels::default()),
        }
    }

    /// The chunk's own index.
    pub fn index(&self) -> ChunkIndex {
        self.index
    }

    /// The world this chunk belongs to.
    pub fn world(&self) -> WorldId {
        self.world
    }

    /// Block id at local `(x, y, z)`.
    pub fn get_block(&self, x: u8, y: u8, z: u8) -> BlockId {
        if !Self::in_bounds(x, y, z) {
            tracing::warn!("Chunk::get_block out of bounds: ({}, {}, {})", x, y, z);
            return BlockId::AIR;
        }
        self.read()
            .blocks
            .get(usize::from(x), usize::from(y), usize::from(z))
    }

    /// Sets the block id at local `(x, y, z)`.
    pub fn set_block(&self, x: u8, y: u8, z: u8, block: BlockId) {
        if !Self::in_bounds(x, y, z) {
            tracing::warn!("Chunk::set_block out of bounds: ({}, {}, {})", x, y, z);
            return;
        }
        self.write()
            .blocks
            .set(usize::from(x), usize::from(y), usize::from(z), block);
    }

    /// Metadata value at local `(x, y, z)`.
    pub fn get_block_meta(&self, x: u8, y: u8, z: u8) -> i32 {
        if !Self::in_bounds(x, y, z) {
            tracing::warn!("Chunk::get_block_meta out of bounds: ({}, {}, {})", x, y, z);
            return 0;
        }
        self.read()
            .meta
            .get(&Self::meta_key(x, y, z))
            .copied()
            .unwrap_or(0)
    }

    /// Sets the metadata value at local `(x, y, z)`. Zero clears the entry.
    pub fn set_block_meta(&self, x: u8, y: u8, z: u8, value: i32) {
        if !Self::in_bounds(x, y, z) {
            tracing::warn!("Chunk::set_block_meta out of bounds: ({}, {}, {})", x, y, z);
            return;
        }
        let key = Self::meta_key(x, y, z);
        let mut voxels = self.write();
        if value == 0 {
            voxels.meta.remove(&key);
        } else {
            voxels.meta.insert(key, value);
        }
    }

    fn in_bounds(x: u8, y: u8, z: u8) -> bool {
        usize::from(x) < CHUNK_SIZE && usize::from(y) < CHUNK_SIZE && usize::from(z) < CHUNK_SIZE
    }

    fn meta_key(x: u8, y: u8, z: u8) -> u16 {
        u16::from(x) | (u16::from(y) << CHUNK_SHIFT_X) | (u16::from(z) << (CHUNK_SHIFT_X + CHUNK_SHIFT_Y))
    }

    fn read(&self) -> RwLockReadGuard<'_, ChunkVoxels> {
        self.voxels.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChunkVoxels> {
        self.voxels.write().unwrap_or_else(PoisonError::into_inner)
    }
}
