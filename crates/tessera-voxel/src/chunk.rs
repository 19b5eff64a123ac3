//! Palette-compressed block storage for one 32×32×32 chunk.
//!
//! Blocks are stored as indices into a per-chunk palette of distinct
//! [`BlockId`] values. The index width grows with the palette, so a
//! homogeneous chunk needs no index storage at all.

use serde::{Deserialize, Serialize};

use crate::bit_packed::PackedIndices;

/// Chunk side length as a power of two, per axis.
pub const CHUNK_SHIFT_X: u32 = 5;
/// See [`CHUNK_SHIFT_X`].
pub const CHUNK_SHIFT_Y: u32 = 5;
/// See [`CHUNK_SHIFT_X`].
pub const CHUNK_SHIFT_Z: u32 = 5;

/// Side length of a chunk in blocks.
pub const CHUNK_SIZE: usize = 1 << CHUNK_SHIFT_X;

/// Number of blocks in a chunk.
pub const CHUNK_VOLUME: usize = (1 << CHUNK_SHIFT_X) * (1 << CHUNK_SHIFT_Y) * (1 << CHUNK_SHIFT_Z);

/// Identifier of a block type. Zero is air and doubles as the "nothing
/// here" value for reads outside the loaded window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u16);

impl BlockId {
    /// Empty space.
    pub const AIR: BlockId = BlockId(0);
}

/// Palette-compressed block ids for a single chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkData {
    palette: Vec<BlockId>,
    indices: PackedIndices,
}

impl ChunkData {
    /// A chunk where every block is `fill`.
    pub fn new(fill: BlockId) -> Self {
        Self {
            palette: vec![fill],
            indices: PackedIndices::zeroed(0, CHUNK_VOLUME),
        }
    }

    /// A chunk of air.
    pub fn new_air() -> Self {
        Self::new(BlockId::AIR)
    }

    /// Returns the block at local `(x, y, z)`. Each coordinate must be below
    /// [`CHUNK_SIZE`].
    pub fn get(&self, x: usize, y: usize, z: usize) -> BlockId {
        self.palette[usize::from(self.indices.get(Self::linear(x, y, z)))]
    }

    /// Stores `block` at local `(x, y, z)`, growing the palette if needed.
    ///
    /// Before the index width grows, stale palette entries are dropped so a
    /// chunk that cycles through many block types does not keep widening.
    pub fn set(&mut self, x: usize, y: usize, z: usize, block: BlockId) {
        let entry = self.palette_entry(block);
        self.indices.set(Self::linear(x, y, z), entry);
    }

    /// Number of distinct palette entries, including unused ones.
    pub fn palette_len(&self) -> usize {
        self.palette.len()
    }

    /// Current bits per stored index.
    pub fn bit_width(&self) -> u8 {
        self.indices.width()
    }

    /// Drops palette entries no block refers to, narrowing the index width
    /// when possible. Scans the whole chunk.
    pub fn compact(&mut self) {
        if self.indices.width() == 0 {
            return;
        }

        let mut used = vec![false; self.palette.len()];
        for i in 0..CHUNK_VOLUME {
            used[usize::from(self.indices.get(i))] = true;
        }

        let mut remap = vec![0u16; self.palette.len()];
        let mut palette = Vec::new();
        for (old, block) in self.palette.iter().enumerate() {
            if used[old] {
                remap[old] = palette.len() as u16;
                palette.push(*block);
            }
        }

        let mut indices = PackedIndices::zeroed(width_for(palette.len()), CHUNK_VOLUME);
        if indices.width() != 0 {
            for i in 0..CHUNK_VOLUME {
                indices.set(i, remap[usize::from(self.indices.get(i))]);
            }
        }

        self.palette = palette;
        self.indices = indices;
    }

    /// x varies fastest.
    fn linear(x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < CHUNK_SIZE && y < CHUNK_SIZE && z < CHUNK_SIZE);
        x | (y << CHUNK_SHIFT_X) | (z << (CHUNK_SHIFT_X + CHUNK_SHIFT_Y))
    }

    /// Palette position of `block`, appending it (and widening indices) if absent.
    fn palette_entry(&mut self, block: BlockId) -> u16 {
        if let Some(pos) = self.palette.iter().position(|&b| b == block) {
            return pos as u16;
        }
        if width_for(self.palette.len() + 1) != self.indices.width() {
            self.compact();
        }
        let width = width_for(self.palette.len() + 1);
        if width != self.indices.width() {
            self.indices = self.indices.rewidth(width);
        }
        self.palette.push(block);
        (self.palette.len() - 1) as u16
    }
}

impl Default for ChunkData {
    fn default() -> Self {
        Self::new_air()
    }
}

/// Index width needed to address `entries` palette slots.
fn width_for(entries: usize) -> u8 {
    match entries {
        0 | 1 => 0,
        2..=4 => 2,
        5..=16 => 4,
        17..=256 => 8,
        _ => 16,
    }
}
