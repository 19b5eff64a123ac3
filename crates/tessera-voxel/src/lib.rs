//! Chunk collaborators for the window cache: chunk coordinates, the toroidal
//! world descriptor, palette-compressed chunk storage, and the chunk authority.

pub mod authority;
pub mod bit_packed;
pub mod chunk;
pub mod chunk_api;
pub mod index;

pub use authority::{AuthorityError, ChunkAuthority, SharedAuthority};
pub use chunk::{
    BlockId, CHUNK_SHIFT_X, CHUNK_SHIFT_Y, CHUNK_SHIFT_Z, CHUNK_SIZE, CHUNK_VOLUME, ChunkData,
};
pub use chunk_api::Chunk;
pub use index::{ChunkIndex, Planet, WorldId};
