//! A sliding window of chunks over a toroidal world.
//!
//! [`WindowCache`] keeps a square of chunk columns around a moving center
//! subscribed from a [`ChunkAuthority`](tessera_voxel::ChunkAuthority), with
//! every height layer of each column. Columns map onto a fixed power-of-two
//! ring of slots by the low bits of their coordinates, so moving the center
//! only evicts the columns that fall out of range.
//!
//! Recentering runs on a background worker. A newer request cancels the pass
//! in progress at its next checkpoint; the window is left partially updated
//! and the next pass picks up from there.

mod cache;
mod error;
mod plan;
mod recenter;
mod slots;
mod state;

pub use cache::WindowCache;
pub use error::WindowError;
pub use plan::RecenterPlan;
pub use recenter::RecenterCallback;
