//! The window cache: a sliding, wrapping window of chunks around a center.
//!
//! [`WindowCache`] keeps every chunk within `range` columns of its center
//! (all height layers) subscribed from a [`ChunkAuthority`]. Moving the center
//! is asynchronous: [`WindowCache::set_center`] hands the request to a
//! background worker and returns at once. Lookups see the window most
//! recently targeted by a pass and treat anything missing or stale as absent.
//! Chunks become readable as the pass loads them.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, bounded, unbounded};
use tessera_config::WindowConfig;
use tessera_voxel::{
    BlockId, CHUNK_SHIFT_X, CHUNK_SHIFT_Y, CHUNK_SHIFT_Z, Chunk, ChunkAuthority, ChunkIndex,
    Planet,
};

use crate::error::WindowError;
use crate::recenter::{
    CancelToken, RecenterCallback, RecenterRequest, WORKER_THREAD_NAME, run_worker,
};
use crate::state::WindowState;

/// A fixed-capacity window of chunks that follows a moving center on a
/// toroidal world.
///
/// Chunks are stored in a `2^grid_exponent × 2^grid_exponent` ring of slots,
/// each one chunk per height layer. The cache starts unbound; the first
/// [`set_center`](Self::set_center) binds it to a world.
///
/// Accessors are not synchronized with recenter passes beyond brief slot
/// locks: while a pass runs, chunks of its target window that are not loaded
/// yet read as absent.
pub struct WindowCache<A: ChunkAuthority + ?Sized + 'static> {
    state: Arc<WindowState<A>>,
    grid_exponent: u32,
    requests: Option<Sender<RecenterRequest>>,
    /// Token of the newest submitted request.
    latest: Mutex<CancelToken>,
    worker: Option<JoinHandle<()>>,
}

impl<A: ChunkAuthority + ?Sized + 'static> WindowCache<A> {
    /// Creates an unbound cache.
    ///
    /// Fails if `2 * range + 1` columns do not fit in a grid of
    /// `2^grid_exponent` slots per side.
    pub fn new(
        authority: Arc<A>,
        grid_exponent: u32,
        range: u32,
        writable: bool,
    ) -> Result<Self, WindowError> {
        let grid_size = WindowConfig {
            grid_exponent,
            range,
            writable,
        }
        .validate()?;

        let state = Arc::new(WindowState::new(authority, grid_exponent, range, writable));
        let (sender, receiver) = unbounded::<RecenterRequest>();
        let worker_state = Arc::clone(&state);
        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || run_worker(worker_state, receiver))
            .expect("Failed to spawn window recenter worker thread");

        tracing::debug!(
            "window cache created: {0}x{0} slots, range {1}, writable {2}",
            grid_size,
            range,
            writable
        );

        Ok(Self {
            state,
            grid_exponent,
            requests: Some(sender),
            latest: Mutex::new(CancelToken::default()),
            worker: Some(worker),
        })
    }

    /// Creates an unbound cache shaped by `config`.
    pub fn from_config(authority: Arc<A>, config: &WindowConfig) -> Result<Self, WindowError> {
        Self::new(
            authority,
            config.grid_exponent,
            config.range,
            config.writable,
        )
    }

    /// Moves the window to `center` in `world`, or empties and unbinds it
    /// when `world` is `None`.
    ///
    /// Never blocks. Any pass already running is told to stop at its next
    /// checkpoint; this request runs after it exits, unless an even newer
    /// request arrives first. `on_complete` runs exactly once on the worker
    /// thread with `true` only if this request's pass ran to completion.
    pub fn set_center(
        &self,
        world: Option<Planet>,
        center: ChunkIndex,
        on_complete: Option<RecenterCallback>,
    ) {
        let request = RecenterRequest {
            world,
            center,
            cancel: CancelToken::default(),
            on_complete,
        };

        let mut latest = self
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        latest.cancel();
        *latest = request.cancel.clone();

        self.state.in_flight.fetch_add(1, Ordering::AcqRel);
        let sent = match &self.requests {
            Some(sender) => sender.send(request).map_err(|e| e.into_inner()),
            None => Err(request),
        };
        if let Err(request) = sent {
            tracing::error!("recenter worker is gone; dropping request to {:?}", center);
            self.state.in_flight.fetch_sub(1, Ordering::AcqRel);
            request.finish(false);
        }
    }

    /// Like [`set_center`](Self::set_center), but waits for the outcome.
    ///
    /// Must not be called from a completion callback: the worker would wait
    /// on itself. On the worker thread this logs an error and returns `false`
    /// without submitting anything.
    pub fn set_center_blocking(&self, world: Option<Planet>, center: ChunkIndex) -> bool {
        if std::thread::current().name() == Some(WORKER_THREAD_NAME) {
            tracing::error!(
                "set_center_blocking to {:?} called on the recenter worker; refusing to wait",
                center
            );
            return false;
        }
        let (done, outcome) = bounded(1);
        self.set_center(
            world,
            center,
            Some(Box::new(move |completed| {
                let _ = done.send(completed);
            })),
        );
        outcome.recv().unwrap_or(false)
    }

    /// The resident chunk at chunk coordinate `(x, y, z)`.
    ///
    /// `x` and `y` are wrapped into the bound world. Returns `None` when no
    /// world is bound, `z` is outside the world, the column is outside the
    /// window most recently targeted by a pass, or the slot is empty or holds
    /// a different chunk.
    pub fn get_chunk(&self, x: i32, y: i32, z: i32) -> Option<Arc<Chunk>> {
        self.get_chunk_at(ChunkIndex::new(x, y, z))
    }

    /// [`get_chunk`](Self::get_chunk) taking a [`ChunkIndex`].
    pub fn get_chunk_at(&self, index: ChunkIndex) -> Option<Arc<Chunk>> {
        self.state.grid().get(index)
    }

    /// Block id at block coordinate `(x, y, z)`, or air if its chunk is not
    /// resident.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockId {
        let (index, lx, ly, lz) = split_block(x, y, z);
        self.get_chunk_at(index)
            .map_or(BlockId::AIR, |chunk| chunk.get_block(lx, ly, lz))
    }

    /// Sets the block at `(x, y, z)`. Does nothing if its chunk is not resident.
    pub fn set_block(&self, x: i32, y: i32, z: i32, block: BlockId) {
        let (index, lx, ly, lz) = split_block(x, y, z);
        if let Some(chunk) = self.get_chunk_at(index) {
            chunk.set_block(lx, ly, lz, block);
        }
    }

    /// Metadata at block coordinate `(x, y, z)`, or 0 if its chunk is not resident.
    pub fn get_block_meta(&self, x: i32, y: i32, z: i32) -> i32 {
        let (index, lx, ly, lz) = split_block(x, y, z);
        self.get_chunk_at(index)
            .map_or(0, |chunk| chunk.get_block_meta(lx, ly, lz))
    }

    /// Sets metadata at `(x, y, z)`. Does nothing if its chunk is not resident.
    pub fn set_block_meta(&self, x: i32, y: i32, z: i32, value: i32) {
        let (index, lx, ly, lz) = split_block(x, y, z);
        if let Some(chunk) = self.get_chunk_at(index) {
            chunk.set_block_meta(lx, ly, lz, value);
        }
    }

    /// Releases every resident chunk and empties all slots. The world stays
    /// bound. Safe to call repeatedly.
    pub fn flush(&self) -> Result<(), WindowError> {
        self.state.flush().map(drop)
    }

    /// Slot grid side as a power of two.
    pub fn grid_exponent(&self) -> u32 {
        self.grid_exponent
    }

    /// Columns kept on each side of the center.
    pub fn range(&self) -> u32 {
        self.state.range
    }

    /// Whether chunks are subscribed for writing.
    pub fn writable(&self) -> bool {
        self.state.writable
    }

    /// The world the slots are currently bound to.
    pub fn bound_world(&self) -> Option<Planet> {
        self.state.grid().world()
    }

    /// Number of chunks currently held, including ones outside the window
    /// whose slots have not been reused yet.
    pub fn resident_count(&self) -> usize {
        self.state.grid().resident_count()
    }

    /// Returns `true` while any recenter request is queued or running.
    pub fn is_busy(&self) -> bool {
        self.state.in_flight.load(Ordering::Acquire) > 0
    }

    /// Authority failures raised by background passes since the last call.
    pub fn drain_errors(&self) -> Vec<WindowError> {
        self.state.take_errors()
    }
}

impl<A: ChunkAuthority + ?Sized + 'static> Drop for WindowCache<A> {
    fn drop(&mut self) {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        // Closing the channel lets the worker drain what is queued and exit.
        self.requests.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("window recenter worker panicked");
        }
        if let Err(e) = self.state.flush() {
            tracing::error!("failed to flush window cache on drop: {}", e);
        }
    }
}

/// Splits a block coordinate into its chunk index and local coordinate.
fn split_block(x: i32, y: i32, z: i32) -> (ChunkIndex, u8, u8, u8) {
    let index = ChunkIndex::new(x >> CHUNK_SHIFT_X, y >> CHUNK_SHIFT_Y, z >> CHUNK_SHIFT_Z);
    (
        index,
        local(x, CHUNK_SHIFT_X),
        local(y, CHUNK_SHIFT_Y),
        local(z, CHUNK_SHIFT_Z),
    )
}

#[inline]
fn local(coord: i32, shift: u32) -> u8 {
    (coord & ((1 << shift) - 1)) as u8
}

#[cfg(test)]
mod tests {
    use tessera_config::{MAX_GRID_EXPONENT, WindowFitError};
    use tessera_voxel::{SharedAuthority, WorldId};

    use super::*;

    fn planet() -> Planet {
        Planet::new(WorldId(1), 32, 32, 8)
    }

    fn cache(range: u32) -> (Arc<SharedAuthority>, WindowCache<SharedAuthority>) {
        let authority = Arc::new(SharedAuthority::new());
        let cache = WindowCache::new(Arc::clone(&authority), 4, range, false).unwrap();
        (authority, cache)
    }

    #[test]
    fn test_construction_fit_boundary() {
        let authority = Arc::new(SharedAuthority::new());
        // 2 * 7 + 1 = 15 <= 16
        assert!(WindowCache::new(Arc::clone(&authority), 4, 7, false).is_ok());
        // 2 * 8 + 1 = 17 > 16
        assert_eq!(
            WindowCache::new(Arc::clone(&authority), 4, 8, false).err(),
            Some(WindowError::InvalidWindow(WindowFitError::WindowTooLarge {
                range: 8,
                needed: 17,
                grid_size: 16,
            }))
        );
        // A 1x1 grid holds only a range-0 window.
        assert!(WindowCache::new(Arc::clone(&authority), 0, 0, true).is_ok());
        assert!(WindowCache::new(Arc::clone(&authority), 0, 1, true).is_err());
    }

    #[test]
    fn test_oversized_grid_is_rejected() {
        let authority = Arc::new(SharedAuthority::new());
        assert!(matches!(
            WindowCache::new(authority, MAX_GRID_EXPONENT + 1, 1, false),
            Err(WindowError::InvalidWindow(WindowFitError::GridTooLarge { .. }))
        ));
    }

    #[test]
    fn test_from_config() {
        let authority = Arc::new(SharedAuthority::new());
        let config = WindowConfig {
            grid_exponent: 3,
            range: 3,
            writable: true,
        };
        let cache = WindowCache::from_config(authority, &config).unwrap();
        assert_eq!(cache.grid_exponent(), 3);
        assert_eq!(cache.range(), 3);
        assert!(cache.writable());
    }

    #[test]
    fn test_unbound_cache_reads_absent() {
        let (_authority, cache) = cache(2);
        assert_eq!(cache.bound_world(), None);
        assert!(cache.get_chunk(0, 0, 0).is_none());
        assert_eq!(cache.get_block(1, 2, 3), BlockId::AIR);
        assert_eq!(cache.get_block_meta(1, 2, 3), 0);
        cache.set_block(1, 2, 3, BlockId(4));
        assert!(cache.flush().is_ok());
    }

    #[test]
    fn test_scenario_window_around_ten_ten() {
        let (_authority, cache) = cache(2);
        assert!(cache.set_center_blocking(Some(planet()), ChunkIndex::new(10, 10, 0)));

        let chunk = cache.get_chunk(10, 10, 0).unwrap();
        assert_eq!(chunk.index(), ChunkIndex::new(10, 10, 0));
        assert!(cache.get_chunk(20, 20, 0).is_none());
        assert_eq!(cache.resident_count(), 5 * 5 * 8);
        assert_eq!(cache.bound_world(), Some(planet()));
    }

    #[test]
    fn test_out_of_height_is_absent() {
        let (_authority, cache) = cache(1);
        assert!(cache.set_center_blocking(Some(planet()), ChunkIndex::new(0, 0, 0)));
        assert!(cache.get_chunk(0, 0, 7).is_some());
        assert!(cache.get_chunk(0, 0, 8).is_none());
        assert!(cache.get_chunk(0, 0, -1).is_none());
    }

    #[test]
    fn test_block_roundtrip_in_window() {
        let (_authority, cache) = cache(1);
        assert!(cache.set_center_blocking(Some(planet()), ChunkIndex::new(0, 0, 0)));

        // Chunk (1, 0, 2), local (3, 31, 0).
        cache.set_block(35, 31, 64, BlockId(12));
        assert_eq!(cache.get_block(35, 31, 64), BlockId(12));
        let chunk = cache.get_chunk(1, 0, 2).unwrap();
        assert_eq!(chunk.get_block(3, 31, 0), BlockId(12));

        cache.set_block_meta(35, 31, 64, 77);
        assert_eq!(cache.get_block_meta(35, 31, 64), 77);
    }

    #[test]
    fn test_negative_block_coordinates_wrap() {
        let (_authority, cache) = cache(1);
        assert!(cache.set_center_blocking(Some(planet()), ChunkIndex::new(0, 0, 0)));

        // Block x = -1 lives in chunk -1, which wraps to chunk 31, local 31.
        cache.set_block(-1, 0, 0, BlockId(9));
        assert_eq!(cache.get_block(-1, 0, 0), BlockId(9));
        assert_eq!(cache.get_block(31 * 32 + 31, 0, 0), BlockId(9));
        assert_eq!(cache.get_chunk(31, 0, 0).unwrap().get_block(31, 0, 0), BlockId(9));
    }

    #[test]
    fn test_block_outside_window_is_noop() {
        let (authority, cache) = cache(1);
        assert!(cache.set_center_blocking(Some(planet()), ChunkIndex::new(0, 0, 0)));
        let subscribed = authority.subscribe_count();

        // Chunk (10, 10, 0) is outside the window.
        cache.set_block(320, 320, 0, BlockId(5));
        cache.set_block_meta(320, 320, 0, 5);
        assert_eq!(cache.get_block(320, 320, 0), BlockId::AIR);
        assert_eq!(cache.get_block_meta(320, 320, 0), 0);
        assert!(!authority.is_loaded(WorldId(1), ChunkIndex::new(10, 10, 0)));
        assert_eq!(authority.subscribe_count(), subscribed);
    }

    #[test]
    fn test_flush_releases_everything() {
        let (authority, cache) = cache(2);
        assert!(cache.set_center_blocking(Some(planet()), ChunkIndex::new(4, 4, 0)));
        assert!(authority.subscribe_count() > 0);

        cache.flush().unwrap();
        assert_eq!(cache.resident_count(), 0);
        assert!(cache.get_chunk(4, 4, 0).is_none());
        assert_eq!(authority.release_count(), authority.subscribe_count());
        assert_eq!(authority.resident_count(), 0);

        // Idempotent.
        cache.flush().unwrap();
        assert_eq!(authority.release_count(), authority.subscribe_count());
        assert_eq!(cache.bound_world(), Some(planet()));
    }

    #[test]
    fn test_unbinding_empties_window() {
        let (authority, cache) = cache(1);
        assert!(cache.set_center_blocking(Some(planet()), ChunkIndex::new(0, 0, 0)));
        assert!(cache.set_center_blocking(None, ChunkIndex::new(0, 0, 0)));
        assert_eq!(cache.bound_world(), None);
        assert_eq!(cache.resident_count(), 0);
        assert_eq!(authority.resident_count(), 0);
    }

    #[test]
    fn test_drop_releases_everything() {
        let (authority, cache) = cache(2);
        assert!(cache.set_center_blocking(Some(planet()), ChunkIndex::new(4, 4, 0)));
        drop(cache);
        assert_eq!(authority.resident_count(), 0);
        assert_eq!(authority.release_count(), authority.subscribe_count());
    }

    #[test]
    fn test_writable_flag_is_used_for_subscriptions() {
        let authority = Arc::new(SharedAuthority::new());
        let cache = WindowCache::new(Arc::clone(&authority), 2, 0, true).unwrap();
        assert!(cache.set_center_blocking(Some(planet()), ChunkIndex::new(3, 3, 0)));
        assert_eq!(authority.ref_count(WorldId(1), ChunkIndex::new(3, 3, 0), true), 1);
        assert_eq!(authority.ref_count(WorldId(1), ChunkIndex::new(3, 3, 0), false), 0);

        cache.flush().unwrap();
        assert!(cache.drain_errors().is_empty());
        assert_eq!(authority.resident_count(), 0);
    }

    #[test]
    fn test_works_with_trait_object_authority() {
        let authority: Arc<dyn ChunkAuthority> = Arc::new(SharedAuthority::new());
        let cache = WindowCache::new(authority, 3, 1, false).unwrap();
        assert!(cache.set_center_blocking(Some(planet()), ChunkIndex::new(0, 0, 0)));
        assert!(cache.get_chunk(31, 31, 0).is_some());
    }

    #[test]
    fn test_blocking_recenter_from_callback_refuses() {
        let authority = Arc::new(SharedAuthority::new());
        let cache = Arc::new(WindowCache::new(authority, 3, 1, false).unwrap());
        let (sender, outcome) = bounded(1);
        let inner = Arc::clone(&cache);
        cache.set_center(
            Some(planet()),
            ChunkIndex::new(0, 0, 0),
            Some(Box::new(move |_| {
                let nested = inner.set_center_blocking(Some(planet()), ChunkIndex::new(5, 5, 0));
                let _ = sender.send(nested);
            })),
        );

        let nested = outcome
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("callback never ran");
        assert!(!nested);
        // Nothing was submitted from the callback.
        assert!(cache.set_center_blocking(Some(planet()), ChunkIndex::new(0, 0, 0)));
        assert!(cache.get_chunk(0, 0, 0).is_some());
        assert!(cache.get_chunk(5, 5, 0).is_none());
    }

    #[test]
    fn test_split_block_handles_negatives() {
        assert_eq!(split_block(0, 0, 0), (ChunkIndex::new(0, 0, 0), 0, 0, 0));
        assert_eq!(split_block(33, 64, 95), (ChunkIndex::new(1, 2, 2), 1, 0, 31));
        assert_eq!(split_block(-1, -32, -33), (ChunkIndex::new(-1, -1, -2), 31, 0, 31));
    }
}
