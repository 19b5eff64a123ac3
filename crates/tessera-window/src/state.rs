//! State shared between a window cache handle and its recenter worker.

use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tessera_voxel::{Chunk, ChunkAuthority};

use crate::error::WindowError;
use crate::slots::SlotGrid;

pub(crate) struct WindowState<A: ChunkAuthority + ?Sized> {
    pub(crate) authority: Arc<A>,
    pub(crate) range: u32,
    pub(crate) writable: bool,
    grid: RwLock<SlotGrid>,
    /// Requests submitted but not yet answered.
    pub(crate) in_flight: AtomicUsize,
    /// Authority failures raised on the worker, oldest first.
    errors: Mutex<Vec<WindowError>>,
}

impl<A: ChunkAuthority + ?Sized> WindowState<A> {
    pub(crate) fn new(authority: Arc<A>, grid_exponent: u32, range: u32, writable: bool) -> Self {
        Self {
            authority,
            range,
            writable,
            grid: RwLock::new(SlotGrid::new(grid_exponent)),
            in_flight: AtomicUsize::new(0),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn grid(&self) -> RwLockReadGuard<'_, SlotGrid> {
        self.grid.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn grid_mut(&self) -> RwLockWriteGuard<'_, SlotGrid> {
        self.grid.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands a resident chunk back to the authority with this cache's flag.
    pub(crate) fn release(&self, chunk: &Chunk) -> Result<(), WindowError> {
        self.authority
            .release(chunk.world(), chunk.index(), self.writable)?;
        Ok(())
    }

    /// Empties every slot and releases what was resident.
    ///
    /// Chunks leave the grid under the lock before any release, so a
    /// concurrent pass can never release the same chunk. Every chunk is
    /// released even if one release fails; the first failure is returned.
    pub(crate) fn flush(&self) -> Result<usize, WindowError> {
        let drained = self.grid_mut().drain();
        let count = drained.len();
        let mut first_error = None;
        for chunk in drained {
            if let Err(e) = self.release(&chunk) {
                tracing::error!("failed to release chunk {:?}: {}", chunk.index(), e);
                first_error.get_or_insert(e);
            }
        }
        if count > 0 {
            tracing::debug!("flushed {} chunks", count);
        }
        first_error.map_or(Ok(count), Err)
    }

    pub(crate) fn record_error(&self, error: WindowError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }

    pub(crate) fn take_errors(&self) -> Vec<WindowError> {
        std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
