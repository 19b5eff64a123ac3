//! Background recenter passes and their cancellation.
//!
//! A single worker thread runs one pass at a time. Each request carries its
//! own cancellation flag; submitting a newer request raises the flag of every
//! older one. A running pass polls its flag at four checkpoints and stops
//! without undoing work it already committed. Requests still queued when a
//! newer one arrives are answered with `false` and never run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Receiver;
use tessera_voxel::{ChunkAuthority, ChunkIndex, Planet};

use crate::error::WindowError;
use crate::plan::RecenterPlan;
use crate::state::WindowState;

/// Name of the worker thread that runs passes and completion callbacks.
pub(crate) const WORKER_THREAD_NAME: &str = "window-recenter";

/// Completion callback for a recenter request: `true` for a full,
/// uninterrupted pass, `false` otherwise. Runs on the worker thread.
pub type RecenterCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Shared flag polled by a running pass.
#[derive(Clone, Debug, Default)]
pub(crate) struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One `set_center` call waiting for the worker.
pub(crate) struct RecenterRequest {
    pub(crate) world: Option<Planet>,
    pub(crate) center: ChunkIndex,
    pub(crate) cancel: CancelToken,
    pub(crate) on_complete: Option<RecenterCallback>,
}

impl RecenterRequest {
    /// Answers the request. Consumes it so the callback runs at most once.
    pub(crate) fn finish(self, completed: bool) {
        if let Some(callback) = self.on_complete {
            callback(completed);
        }
    }
}

/// Work done by a pass before it finished or was interrupted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PassStats {
    /// Stale chunks handed back to the authority.
    pub(crate) released: usize,
    /// Chunks newly subscribed.
    pub(crate) subscribed: usize,
}

/// Worker thread body: runs the newest queued request until the sender hangs up.
pub(crate) fn run_worker<A>(state: Arc<WindowState<A>>, requests: Receiver<RecenterRequest>)
where
    A: ChunkAuthority + ?Sized,
{
    while let Ok(mut request) = requests.recv() {
        while let Ok(newer) = requests.try_recv() {
            tracing::trace!("dropping superseded recenter to {:?}", request.center);
            complete(&state, request, false);
            request = newer;
        }

        let completed = match run_pass(&state, &request) {
            Ok((completed, stats)) => {
                tracing::debug!(
                    "recenter to {:?} {} (released {}, subscribed {})",
                    request.center,
                    if completed { "completed" } else { "cancelled" },
                    stats.released,
                    stats.subscribed
                );
                completed
            }
            Err(e) => {
                tracing::error!("recenter to {:?} failed: {}", request.center, e);
                state.record_error(e);
                false
            }
        };
        complete(&state, request, completed);
    }
    tracing::debug!("recenter worker exiting");
}

fn complete<A: ChunkAuthority + ?Sized>(
    state: &WindowState<A>,
    request: RecenterRequest,
    completed: bool,
) {
    state.in_flight.fetch_sub(1, Ordering::AcqRel);
    request.finish(completed);
}

/// Runs one recenter pass. Returns whether it ran to completion.
pub(crate) fn run_pass<A>(
    state: &WindowState<A>,
    request: &RecenterRequest,
) -> Result<(bool, PassStats), WindowError>
where
    A: ChunkAuthority + ?Sized,
{
    let mut stats = PassStats::default();

    let bound = state.grid().world();
    if bound != request.world {
        let flushed = state.flush();
        state.grid_mut().rebind(request.world);
        match request.world {
            Some(planet) => {
                tracing::info!(
                    "window bound to world {:?} ({}x{}x{})",
                    planet.id,
                    planet.width,
                    planet.depth,
                    planet.height
                );
                warn_on_slot_aliasing(&planet, state.grid().side());
            }
            None => tracing::info!("window unbound"),
        }
        stats.released += flushed?;
    }

    let Some(planet) = request.world else {
        return Ok((true, stats));
    };

    let plan = RecenterPlan::new(&planet, request.center, state.range);
    tracing::debug!(
        "recenter to {:?} visiting {} chunks",
        request.center,
        plan.len()
    );

    let cancel = &request.cancel;
    if cancel.is_cancelled() {
        return Ok((false, stats));
    }
    // Lookups follow the new target from here on, so chunks are readable as
    // soon as they land.
    state.grid_mut().set_window(request.center, state.range);

    for index in plan {
        if cancel.is_cancelled() {
            return Ok((false, stats));
        }

        let stale = state.grid_mut().take_stale(index);
        if let Some(chunk) = stale {
            tracing::trace!("evicting {:?} for {:?}", chunk.index(), index);
            state.release(&chunk)?;
            stats.released += 1;
        }

        if cancel.is_cancelled() {
            return Ok((false, stats));
        }

        if state.grid().is_vacant(index) {
            let chunk = state
                .authority
                .subscribe(planet.id, index, state.writable)?;
            if chunk.index() != index {
                // The subscription was taken out for `index`; hand it back.
                state
                    .authority
                    .release(planet.id, index, state.writable)?;
                return Err(WindowError::MismatchedChunk {
                    requested: index,
                    returned: chunk.index(),
                });
            }
            stats.subscribed += 1;
            let stored = state.grid_mut().store(chunk);
            match stored {
                Ok(None) => {}
                Ok(Some(displaced)) | Err(displaced) => state.release(&displaced)?,
            }
        }

        if cancel.is_cancelled() {
            return Ok((false, stats));
        }
    }

    Ok((true, stats))
}

/// Window columns share a slot only when a world extent is wider than the
/// grid and not a multiple of it.
fn warn_on_slot_aliasing(planet: &Planet, grid_side: usize) {
    let side = grid_side as i32;
    for (axis, extent) in [("width", planet.width), ("depth", planet.depth)] {
        if extent > side && extent % side != 0 {
            tracing::warn!(
                "world {} {} is not a multiple of the {}-slot grid; columns near the seam will alias",
                axis,
                extent,
                side
            );
        }
    }
}
