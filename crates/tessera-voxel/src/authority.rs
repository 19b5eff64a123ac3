//! The chunk authority contract and an in-process reference-counting authority.
//!
//! The authority is the single owner of chunk lifetime. Consumers such as
//! window caches [`subscribe`](ChunkAuthority::subscribe) to a chunk to obtain
//! a shared handle and must later [`release`](ChunkAuthority::release) it with
//! the same `(world, index, writable)` triple.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::chunk_api::Chunk;
use crate::index::{ChunkIndex, Planet, WorldId};

/// Errors raised by a chunk authority.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    /// A release arrived with no matching subscription.
    #[error("chunk {index:?} in world {world:?} is not subscribed (writable: {writable})")]
    NotSubscribed {
        /// World of the release.
        world: WorldId,
        /// Index of the release.
        index: ChunkIndex,
        /// Writable flag of the release.
        writable: bool,
    },
    /// The index lies outside the world's height.
    #[error("chunk {index:?} is outside world {world:?}")]
    OutOfBounds {
        /// World of the request.
        world: WorldId,
        /// Offending index.
        index: ChunkIndex,
    },
    /// The backing store could not produce the chunk.
    #[error("chunk authority unavailable: {0}")]
    Unavailable(String),
}

/// Owner of chunk identity, lifetime, and sharing.
///
/// Every successful `subscribe` must be paired with exactly one `release`
/// carrying the same world, index, and writable flag.
pub trait ChunkAuthority: Send + Sync {
    /// Obtains the chunk at `index`, loading or creating it if necessary, and
    /// takes a reference on it.
    fn subscribe(
        &self,
        world: WorldId,
        index: ChunkIndex,
        writable: bool,
    ) -> Result<Arc<Chunk>, AuthorityError>;

    /// Drops a reference taken by [`subscribe`](Self::subscribe).
    fn release(&self, world: WorldId, index: ChunkIndex, writable: bool)
    -> Result<(), AuthorityError>;
}

/// A loaded chunk and the references held on it.
#[derive(Debug)]
struct Entry {
    chunk: Arc<Chunk>,
    readers: u32,
    writers: u32,
}

impl Entry {
    fn count_mut(&mut self, writable: bool) -> &mut u32 {
        if writable {
            &mut self.writers
        } else {
            &mut self.readers
        }
    }
}

/// In-process authority that keeps chunks in memory while referenced.
///
/// New chunks start as air. A chunk is dropped as soon as its last
/// reference is released, so its contents do not survive an unload.
#[derive(Debug, Default)]
pub struct SharedAuthority {
    entries: Mutex<FxHashMap<(WorldId, ChunkIndex), Entry>>,
    planets: Mutex<FxHashMap<WorldId, Planet>>,
    subscribes: AtomicU64,
    releases: AtomicU64,
    subscribe_delay: Option<Duration>,
}

impl SharedAuthority {
    /// Creates an authority with no loaded chunks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` inside every subscribe, standing in for disk or
    /// generation latency.
    pub fn with_subscribe_delay(mut self, delay: Duration) -> Self {
        self.subscribe_delay = Some(delay);
        self
    }

    /// Registers a planet so subscriptions outside its height are rejected.
    pub fn register_planet(&self, planet: Planet) {
        lock(&self.planets).insert(planet.id, planet);
    }

    /// Total successful subscribe calls.
    pub fn subscribe_count(&self) -> u64 {
        self.subscribes.load(Ordering::Relaxed)
    }

    /// Total successful release calls.
    pub fn release_count(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    /// Number of chunks currently held in memory.
    pub fn resident_count(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Number of chunks of `world` currently held in memory.
    pub fn resident_in(&self, world: WorldId) -> usize {
        lock(&self.entries)
            .keys()
            .filter(|(w, _)| *w == world)
            .count()
    }

    /// References held on a chunk for the given access mode.
    pub fn ref_count(&self, world: WorldId, index: ChunkIndex, writable: bool) -> u32 {
        lock(&self.entries)
            .get(&(world, index))
            .map_or(0, |e| if writable { e.writers } else { e.readers })
    }

    /// Returns `true` if the chunk is held in memory.
    pub fn is_loaded(&self, world: WorldId, index: ChunkIndex) -> bool {
        lock(&self.entries).contains_key(&(world, index))
    }
}

impl ChunkAuthority for SharedAuthority {
    fn subscribe(
        &self,
        world: WorldId,
        index: ChunkIndex,
        writable: bool,
    ) -> Result<Arc<Chunk>, AuthorityError> {
        if let Some(planet) = lock(&self.planets).get(&world)
            && !planet.contains_z(index.z)
        {
            return Err(AuthorityError::OutOfBounds { world, index });
        }

        if let Some(delay) = self.subscribe_delay {
            std::thread::sleep(delay);
        }

        let mut entries = lock(&self.entries);
        let entry = entries.entry((world, index)).or_insert_with(|| {
            tracing::trace!("loading chunk {:?} in world {:?}", index, world);
            Entry {
                chunk: Arc::new(Chunk::new(world, index)),
                readers: 0,
                writers: 0,
            }
        });
        *entry.count_mut(writable) += 1;
        self.subscribes.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::clone(&entry.chunk))
    }

    fn release(
        &self,
        world: WorldId,
        index: ChunkIndex,
        writable: bool,
    ) -> Result<(), AuthorityError> {
        let mut entries = lock(&self.entries);
        let not_subscribed = AuthorityError::NotSubscribed {
            world,
            index,
            writable,
        };
        let entry = entries
            .get_mut(&(world, index))
            .ok_or_else(|| not_subscribed.clone())?;

        let count = entry.count_mut(writable);
        if *count == 0 {
            return Err(not_subscribed);
        }
        *count -= 1;

        if entry.readers == 0 && entry.writers == 0 {
            entries.remove(&(world, index));
            tracing::trace!("unloaded chunk {:?} in world {:?}", index, world);
        }
        self.releases.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
