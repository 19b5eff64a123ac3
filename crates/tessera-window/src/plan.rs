//! The set of chunks a window needs, in nearest-first visiting order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashSet;
use tessera_voxel::{ChunkIndex, Planet};

/// Every chunk index inside a window, yielded nearest-first.
///
/// Built from all `(x, y)` offsets in `[-range, range]²` around the center
/// and every height layer of the planet. X and Y are wrapped into the world;
/// indices that wrap onto each other in a narrow world are yielded once.
/// Ties in distance are broken by index so the order is deterministic.
#[derive(Debug)]
pub struct RecenterPlan {
    /// Min-heap: `(wrapped distance², index)`.
    queue: BinaryHeap<Reverse<(u64, ChunkIndex)>>,
}

impl RecenterPlan {
    /// Plans the window of `range` around `center` on `planet`.
    pub fn new(planet: &Planet, center: ChunkIndex, range: u32) -> Self {
        let center = planet.wrap(center);
        let r = range as i32;
        let mut seen = FxHashSet::default();
        let mut queue = BinaryHeap::new();

        for dy in -r..=r {
            for dx in -r..=r {
                for z in 0..planet.height {
                    let index = planet.wrap(ChunkIndex::new(center.x + dx, center.y + dy, z));
                    if seen.insert(index) {
                        let dist_sq = planet.wrapped_distance_sq(index, center);
                        queue.push(Reverse((dist_sq, index)));
                    }
                }
            }
        }

        Self { queue }
    }

    /// Indices not yet visited.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` once every index has been visited.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Iterator for RecenterPlan {
    type Item = ChunkIndex;

    fn next(&mut self) -> Option<ChunkIndex> {
        self.queue.pop().map(|Reverse((_, index))| index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.queue.len(), Some(self.queue.len()))
    }
}

impl ExactSizeIterator for RecenterPlan {}
