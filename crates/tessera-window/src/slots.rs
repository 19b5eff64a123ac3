//! Fixed 2D ring of per-height chunk slots.
//!
//! The grid is `2^exponent` slots on each side. A chunk column `(x, y)` lives
//! in the slot addressed by the low `exponent` bits of its wrapped
//! coordinates, so the same storage is reused as the window slides across
//! the world. Each slot holds one chunk per height layer.
//!
//! The grid is wider than the window, so columns that left the window can
//! stay resident until their slot is needed again. Lookups only see chunks
//! inside the window the latest pass is working toward.

use std::sync::Arc;

use tessera_voxel::{Chunk, ChunkIndex, Planet};

/// Slot storage plus the world it is currently bound to.
#[derive(Debug)]
pub(crate) struct SlotGrid {
    exponent: u32,
    mask: i32,
    world: Option<Planet>,
    /// Wrapped center and range of the current target window.
    window: Option<(ChunkIndex, u32)>,
    /// `2^exponent × 2^exponent` slots, each `height` chunks tall.
    slots: Vec<Box<[Option<Arc<Chunk>>]>>,
}

impl SlotGrid {
    /// An unbound grid. Slots have no height until a world is bound.
    pub(crate) fn new(exponent: u32) -> Self {
        let side = 1usize << exponent;
        Self {
            exponent,
            mask: (1i32 << exponent) - 1,
            world: None,
            window: None,
            slots: (0..side * side).map(|_| Box::default()).collect(),
        }
    }

    /// Slots per grid side.
    pub(crate) fn side(&self) -> usize {
        1 << self.exponent
    }

    /// The bound world, if any.
    pub(crate) fn world(&self) -> Option<Planet> {
        self.world
    }

    /// Flat slot position of a wrapped column.
    #[inline]
    pub(crate) fn slot_index(&self, x: i32, y: i32) -> usize {
        (((y & self.mask) << self.exponent) | (x & self.mask)) as usize
    }

    /// Rebinds the grid to `world`, resizing every slot to its height.
    ///
    /// The grid must be empty; the caller releases residents first.
    pub(crate) fn rebind(&mut self, world: Option<Planet>) {
        debug_assert_eq!(self.resident_count(), 0, "rebinding a populated grid");
        let height = world.map_or(0, |w| w.height as usize);
        for slot in &mut self.slots {
            *slot = vec![None; height].into_boxed_slice();
        }
        self.world = world;
        self.window = None;
    }

    /// Makes the window of `range` around `center` the one visible to
    /// lookups. Columns outside it read as absent even while still resident.
    pub(crate) fn set_window(&mut self, center: ChunkIndex, range: u32) {
        if let Some(world) = &self.world {
            self.window = Some((world.wrap(center), range));
        }
    }

    fn in_window(&self, world: &Planet, index: ChunkIndex) -> bool {
        self.window.is_some_and(|(center, range)| {
            let (dx, dy) = world.column_separation(index, center);
            dx <= i64::from(range) && dy <= i64::from(range)
        })
    }

    /// Position of `index` in the grid, or `None` if no world is bound or
    /// `index.z` is outside it. `index` is wrapped first.
    fn locate(&self, index: ChunkIndex) -> Option<(usize, usize, ChunkIndex)> {
        let world = self.world.as_ref()?;
        if !world.contains_z(index.z) {
            return None;
        }
        let wrapped = world.wrap(index);
        Some((
            self.slot_index(wrapped.x, wrapped.y),
            wrapped.z as usize,
            wrapped,
        ))
    }

    /// The resident chunk for `index`, if it lies in the current target
    /// window and the slot's own index matches exactly.
    pub(crate) fn get(&self, index: ChunkIndex) -> Option<Arc<Chunk>> {
        let (slot, z, wrapped) = self.locate(index)?;
        if !self.world.is_some_and(|world| self.in_window(&world, wrapped)) {
            return None;
        }
        self.slots[slot][z]
            .as_ref()
            .filter(|chunk| chunk.index() == wrapped)
            .cloned()
    }

    /// Removes and returns the occupant of `index`'s slot if it belongs to a
    /// different index.
    pub(crate) fn take_stale(&mut self, index: ChunkIndex) -> Option<Arc<Chunk>> {
        let (slot, z, wrapped) = self.locate(index)?;
        let cell = &mut self.slots[slot][z];
        if cell.as_ref().is_some_and(|chunk| chunk.index() != wrapped) {
            cell.take()
        } else {
            None
        }
    }

    /// Returns `true` if `index`'s slot holds nothing.
    pub(crate) fn is_vacant(&self, index: ChunkIndex) -> bool {
        self.locate(index)
            .is_some_and(|(slot, z, _)| self.slots[slot][z].is_none())
    }

    /// Stores `chunk` in the slot for its own index.
    ///
    /// Returns the previous occupant, which the caller must release, or
    /// hands `chunk` back in `Err` if it does not fit the bound world.
    pub(crate) fn store(&mut self, chunk: Arc<Chunk>) -> Result<Option<Arc<Chunk>>, Arc<Chunk>> {
        match self.locate(chunk.index()) {
            Some((slot, z, _)) => Ok(self.slots[slot][z].replace(chunk)),
            None => Err(chunk),
        }
    }

    /// Empties every slot, returning the chunks that were resident.
    pub(crate) fn drain(&mut self) -> Vec<Arc<Chunk>> {
        self.slots
            .iter_mut()
            .flat_map(|slot| slot.iter_mut())
            .filter_map(Option::take)
            .collect()
    }

    /// Number of occupied `(slot, z)` cells.
    pub(crate) fn resident_count(&self) -> usize {
        self.slots
            .iter()
            .flat_map(|slot| slot.iter())
            .filter(|cell| cell.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use tessera_voxel::WorldId;

    use super::*;

    fn planet() -> Planet {
        Planet::new(WorldId(1), 32, 32, 4)
    }

    fn chunk(x: i32, y: i32, z: i32) -> Arc<Chunk> {
        Arc::new(Chunk::new(WorldId(1), ChunkIndex::new(x, y, z)))
    }

    fn bound_grid() -> SlotGrid {
        let mut grid = SlotGrid::new(4);
        grid.rebind(Some(planet()));
        // Covers the whole 32x32 world.
        grid.set_window(ChunkIndex::new(0, 0, 0), 16);
        grid
    }

    #[test]
    fn test_slot_index_uses_low_bits() {
        let grid = SlotGrid::new(4);
        assert_eq!(grid.side(), 16);
        assert_eq!(grid.slot_index(0, 0), 0);
        assert_eq!(grid.slot_index(15, 0), 15);
        assert_eq!(grid.slot_index(0, 1), 16);
        assert_eq!(grid.slot_index(16, 16), 0);
        assert_eq!(grid.slot_index(17, 3), 3 * 16 + 1);
    }

    #[test]
    fn test_unbound_grid_has_no_chunks() {
        let grid = SlotGrid::new(3);
        assert_eq!(grid.world(), None);
        assert!(grid.get(ChunkIndex::new(0, 0, 0)).is_none());
        assert!(!grid.is_vacant(ChunkIndex::new(0, 0, 0)));
    }

    #[test]
    fn test_store_then_get() {
        let mut grid = bound_grid();
        assert!(grid.is_vacant(ChunkIndex::new(3, 4, 1)));
        assert!(matches!(grid.store(chunk(3, 4, 1)), Ok(None)));

        let got = grid.get(ChunkIndex::new(3, 4, 1)).unwrap();
        assert_eq!(got.index(), ChunkIndex::new(3, 4, 1));
        // Unwrapped query for the same column.
        assert!(grid.get(ChunkIndex::new(35, -28, 1)).is_some());
        // Same slot, other layer.
        assert!(grid.get(ChunkIndex::new(3, 4, 0)).is_none());
    }

    #[test]
    fn test_aliased_column_reads_as_absent() {
        let mut grid = bound_grid();
        grid.store(chunk(3, 4, 0)).unwrap();
        // (19, 20) shares slot bits with (3, 4) on a 16-wide grid.
        assert!(grid.get(ChunkIndex::new(19, 20, 0)).is_none());
        assert!(!grid.is_vacant(ChunkIndex::new(19, 20, 0)));
    }

    #[test]
    fn test_lookup_limited_to_window() {
        let mut grid = bound_grid();
        grid.store(chunk(3, 4, 0)).unwrap();
        grid.store(chunk(30, 4, 0)).unwrap();

        grid.set_window(ChunkIndex::new(1, 4, 0), 2);
        assert!(grid.get(ChunkIndex::new(3, 4, 0)).is_some());
        // Two columns west across the seam.
        assert!(grid.get(ChunkIndex::new(30, 4, 0)).is_none());
        grid.set_window(ChunkIndex::new(0, 4, 0), 2);
        assert!(grid.get(ChunkIndex::new(30, 4, 0)).is_some());
        assert!(grid.get(ChunkIndex::new(3, 4, 0)).is_none());
        // Still resident, just hidden.
        assert_eq!(grid.resident_count(), 2);
    }

    #[test]
    fn test_rebind_hides_window() {
        let mut grid = bound_grid();
        grid.store(chunk(0, 0, 0)).unwrap();
        grid.drain();
        grid.rebind(Some(planet()));
        grid.store(chunk(0, 0, 0)).unwrap();
        assert!(grid.get(ChunkIndex::new(0, 0, 0)).is_none());
    }

    #[test]
    fn test_take_stale_only_removes_mismatches() {
        let mut grid = bound_grid();
        grid.store(chunk(3, 4, 0)).unwrap();

        assert!(grid.take_stale(ChunkIndex::new(3, 4, 0)).is_none());
        let stale = grid.take_stale(ChunkIndex::new(19, 20, 0)).unwrap();
        assert_eq!(stale.index(), ChunkIndex::new(3, 4, 0));
        assert!(grid.is_vacant(ChunkIndex::new(19, 20, 0)));
    }

    #[test]
    fn test_store_out_of_height_is_rejected() {
        let mut grid = bound_grid();
        assert!(grid.store(chunk(0, 0, 4)).is_err());
        assert!(grid.store(chunk(0, 0, -1)).is_err());
        assert_eq!(grid.resident_count(), 0);
    }

    #[test]
    fn test_drain_empties_grid() {
        let mut grid = bound_grid();
        grid.store(chunk(0, 0, 0)).unwrap();
        grid.store(chunk(1, 0, 3)).unwrap();
        grid.store(chunk(5, 9, 2)).unwrap();
        assert_eq!(grid.resident_count(), 3);

        let drained = grid.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(grid.resident_count(), 0);
        assert!(grid.drain().is_empty());
    }

    #[test]
    fn test_rebind_resizes_height() {
        let mut grid = bound_grid();
        grid.rebind(Some(Planet::new(WorldId(2), 64, 64, 9)));
        assert!(grid.store(chunk(0, 0, 8)).is_ok());

        grid.drain();
        grid.rebind(None);
        assert_eq!(grid.world(), None);
        assert!(grid.store(chunk(0, 0, 0)).is_err());
    }
}
