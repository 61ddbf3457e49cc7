//! # StableContainer — dense entity storage with stable handles
//!
//! One container owns every instance of one entity type, packed into a dense
//! `Vec` for cache-friendly iteration. A slot table maps [`Identity`] handles
//! to the entity's current dense row, so handles stay valid while entities
//! move around during sweeps.
//!
//! ## Layout
//!
//! ```text
//! dense:  [ T, T, T, ... ]            contiguous entities, iteration order
//! ids:    [ Identity, ... ]           handle stored at each dense row
//! slots:  [ (generation, row), ... ]  Identity.index → dense row
//! free:   [ u32, ... ]                recyclable slot indices
//! ```
//!
//! ## Removal
//!
//! Removal is deferred: update logic flags entities, and the scheduler calls
//! [`sweep`](StableContainer::sweep) at a single designated point per tick.
//! The sweep compacts with swap-and-pop, so the relative order of survivors is
//! unspecified afterwards. Freed slots get their generation bumped, which is
//! what invalidates outstanding handles.

use std::cell::Cell;

use crate::entity::{Entity, Identity};
use crate::error::InvalidIdentity;

struct Slot {
    generation: u32,
    /// Dense row currently occupied, or `FREE`.
    row: u32,
}

const FREE: u32 = u32::MAX;

/// Densely-packed storage for one entity type with stable identities.
pub struct StableContainer<T> {
    dense: Vec<T>,
    /// Parallel to `dense`: the identity living at each row.
    ids: Vec<Identity>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Set while a traversal is running; guards against reentrant mutation in
    /// debug builds. Mutating during traversal is a documented precondition
    /// violation, not a checked runtime error.
    traversing: Cell<bool>,
}

impl<T: Entity> StableContainer<T> {
    pub fn new() -> Self {
        Self {
            dense: Vec::new(),
            ids: Vec::new(),
            slots: Vec::new(),
            free: Vec::new(),
            traversing: Cell::new(false),
        }
    }

    /// Append an entity and return a fresh identity for it.
    ///
    /// Amortized O(1). The returned identity is never shared with another
    /// live entity; a recycled slot index comes back with a higher generation.
    pub fn create(&mut self, value: T) -> Identity {
        debug_assert!(
            !self.traversing.get(),
            "create() called during a live traversal"
        );
        let row = self.dense.len() as u32;
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.row = row;
                Identity::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot { generation: 0, row });
                Identity::new(index, 0)
            }
        };
        self.dense.push(value);
        self.ids.push(id);
        id
    }

    /// Resolve an identity to the entity it denotes.
    ///
    /// O(1). Fails with [`InvalidIdentity`] if the entity was removed by a
    /// sweep or the handle was never issued here.
    pub fn get(&self, id: Identity) -> Result<&T, InvalidIdentity> {
        let row = self.resolve(id)?;
        Ok(&self.dense[row])
    }

    /// Mutable variant of [`get`](StableContainer::get).
    pub fn get_mut(&mut self, id: Identity) -> Result<&mut T, InvalidIdentity> {
        let row = self.resolve(id)?;
        Ok(&mut self.dense[row])
    }

    /// Whether the identity currently resolves to a live entity.
    pub fn contains(&self, id: Identity) -> bool {
        self.resolve(id).is_ok()
    }

    fn resolve(&self, id: Identity) -> Result<usize, InvalidIdentity> {
        let slot = self
            .slots
            .get(id.index() as usize)
            .ok_or(InvalidIdentity(id))?;
        if slot.generation != id.generation() || slot.row == FREE {
            return Err(InvalidIdentity(id));
        }
        Ok(slot.row as usize)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Sequential traversal over all live entities in current storage order.
    ///
    /// The callback may mutate entity state but must not create or remove
    /// entities; doing so is a precondition violation (asserted in debug
    /// builds only).
    pub fn for_each(&mut self, mut f: impl FnMut(&mut T)) {
        // Clear the flag even if the callback unwinds.
        struct ClearOnExit<'a>(&'a Cell<bool>);
        impl Drop for ClearOnExit<'_> {
            fn drop(&mut self) {
                self.0.set(false);
            }
        }

        self.traversing.set(true);
        let _guard = ClearOnExit(&self.traversing);
        for entity in &mut self.dense {
            f(entity);
        }
    }

    /// Iterate live entities in current storage order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.dense.iter()
    }

    /// Mutably iterate live entities in current storage order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.dense.iter_mut()
    }

    /// Iterate `(identity, entity)` pairs in current storage order.
    pub fn entries(&self) -> impl Iterator<Item = (Identity, &T)> {
        self.ids.iter().copied().zip(self.dense.iter())
    }

    /// Remove every entity for which the predicate holds, compacting storage.
    ///
    /// Swap-and-pop: O(1) per removal, O(n) total. Identities of removed
    /// entities become invalid; the relative order of survivors is
    /// unspecified afterwards. Returns the number of entities removed.
    pub fn sweep(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        debug_assert!(
            !self.traversing.get(),
            "sweep() called during a live traversal"
        );
        let mut removed = 0;
        let mut row = 0;
        while row < self.dense.len() {
            if predicate(&self.dense[row]) {
                let id = self.ids[row];
                let slot = &mut self.slots[id.index() as usize];
                slot.row = FREE;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index());

                self.dense.swap_remove(row);
                self.ids.swap_remove(row);
                // The entity swapped into `row` moved; point its slot here.
                if row < self.dense.len() {
                    let moved = self.ids[row];
                    self.slots[moved.index() as usize].row = row as u32;
                }
                removed += 1;
            } else {
                row += 1;
            }
        }
        removed
    }

    /// Remove every entity whose removal flag is set.
    ///
    /// This is the sweep the scheduler runs once per tick, after the update
    /// phase and before the render phase.
    pub fn sweep_flagged(&mut self) -> usize {
        self.sweep(Entity::removal_requested)
    }

    /// Dense backing storage, in current storage order.
    pub fn as_slice(&self) -> &[T] {
        &self.dense
    }

    /// Mutable dense backing storage, in current storage order.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.dense
    }

    /// Raw view of the dense storage for index-addressed parallel access.
    ///
    /// Row indices are only meaningful for the duration of the current tick
    /// phase: no `create` or `sweep` may run while a raw slice is outstanding.
    pub fn raw_slice(&mut self) -> RawSlice<T> {
        RawSlice {
            ptr: self.dense.as_mut_ptr(),
            len: self.dense.len(),
        }
    }
}

impl<T: Entity> Default for StableContainer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pointer-and-length view of a container's dense storage.
///
/// Exists so the thread pool can hand disjoint index ranges of one container
/// to different workers. Copyable and sendable; all safety rests on range
/// disjointness, which the pool's partitioning provides.
pub struct RawSlice<T> {
    ptr: *mut T,
    len: usize,
}

impl<T> Clone for RawSlice<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RawSlice<T> {}

// Workers on other threads mutate disjoint ranges of the underlying storage.
unsafe impl<T: Send> Send for RawSlice<T> {}
unsafe impl<T: Send> Sync for RawSlice<T> {}

impl<T> RawSlice<T> {
    /// Number of rows in the view.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reborrow the sub-range `[start, end)` as a mutable slice.
    ///
    /// # Safety
    ///
    /// - `start <= end <= len()`.
    /// - No other live borrow (raw or otherwise) may overlap `[start, end)`.
    ///   Range-partitioned dispatch satisfies this because ranges are
    ///   pairwise disjoint.
    /// - The container must not be mutated structurally (`create`, `sweep`)
    ///   while the returned slice is alive.
    pub unsafe fn range_mut<'a>(&self, start: usize, end: usize) -> &'a mut [T] {
        debug_assert!(start <= end && end <= self.len);
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(start), end - start) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Particle {
        value: u32,
        remove: bool,
    }

    impl Particle {
        fn new(value: u32) -> Self {
            Self {
                value,
                remove: false,
            }
        }
    }

    impl Entity for Particle {
        fn removal_requested(&self) -> bool {
            self.remove
        }
        fn request_removal(&mut self) {
            self.remove = true;
        }
    }

    #[test]
    fn create_and_get() {
        let mut c = StableContainer::new();
        let a = c.create(Particle::new(1));
        let b = c.create(Particle::new(2));
        assert_eq!(c.len(), 2);
        assert_eq!(c.get(a).unwrap().value, 1);
        assert_eq!(c.get(b).unwrap().value, 2);
        c.get_mut(a).unwrap().value = 10;
        assert_eq!(c.get(a).unwrap().value, 10);
    }

    #[test]
    fn get_fails_after_sweep() {
        let mut c = StableContainer::new();
        let a = c.create(Particle::new(1));
        let b = c.create(Particle::new(2));
        c.get_mut(a).unwrap().request_removal();
        let removed = c.sweep_flagged();
        assert_eq!(removed, 1);
        assert_eq!(c.get(a), Err(InvalidIdentity(a)));
        assert!(!c.contains(a));
        assert_eq!(c.get(b).unwrap().value, 2);
    }

    #[test]
    fn sweep_completeness() {
        let mut c = StableContainer::new();
        for i in 0..20 {
            c.create(Particle::new(i));
        }
        let removed = c.sweep(|p| p.value % 3 == 0);
        assert_eq!(removed, 7); // 0, 3, 6, 9, 12, 15, 18
        assert_eq!(c.len(), 13);
        assert!(c.iter().all(|p| p.value % 3 != 0));
    }

    #[test]
    fn surviving_entities_keep_valid_identities() {
        let mut c = StableContainer::new();
        let ids: Vec<_> = (0..10).map(|i| c.create(Particle::new(i))).collect();
        c.sweep(|p| p.value < 5);
        for (i, id) in ids.iter().enumerate() {
            if i < 5 {
                assert!(!c.contains(*id));
            } else {
                assert_eq!(c.get(*id).unwrap().value, i as u32);
            }
        }
    }

    #[test]
    fn recycled_slot_gets_new_generation() {
        let mut c = StableContainer::new();
        let a = c.create(Particle::new(1));
        c.get_mut(a).unwrap().request_removal();
        c.sweep_flagged();

        let b = c.create(Particle::new(2));
        // The slot index is recycled, but the stale handle must not resolve.
        assert_eq!(b.index(), a.index());
        assert_ne!(b.generation(), a.generation());
        assert_eq!(c.get(a), Err(InvalidIdentity(a)));
        assert_eq!(c.get(b).unwrap().value, 2);
    }

    #[test]
    fn foreign_identity_does_not_resolve() {
        let mut c = StableContainer::new();
        c.create(Particle::new(1));
        let foreign = Identity::new(99, 0);
        assert_eq!(c.get(foreign), Err(InvalidIdentity(foreign)));
    }

    #[test]
    fn for_each_visits_all() {
        let mut c = StableContainer::new();
        for i in 0..5 {
            c.create(Particle::new(i));
        }
        let mut sum = 0;
        c.for_each(|p| sum += p.value);
        assert_eq!(sum, 10);
    }

    #[test]
    fn traversal_flag_clears_when_the_callback_unwinds() {
        let mut c = StableContainer::new();
        c.create(Particle::new(1));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            c.for_each(|_| panic!("callback failed"));
        }));
        assert!(result.is_err());

        // The container must accept mutation again after the unwind.
        c.create(Particle::new(2));
        assert_eq!(c.len(), 2);
        assert_eq!(c.sweep(|p| p.value == 1), 1);
    }

    #[test]
    fn entries_pair_identities_with_entities() {
        let mut c = StableContainer::new();
        let a = c.create(Particle::new(7));
        let (id, p) = c.entries().next().unwrap();
        assert_eq!(id, a);
        assert_eq!(p.value, 7);
    }

    #[test]
    fn raw_slice_spans_dense_storage() {
        let mut c = StableContainer::new();
        for i in 0..8 {
            c.create(Particle::new(i));
        }
        let raw = c.raw_slice();
        assert_eq!(raw.len(), 8);
        let chunk = unsafe { raw.range_mut(2, 5) };
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk[0].value, 2);
        chunk[0].value = 100;
        assert_eq!(c.as_slice()[2].value, 100);
    }
}
