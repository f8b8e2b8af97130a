//! Handle table for the secondary-language bridge
//!
//! Bindings that cannot hold a `Checkpoint` by value get a small
//! non-negative integer instead. The table is a fixed-capacity,
//! append-only arena: slots are cleared on close but never compacted or
//! reused, so a handle stays valid (or becomes null) for the life of the
//! process. The capacity ceiling is a hard limit, not a resize point;
//! handle stability across the bridge matters more than unbounded
//! capacity.

use crate::error::{CheckpointError, Result};
use crate::store::Checkpoint;

/// Slot count: a 4 KiB table of 8-byte slots, as sized in the original
/// binding layer.
pub const HANDLE_TABLE_CAPACITY: usize = 4096 / 8;

/// Opaque integer form of a checkpoint store reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub i32);

impl Handle {
    /// The null handle: resolves to no store.
    pub const NULL: Self = Self(-1);

    pub fn is_null(self) -> bool {
        self.0 < 0
    }
}

/// Fixed-capacity bidirectional mapping between handles and live stores.
#[derive(Debug, Default)]
pub struct HandleTable {
    slots: Vec<Option<Checkpoint>>,
}

impl HandleTable {
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register a store and return its handle, or
    /// [`HandleTableFull`](CheckpointError::HandleTableFull) if every
    /// slot has been handed out already.
    pub fn register(&mut self, store: Checkpoint) -> Result<Handle> {
        if self.slots.len() == HANDLE_TABLE_CAPACITY {
            return Err(CheckpointError::HandleTableFull {
                capacity: HANDLE_TABLE_CAPACITY,
            });
        }
        self.slots.push(Some(store));
        Ok(Handle(self.slots.len() as i32 - 1))
    }

    /// Bounds-checked lookup; out-of-range or cleared slots resolve to
    /// nothing, mirroring the null handle.
    pub fn resolve(&self, handle: Handle) -> Option<&Checkpoint> {
        match self.slot_index(handle) {
            Some(index) => self.slots[index].as_ref(),
            None => None,
        }
    }

    pub fn resolve_mut(&mut self, handle: Handle) -> Option<&mut Checkpoint> {
        match self.slot_index(handle) {
            Some(index) => self.slots[index].as_mut(),
            None => None,
        }
    }

    /// Remove and return the store behind a handle, clearing its slot.
    /// The slot is never reused.
    pub fn take(&mut self, handle: Handle) -> Option<Checkpoint> {
        match self.slot_index(handle) {
            Some(index) => self.slots[index].take(),
            None => None,
        }
    }

    /// Number of slots handed out so far (cleared slots included).
    pub fn registered(&self) -> usize {
        self.slots.len()
    }

    fn slot_index(&self, handle: Handle) -> Option<usize> {
        if handle.is_null() {
            return None;
        }
        let index = handle.0 as usize;
        (index < self.slots.len()).then_some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Checkpoint;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir, name: usize) -> Checkpoint {
        Checkpoint::create(&dir.path().join(name.to_string()), 0, false)
    }

    #[test]
    fn register_and_resolve_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut table = HandleTable::new();
        let handle = table.register(open_store(&dir, 0)).unwrap();
        assert_eq!(handle, Handle(0));
        assert!(table.resolve(handle).is_some());
        table.resolve_mut(handle).unwrap().write(&[1u8]).unwrap();
    }

    #[test]
    fn null_and_out_of_range_handles_resolve_to_nothing() {
        let dir = TempDir::new().unwrap();
        let mut table = HandleTable::new();
        table.register(open_store(&dir, 0)).unwrap();
        assert!(table.resolve(Handle::NULL).is_none());
        assert!(table.resolve(Handle(1)).is_none());
        assert!(table.resolve(Handle(i32::MAX)).is_none());
    }

    #[test]
    fn closed_slots_are_cleared_not_reused() {
        let dir = TempDir::new().unwrap();
        let mut table = HandleTable::new();
        let first = table.register(open_store(&dir, 0)).unwrap();
        table.take(first).unwrap().close();
        assert!(table.resolve(first).is_none());
        assert!(table.take(first).is_none());

        let second = table.register(open_store(&dir, 1)).unwrap();
        assert_eq!(second, Handle(1));
    }

    #[test]
    fn overflow_is_an_error_and_keeps_prior_registrations() {
        let dir = TempDir::new().unwrap();
        let mut table = HandleTable::new();
        for i in 0..HANDLE_TABLE_CAPACITY {
            table.register(open_store(&dir, i)).unwrap();
        }
        let err = table.register(open_store(&dir, HANDLE_TABLE_CAPACITY)).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::HandleTableFull {
                capacity: HANDLE_TABLE_CAPACITY,
            }
        ));
        assert_eq!(table.registered(), HANDLE_TABLE_CAPACITY);
        for i in 0..HANDLE_TABLE_CAPACITY {
            assert!(table.resolve(Handle(i as i32)).is_some());
        }
    }
}
