//! C ABI bridge for mpi-checkpoint
//!
//! Exposes the checkpoint lifecycle to bindings that cannot hold a
//! `Checkpoint` by value: every store is referred to by a small
//! non-negative integer handle drawn from the fixed-capacity handle
//! table, and every call returns one of the three status codes below.
//! Success and failure semantics match the native API; the only
//! additions are the handle indirection and the flat status codes.
//!
//! The bridge runs over the single-process communicator. Bridging a real
//! MPI communicator handle belongs to the out-of-scope substrate.

use std::slice;

use parking_lot::Mutex;

use mpi_checkpoint::{CheckpointManager, Handle, HandleTable, SingleProcess};

/// The operation completed and, for create/restore, produced a store.
pub const MPI_CHECKPOINT_SUCCESS: i32 = 0;
/// No checkpoint was produced or restored; skip this cycle. Not an error.
pub const MPI_CHECKPOINT_NO_CHECKPOINT: i32 = 1;
/// Recoverable failure: bad handle, exhausted handle table, read past
/// the end of the data, or a mode mismatch.
pub const MPI_CHECKPOINT_ERROR: i32 = 2;
/// The null handle value.
pub const MPI_CHECKPOINT_NULL: i32 = -1;

struct Bridge {
    manager: Option<CheckpointManager>,
    table: HandleTable,
}

impl Bridge {
    /// Initialization is lazy and idempotent: the first create/restore
    /// call configures the manager if `mpi_checkpoint_init` never ran.
    fn manager(&mut self) -> &mut CheckpointManager {
        self.manager.get_or_insert_with(CheckpointManager::from_env)
    }
}

static BRIDGE: Mutex<Bridge> = Mutex::new(Bridge {
    manager: None,
    table: HandleTable::new(),
});

/// Load configuration and environment overrides. Idempotent; invoked
/// automatically by create/restore if never called.
#[no_mangle]
pub extern "C" fn mpi_checkpoint_init() -> i32 {
    let mut bridge = BRIDGE.lock();
    bridge.manager();
    MPI_CHECKPOINT_SUCCESS
}

/// Release process-wide checkpoint state.
#[no_mangle]
pub extern "C" fn mpi_checkpoint_finalize() -> i32 {
    let mut bridge = BRIDGE.lock();
    if let Some(manager) = bridge.manager.as_mut() {
        manager.finalize();
    }
    MPI_CHECKPOINT_SUCCESS
}

/// Try to create a checkpoint; on success `*handle` names the store.
///
/// # Safety
///
/// `handle` must be a valid pointer to an `i32`.
#[no_mangle]
pub unsafe extern "C" fn mpi_checkpoint_create(handle: *mut i32) -> i32 {
    if handle.is_null() {
        return MPI_CHECKPOINT_ERROR;
    }
    *handle = MPI_CHECKPOINT_NULL;
    let mut bridge = BRIDGE.lock();
    let Some(store) = bridge.manager().create(&SingleProcess) else {
        return MPI_CHECKPOINT_NO_CHECKPOINT;
    };
    match bridge.table.register(store) {
        Ok(registered) => {
            *handle = registered.0;
            MPI_CHECKPOINT_SUCCESS
        }
        Err(_) => MPI_CHECKPOINT_ERROR,
    }
}

/// Try to restore from the configured source; on success `*handle`
/// names the store.
///
/// # Safety
///
/// `handle` must be a valid pointer to an `i32`.
#[no_mangle]
pub unsafe extern "C" fn mpi_checkpoint_restore(handle: *mut i32) -> i32 {
    if handle.is_null() {
        return MPI_CHECKPOINT_ERROR;
    }
    *handle = MPI_CHECKPOINT_NULL;
    let mut bridge = BRIDGE.lock();
    let Some(store) = bridge.manager().restore(&SingleProcess) else {
        return MPI_CHECKPOINT_NO_CHECKPOINT;
    };
    match bridge.table.register(store) {
        Ok(registered) => {
            *handle = registered.0;
            MPI_CHECKPOINT_SUCCESS
        }
        Err(_) => MPI_CHECKPOINT_ERROR,
    }
}

/// Append `count * element_size` bytes from `buf` to a write-only store.
///
/// # Safety
///
/// `buf` must be valid for reads of `count * element_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn mpi_checkpoint_write(
    handle: i32,
    buf: *const u8,
    count: u64,
    element_size: u64,
) -> i32 {
    let bytes = (count * element_size) as usize;
    if buf.is_null() && bytes != 0 {
        return MPI_CHECKPOINT_ERROR;
    }
    let mut bridge = BRIDGE.lock();
    let Some(store) = bridge.table.resolve_mut(Handle(handle)) else {
        return MPI_CHECKPOINT_ERROR;
    };
    let data: &[u8] = if bytes == 0 {
        &[]
    } else {
        slice::from_raw_parts(buf, bytes)
    };
    match store.write_bytes(data) {
        Ok(()) => MPI_CHECKPOINT_SUCCESS,
        Err(_) => MPI_CHECKPOINT_ERROR,
    }
}

/// Fill `buf` with `count * element_size` bytes from a read-only store.
/// Reading past the end of the data returns `MPI_CHECKPOINT_ERROR` and
/// copies nothing.
///
/// # Safety
///
/// `buf` must be valid for writes of `count * element_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn mpi_checkpoint_read(
    handle: i32,
    buf: *mut u8,
    count: u64,
    element_size: u64,
) -> i32 {
    let bytes = (count * element_size) as usize;
    if buf.is_null() && bytes != 0 {
        return MPI_CHECKPOINT_ERROR;
    }
    let mut bridge = BRIDGE.lock();
    let Some(store) = bridge.table.resolve_mut(Handle(handle)) else {
        return MPI_CHECKPOINT_ERROR;
    };
    let data: &mut [u8] = if bytes == 0 {
        &mut []
    } else {
        slice::from_raw_parts_mut(buf, bytes)
    };
    match store.read_bytes(data) {
        Ok(()) => MPI_CHECKPOINT_SUCCESS,
        Err(_) => MPI_CHECKPOINT_ERROR,
    }
}

/// Close the store behind `*handle` and clear the handle to null. The
/// slot is never reused.
///
/// # Safety
///
/// `handle` must be a valid pointer to an `i32`.
#[no_mangle]
pub unsafe extern "C" fn mpi_checkpoint_close(handle: *mut i32) -> i32 {
    if handle.is_null() {
        return MPI_CHECKPOINT_ERROR;
    }
    let store = {
        let mut bridge = BRIDGE.lock();
        bridge.table.take(Handle(*handle))
    };
    match store {
        Some(store) => {
            store.close();
            *handle = MPI_CHECKPOINT_NULL;
            MPI_CHECKPOINT_SUCCESS
        }
        None => MPI_CHECKPOINT_ERROR,
    }
}
