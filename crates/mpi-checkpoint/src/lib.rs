//! Per-rank checkpointing for distributed numerical applications
//!
//! Each rank of a cooperating group owns one checkpoint file, accessed
//! through a sequential cursor over a growable memory-mapped store. The
//! library coordinates when checkpoints happen (throttling, a global
//! disable switch, an external whole-process fallback) and where
//! (a timestamp-named directory agreed on by collective broadcast),
//! while the per-rank byte streams themselves stay opaque to it.
//!
//! ```no_run
//! use mpi_checkpoint::{CheckpointManager, SingleProcess};
//!
//! let comm = SingleProcess;
//! let mut manager = CheckpointManager::from_env();
//! if let Some(mut store) = manager.restore(&comm) {
//!     let mut iteration = [0u64];
//!     store.read(&mut iteration)?;
//!     store.close();
//! }
//! // ... every N iterations:
//! if let Some(mut store) = manager.create(&comm) {
//!     store.write(&[42u64])?;
//!     store.close();
//! }
//! # Ok::<(), mpi_checkpoint::CheckpointError>(())
//! ```

pub mod collective;
pub mod config;
pub mod error;
pub mod handle;
pub mod naming;
pub mod store;
pub mod throttle;

mod manager;

pub use collective::{Communicator, LocalGroup, SingleProcess};
pub use config::{CheckpointConfig, CheckpointSource};
pub use error::{CheckpointError, ConfigError, Result};
pub use handle::{Handle, HandleTable, HANDLE_TABLE_CAPACITY};
pub use manager::CheckpointManager;
pub use store::{Checkpoint, Element, INITIAL_CAPACITY};
