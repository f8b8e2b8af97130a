//! Error types for checkpoint operations

use std::fmt::Display;
use std::io;
use std::process;

use thiserror::Error;

/// Recoverable checkpoint errors.
///
/// These are the only conditions reported to callers as values. Failures
/// of the file or memory subsystem while building or growing a mapped
/// store are not represented here; those terminate the process through
/// [`fatal`], since partially-built checkpoint state cannot be retried
/// in place.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("read of {requested} bytes exceeds remaining checkpoint data ({available} available)")]
    EndOfCheckpoint { requested: usize, available: usize },

    #[error("checkpoint is read-only")]
    ReadOnly,

    #[error("checkpoint is write-only")]
    WriteOnly,

    #[error("handle table full ({capacity} slots)")]
    HandleTableFull { capacity: usize },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from parsing a checkpoint configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read \"{path}\": {source}")]
    Io { path: String, source: io::Error },

    #[error("unknown interval suffix: {0:?}")]
    BadIntervalSuffix(String),

    #[error("bad checkpoint interval: {0:?}")]
    BadInterval(String),

    #[error("bad compression level: {0:?}")]
    BadCompressionLevel(String),

    #[error("bad verbose flag: {0:?}")]
    BadVerboseFlag(String),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Report a failed storage-layer operation and terminate the process.
///
/// Checkpoint files that cannot be created, grown, synced, or released
/// correctly indicate an environment or logic error; continuing would
/// risk a silently corrupt checkpoint, so the failing operation and the
/// OS-reported reason go to stderr and the process exits.
pub(crate) fn fatal(operation: &str, err: &dyn Display) -> ! {
    eprintln!("mpi-checkpoint: {operation}: {err}");
    process::exit(1);
}
