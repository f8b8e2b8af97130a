//! Checkpoint directory naming
//!
//! Every checkpoint event gets one directory named
//! `<prefix>.<unix-seconds>.checkpoint/` holding one file per rank. Rank
//! 0 reads the clock once and broadcasts the value, so every rank
//! derives the identical name regardless of local clock skew.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::collective::Communicator;
use crate::error::fatal;

/// Agree on the directory for a new checkpoint and make sure it exists.
///
/// Collective: every rank of `comm` must call this together. Creation is
/// idempotent (an already-existing directory is fine); any other
/// creation failure is fatal.
pub fn checkpoint_directory<C: Communicator>(prefix: &str, comm: &C) -> PathBuf {
    let mut stamp = [0u8; 8];
    if comm.rank() == 0 {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        stamp = seconds.to_le_bytes();
    }
    comm.broadcast(&mut stamp, 0);
    let seconds = u64::from_le_bytes(stamp);
    let directory = PathBuf::from(format!("{prefix}.{seconds}.checkpoint"));
    if let Err(err) = fs::create_dir_all(&directory) {
        fatal(
            &format!("mkdir \"{}\"", directory.display()),
            &err,
        );
    }
    debug!(rank = comm.rank(), directory = %directory.display(), "checkpoint directory agreed");
    directory
}

/// The per-rank file inside a checkpoint directory: the decimal rank.
pub fn rank_file(directory: &Path, rank: usize) -> PathBuf {
    directory.join(rank.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::{LocalGroup, SingleProcess};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn all_ranks_agree_on_one_directory() {
        let scratch = TempDir::new().unwrap();
        let prefix = scratch.path().join("app").display().to_string();
        let handles: Vec<_> = LocalGroup::ranks(4)
            .into_iter()
            .map(|comm| {
                let prefix = prefix.clone();
                thread::spawn(move || {
                    // Stagger the ranks so a local-clock bug would show
                    // up as disagreeing names.
                    thread::sleep(std::time::Duration::from_millis(comm.rank() as u64 * 5));
                    checkpoint_directory(&prefix, &comm)
                })
            })
            .collect();
        let directories: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(directories.windows(2).all(|pair| pair[0] == pair[1]));
        assert!(directories[0].is_dir());
    }

    #[test]
    fn directory_name_has_prefix_and_suffix() {
        let scratch = TempDir::new().unwrap();
        let prefix = scratch.path().join("npb.bt").display().to_string();
        let directory = checkpoint_directory(&prefix, &SingleProcess);
        let name = directory.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("npb.bt."));
        assert!(name.ends_with(".checkpoint"));
        assert!(directory.is_dir());
    }

    #[test]
    fn creating_twice_is_idempotent() {
        let scratch = TempDir::new().unwrap();
        let prefix = scratch.path().join("app").display().to_string();
        let first = checkpoint_directory(&prefix, &SingleProcess);
        let second = checkpoint_directory(&prefix, &SingleProcess);
        assert!(first.is_dir());
        assert!(second.is_dir());
    }

    #[test]
    fn rank_files_are_decimal_names() {
        let directory = PathBuf::from("run.123.checkpoint");
        assert_eq!(rank_file(&directory, 0), directory.join("0"));
        assert_eq!(rank_file(&directory, 4095), directory.join("4095"));
    }
}
