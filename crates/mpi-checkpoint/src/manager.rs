//! Checkpoint lifecycle
//!
//! One [`CheckpointManager`] per process carries the policy loaded at
//! initialization (prefix, throttling, verbosity, backend) and
//! orchestrates each checkpoint cycle: veto by throttle or disable flag,
//! delegate to the external whole-process tool, or open a mapped store
//! against the collectively agreed directory.

use std::process::Command;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::collective::Communicator;
use crate::config::{CheckpointConfig, CheckpointSource};
use crate::error::fatal;
use crate::naming;
use crate::store::Checkpoint;
use crate::throttle::Throttle;

/// Process-wide checkpoint state: configuration plus the throttling
/// clock. Initialize once, reuse across every checkpoint cycle.
#[derive(Debug)]
pub struct CheckpointManager {
    config: CheckpointConfig,
    throttle: Throttle,
}

impl CheckpointManager {
    pub fn new(config: CheckpointConfig) -> Self {
        let throttle = Throttle::new(config.min_interval_secs);
        Self { config, throttle }
    }

    /// Initialize from the configuration file and environment overrides.
    ///
    /// An unreadable or malformed configuration file is fatal: running a
    /// long job with a silently wrong checkpoint policy is worse than
    /// not starting it.
    pub fn from_env() -> Self {
        match CheckpointConfig::from_env() {
            Ok(config) => Self::new(config),
            Err(err) => fatal("checkpoint configuration", &err),
        }
    }

    /// Try to create a checkpoint for this cycle.
    ///
    /// Collective over `comm`. Returns `None` ("no checkpoint produced")
    /// when checkpointing is disabled, when the minimum interval since
    /// the last permitted creation has not elapsed, or when the external
    /// whole-process tool handled the checkpoint out-of-band; the caller
    /// skips its write path for this cycle. Otherwise returns the
    /// write-only store for this rank's file.
    pub fn create<C: Communicator>(&mut self, comm: &C) -> Option<Checkpoint> {
        if self.config.disabled {
            debug!("checkpointing disabled, skipping create");
            return None;
        }
        if !self.throttle.try_acquire(unix_now()) {
            debug!("checkpoint throttled, skipping create");
            return None;
        }
        if self.config.source == CheckpointSource::Dmtcp {
            self.dmtcp_checkpoint(comm);
            return None;
        }
        let directory = naming::checkpoint_directory(&self.config.prefix, comm);
        let path = naming::rank_file(&directory, comm.rank());
        Some(Checkpoint::create(&path, comm.rank(), self.config.verbose))
    }

    /// Try to restore from the configured checkpoint source.
    ///
    /// Returns `None` when checkpointing is disabled, when no restore
    /// source is configured, or when the source is the external tool
    /// (which restores the whole process before this library runs).
    pub fn restore<C: Communicator>(&mut self, comm: &C) -> Option<Checkpoint> {
        if self.config.disabled {
            debug!("checkpointing disabled, skipping restore");
            return None;
        }
        match &self.config.source {
            CheckpointSource::None | CheckpointSource::Dmtcp => None,
            CheckpointSource::Directory(directory) => {
                let path = naming::rank_file(directory, comm.rank());
                Some(Checkpoint::restore(&path, comm.rank(), self.config.verbose))
            }
        }
    }

    /// Release process-wide checkpoint state.
    ///
    /// The mapped core holds nothing beyond this struct; kept for
    /// lifecycle parity with the bridged API.
    pub fn finalize(&mut self) {
        debug!("checkpoint manager finalized");
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Whole-process checkpoint via DMTCP: all ranks synchronize, rank 0
    /// drives the external tool, all ranks synchronize again. The
    /// per-file write path is never exercised in this mode.
    fn dmtcp_checkpoint<C: Communicator>(&self, comm: &C) {
        comm.barrier();
        if comm.rank() == 0 {
            if self.config.verbose {
                info!("rank 0 creating checkpoint using DMTCP");
            }
            let started = Instant::now();
            match Command::new("dmtcp_command").arg("--bccheckpoint").status() {
                Ok(status) if !status.success() => {
                    warn!(%status, "dmtcp_command exited abnormally");
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "unable to run dmtcp_command"),
            }
            if self.config.verbose {
                info!(
                    "rank 0 checkpoint took {:.6} seconds",
                    started.elapsed().as_secs_f64(),
                );
            }
        }
        comm.barrier();
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
