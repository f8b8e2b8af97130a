//! Collective-communication seam
//!
//! The checkpoint core uses its communication substrate only as a
//! synchronization primitive: a barrier around the external-tool path and
//! a broadcast of the shared directory timestamp. [`Communicator`] is the
//! seam a real MPI binding implements; [`SingleProcess`] covers
//! single-rank use and [`LocalGroup`] backs multi-rank tests with one
//! thread per rank.

use std::sync::{Arc, Barrier};

use parking_lot::Mutex;

/// A group of cooperating ranks, viewed from one member.
///
/// All members must call [`barrier`](Communicator::barrier) and
/// [`broadcast`](Communicator::broadcast) together; no member proceeds
/// past a collective call before every member has entered it.
pub trait Communicator {
    /// This process's ordinal identity within the group.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Block until every rank in the group has entered the barrier.
    fn barrier(&self);

    /// Replicate `buf` from `root` to every rank's `buf`.
    fn broadcast(&self, buf: &mut [u8], root: usize);
}

/// Trivial group of one rank. Collectives are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn broadcast(&self, _buf: &mut [u8], _root: usize) {}
}

struct GroupShared {
    barrier: Barrier,
    slot: Mutex<Vec<u8>>,
}

/// Thread-backed group: each rank runs on its own thread within one
/// process, sharing a barrier and a broadcast slot.
///
/// Exists so the collective paths (naming agreement, external-tool
/// barriers) can be exercised without an MPI installation.
pub struct LocalGroup {
    rank: usize,
    size: usize,
    shared: Arc<GroupShared>,
}

impl LocalGroup {
    /// Create the per-rank handles for a group of `size` ranks.
    pub fn ranks(size: usize) -> Vec<Self> {
        assert!(size > 0, "a group needs at least one rank");
        let shared = Arc::new(GroupShared {
            barrier: Barrier::new(size),
            slot: Mutex::new(Vec::new()),
        });
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Communicator for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn broadcast(&self, buf: &mut [u8], root: usize) {
        if self.rank == root {
            let mut slot = self.shared.slot.lock();
            slot.clear();
            slot.extend_from_slice(buf);
        }
        self.shared.barrier.wait();
        if self.rank != root {
            buf.copy_from_slice(&self.shared.slot.lock());
        }
        // Hold everyone until the slot has been read out, so a later
        // broadcast on the same group cannot clobber it early.
        self.shared.barrier.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn single_process_is_rank_zero_of_one() {
        let comm = SingleProcess;
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        comm.barrier();
        let mut buf = [7u8; 4];
        comm.broadcast(&mut buf, 0);
        assert_eq!(buf, [7u8; 4]);
    }

    #[test]
    fn broadcast_replicates_root_value() {
        let ranks = LocalGroup::ranks(4);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let mut buf = if comm.rank() == 0 {
                        0xabad1deau32.to_le_bytes()
                    } else {
                        [0u8; 4]
                    };
                    comm.broadcast(&mut buf, 0);
                    u32::from_le_bytes(buf)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 0xabad1dea);
        }
    }

    #[test]
    fn back_to_back_broadcasts_do_not_interfere() {
        let ranks = LocalGroup::ranks(3);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let mut out = Vec::new();
                    for round in 0u8..3 {
                        let mut buf = [if comm.rank() == 0 { round } else { 0xff }];
                        comm.broadcast(&mut buf, 0);
                        out.push(buf[0]);
                    }
                    out
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), vec![0, 1, 2]);
        }
    }
}
