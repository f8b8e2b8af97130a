//! Mapped checkpoint store
//!
//! One rank's checkpoint file made directly addressable through a page
//! mapping, with a sequential cursor over it. Write stores grow the
//! backing file incrementally and proactively evict already-durable
//! pages, so resident memory stays bounded by roughly one growth
//! increment no matter how large the checkpoint gets. Read stores evict
//! fully-consumed pages behind the cursor under the same bound.
//!
//! Callers never see the mapping's address, only the cursor and
//! capacity; a growth step may relocate the mapping and no reference
//! into it survives across one, which the borrow checker enforces by
//! construction.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

use memmap2::{Mmap, MmapMut, MmapOptions};
#[cfg(unix)]
use memmap2::UncheckedAdvice;
#[cfg(any(target_os = "linux", target_os = "android"))]
use memmap2::RemapOptions;
use tracing::{debug, info};

use crate::error::{fatal, CheckpointError, Result};

/// Size a freshly created checkpoint file starts at, before any growth.
pub const INITIAL_CAPACITY: usize = 4096;

/// The current mapping, if any. The variant fixes the store's mode:
/// `Write` stores are created by [`Checkpoint::create`], `Read` (or
/// `None`, for an empty file) by [`Checkpoint::restore`].
enum Mapping {
    Write(MmapMut),
    Read(Mmap),
    None,
}

/// A single rank's open checkpoint file.
///
/// Created write-only by [`create`](Checkpoint::create) or read-only by
/// [`restore`](Checkpoint::restore); mutated only by the sequential
/// [`write`](Checkpoint::write) / [`read`](Checkpoint::read) calls of
/// the owning rank; consumed exactly once by [`close`](Checkpoint::close).
///
/// Storage-layer failures (open, extend, map, remap, sync, truncate)
/// terminate the process: a checkpoint file that cannot be handled
/// correctly is an environment error, not a transient fault.
pub struct Checkpoint {
    file: File,
    mapping: Mapping,
    /// Mapped length in bytes. Changes together with the mapping under
    /// growth.
    capacity: usize,
    /// Next byte offset for sequential read or write.
    cursor: usize,
    /// Offset below which pages have already been released from the
    /// resident set.
    evicted_through: usize,
    page_size: usize,
    rank: usize,
    path: PathBuf,
    opened_at: Instant,
    verbose: bool,
}

impl Checkpoint {
    /// Create a write-only store at `path`, truncated to
    /// [`INITIAL_CAPACITY`] and mapped shared-writable.
    pub fn create(path: &Path, rank: usize, verbose: bool) -> Self {
        let file = match OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
        {
            Ok(file) => file,
            Err(err) => fatal(
                &format!("unable to open checkpoint \"{}\" for writing", path.display()),
                &err,
            ),
        };
        if let Err(err) = file.set_len(INITIAL_CAPACITY as u64) {
            fatal("ftruncate", &err);
        }
        let mmap = match unsafe { MmapOptions::new().len(INITIAL_CAPACITY).map_mut(&file) } {
            Ok(mmap) => mmap,
            Err(err) => fatal("mmap", &err),
        };
        debug!(rank, path = %path.display(), "created checkpoint store");
        if verbose {
            info!("rank {rank} creating {}", path.display());
        }
        Self {
            file,
            mapping: Mapping::Write(mmap),
            capacity: INITIAL_CAPACITY,
            cursor: 0,
            evicted_through: 0,
            page_size: page_size(),
            rank,
            path: path.to_path_buf(),
            opened_at: Instant::now(),
            verbose,
        }
    }

    /// Open a previously written store at `path` read-only.
    ///
    /// An empty file is a valid store with no mapping; every non-empty
    /// read from it fails with
    /// [`EndOfCheckpoint`](CheckpointError::EndOfCheckpoint).
    pub fn restore(path: &Path, rank: usize, verbose: bool) -> Self {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => fatal(
                &format!("unable to open checkpoint \"{}\" for reading", path.display()),
                &err,
            ),
        };
        let size = match file.metadata() {
            Ok(metadata) => metadata.len() as usize,
            Err(err) => fatal("fstat", &err),
        };
        let mapping = if size == 0 {
            Mapping::None
        } else {
            let mmap = match unsafe { MmapOptions::new().map_copy_read_only(&file) } {
                Ok(mmap) => mmap,
                Err(err) => fatal("mmap", &err),
            };
            #[cfg(unix)]
            if let Err(err) = mmap.advise(memmap2::Advice::Sequential) {
                fatal("madvise", &err);
            }
            Mapping::Read(mmap)
        };
        debug!(rank, path = %path.display(), size, "restored checkpoint store");
        if verbose {
            info!("rank {rank} restored from {}", path.display());
        }
        Self {
            file,
            mapping,
            capacity: size,
            cursor: 0,
            evicted_through: 0,
            page_size: page_size(),
            rank,
            path: path.to_path_buf(),
            opened_at: Instant::now(),
            verbose,
        }
    }

    /// Append a slice of elements at the cursor, growing the backing
    /// file and mapping as needed.
    ///
    /// All previously written bytes stay valid at their offsets even if
    /// growth relocated the mapping.
    pub fn write<T: Element>(&mut self, data: &[T]) -> Result<()> {
        self.write_bytes(element_bytes(data))
    }

    /// Byte-level form of [`write`](Checkpoint::write).
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if !matches!(self.mapping, Mapping::Write(_)) {
            return Err(CheckpointError::ReadOnly);
        }
        while self.capacity - self.cursor < data.len() {
            self.grow(self.cursor + data.len());
        }
        if let Mapping::Write(mmap) = &mut self.mapping {
            mmap[self.cursor..self.cursor + data.len()].copy_from_slice(data);
        }
        self.cursor += data.len();
        Ok(())
    }

    /// Fill a slice of elements from the cursor.
    ///
    /// Fails with [`EndOfCheckpoint`](CheckpointError::EndOfCheckpoint)
    /// if fewer bytes remain than requested; this is the expected way to
    /// detect the end of the stream, not a fault.
    ///
    /// Access is strictly sequential and single-pass: pages behind the
    /// cursor are released as they are consumed. There is no seek, so an
    /// already-evicted range cannot be reached again through this API.
    pub fn read<T: Element>(&mut self, data: &mut [T]) -> Result<()> {
        self.read_bytes(element_bytes_mut(data))
    }

    /// Byte-level form of [`read`](Checkpoint::read).
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        match &self.mapping {
            Mapping::Write(_) => return Err(CheckpointError::WriteOnly),
            Mapping::Read(mmap) => {
                if self.cursor + buf.len() > self.capacity {
                    return Err(CheckpointError::EndOfCheckpoint {
                        requested: buf.len(),
                        available: self.capacity - self.cursor,
                    });
                }
                buf.copy_from_slice(&mmap[self.cursor..self.cursor + buf.len()]);
            }
            Mapping::None => {
                if !buf.is_empty() {
                    return Err(CheckpointError::EndOfCheckpoint {
                        requested: buf.len(),
                        available: 0,
                    });
                }
            }
        }
        self.cursor += buf.len();
        let whole_pages = (self.cursor - self.evicted_through) / self.page_size;
        if whole_pages != 0 {
            self.evict_through(self.evicted_through + whole_pages * self.page_size);
        }
        Ok(())
    }

    /// Flush (write stores), unmap, truncate the file to the logical
    /// size, and close the descriptor. Consumes the store.
    pub fn close(mut self) {
        if let Mapping::Write(mmap) = &self.mapping {
            if let Err(err) = mmap.flush() {
                fatal("msync", &err);
            }
        }
        let writable = matches!(self.mapping, Mapping::Write(_));
        // Unmap before shrinking the file below the mapped length.
        self.mapping = Mapping::None;
        if writable {
            if let Err(err) = self.file.set_len(self.cursor as u64) {
                fatal("ftruncate", &err);
            }
        }
        debug!(
            rank = self.rank,
            path = %self.path.display(),
            bytes = self.cursor,
            "closed checkpoint store"
        );
        if self.verbose {
            info!(
                "rank {} checkpoint create/restore took {:.6} seconds",
                self.rank,
                self.opened_at.elapsed().as_secs_f64(),
            );
        }
    }

    /// Next byte offset for sequential access.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Current mapped length in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Offset below which pages have been released from the resident set.
    pub fn evicted_through(&self) -> usize {
        self.evicted_through
    }

    /// Whether this store was opened for writing.
    pub fn is_writable(&self) -> bool {
        matches!(self.mapping, Mapping::Write(_))
    }

    /// The per-rank file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extend the file and remap so the capacity reaches at least
    /// `min_size`, then release the pages written before this step.
    fn grow(&mut self, min_size: usize) {
        let remainder = min_size % self.page_size;
        let new_size = if remainder == 0 {
            min_size
        } else {
            min_size + (self.page_size - remainder)
        };
        // The file must cover the new length before the mapping does,
        // or the OS faults on the grown region.
        if let Err(err) = self.file.set_len(new_size as u64) {
            fatal("ftruncate", &err);
        }
        let old_capacity = self.capacity;
        #[cfg(any(target_os = "linux", target_os = "android"))]
        if let Mapping::Write(mmap) = &mut self.mapping {
            if let Err(err) = unsafe { mmap.remap(new_size, RemapOptions::new().may_move(true)) } {
                fatal("mremap", &err);
            }
        }
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            // No mremap here; map the extended file fresh. The old
            // mapping is shared, so its pages are already in the file.
            let mmap = match unsafe { MmapOptions::new().len(new_size).map_mut(&self.file) } {
                Ok(mmap) => mmap,
                Err(err) => fatal("mmap", &err),
            };
            self.mapping = Mapping::Write(mmap);
        }
        self.capacity = new_size;
        debug!(
            rank = self.rank,
            old_capacity, new_capacity = new_size,
            "grew checkpoint store"
        );
        // Everything below the old capacity is durable in the file;
        // drop it from the resident set.
        self.evict_through(old_capacity);
    }

    /// Advise the OS that `[evicted_through, end)` is no longer needed
    /// and advance the eviction point. A no-op for already-evicted
    /// ranges.
    fn evict_through(&mut self, end: usize) {
        if end <= self.evicted_through {
            return;
        }
        #[cfg(unix)]
        {
            let offset = self.evicted_through;
            let len = end - offset;
            // DontNeed is safe here: both mapping kinds are file-backed,
            // so dropped pages re-fault from the file, and write stores
            // only evict below the old capacity, which growth has
            // already pushed to disk via the shared mapping.
            let outcome = match &self.mapping {
                Mapping::Write(mmap) => unsafe {
                    mmap.unchecked_advise_range(UncheckedAdvice::DontNeed, offset, len)
                },
                Mapping::Read(mmap) => unsafe {
                    mmap.unchecked_advise_range(UncheckedAdvice::DontNeed, offset, len)
                },
                Mapping::None => Ok(()),
            };
            if let Err(err) = outcome {
                fatal("madvise", &err);
            }
        }
        self.evicted_through = end;
    }
}

impl std::fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkpoint")
            .field("path", &self.path)
            .field("rank", &self.rank)
            .field("writable", &self.is_writable())
            .field("cursor", &self.cursor)
            .field("capacity", &self.capacity)
            .field("evicted_through", &self.evicted_through)
            .finish()
    }
}

/// Element types that may be written to and read from a checkpoint as
/// raw bytes: the fixed-width integers and floats. Sealed; padding-free
/// layout is what makes the byte views sound.
pub trait Element: Copy + sealed::Sealed {}

mod sealed {
    pub trait Sealed {}
}

macro_rules! impl_element {
    ($($ty:ty),*) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Element for $ty {}
        )*
    };
}

impl_element!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, f32, f64);

fn element_bytes<T: Element>(data: &[T]) -> &[u8] {
    // Sound for Element impls: no padding, no invalid bit patterns.
    unsafe { std::slice::from_raw_parts(data.as_ptr().cast::<u8>(), std::mem::size_of_val(data)) }
}

fn element_bytes_mut<T: Element>(data: &mut [T]) -> &mut [u8] {
    unsafe {
        std::slice::from_raw_parts_mut(data.as_mut_ptr().cast::<u8>(), std::mem::size_of_val(data))
    }
}

/// The platform page size, falling back to 4096 if it cannot be queried.
fn page_size() -> usize {
    #[cfg(unix)]
    {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as usize;
        }
    }
    4096
}
