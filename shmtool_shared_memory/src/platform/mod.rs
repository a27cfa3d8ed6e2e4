//! Kernel shared memory bindings.
//!
//! [`ShmKernel`] is the capability set a [`Segment`](crate::Segment) is built
//! from. Two backends are provided:
//!
//! - [`SysV`] - the real System V calls (`shmget`, `shmat`, `shmdt`, `shmctl`)
//! - [`SimulatedKernel`] - an in-process model for development and testing
//!
//! # Adding New Backends
//!
//! Implement the required methods; `read` and `write` have default
//! implementations built on `attach`/`detach` that suit any backend whose
//! attach hands out a plain memory address.

pub mod linux;
pub mod simulation;

pub use linux::SysV;
pub use simulation::SimulatedKernel;

use crate::error::{ShmError, ShmResult};
use crate::flags::ShmFlags;
use nix::sys::stat::Mode;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::ptr::NonNull;

/// Kernel-assigned segment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ShmId(libc::c_int);

impl ShmId {
    /// Wrap a raw id as returned by `shmget(2)`.
    pub const fn from_raw(raw: libc::c_int) -> Self {
        Self(raw)
    }

    /// Raw id for passing to the kernel.
    pub const fn as_raw(&self) -> libc::c_int {
        self.0
    }
}

impl fmt::Display for ShmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key used to look up or create a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShmKey(libc::key_t);

impl ShmKey {
    /// Always creates a new segment (`IPC_PRIVATE`).
    pub const PRIVATE: Self = Self(libc::IPC_PRIVATE);

    /// Wrap a raw key.
    pub const fn from_raw(raw: libc::key_t) -> Self {
        Self(raw)
    }

    /// Raw key for passing to the kernel.
    pub const fn as_raw(&self) -> libc::key_t {
        self.0
    }

    /// True for [`ShmKey::PRIVATE`].
    pub const fn is_private(&self) -> bool {
        self.0 == libc::IPC_PRIVATE
    }

    /// Derive a key from an existing path with `ftok(3)`.
    pub fn from_path(path: &Path, proj_id: i32) -> ShmResult<Self> {
        linux::ftok(path, proj_id).map_err(|source| ShmError::KeyDerivation {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Default for ShmKey {
    fn default() -> Self {
        Self::PRIVATE
    }
}

/// Kernel status of a segment (`IPC_STAT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentStat {
    /// Size in bytes
    pub size: usize,
    /// Number of current attaches
    pub attach_count: u64,
    /// Creator process id
    pub creator_pid: i32,
    /// Process id of the last attach/detach
    pub last_pid: i32,
    /// Permission bits
    pub mode: u32,
    /// Owner user id
    pub uid: u32,
    /// Owner group id
    pub gid: u32,
    /// Pages are pinned (`SHM_LOCK`)
    pub locked: bool,
    /// Removal pending until the last detach
    pub marked_for_removal: bool,
}

/// Primitive shared memory operations.
///
/// Every method maps onto a single kernel request and reports the raw
/// [`nix::errno::Errno`]; context is added by the caller.
pub trait ShmKernel: Clone {
    /// Allocate or look up a segment (`shmget`).
    fn get(&self, key: ShmKey, size: usize, flags: ShmFlags, mode: Mode) -> nix::Result<ShmId>;

    /// Query kernel status (`IPC_STAT`).
    fn stat(&self, id: ShmId) -> nix::Result<SegmentStat>;

    /// Map the segment into this process (`shmat`).
    fn attach(&self, id: ShmId) -> nix::Result<NonNull<u8>>;

    /// Unmap an address returned by [`attach`](ShmKernel::attach) (`shmdt`).
    ///
    /// # Safety
    ///
    /// `addr` must be a live mapping from this backend. No reference into the
    /// mapping may be used afterwards.
    unsafe fn detach(&self, addr: NonNull<u8>) -> nix::Result<()>;

    /// Mark for removal once the last process detaches (`IPC_RMID`).
    fn remove(&self, id: ShmId) -> nix::Result<()>;

    /// Pin the segment's pages in memory (`SHM_LOCK`).
    fn lock(&self, id: ShmId) -> nix::Result<()>;

    /// Release pinned pages (`SHM_UNLOCK`).
    fn unlock(&self, id: ShmId) -> nix::Result<()>;

    /// Size of the segment in bytes.
    fn size_of(&self, id: ShmId) -> nix::Result<usize> {
        self.stat(id).map(|stat| stat.size)
    }

    /// Copy `buf.len()` bytes starting at `offset` out of the segment.
    ///
    /// # Safety
    ///
    /// `offset + buf.len()` must not exceed the segment size.
    unsafe fn read(&self, id: ShmId, offset: usize, buf: &mut [u8]) -> nix::Result<()> {
        let base = self.attach(id)?;
        // SAFETY: the caller keeps the range inside the mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(base.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
            self.detach(base)
        }
    }

    /// Copy `buf` into the segment starting at `offset`.
    ///
    /// # Safety
    ///
    /// `offset + buf.len()` must not exceed the segment size.
    unsafe fn write(&self, id: ShmId, offset: usize, buf: &[u8]) -> nix::Result<()> {
        let base = self.attach(id)?;
        // SAFETY: the caller keeps the range inside the mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(buf.as_ptr(), base.as_ptr().add(offset), buf.len());
            self.detach(base)
        }
    }
}
