//! System V shared memory calls on Linux

use super::{SegmentStat, ShmId, ShmKernel, ShmKey};
use crate::flags::ShmFlags;
use nix::NixPath;
use nix::errno::Errno;
use nix::sys::stat::Mode;
use std::mem::MaybeUninit;
use std::path::Path;
use std::ptr::{self, NonNull};

/// `shm_perm.mode` bit set while a segment awaits removal.
const SHM_DEST: u32 = 0o1000;
/// `shm_perm.mode` bit set while a segment's pages are locked.
const SHM_LOCKED: u32 = 0o2000;

/// Backend issuing the real `shmget`/`shmat`/`shmdt`/`shmctl` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SysV;

impl SysV {
    fn control(id: ShmId, command: libc::c_int) -> nix::Result<()> {
        // SAFETY: RMID/LOCK/UNLOCK ignore the buffer argument.
        let res = unsafe { libc::shmctl(id.as_raw(), command, ptr::null_mut()) };
        Errno::result(res).map(drop)
    }
}

impl ShmKernel for SysV {
    fn get(&self, key: ShmKey, size: usize, flags: ShmFlags, mode: Mode) -> nix::Result<ShmId> {
        let shmflg = flags.bits() | mode.bits() as libc::c_int;
        // SAFETY: plain syscall, no pointers involved.
        let id = unsafe { libc::shmget(key.as_raw(), size, shmflg) };
        Errno::result(id).map(ShmId::from_raw)
    }

    fn stat(&self, id: ShmId) -> nix::Result<SegmentStat> {
        let mut ds = MaybeUninit::<libc::shmid_ds>::zeroed();
        // SAFETY: IPC_STAT fills the buffer on success.
        let res = unsafe { libc::shmctl(id.as_raw(), libc::IPC_STAT, ds.as_mut_ptr()) };
        Errno::result(res)?;
        // SAFETY: zero-initialised and written by the kernel.
        let ds = unsafe { ds.assume_init() };

        let raw_mode = ds.shm_perm.mode as u32;
        Ok(SegmentStat {
            size: ds.shm_segsz as usize,
            attach_count: ds.shm_nattch as u64,
            creator_pid: ds.shm_cpid,
            last_pid: ds.shm_lpid,
            mode: raw_mode & 0o777,
            uid: ds.shm_perm.uid,
            gid: ds.shm_perm.gid,
            locked: raw_mode & SHM_LOCKED != 0,
            marked_for_removal: raw_mode & SHM_DEST != 0,
        })
    }

    fn attach(&self, id: ShmId) -> nix::Result<NonNull<u8>> {
        // SAFETY: the kernel chooses the address; no existing mapping is touched.
        let addr = unsafe { libc::shmat(id.as_raw(), ptr::null(), 0) };
        if addr as isize == -1 {
            return Err(Errno::last());
        }
        NonNull::new(addr.cast::<u8>()).ok_or(Errno::EINVAL)
    }

    unsafe fn detach(&self, addr: NonNull<u8>) -> nix::Result<()> {
        // SAFETY: forwarded from the caller's contract.
        let res = unsafe { libc::shmdt(addr.as_ptr().cast()) };
        Errno::result(res).map(drop)
    }

    fn remove(&self, id: ShmId) -> nix::Result<()> {
        Self::control(id, libc::IPC_RMID)
    }

    fn lock(&self, id: ShmId) -> nix::Result<()> {
        Self::control(id, libc::SHM_LOCK)
    }

    fn unlock(&self, id: ShmId) -> nix::Result<()> {
        Self::control(id, libc::SHM_UNLOCK)
    }
}

/// `ftok(3)`: derive a key from an existing file and a project id.
pub fn ftok(path: &Path, proj_id: i32) -> nix::Result<ShmKey> {
    // SAFETY: the path is NUL-terminated for the duration of the call.
    let key = path.with_nix_path(|cstr| unsafe { libc::ftok(cstr.as_ptr(), proj_id) })?;
    Errno::result(key).map(ShmKey::from_raw)
}
