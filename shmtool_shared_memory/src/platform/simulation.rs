//! In-process shared memory backend.
//!
//! `SimulatedKernel` models the System V rules that matter to a
//! [`Segment`](crate::Segment) without touching the host's IPC namespace:
//! key lookup with `CREATE`/`EXCLUSIVE`, deferred removal until the last
//! detach, attach accounting and lock state. Clones share the same state,
//! so two `Segment` values opened from clones behave like two processes
//! attached to one kernel.

use super::{SegmentStat, ShmId, ShmKernel, ShmKey};
use crate::flags::ShmFlags;
use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::{getgid, getpid, getuid};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::trace;

/// Simulated System V shared memory.
#[derive(Debug, Clone)]
pub struct SimulatedKernel {
    state: Arc<Mutex<SimState>>,
}

#[derive(Debug)]
struct SimState {
    next_id: libc::c_int,
    page_size: usize,
    segments: HashMap<ShmId, SimSegment>,
    /// Live attach addresses and the segment they belong to.
    mappings: HashMap<usize, ShmId>,
}

#[derive(Debug)]
struct SimSegment {
    key: ShmKey,
    memory: SimMemory,
    mode: Mode,
    attach_count: u64,
    locked: bool,
    removed: bool,
}

/// Heap block with a stable address that attaches may alias.
#[derive(Debug)]
struct SimMemory {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the block is only reached through `SimState` behind a mutex, or
// through attach addresses whose use is governed by `ShmKernel::detach`.
unsafe impl Send for SimMemory {}

impl SimMemory {
    fn zeroed(len: usize) -> Self {
        let block: Box<[u8]> = vec![0u8; len].into_boxed_slice();
        let ptr = NonNull::from(Box::leak(block)).cast::<u8>();
        Self { ptr, len }
    }

    fn range(&self, offset: usize, len: usize) -> nix::Result<NonNull<u8>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => {
                // SAFETY: offset is within the block.
                Ok(unsafe { self.ptr.add(offset) })
            }
            _ => Err(Errno::EFAULT),
        }
    }
}

impl Drop for SimMemory {
    fn drop(&mut self) {
        let slice = std::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len);
        // SAFETY: allocated by `zeroed` as a boxed slice of `len` bytes.
        drop(unsafe { Box::from_raw(slice) });
    }
}

impl SimState {
    fn live(&self, id: ShmId) -> nix::Result<&SimSegment> {
        match self.segments.get(&id) {
            Some(segment) if segment.removed => Err(Errno::EIDRM),
            Some(segment) => Ok(segment),
            None => Err(Errno::EINVAL),
        }
    }

    fn live_mut(&mut self, id: ShmId) -> nix::Result<&mut SimSegment> {
        match self.segments.get_mut(&id) {
            Some(segment) if segment.removed => Err(Errno::EIDRM),
            Some(segment) => Ok(segment),
            None => Err(Errno::EINVAL),
        }
    }

    fn allocate(&mut self, key: ShmKey, size: usize, mode: Mode) -> ShmId {
        let rounded = size.div_ceil(self.page_size) * self.page_size;
        let id = ShmId::from_raw(self.next_id);
        self.next_id += 1;

        self.segments.insert(
            id,
            SimSegment {
                key,
                memory: SimMemory::zeroed(rounded),
                mode,
                attach_count: 0,
                locked: false,
                removed: false,
            },
        );
        id
    }

    fn reap(&mut self, id: ShmId) {
        if let Some(segment) = self.segments.get(&id) {
            if segment.removed && segment.attach_count == 0 {
                trace!(%id, "Reclaiming simulated segment");
                self.segments.remove(&id);
            }
        }
    }
}

impl SimulatedKernel {
    /// Backend without page rounding.
    pub fn new() -> Self {
        Self::with_page_size(1)
    }

    /// Backend that rounds every allocation up to a multiple of `page_size`.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                next_id: 0,
                page_size: page_size.max(1),
                segments: HashMap::new(),
                mappings: HashMap::new(),
            })),
        }
    }

    /// Number of segments still holding memory, including ones awaiting removal.
    pub fn segment_count(&self) -> usize {
        self.state.lock().segments.len()
    }
}

impl Default for SimulatedKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl ShmKernel for SimulatedKernel {
    fn get(&self, key: ShmKey, size: usize, flags: ShmFlags, mode: Mode) -> nix::Result<ShmId> {
        let mut state = self.state.lock();

        if key.is_private() {
            if size == 0 {
                return Err(Errno::EINVAL);
            }
            return Ok(state.allocate(key, size, mode));
        }

        let existing = state
            .segments
            .iter()
            .find(|(_, segment)| !segment.removed && segment.key == key)
            .map(|(id, segment)| (*id, segment.memory.len));

        match existing {
            Some(_) if flags.contains(ShmFlags::CREATE_EXCLUSIVE) => Err(Errno::EEXIST),
            Some((_, len)) if size > len => Err(Errno::EINVAL),
            Some((id, _)) => Ok(id),
            None if !flags.creates() => Err(Errno::ENOENT),
            None if size == 0 => Err(Errno::EINVAL),
            None => Ok(state.allocate(key, size, mode)),
        }
    }

    fn stat(&self, id: ShmId) -> nix::Result<SegmentStat> {
        let state = self.state.lock();
        let segment = state.segments.get(&id).ok_or(Errno::EINVAL)?;
        let pid = getpid().as_raw();

        Ok(SegmentStat {
            size: segment.memory.len,
            attach_count: segment.attach_count,
            creator_pid: pid,
            last_pid: pid,
            mode: segment.mode.bits() as u32,
            uid: getuid().as_raw(),
            gid: getgid().as_raw(),
            locked: segment.locked,
            marked_for_removal: segment.removed,
        })
    }

    fn attach(&self, id: ShmId) -> nix::Result<NonNull<u8>> {
        let mut state = self.state.lock();
        let segment = state.live_mut(id)?;
        segment.attach_count += 1;
        let addr = segment.memory.ptr;

        state.mappings.insert(addr.as_ptr() as usize, id);
        Ok(addr)
    }

    unsafe fn detach(&self, addr: NonNull<u8>) -> nix::Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let id = state
            .mappings
            .remove(&(addr.as_ptr() as usize))
            .ok_or(Errno::EINVAL)?;

        if let Some(segment) = state.segments.get_mut(&id) {
            segment.attach_count = segment.attach_count.saturating_sub(1);
            // Several attaches of one segment share an address.
            if segment.attach_count > 0 {
                state.mappings.insert(addr.as_ptr() as usize, id);
            }
        }
        state.reap(id);
        Ok(())
    }

    fn remove(&self, id: ShmId) -> nix::Result<()> {
        let mut state = self.state.lock();
        state.live_mut(id)?.removed = true;
        state.reap(id);
        Ok(())
    }

    fn lock(&self, id: ShmId) -> nix::Result<()> {
        self.state.lock().live_mut(id)?.locked = true;
        Ok(())
    }

    fn unlock(&self, id: ShmId) -> nix::Result<()> {
        self.state.lock().live_mut(id)?.locked = false;
        Ok(())
    }

    unsafe fn read(&self, id: ShmId, offset: usize, buf: &mut [u8]) -> nix::Result<()> {
        let state = self.state.lock();
        let src = state.live(id)?.memory.range(offset, buf.len())?;
        // SAFETY: `range` checked the bounds; the mutex serialises kernel copies.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), buf.as_mut_ptr(), buf.len()) };
        Ok(())
    }

    unsafe fn write(&self, id: ShmId, offset: usize, buf: &[u8]) -> nix::Result<()> {
        let state = self.state.lock();
        let dst = state.live(id)?.memory.range(offset, buf.len())?;
        // SAFETY: `range` checked the bounds; the mutex serialises kernel copies.
        unsafe { std::ptr::copy_nonoverlapping(buf.as_ptr(), dst.as_ptr(), buf.len()) };
        Ok(())
    }
}
