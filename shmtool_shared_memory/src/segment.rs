//! Stream view over a System V shared memory segment

use crate::attach::Attachment;
use crate::error::{ControlCommand, ShmError, ShmResult};
use crate::flags::{ShmFlags, effective_mode};
use crate::platform::{SegmentStat, ShmId, ShmKernel, ShmKey, SysV};
use nix::sys::stat::Mode;
use std::io::{self, SeekFrom};
use tracing::{debug, info, trace};

/// A shared memory segment with a read/write cursor.
///
/// The kernel segment outlives this value: dropping a `Segment` never removes
/// it, only [`destroy`](Segment::destroy) or [`destroy_segment`] do. Several
/// `Segment` values, in this process or others, may refer to the same id.
///
/// The cursor is plain per-value state. Share a `Segment` between threads
/// behind a mutex; nothing here synchronises access to the segment contents
/// across processes.
#[derive(Debug)]
pub struct Segment<K: ShmKernel = SysV> {
    kernel: K,
    id: Option<ShmId>,
    size: usize,
    cursor: u64,
}

impl Segment<SysV> {
    /// Create a new private segment of `size` bytes with owner read/write
    /// permission.
    pub fn create(size: usize) -> ShmResult<Self> {
        Self::create_in(SysV, size)
    }

    /// Open an existing segment by id.
    pub fn open(id: ShmId) -> ShmResult<Self> {
        Self::open_in(SysV, id)
    }

    /// Create a private segment with explicit flags and permissions.
    pub fn open_segment(size: usize, flags: ShmFlags, perm: Mode) -> ShmResult<Self> {
        Self::open_segment_in(SysV, size, flags, perm)
    }

    /// Create or look up a segment by key.
    pub fn open_with_key(key: ShmKey, size: usize, flags: ShmFlags, perm: Mode) -> ShmResult<Self> {
        Self::open_with_key_in(SysV, key, size, flags, perm)
    }
}

/// Mark the segment with `id` for removal.
pub fn destroy_segment(id: ShmId) -> ShmResult<()> {
    destroy_segment_in(&SysV, id)
}

/// Mark the segment with `id` for removal through `kernel`.
///
/// Memory is reclaimed once the last attached process detaches.
pub fn destroy_segment_in<K: ShmKernel>(kernel: &K, id: ShmId) -> ShmResult<()> {
    kernel.remove(id).map_err(|source| ShmError::Control {
        id,
        command: ControlCommand::Remove,
        source,
    })?;
    info!(%id, "Destroyed segment");
    Ok(())
}

impl<K: ShmKernel> Segment<K> {
    /// [`create`](Segment::create) on a specific backend.
    pub fn create_in(kernel: K, size: usize) -> ShmResult<Self> {
        Self::open_segment_in(kernel, size, ShmFlags::CREATE_EXCLUSIVE, Mode::empty())
    }

    /// [`open`](Segment::open) on a specific backend.
    pub fn open_in(kernel: K, id: ShmId) -> ShmResult<Self> {
        let size = kernel
            .size_of(id)
            .map_err(|source| ShmError::NotFound { id, source })?;

        debug!(%id, size, "Opened segment");
        Ok(Self {
            kernel,
            id: Some(id),
            size,
            cursor: 0,
        })
    }

    /// [`open_segment`](Segment::open_segment) on a specific backend.
    pub fn open_segment_in(kernel: K, size: usize, flags: ShmFlags, perm: Mode) -> ShmResult<Self> {
        Self::open_with_key_in(kernel, ShmKey::PRIVATE, size, flags, perm)
    }

    /// [`open_with_key`](Segment::open_with_key) on a specific backend.
    ///
    /// A private key always allocates a new segment and needs a non-zero
    /// size. The stored size is the one the kernel reports afterwards, which
    /// may be larger than requested.
    pub fn open_with_key_in(
        kernel: K,
        key: ShmKey,
        size: usize,
        flags: ShmFlags,
        perm: Mode,
    ) -> ShmResult<Self> {
        flags.validate()?;
        if size == 0 && key.is_private() {
            return Err(ShmError::Allocation {
                size,
                source: nix::errno::Errno::EINVAL,
            });
        }

        let mode = effective_mode(flags, perm);
        let id = kernel
            .get(key, size, flags, mode)
            .map_err(|source| ShmError::Allocation { size, source })?;
        let actual = kernel
            .size_of(id)
            .map_err(|source| ShmError::NotFound { id, source })?;

        info!(%id, requested = size, size = actual, ?flags, mode = mode.bits(), "Opened segment");
        Ok(Self {
            kernel,
            id: Some(id),
            size: actual,
            cursor: 0,
        })
    }

    /// Kernel id, or `None` once the segment has been destroyed through this value.
    pub fn id(&self) -> Option<ShmId> {
        self.id
    }

    /// Size in bytes as reported by the kernel when opened.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Bytes between the cursor and the end of the segment.
    pub fn remaining(&self) -> usize {
        (self.size as u64).saturating_sub(self.cursor) as usize
    }

    /// True when the next read or write reports end-of-stream.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.size as u64
    }

    /// Move the cursor back to the start.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Reposition the cursor.
    ///
    /// Positions at or past the end are allowed; the next read or write then
    /// transfers nothing. Positions before the start fail with
    /// [`ShmError::InvalidSeek`] and leave the cursor unchanged.
    pub fn seek(&mut self, pos: SeekFrom) -> ShmResult<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(target) => {
                self.cursor = target;
                return Ok(target);
            }
            SeekFrom::Current(offset) => (self.cursor, offset),
            SeekFrom::End(offset) => (self.size as u64, offset),
        };

        let target = base
            .checked_add_signed(offset)
            .ok_or(ShmError::InvalidSeek { base, offset })?;
        self.cursor = target;
        Ok(target)
    }

    /// Copy bytes from the cursor into `buf` and advance the cursor.
    ///
    /// Returns the number of bytes copied; `0` means end-of-stream (cursor at
    /// or past the end, or an empty `buf`).
    pub fn read(&mut self, buf: &mut [u8]) -> ShmResult<usize> {
        let id = self.backing_id()?;
        let Some(length) = self.transfer_len(buf.len()) else {
            return Ok(0);
        };

        let offset = self.cursor;
        // SAFETY: `transfer_len` keeps offset + length within the segment.
        unsafe {
            self.kernel
                .read(id, offset as usize, &mut buf[..length])
                .map_err(|source| ShmError::Io {
                    id,
                    offset,
                    length,
                    source,
                })?;
        }

        self.cursor += length as u64;
        trace!(%id, offset, length, "Read from segment");
        Ok(length)
    }

    /// Copy `buf` into the segment at the cursor and advance the cursor.
    ///
    /// The segment never grows: returns `0` once the cursor reaches the end,
    /// and a short count when `buf` does not fit.
    pub fn write(&mut self, buf: &[u8]) -> ShmResult<usize> {
        let id = self.backing_id()?;
        let Some(length) = self.transfer_len(buf.len()) else {
            return Ok(0);
        };

        let offset = self.cursor;
        // SAFETY: `transfer_len` keeps offset + length within the segment.
        unsafe {
            self.kernel
                .write(id, offset as usize, &buf[..length])
                .map_err(|source| ShmError::Io {
                    id,
                    offset,
                    length,
                    source,
                })?;
        }

        self.cursor += length as u64;
        trace!(%id, offset, length, "Wrote to segment");
        Ok(length)
    }

    /// Read `length` bytes (the whole segment when `None`) at absolute
    /// offset `start`, leaving the cursor alone.
    pub fn read_chunk(&self, length: Option<usize>, start: u64) -> ShmResult<Vec<u8>> {
        let id = self.backing_id()?;
        let length = length.unwrap_or(self.size);

        let end = start.saturating_add(length as u64);
        if end > self.size as u64 {
            return Err(ShmError::OutOfBounds {
                start,
                end,
                size: self.size,
            });
        }

        let mut chunk = vec![0u8; length];
        // SAFETY: start..end was checked against the segment size.
        unsafe {
            self.kernel
                .read(id, start as usize, &mut chunk)
                .map_err(|source| ShmError::Io {
                    id,
                    offset: start,
                    length,
                    source,
                })?;
        }
        Ok(chunk)
    }

    /// Map the segment into this process.
    pub fn attach(&self) -> ShmResult<Attachment<K>> {
        let id = self.backing_id()?;
        let addr = self
            .kernel
            .attach(id)
            .map_err(|source| ShmError::Attach { id, source })?;
        Ok(Attachment::new(self.kernel.clone(), id, addr, self.size))
    }

    /// Current kernel status of the segment.
    pub fn stat(&self) -> ShmResult<SegmentStat> {
        let id = self.backing_id()?;
        self.kernel
            .stat(id)
            .map_err(|source| ShmError::NotFound { id, source })
    }

    /// Pin the segment's pages in memory.
    pub fn lock(&self) -> ShmResult<()> {
        self.control(ControlCommand::Lock)
    }

    /// Release pinned pages.
    pub fn unlock(&self) -> ShmResult<()> {
        self.control(ControlCommand::Unlock)
    }

    /// Mark the segment for removal.
    ///
    /// Afterwards this value has no id and every read, write or attach fails
    /// with [`ShmError::NotAttached`]. Processes still attached keep their
    /// mapping until they detach.
    pub fn destroy(&mut self) -> ShmResult<()> {
        self.control(ControlCommand::Remove)?;
        info!(id = ?self.id, "Destroyed segment");
        self.id = None;
        Ok(())
    }

    fn backing_id(&self) -> ShmResult<ShmId> {
        self.id.ok_or(ShmError::NotAttached)
    }

    /// Bytes a transfer of `requested` bytes may move from the cursor:
    /// capped by the request, then the segment size, then what remains.
    /// `None` means end-of-stream.
    fn transfer_len(&self, requested: usize) -> Option<usize> {
        if self.is_exhausted() {
            return None;
        }

        let length = requested.min(self.size).min(self.remaining());
        (length > 0).then_some(length)
    }

    fn control(&self, command: ControlCommand) -> ShmResult<()> {
        let id = self.backing_id()?;
        let result = match command {
            ControlCommand::Remove => self.kernel.remove(id),
            ControlCommand::Lock => self.kernel.lock(id),
            ControlCommand::Unlock => self.kernel.unlock(id),
        };
        result.map_err(|source| ShmError::Control {
            id,
            command,
            source,
        })?;

        debug!(%id, %command, "Segment control");
        Ok(())
    }
}

impl<K: ShmKernel> io::Read for Segment<K> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Segment::read(self, buf).map_err(io::Error::from)
    }
}

impl<K: ShmKernel> io::Write for Segment<K> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Segment::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<K: ShmKernel> io::Seek for Segment<K> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Segment::seek(self, pos).map_err(io::Error::from)
    }
}
