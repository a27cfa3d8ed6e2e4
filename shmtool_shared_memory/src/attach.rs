//! Attached address capability

use crate::error::{ShmError, ShmResult};
use crate::platform::{ShmId, ShmKernel, SysV};
use std::ptr::{self, NonNull};
use tracing::{debug, warn};

/// A segment mapped into this process.
///
/// The handle owns one attach: [`detach`](Attachment::detach) consumes it, and
/// dropping it detaches as well. It does not keep the kernel segment alive
/// beyond what `shmat(2)` itself guarantees, and holds no reference to the
/// [`Segment`](crate::Segment) it came from.
///
/// Other processes may write the mapped bytes at any time, so the handle only
/// exposes the raw address. Building references from it is up to the caller.
#[derive(Debug)]
pub struct Attachment<K: ShmKernel = SysV> {
    kernel: K,
    id: ShmId,
    addr: Option<NonNull<u8>>,
    len: usize,
}

impl<K: ShmKernel> Attachment<K> {
    pub(crate) fn new(kernel: K, id: ShmId, addr: NonNull<u8>, len: usize) -> Self {
        debug!(%id, address = addr.as_ptr() as usize, len, "Attached segment");
        Self {
            kernel,
            id,
            addr: Some(addr),
            len,
        }
    }

    /// Id of the attached segment.
    pub fn id(&self) -> ShmId {
        self.id
    }

    /// Base address of the mapping.
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// Mapped length in bytes, as known when attaching.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length mapping.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Unmap the segment.
    pub fn detach(mut self) -> ShmResult<()> {
        self.release()
    }

    fn release(&mut self) -> ShmResult<()> {
        let Some(addr) = self.addr.take() else {
            return Ok(());
        };

        // SAFETY: `addr` came from `attach` and is detached at most once.
        unsafe { self.kernel.detach(addr) }.map_err(|source| ShmError::Detach {
            address: addr.as_ptr() as usize,
            source,
        })?;

        debug!(id = %self.id, address = addr.as_ptr() as usize, "Detached segment");
        Ok(())
    }
}

impl<K: ShmKernel> Drop for Attachment<K> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(id = %self.id, "Detach on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Segment;
    use crate::platform::SimulatedKernel;

    #[test]
    fn test_attach_detach_accounting() {
        let kernel = SimulatedKernel::new();
        let segment = Segment::create_in(kernel.clone(), 32).unwrap();
        let id = segment.id().unwrap();

        let attachment = segment.attach().unwrap();
        assert_eq!(attachment.id(), id);
        assert_eq!(attachment.len(), 32);
        assert!(!attachment.as_ptr().is_null());
        assert_eq!(kernel.stat(id).unwrap().attach_count, 1);

        attachment.detach().unwrap();
        assert_eq!(kernel.stat(id).unwrap().attach_count, 0);
    }

    #[test]
    fn test_drop_detaches() {
        let kernel = SimulatedKernel::new();
        let segment = Segment::create_in(kernel.clone(), 32).unwrap();
        let id = segment.id().unwrap();

        {
            let _attachment = segment.attach().unwrap();
            assert_eq!(kernel.stat(id).unwrap().attach_count, 1);
        }
        assert_eq!(kernel.stat(id).unwrap().attach_count, 0);
    }

    #[test]
    fn test_mapping_sees_stream_writes() {
        let kernel = SimulatedKernel::new();
        let mut segment = Segment::create_in(kernel, 16).unwrap();
        segment.write(b"mapped").unwrap();

        let attachment = segment.attach().unwrap();
        let view = unsafe { std::slice::from_raw_parts(attachment.as_ptr(), 6) };
        assert_eq!(view, b"mapped");
        attachment.detach().unwrap();
    }
}
