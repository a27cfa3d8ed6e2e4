//! Error types for shared memory operations

use crate::flags::ShmFlags;
use crate::platform::ShmId;
use nix::errno::Errno;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// `shmctl(2)` commands that can fail on an existing segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Mark for removal (`IPC_RMID`)
    Remove,
    /// Pin pages in memory (`SHM_LOCK`)
    Lock,
    /// Release pinned pages (`SHM_UNLOCK`)
    Unlock,
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControlCommand::Remove => "IPC_RMID",
            ControlCommand::Lock => "SHM_LOCK",
            ControlCommand::Unlock => "SHM_UNLOCK",
        })
    }
}

/// Errors that can occur during shared memory operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// The kernel refused to allocate or look up a segment
    #[error("Failed to allocate {size} byte segment: {source}")]
    Allocation {
        /// Requested size in bytes
        size: usize,
        /// Kernel status
        source: Errno,
    },

    /// Segment id does not exist or is not accessible
    #[error("Segment not found: {id}: {source}")]
    NotFound {
        /// Segment id
        id: ShmId,
        /// Kernel status
        source: Errno,
    },

    /// Mapping the segment into this process failed
    #[error("Failed to attach segment {id}: {source}")]
    Attach {
        /// Segment id
        id: ShmId,
        /// Kernel status
        source: Errno,
    },

    /// Unmapping an attached address failed
    #[error("Failed to detach address {address:#x}: {source}")]
    Detach {
        /// Base address that was being detached
        address: usize,
        /// Kernel status
        source: Errno,
    },

    /// Kernel read or write failed
    #[error("I/O error on segment {id} at offset {offset} ({length} bytes): {source}")]
    Io {
        /// Segment id
        id: ShmId,
        /// Offset of the transfer
        offset: u64,
        /// Length of the transfer
        length: usize,
        /// Kernel status
        source: Errno,
    },

    /// Seek would move the cursor before the start of the segment
    #[error("Cannot seek {offset} bytes from position {base}: position before start of segment")]
    InvalidSeek {
        /// Position the seek was relative to
        base: u64,
        /// Requested displacement
        offset: i64,
    },

    /// The segment value has no backing kernel segment
    #[error("Cannot access shared memory segment: no segment id set")]
    NotAttached,

    /// Flag combination rejected before reaching the kernel
    #[error("Invalid flag combination: {flags:?} (requires CREATE)")]
    InvalidFlags {
        /// Offending flags
        flags: ShmFlags,
    },

    /// Random-access range does not fit in the segment
    #[error("Range {start}..{end} is outside segment of {size} bytes")]
    OutOfBounds {
        /// Range start
        start: u64,
        /// Range end (exclusive)
        end: u64,
        /// Segment size
        size: usize,
    },

    /// `shmctl(2)` command failed
    #[error("{command} failed on segment {id}: {source}")]
    Control {
        /// Segment id
        id: ShmId,
        /// Command issued
        command: ControlCommand,
        /// Kernel status
        source: Errno,
    },

    /// `ftok(3)` could not derive a key from a path
    #[error("Failed to derive key from {}: {source}", path.display())]
    KeyDerivation {
        /// Path handed to ftok
        path: PathBuf,
        /// Kernel status
        source: Errno,
    },
}

impl ShmError {
    /// Kernel status behind this error, if one exists.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            ShmError::Allocation { source, .. }
            | ShmError::NotFound { source, .. }
            | ShmError::Attach { source, .. }
            | ShmError::Detach { source, .. }
            | ShmError::Io { source, .. }
            | ShmError::Control { source, .. }
            | ShmError::KeyDerivation { source, .. } => Some(*source),
            ShmError::InvalidSeek { .. }
            | ShmError::NotAttached
            | ShmError::InvalidFlags { .. }
            | ShmError::OutOfBounds { .. } => None,
        }
    }
}

impl From<ShmError> for io::Error {
    fn from(err: ShmError) -> Self {
        let kind = match &err {
            ShmError::NotFound { .. } => io::ErrorKind::NotFound,
            ShmError::NotAttached => io::ErrorKind::NotConnected,
            ShmError::InvalidSeek { .. }
            | ShmError::InvalidFlags { .. }
            | ShmError::OutOfBounds { .. } => io::ErrorKind::InvalidInput,
            other => other
                .errno()
                .map(|errno| io::Error::from(errno).kind())
                .unwrap_or(io::ErrorKind::Other),
        };
        io::Error::new(kind, err)
    }
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_kinds() {
        let err: io::Error = ShmError::NotAttached.into();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        let err: io::Error = ShmError::InvalidSeek {
            base: 0,
            offset: -1,
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err: io::Error = ShmError::NotFound {
            id: ShmId::from_raw(7),
            source: Errno::EINVAL,
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err: io::Error = ShmError::Attach {
            id: ShmId::from_raw(7),
            source: Errno::EACCES,
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_io_error_keeps_inner() {
        let err: io::Error = ShmError::Io {
            id: ShmId::from_raw(3),
            offset: 16,
            length: 4,
            source: Errno::EFAULT,
        }
        .into();

        let inner = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<ShmError>())
            .unwrap();
        assert!(matches!(inner, ShmError::Io { offset: 16, .. }));
        assert_eq!(inner.errno(), Some(Errno::EFAULT));
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = ShmError::Io {
            id: ShmId::from_raw(42),
            offset: 128,
            length: 64,
            source: Errno::EINVAL,
        };
        let message = err.to_string();
        assert!(message.contains("42"));
        assert!(message.contains("128"));
        assert!(message.contains("64"));

        let err = ShmError::Control {
            id: ShmId::from_raw(1),
            command: ControlCommand::Lock,
            source: Errno::EPERM,
        };
        assert!(err.to_string().starts_with("SHM_LOCK failed"));
    }
}
