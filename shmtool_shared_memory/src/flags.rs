//! Segment creation flags and permission defaults.

use crate::error::{ShmError, ShmResult};
use bitflags::bitflags;
use nix::sys::stat::Mode;
use shmtool_common::consts::{DEFAULT_PERMISSIONS, PERMISSION_MASK};

bitflags! {
    /// Flags passed to `shmget(2)`.
    ///
    /// Combination rules:
    /// - An empty set looks up an existing segment.
    /// - `EXCLUSIVE`, `HUGE_PAGES` and `NO_RESERVE` only apply to creation and
    ///   are rejected without `CREATE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShmFlags: libc::c_int {
        /// Create the segment if it does not exist (`IPC_CREAT`).
        const CREATE     = libc::IPC_CREAT;
        /// Fail if the segment already exists (`IPC_EXCL`).
        const EXCLUSIVE  = libc::IPC_EXCL;
        /// Back the segment with huge pages (`SHM_HUGETLB`).
        const HUGE_PAGES = libc::SHM_HUGETLB;
        /// Do not reserve swap space (`SHM_NORESERVE`).
        const NO_RESERVE = libc::SHM_NORESERVE;
    }
}

impl ShmFlags {
    /// Lookup only.
    pub const NONE: Self = Self::empty();

    /// Flags used by [`Segment::create`](crate::Segment::create).
    pub const CREATE_EXCLUSIVE: Self =
        Self::from_bits_truncate(Self::CREATE.bits() | Self::EXCLUSIVE.bits());

    const CREATION_ONLY: Self = Self::from_bits_truncate(
        Self::EXCLUSIVE.bits() | Self::HUGE_PAGES.bits() | Self::NO_RESERVE.bits(),
    );

    /// True if these flags ask the kernel to create a segment.
    #[inline]
    pub const fn creates(&self) -> bool {
        self.contains(Self::CREATE)
    }

    /// Check the combination rules.
    pub fn validate(&self) -> ShmResult<()> {
        if !self.creates() && self.intersects(Self::CREATION_ONLY) {
            return Err(ShmError::InvalidFlags { flags: *self });
        }
        Ok(())
    }
}

impl Default for ShmFlags {
    fn default() -> Self {
        Self::NONE
    }
}

/// Permissions actually handed to the kernel.
///
/// Bits outside `0o777` are dropped. Creating with no permission bits would
/// produce a segment nobody can attach, so it falls back to owner read/write.
pub fn effective_mode(flags: ShmFlags, perm: Mode) -> Mode {
    let perm = Mode::from_bits_truncate(perm.bits() & PERMISSION_MASK as libc::mode_t);

    if perm.is_empty() && flags.creates() {
        Mode::from_bits_truncate(DEFAULT_PERMISSIONS as libc::mode_t)
    } else {
        perm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_values_match_kernel() {
        assert_eq!(ShmFlags::CREATE.bits(), libc::IPC_CREAT);
        assert_eq!(ShmFlags::EXCLUSIVE.bits(), libc::IPC_EXCL);
        assert_eq!(
            ShmFlags::CREATE_EXCLUSIVE,
            ShmFlags::CREATE | ShmFlags::EXCLUSIVE
        );
        assert_eq!(ShmFlags::default(), ShmFlags::NONE);
    }

    #[test]
    fn test_flag_validation() {
        assert!(ShmFlags::NONE.validate().is_ok());
        assert!(ShmFlags::CREATE.validate().is_ok());
        assert!(
            (ShmFlags::CREATE_EXCLUSIVE | ShmFlags::HUGE_PAGES | ShmFlags::NO_RESERVE)
                .validate()
                .is_ok()
        );

        for flags in [
            ShmFlags::EXCLUSIVE,
            ShmFlags::HUGE_PAGES,
            ShmFlags::NO_RESERVE,
        ] {
            assert!(matches!(
                flags.validate(),
                Err(ShmError::InvalidFlags { .. })
            ));
        }
    }

    #[test]
    fn test_effective_mode_defaults() {
        let owner_rw = Mode::S_IRUSR | Mode::S_IWUSR;

        assert_eq!(effective_mode(ShmFlags::CREATE, Mode::empty()), owner_rw);
        assert_eq!(effective_mode(ShmFlags::NONE, Mode::empty()), Mode::empty());

        let group_read = owner_rw | Mode::S_IRGRP;
        assert_eq!(effective_mode(ShmFlags::CREATE, group_read), group_read);
    }

    #[test]
    fn test_effective_mode_masks_special_bits() {
        let mode = effective_mode(ShmFlags::CREATE, Mode::S_ISUID | Mode::S_IRUSR);
        assert_eq!(mode, Mode::S_IRUSR);
    }
}
