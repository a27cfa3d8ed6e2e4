//! Subcommand implementations.
//!
//! Each command works on any [`ShmKernel`] and on caller-supplied streams so
//! the binary wires in `SysV`, stdin and stdout while tests use the
//! simulated kernel and in-memory buffers.

use shmtool_common::config::SegmentConfig;
use shmtool_shared_memory::{
    Mode, Segment, SegmentStat, ShmFlags, ShmId, ShmKernel, ShmKey, ShmResult,
};
use std::error::Error;
use std::io::{self, Read, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// How `open` finds its segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Existing segment by id.
    Id(ShmId),
    /// New private segment of the given size.
    Create(usize),
    /// Segment derived from a key; created when `size` is non-zero.
    Keyed { key: ShmKey, size: usize },
}

/// Resolve `open` arguments.
///
/// An explicit id wins; otherwise a key file or a non-zero size is required.
pub fn resolve_target(
    id: Option<ShmId>,
    size: Option<usize>,
    key_file: Option<&Path>,
    proj_id: i32,
) -> Result<Target, Box<dyn Error>> {
    if let Some(id) = id {
        return Ok(Target::Id(id));
    }

    let size = size.unwrap_or(0);
    if let Some(path) = key_file {
        let key = ShmKey::from_path(path, proj_id)?;
        return Ok(Target::Keyed { key, size });
    }

    if size == 0 {
        return Err("Must specify a segment size".into());
    }
    Ok(Target::Create(size))
}

/// Flags and permissions for creating a segment under `config`.
pub fn creation_options(
    config: &SegmentConfig,
    exclusive: bool,
) -> Result<(ShmFlags, Mode), Box<dyn Error>> {
    let mut flags = if exclusive {
        ShmFlags::CREATE_EXCLUSIVE
    } else {
        ShmFlags::CREATE
    };
    if config.huge_pages {
        flags |= ShmFlags::HUGE_PAGES;
    }
    if config.no_reserve {
        flags |= ShmFlags::NO_RESERVE;
    }

    let perm = Mode::from_bits_truncate(config.permission_bits()? as _);
    Ok((flags, perm))
}

/// Open or create the segment `target` points at.
pub fn open_target<K: ShmKernel>(
    kernel: K,
    target: Target,
    config: &SegmentConfig,
) -> Result<Segment<K>, Box<dyn Error>> {
    let segment = match target {
        Target::Id(id) => Segment::open_in(kernel, id)?,
        Target::Create(size) => {
            let (flags, perm) = creation_options(config, true)?;
            Segment::open_segment_in(kernel, size, flags, perm)?
        }
        Target::Keyed { key, size: 0 } => {
            Segment::open_with_key_in(kernel, key, 0, ShmFlags::NONE, Mode::empty())?
        }
        Target::Keyed { key, size } => {
            let (flags, perm) = creation_options(config, false)?;
            Segment::open_with_key_in(kernel, key, size, flags, perm)?
        }
    };
    Ok(segment)
}

/// `open`: print the id, then copy `input` into the segment from `offset`.
pub fn open<K: ShmKernel, R: Read, W: Write>(
    segment: &mut Segment<K>,
    offset: u64,
    input: R,
    out: &mut W,
) -> Result<u64, Box<dyn Error>> {
    segment.seek(SeekFrom::Start(offset))?;

    let id = segment.id().ok_or("segment has no id")?;
    debug!(
        "Opened shared memory segment {}: size is {}, offset is {}",
        id,
        segment.size(),
        segment.position()
    );
    writeln!(out, "{}", id)?;
    out.flush()?;

    let written = fill_from(segment, input)?;
    info!("Wrote {} bytes to shared memory", written);
    Ok(written)
}

/// Copy `input` into the segment until either runs out.
///
/// A full segment ends the copy quietly; leftover input is discarded.
pub fn fill_from<K: ShmKernel, R: Read>(
    segment: &mut Segment<K>,
    mut input: R,
) -> io::Result<u64> {
    let mut buf = [0u8; 8192];
    let mut total = 0u64;

    while !segment.is_exhausted() {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        let mut chunk = &buf[..n];
        while !chunk.is_empty() {
            let written = segment.write(chunk)?;
            if written == 0 {
                warn!("Segment is full, discarding remaining input");
                return Ok(total);
            }
            total += written as u64;
            chunk = &chunk[written..];
        }
    }
    Ok(total)
}

/// `read`: copy up to `size` bytes from `offset` to `out`.
///
/// A size of zero, or one larger than the segment, means the whole segment.
pub fn read<K: ShmKernel, W: Write>(
    segment: &mut Segment<K>,
    size: usize,
    offset: u64,
    out: &mut W,
) -> Result<u64, Box<dyn Error>> {
    let read_size = if size == 0 || size > segment.size() {
        segment.size()
    } else {
        size
    };
    segment.seek(SeekFrom::Start(offset))?;

    debug!(
        "Opened shared memory segment: size is {}, offset is {}",
        segment.size(),
        segment.position()
    );
    debug!("Reading {} bytes...", read_size);

    let copied = io::copy(&mut Read::take(&mut *segment, read_size as u64), out)?;
    out.flush()?;

    if copied < read_size as u64 {
        warn!("Reached end of segment after {} of {} bytes", copied, read_size);
    }
    info!("Read {} bytes from shared memory", copied);
    Ok(copied)
}

/// `info`: print kernel status, as JSON when `json` is set.
pub fn info<W: Write>(
    id: ShmId,
    stat: &SegmentStat,
    json: bool,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    if json {
        serde_json::to_writer_pretty(&mut *out, stat)?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "id:             {}", id)?;
    writeln!(out, "size:           {}", stat.size)?;
    writeln!(out, "attached:       {}", stat.attach_count)?;
    writeln!(out, "mode:           {:o}", stat.mode)?;
    writeln!(out, "owner:          {}:{}", stat.uid, stat.gid)?;
    writeln!(out, "creator pid:    {}", stat.creator_pid)?;
    writeln!(out, "last pid:       {}", stat.last_pid)?;
    writeln!(out, "locked:         {}", stat.locked)?;
    writeln!(out, "pending remove: {}", stat.marked_for_removal)?;
    Ok(())
}

/// Open `id` and pin or release its pages.
pub fn set_locked<K: ShmKernel>(kernel: K, id: ShmId, locked: bool) -> ShmResult<()> {
    let segment = Segment::open_in(kernel, id)?;
    if locked {
        segment.lock()?;
        info!("Locked segment {}", id);
    } else {
        segment.unlock()?;
        info!("Unlocked segment {}", id);
    }
    Ok(())
}
