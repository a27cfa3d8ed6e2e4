//! # System V Shared Memory Segments
//!
//! Stream-style access to System V shared memory. A [`Segment`] wraps a kernel
//! segment id and a cursor, and exposes bounded sequential reads and writes
//! plus seeking, without the caller attaching and detaching for every
//! transfer.
//!
//! ## Features
//!
//! - **Lifecycle**: create, open by id or key, destroy
//! - **Bounded I/O**: transfers are clamped to the segment and never grow it
//! - **std::io integration**: `Segment` implements `Read`, `Write` and `Seek`
//! - **Direct mapping**: [`Attachment`] hands out the mapped address for
//!   libraries that want a raw pointer
//! - **Pluggable kernel**: [`ShmKernel`] with a real [`SysV`] backend and an
//!   in-process [`SimulatedKernel`]
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │   Process A     │    │  Kernel segment │    │   Process B     │
//! │                 │    │                 │    │                 │
//! │ Segment(cursor) ├───►│   shmid, size   │◄───┤ Segment(cursor) │
//! │                 │    │                 │    │                 │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//!          │                      ▲
//!          │ attach()             │ shmdt on detach/drop
//!          ▼                      │
//! ┌─────────────────┐             │
//! │   Attachment    ├─────────────┘
//! └─────────────────┘
//! ```
//!
//! ## Usage Patterns
//!
//! ### Write, rewind, read back
//!
//! ```rust,no_run
//! use shmtool_shared_memory::{Segment, ShmResult};
//!
//! # fn main() -> ShmResult<()> {
//! let mut segment = Segment::create(4096)?;
//! segment.write(b"temperature: 25.5")?;
//! segment.reset();
//!
//! let mut buf = [0u8; 17];
//! let n = segment.read(&mut buf)?;
//! assert_eq!(&buf[..n], b"temperature: 25.5");
//!
//! segment.destroy()?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Streaming with std::io
//!
//! ```rust,no_run
//! use shmtool_shared_memory::{Segment, ShmId};
//! use std::io::{self, Seek, SeekFrom};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut segment = Segment::open(ShmId::from_raw(32769))?;
//! segment.seek(SeekFrom::End(-512))?;
//! io::copy(&mut segment, &mut io::stdout())?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Testing without the host kernel
//!
//! ```rust
//! use shmtool_shared_memory::{Segment, SimulatedKernel};
//!
//! let kernel = SimulatedKernel::new();
//! let mut writer = Segment::create_in(kernel.clone(), 64).unwrap();
//! let mut reader = Segment::open_in(kernel, writer.id().unwrap()).unwrap();
//!
//! writer.write(b"shared").unwrap();
//! let mut buf = [0u8; 6];
//! reader.read(&mut buf).unwrap();
//! assert_eq!(&buf, b"shared");
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, ShmError>`. End-of-stream is `Ok(0)`:
//!
//! ```rust,no_run
//! use shmtool_shared_memory::{Segment, ShmError, ShmId};
//!
//! match Segment::open(ShmId::from_raw(7)) {
//!     Ok(segment) => println!("{} bytes", segment.size()),
//!     Err(ShmError::NotFound { id, source }) => {
//!         eprintln!("Segment {} not found: {}", id, source);
//!     }
//!     Err(e) => eprintln!("Unexpected error: {}", e),
//! }
//! ```
//!
//! ## Thread Safety
//!
//! - **Segment**: `Send`, cursor is unsynchronised - wrap in a mutex to share
//! - **Attachment**: neither `Send` nor `Sync`
//! - **SimulatedKernel**: thread-safe, clones share state
//!
//! Nothing here coordinates concurrent writers in different processes.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod attach;
pub mod error;
pub mod flags;
pub mod platform;
pub mod segment;

pub use attach::Attachment;
pub use error::{ControlCommand, ShmError, ShmResult};
pub use flags::ShmFlags;
pub use platform::{SegmentStat, ShmId, ShmKernel, ShmKey, SimulatedKernel, SysV};
pub use segment::{Segment, destroy_segment, destroy_segment_in};

pub use nix::sys::stat::Mode;

/// Initialize tracing for tests and small tools
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
