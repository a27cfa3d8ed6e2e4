//! # shmtool
//!
//! Command line utility for creating, filling, reading and removing System V
//! shared memory segments.
//!
//! # Usage
//!
//! ```bash
//! # Create a 64 KiB segment, print its id and fill it from stdin
//! echo "hello" | shmtool open -s 65536
//!
//! # Write into an existing segment starting at byte 128
//! cat data.bin | shmtool open 32769 -o 128
//!
//! # Dump 16 bytes from offset 4
//! shmtool read 32769 -s 16 -o 4 | xxd
//!
//! # Kernel status as JSON, then remove
//! shmtool info 32769 --json
//! shmtool rm 32769
//!
//! # Verbose logging
//! shmtool -L debug read 32769
//! ```

#![deny(warnings)]

mod commands;

use clap::{Parser, Subcommand};
use shmtool_common::config::{LogLevel, ShmtoolConfig};
use shmtool_common::consts::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, LOG_LEVEL_ENV};
use shmtool_shared_memory::{Segment, ShmId, SysV, destroy_segment};
use std::io;
use std::path::PathBuf;
use tracing::{Level, debug, error};
use tracing_subscriber::EnvFilter;

/// shmtool - inspect and move data through System V shared memory
#[derive(Parser, Debug)]
#[command(name = "shmtool")]
#[command(version)]
#[command(about = "Utility for interacting with System V shared memory segments")]
#[command(long_about = None)]
struct Args {
    /// Logging level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, global = true, env = LOG_LEVEL_ENV)]
    log_level: Option<LogLevel>,

    /// Path to configuration file
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open or create a segment, print its id and copy stdin into it
    Open {
        /// Existing segment id; a new segment is created when omitted
        #[arg(value_parser = clap::value_parser!(i32).range(0..))]
        id: Option<i32>,

        /// Size of the segment to create
        #[arg(short, long)]
        size: Option<usize>,

        /// Byte offset to start writing at
        #[arg(short, long, default_value_t = 0)]
        offset: u64,

        /// Derive a System V key from this path instead of a private segment
        #[arg(short, long, value_name = "PATH")]
        key_file: Option<PathBuf>,
    },

    /// Copy bytes from a segment to stdout
    Read {
        /// Segment id
        #[arg(value_parser = clap::value_parser!(i32).range(0..))]
        id: i32,

        /// Number of bytes to read; 0 reads the whole segment
        #[arg(short, long, default_value_t = 0)]
        size: usize,

        /// Byte offset to start reading at
        #[arg(short, long, default_value_t = 0)]
        offset: u64,
    },

    /// Mark a segment for removal
    Rm {
        /// Segment id
        #[arg(value_parser = clap::value_parser!(i32).range(0..))]
        id: i32,
    },

    /// Show kernel status of a segment
    Info {
        /// Segment id
        #[arg(value_parser = clap::value_parser!(i32).range(0..))]
        id: i32,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pin a segment's pages in memory
    Lock {
        /// Segment id
        #[arg(value_parser = clap::value_parser!(i32).range(0..))]
        id: i32,
    },

    /// Release a previously locked segment
    Unlock {
        /// Segment id
        #[arg(value_parser = clap::value_parser!(i32).range(0..))]
        id: i32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Tracing comes up before the config is checked so load errors are logged
    let config = load_config(&args);
    let level = resolve_level(
        args.log_level,
        config.as_ref().ok().map(|c| c.shared.log_level),
    );
    setup_tracing(level, args.log_json);
    let config = config?;

    let stdout = io::stdout();
    match args.command {
        Command::Open {
            id,
            size,
            offset,
            key_file,
        } => {
            let target = commands::resolve_target(
                id.map(ShmId::from_raw),
                size,
                key_file.as_deref(),
                config.segment.key_proj_id,
            )?;
            let mut segment = commands::open_target(SysV, target, &config.segment)?;
            commands::open(&mut segment, offset, io::stdin().lock(), &mut stdout.lock())?;
        }
        Command::Read { id, size, offset } => {
            let mut segment = Segment::open(ShmId::from_raw(id))?;
            commands::read(&mut segment, size, offset, &mut stdout.lock())?;
        }
        Command::Rm { id } => {
            destroy_segment(ShmId::from_raw(id))?;
        }
        Command::Info { id, json } => {
            let id = ShmId::from_raw(id);
            let stat = Segment::open(id)?.stat()?;
            commands::info(id, &stat, json, &mut stdout.lock())?;
        }
        Command::Lock { id } => commands::set_locked(SysV, ShmId::from_raw(id), true)?,
        Command::Unlock { id } => commands::set_locked(SysV, ShmId::from_raw(id), false)?,
    }

    Ok(())
}

/// Load and validate the configuration file.
///
/// An explicit `--config` path must exist; the default path is optional.
fn load_config(args: &Args) -> Result<ShmtoolConfig, Box<dyn std::error::Error>> {
    let (path, required) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    let config = ShmtoolConfig::load_or_default(&path, required)
        .map_err(|e| format!("config {}: {}", path.display(), e))?;
    config
        .validate()
        .map_err(|e| format!("config {}: {}", path.display(), e))?;
    Ok(config)
}

/// Command line wins over the config file, which wins over the default.
fn resolve_level(cli: Option<LogLevel>, config: Option<LogLevel>) -> LogLevel {
    cli.or(config).unwrap_or_default()
}

fn to_tracing_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

fn setup_tracing(level: LogLevel, json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(to_tracing_level(level).into());

    // stdout carries segment ids and data, so logs go to stderr
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
    debug!("Log level: {}", level);
}
