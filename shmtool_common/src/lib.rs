//! shmtool Common Library
//!
//! Shared constants and configuration loading utilities for the shmtool
//! workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Permission defaults, key derivation and path constants
//! - [`config`] - Configuration loading traits and types
//!
//! # Usage
//!
//! ```rust
//! use shmtool_common::consts::DEFAULT_PERMISSIONS;
//! use shmtool_common::config::{ConfigLoader, ShmtoolConfig};
//! ```

pub mod config;
pub mod consts;
