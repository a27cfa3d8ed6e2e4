//! Configuration loading traits and types.
//!
//! The `shmtool` binary reads an optional TOML file carrying the log level and
//! the defaults applied when a segment is created.
//!
//! # Usage
//!
//! ```rust,no_run
//! use shmtool_common::config::{ConfigError, ConfigLoader, ShmtoolConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = ShmtoolConfig::load(Path::new("shmtool.toml"))?;
//!     config.validate()?;
//!     println!("Permissions: {:o}", config.segment.permission_bits()?);
//!     Ok(())
//! }
//! ```

use crate::consts::{DEFAULT_PERMISSIONS, IPC_KEY_PROJID, PERMISSION_MASK};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility, and parses the same
/// spellings from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Lowercase name, usable as a `tracing` filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::ParseError(format!(
                "invalid log level '{other}'"
            ))),
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Defaults applied when the tool creates a new segment.
///
/// # TOML Example
///
/// ```toml
/// [segment]
/// permissions = "640"
/// huge_pages = false
/// no_reserve = true
/// key_proj_id = 66
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Octal permission bits (`"600"`, `"0640"`, `"0o660"`).
    pub permissions: String,
    /// Request huge-page backing (`SHM_HUGETLB`).
    pub huge_pages: bool,
    /// Skip swap reservation (`SHM_NORESERVE`).
    pub no_reserve: bool,
    /// Project id for `ftok(3)` key derivation.
    pub key_proj_id: i32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            permissions: format!("{DEFAULT_PERMISSIONS:o}"),
            huge_pages: false,
            no_reserve: false,
            key_proj_id: IPC_KEY_PROJID,
        }
    }
}

impl SegmentConfig {
    /// Parse `permissions` into mode bits.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the string is not octal or
    /// sets bits outside `0o777`.
    pub fn permission_bits(&self) -> Result<u32, ConfigError> {
        let raw = self.permissions.trim();
        let digits = raw.strip_prefix("0o").unwrap_or(raw);

        let bits = u32::from_str_radix(digits, 8).map_err(|_| {
            ConfigError::ValidationError(format!("permissions '{raw}' is not an octal mode"))
        })?;

        if bits & !PERMISSION_MASK != 0 {
            return Err(ConfigError::ValidationError(format!(
                "permissions {bits:o} exceed {PERMISSION_MASK:o}"
            )));
        }
        Ok(bits)
    }
}

/// Top-level configuration file of the `shmtool` binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShmtoolConfig {
    /// Shared settings.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Segment creation defaults.
    #[serde(default)]
    pub segment: SegmentConfig,
}

impl ShmtoolConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `segment.permissions` is not a valid octal mode
    /// - `segment.key_proj_id` is outside `1..=255`
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.segment.permission_bits()?;

        if !(1..=0xff).contains(&self.segment.key_proj_id) {
            return Err(ConfigError::ValidationError(format!(
                "key_proj_id {} must be in 1..=255",
                self.segment.key_proj_id
            )));
        }
        Ok(())
    }

    /// Load from `path`, falling back to defaults when the file is absent
    /// and `required` is false.
    pub fn load_or_default(path: &Path, required: bool) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::FileNotFound) if !required => Ok(Self::default()),
            other => other,
        }
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_display_matches_parse() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            assert_eq!(level.to_string(), level.as_str());
            assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" info ".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!(matches!(
            "loud".parse::<LogLevel>(),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"warn\"")
                .unwrap()
                .level,
            LogLevel::Warn
        );
        assert!(toml::from_str::<TestWrapper>("level = \"verbose\"").is_err());
    }

    #[test]
    fn test_permission_bits() {
        let mut segment = SegmentConfig::default();
        assert_eq!(segment.permission_bits().unwrap(), 0o600);

        segment.permissions = "0640".to_string();
        assert_eq!(segment.permission_bits().unwrap(), 0o640);

        segment.permissions = "0o660".to_string();
        assert_eq!(segment.permission_bits().unwrap(), 0o660);

        segment.permissions = "689".to_string();
        assert!(matches!(
            segment.permission_bits(),
            Err(ConfigError::ValidationError(_))
        ));

        segment.permissions = "1777".to_string();
        assert!(segment.permission_bits().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_proj_id() {
        let mut config = ShmtoolConfig::default();
        assert!(config.validate().is_ok());

        config.segment.key_proj_id = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        config.segment.key_proj_id = 256;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let path = Path::new("/nonexistent/shmtool.toml");

        let config = ShmtoolConfig::load_or_default(path, false).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Info);

        assert!(matches!(
            ShmtoolConfig::load_or_default(path, true),
            Err(ConfigError::FileNotFound)
        ));
    }
}
