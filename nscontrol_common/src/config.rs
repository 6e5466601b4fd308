//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! across all nscontrol applications.
//!
//! # Usage
//!
//! ```rust,no_run
//! use nscontrol_common::config::{ConfigLoader, ConfigError, NsControlConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = NsControlConfig::load(Path::new("nscontrol.toml"))?;
//!     config.validate()?;
//!     println!("Arena: {}", config.segment.name);
//!     Ok(())
//! }
//! ```

use crate::shm::consts::{ARENA_CAPACITY, ARENA_NAME, ATTACH_TIMEOUT_MS, SHM_DIR, SHM_MAX_SIZE, SHM_MIN_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
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
/// Uses lowercase serde values for TOML compatibility.
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
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across all nscontrol applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "nscontrol-console"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Location and size of the shared arena.
///
/// Every field has a default, so an empty `[segment]` table (or none at all)
/// selects the well-known arena.
///
/// # TOML Example
///
/// ```toml
/// [segment]
/// name = "nscontrol"
/// capacity = 4194304
/// directory = "/dev/shm"
/// attach_timeout_ms = 2000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Arena name, shared by every process that wants to rendezvous.
    pub name: String,
    /// Total arena capacity in bytes; only used by the creating process.
    pub capacity: usize,
    /// Directory holding the named region.
    pub directory: PathBuf,
    /// How long an opener waits for the creator to finish initialization.
    pub attach_timeout_ms: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            name: ARENA_NAME.to_string(),
            capacity: ARENA_CAPACITY,
            directory: PathBuf::from(SHM_DIR),
            attach_timeout_ms: ATTACH_TIMEOUT_MS,
        }
    }
}

impl SegmentConfig {
    /// Default configuration with a different arena name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Full path of the named region.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `name` is empty or contains characters other than `[A-Za-z0-9_.-]`
    /// - `capacity` is outside `SHM_MIN_SIZE..=SHM_MAX_SIZE` or not page-aligned
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "segment name cannot be empty".to_string(),
            ));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(ConfigError::ValidationError(format!(
                "segment name '{}' contains invalid characters",
                self.name
            )));
        }
        if self.capacity < SHM_MIN_SIZE
            || self.capacity > SHM_MAX_SIZE
            || self.capacity % SHM_MIN_SIZE != 0
        {
            return Err(ConfigError::ValidationError(format!(
                "segment capacity {} must be page-aligned and within {}..={}",
                self.capacity, SHM_MIN_SIZE, SHM_MAX_SIZE
            )));
        }
        Ok(())
    }
}

/// Top-level configuration file of an nscontrol process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NsControlConfig {
    /// Logging and service identity.
    pub shared: SharedConfig,
    /// Arena location.
    #[serde(default)]
    pub segment: SegmentConfig,
}

impl NsControlConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.segment.validate()
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
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        let parse = |s: &str| toml::from_str::<TestWrapper>(s).unwrap().level;
        assert_eq!(parse("level = \"trace\""), LogLevel::Trace);
        assert_eq!(parse("level = \"debug\""), LogLevel::Debug);
        assert_eq!(parse("level = \"error\""), LogLevel::Error);
    }

    #[test]
    fn test_segment_defaults() {
        let config = SegmentConfig::default();
        assert_eq!(config.name, ARENA_NAME);
        assert_eq!(config.capacity, ARENA_CAPACITY);
        assert_eq!(config.path(), PathBuf::from("/dev/shm/nscontrol"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_segment_validation_rejects_bad_names() {
        assert!(SegmentConfig::named("").validate().is_err());
        assert!(SegmentConfig::named("../etc").validate().is_err());
        assert!(SegmentConfig::named("has space").validate().is_err());
        assert!(SegmentConfig::named("ok_name-1.2").validate().is_ok());
    }

    #[test]
    fn test_segment_validation_rejects_bad_capacity() {
        let mut config = SegmentConfig::default();
        config.capacity = 1024;
        assert!(config.validate().is_err());
        config.capacity = SHM_MIN_SIZE + 1;
        assert!(config.validate().is_err());
        config.capacity = SHM_MIN_SIZE * 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
