//! Error types for shared memory operations

use nix::errno::Errno;
use nscontrol_common::config::ConfigError;
use thiserror::Error;

/// Errors that can occur during shared memory operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// Arena not found
    #[error("Arena not found: {name}")]
    NotFound {
        /// Arena name
        name: String,
    },

    /// Invalid arena size
    #[error("Invalid arena size: {size} bytes (must be page-aligned, 4KB-1GB, and hold the arena root)")]
    InvalidSize {
        /// Attempted size in bytes
        size: usize,
    },

    /// Permission denied
    #[error("Permission denied accessing arena: {name}")]
    PermissionDenied {
        /// Arena name
        name: String,
    },

    /// The arena was created by a build with a different layout
    #[error("Arena layout mismatch: expected {expected:#x}, found {found:#x}")]
    LayoutMismatch {
        /// Layout hash of this build
        expected: u32,
        /// Layout hash stored in the arena
        found: u32,
    },

    /// Another process created the arena but never finished initializing it
    #[error("Timed out waiting for arena initialization: {name}")]
    InitTimeout {
        /// Arena name
        name: String,
    },

    /// The arena allocator has no block large enough
    #[error("Arena out of memory: requested {requested} bytes, {free} bytes free")]
    OutOfMemory {
        /// Requested allocation size in bytes
        requested: usize,
        /// Free bytes remaining in the arena
        free: usize,
    },

    /// The connection registry has no free entry
    #[error("Connection registry full ({capacity} entries)")]
    RegistryFull {
        /// Registry capacity
        capacity: usize,
    },

    /// A process-shared lock operation failed
    #[error("Lock '{lock}' failed: {source}")]
    Lock {
        /// Name of the lock
        lock: &'static str,
        /// Error code returned by the pthread call
        source: Errno,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },

    /// Invalid configuration
    #[error("Configuration error: {source}")]
    Config {
        /// Source configuration error
        #[from]
        source: ConfigError,
    },
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;
