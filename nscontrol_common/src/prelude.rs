//! Prelude module for common re-exports.
//!
//! ```rust
//! use nscontrol_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, NsControlConfig, SegmentConfig, SharedConfig};

// ─── Arena constants ────────────────────────────────────────────────
pub use crate::shm::consts::{
    ARENA_CAPACITY, ARENA_NAME, COMMAND_QUEUE_DEPTH, MAX_CONNECTIONS, PAYLOAD_CAPACITY,
    RT_RING_SIZE,
};

// ─── Layout ─────────────────────────────────────────────────────────
pub use crate::shm::layout::{ARENA_MAGIC, ClientType, struct_version_hash};
