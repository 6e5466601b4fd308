//! # nscontrol
//!
//! Cross-process shared state for a planetarium renderer and the processes
//! that drive it. Every participant maps the same named shared-memory arena
//! and talks through a [`Control`] facade.
//!
//! ## Channels
//!
//! - **Command queues**: each connected client owns a bounded FIFO of
//!   100 commands. A write is copied to every other client of a different
//!   client type; a full queue drops its oldest entry.
//! - **Realtime ring**: one shared ring of 100 slots with its own reader
//!   and writer locks. A write to a full ring is dropped.
//! - **Dual state store**: six state records (observer, media, script,
//!   reference flags, settings, object flags) kept twice. Producers merge
//!   partial deltas into the write side; `publish` copies the whole write
//!   side to the read side at once; consumers copy snapshots out of the
//!   read side.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Engine         │    ┌──────────────────────┐  │  Console        │
//! │                 │    │  /dev/shm/nscontrol  │  │                 │
//! │  ShmControl     ├───►│                      │◄─┤  ShmControl     │
//! │                 │    │ Root | Locks | Heap  │  │                 │
//! └─────────────────┘    │ Registry  Ring  State│  └─────────────────┘
//!                        └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nscontrol::{Control, ObserverDelta, connect_or_null};
//! use nscontrol_common::config::SegmentConfig;
//! use nscontrol_common::shm::layout::ClientType;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let control = connect_or_null(&SegmentConfig::default(), ClientType::Engine);
//! control.connect()?;
//!
//! control.set_observer(&ObserverDelta {
//!     latitude: Some(45.0),
//!     ..Default::default()
//! })?;
//! control.publish()?;
//!
//! while let Some(command) = control.read()? {
//!     println!("command: {}", command.to_text());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! If the arena cannot be created or attached, [`connect_or_null`] logs a
//! warning and returns a [`NullControl`], so callers never need to check
//! availability.
//!
//! ## Locking
//!
//! Five process-shared mutexes live in the arena: `global` (registry,
//! heap, ring gap, reference count), `ring_reader`, `ring_writer`,
//! `state_write` and `state_read`. `global` is always taken last. A process
//! that dies while holding a lock leaves it held.

#![deny(missing_docs)]
#![warn(clippy::all)]

mod alloc;
pub mod arena;
pub mod control;
pub mod data;
pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod queue;
pub mod ring;
pub mod store;
pub mod sync;

pub use arena::{Arena, min_arena_size, validate_segment_size};
pub use control::{
    ArenaStats, Control, ControlGuard, NullControl, SharedControl, ShmControl, connect_or_null,
};
pub use data::*;
pub use error::{ShmError, ShmResult};
pub use lifecycle::{Attach, Release, remove_arena};
pub use queue::{ClientId, Command, ConnectionInfo};
pub use ring::RT_RING_CAPACITY;
pub use store::{SharedText, Side, StateSet};

use nscontrol_common::config::LogLevel;
use tracing_subscriber::EnvFilter;

/// Log filter for a configured level. `RUST_LOG` takes precedence.
pub fn log_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_directive()))
}

/// Install a `tracing` subscriber for small tools and tests.
///
/// Calling this more than once is harmless.
pub fn init_tracing(level: LogLevel) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(level))
        .with_test_writer()
        .try_init();
}
