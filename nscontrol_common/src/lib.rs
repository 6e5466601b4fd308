//! nscontrol Common Library
//!
//! This crate provides shared constants, arena layout tags and configuration
//! loading utilities for all nscontrol workspace crates.
//!
//! # Module Structure
//!
//! - [`shm`] - Arena constants, client type tags and layout hashing
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! nscontrol_common = { path = "../nscontrol_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use nscontrol_common::shm::consts::*;
//! use nscontrol_common::config::{ConfigLoader, SegmentConfig};
//! ```

pub mod config;
pub mod prelude;
pub mod shm;
