//! Shared memory subsystem definitions.
//!
//! This module contains:
//! - `consts`: Arena name, capacity limits and channel dimensions.
//! - `layout`: Arena magic, client type tags and layout hashing.

pub mod consts;
pub mod layout;
