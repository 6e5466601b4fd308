//! Arena layout tags and client type identifiers.
//!
//! Defines the magic bytes written at the start of every arena, the
//! `ClientType` tag carried by each connection, and the compile-time layout
//! hash that keeps processes built from incompatible layouts apart.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

/// Magic bytes identifying a valid nscontrol arena: `"NSCTRL\0\0"`.
pub const ARENA_MAGIC: [u8; 8] = *b"NSCTRL\0\0";

/// Coarse category of an attached process.
///
/// A broadcast on the command channel is never delivered to connections of
/// the sender's own category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ClientType {
    /// The simulation engine owning the published state.
    Engine = 0,
    /// Interactive command console.
    Console = 1,
    /// Any other external controller.
    External = 2,
}

const_assert_eq!(core::mem::size_of::<ClientType>(), 1);

impl ClientType {
    /// Convert from raw `u8` value. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Engine),
            1 => Some(Self::Console),
            2 => Some(Self::External),
            _ => None,
        }
    }

    /// Lowercase name, as used in configuration and on the command line.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Engine => "engine",
            Self::Console => "console",
            Self::External => "external",
        }
    }
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "engine" => Ok(Self::Engine),
            "console" => Ok(Self::Console),
            "external" => Ok(Self::External),
            other => Err(format!("unknown client type '{other}'")),
        }
    }
}

/// Compile-time version hash for arena layout compatibility detection.
///
/// Computes a hash from `size_of::<T>()` and `align_of::<T>()`.
/// If the arena root layout changes, the hash changes, and openers
/// refuse to attach.
///
/// **Known limitation**: Does not detect field reordering within the
/// same total size/alignment.
pub const fn struct_version_hash<T>() -> u32 {
    let size = core::mem::size_of::<T>() as u32;
    let align = core::mem::align_of::<T>() as u32;
    size.wrapping_mul(0x9E3779B9) ^ align.wrapping_mul(0x517CC1B7)
}
