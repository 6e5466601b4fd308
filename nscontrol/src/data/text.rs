//! Fixed-capacity values that can live inside the arena.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// NUL-padded UTF-8 text of at most `N` bytes.
///
/// An empty value has a zero first byte. Longer input is truncated on a
/// character boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct FixedStr<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> FixedStr<N> {
    /// Empty text.
    pub const EMPTY: Self = Self { bytes: [0; N] };

    /// Copy `s`, truncating to the capacity.
    pub fn new(s: &str) -> Self {
        let mut end = s.len().min(N);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; N];
        bytes[..end].copy_from_slice(&s.as_bytes()[..end]);
        Self { bytes }
    }

    /// Byte length up to the first NUL.
    pub fn len(&self) -> usize {
        self.bytes.iter().position(|&b| b == 0).unwrap_or(N)
    }

    /// True when the first byte is NUL.
    pub fn is_empty(&self) -> bool {
        N == 0 || self.bytes[0] == 0
    }

    /// Capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Text content. Invalid UTF-8 (only possible if another process wrote
    /// garbage) is cut at the first bad byte.
    pub fn as_str(&self) -> &str {
        let raw = &self.bytes[..self.len()];
        match std::str::from_utf8(raw) {
            Ok(s) => s,
            Err(e) => std::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl<const N: usize> From<&str> for FixedStr<N> {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> Serialize for FixedStr<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedStr<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

/// Three-state display switch.
///
/// `Unset` means "no opinion": the write side of the reference flags starts
/// there so the first publish does not force any flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Toggle {
    /// Disabled.
    #[default]
    Off = 0,
    /// Enabled.
    On = 1,
    /// No value requested.
    Unset = 0xFF,
}

impl Toggle {
    /// True only for `On`.
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<bool> for Toggle {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

/// Playback state of audio, video or a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PlayState {
    /// Nothing loaded or playback stopped.
    #[default]
    Stopped = 0,
    /// Playing.
    Playing = 1,
    /// Paused mid-way.
    Paused = 2,
    /// Recording (scripts only).
    Recording = 3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_str_roundtrip_and_truncation() {
        let s = FixedStr::<8>::new("Earth");
        assert_eq!(s.as_str(), "Earth");
        assert_eq!(s.len(), 5);

        let long = FixedStr::<4>::new("Jupiter");
        assert_eq!(long.as_str(), "Jupi");
        assert_eq!(long.len(), 4);
    }

    #[test]
    fn test_fixed_str_truncates_on_char_boundary() {
        // 'é' is two bytes; cutting at 4 would split it.
        let s = FixedStr::<4>::new("abcé");
        assert_eq!(s.as_str(), "abc");
    }

    #[test]
    fn test_fixed_str_empty_first_byte() {
        let s = FixedStr::<16>::default();
        assert!(s.is_empty());
        assert_eq!(s.as_str(), "");
        assert!(!FixedStr::<16>::new("x").is_empty());
    }

    #[test]
    fn test_toggle_from_bool() {
        assert_eq!(Toggle::from(true), Toggle::On);
        assert_eq!(Toggle::from(false), Toggle::Off);
        assert!(!Toggle::Unset.is_on());
    }
}
