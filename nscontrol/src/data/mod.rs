//! State records shared through the dual state store.
//!
//! Each category comes as a pair: the persistent record stored (twice) in
//! the arena, and a delta type in which every field is optional. A merge
//! copies only the fields a delta actually sets, so independent producers
//! can update the fields they own without reading the current value first
//! and without clobbering each other.
//!
//! All persistent records are `#[repr(C)]` and `Copy` with fixed-size
//! fields only (no `String`, `Vec`, etc.), so they can be copied in and out
//! of shared memory by value.

pub mod flags;
pub mod media;
pub mod observer;
pub mod settings;
pub mod text;

pub use flags::{Objects, ObjectsDelta, Reference, ReferenceDelta};
pub use media::{Media, MediaDelta, Script, ScriptDelta};
pub use observer::{Observer, ObserverDelta};
pub use settings::{Color, Settings, SettingsDelta};
pub use text::{FixedStr, PlayState, Toggle};

use serde::{Deserialize, Serialize};

/// Non-destructive partial update of a persistent record.
pub trait Merge {
    /// Partial update type; `None` fields mean "leave unchanged".
    type Delta;

    /// Overwrite every field set in `delta`. Returns the number of fields
    /// written.
    fn merge(&mut self, delta: &Self::Delta) -> usize;
}

/// The six state categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Observer location, heading and civil time.
    Observer,
    /// Audio/video playback.
    Media,
    /// Script playback.
    Script,
    /// Reference flags (grids, lines, atmosphere, overlays).
    Reference,
    /// Display tuning values.
    Settings,
    /// Label, line and orbit visibility.
    Objects,
}

impl Category {
    /// Every category, in publish order.
    pub const ALL: [Category; 6] = [
        Category::Observer,
        Category::Media,
        Category::Script,
        Category::Reference,
        Category::Settings,
        Category::Objects,
    ];

    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Observer => "observer",
            Self::Media => "media",
            Self::Script => "script",
            Self::Reference => "reference",
            Self::Settings => "settings",
            Self::Objects => "objects",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// Declare a persistent record, its delta, and the merge between them.
macro_rules! state_record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident / $delta:ident {
            $(
                $(#[$fmeta:meta])*
                pub $field:ident : $ty:ty,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
        #[repr(C)]
        pub struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        #[doc = concat!("Partial update of [`", stringify!($name), "`]; `None` fields are left untouched.")]
        #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct $delta {
            $(
                $(#[$fmeta])*
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl $delta {
            /// True when no field is set.
            pub fn is_empty(&self) -> bool {
                true $( && self.$field.is_none() )*
            }
        }

        impl $crate::data::Merge for $name {
            type Delta = $delta;

            fn merge(&mut self, delta: &$delta) -> usize {
                let mut applied = 0;
                $(
                    if let Some(value) = delta.$field {
                        self.$field = value;
                        applied += 1;
                    }
                )*
                applied
            }
        }
    };
}

pub(crate) use state_record;
