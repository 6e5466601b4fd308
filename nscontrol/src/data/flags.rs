//! Reference flags and object visibility switches.

use super::text::{FixedStr, Toggle};

super::state_record! {
    /// Sky reference aids, atmosphere/landscape switches and UI overlays.
    pub struct Reference / ReferenceDelta {
        /// Atmosphere rendering.
        pub atmosphere: Toggle,
        /// Landscape rendering.
        pub landscape: Toggle,
        /// Ground fog.
        pub fog: Toggle,
        /// Cardinal point labels.
        pub cardinal_points: Toggle,
        /// Azimuthal grid.
        pub azimuthal_grid: Toggle,
        /// Equatorial grid.
        pub equatorial_grid: Toggle,
        /// Ecliptic grid.
        pub ecliptic_grid: Toggle,
        /// Galactic grid.
        pub galactic_grid: Toggle,
        /// Celestial equator line.
        pub equator_line: Toggle,
        /// Ecliptic line.
        pub ecliptic_line: Toggle,
        /// Meridian line.
        pub meridian_line: Toggle,
        /// Galactic equator line.
        pub galactic_line: Toggle,
        /// Precession circles.
        pub precession_circle: Toggle,
        /// Enlarged moon.
        pub moon_scaled: Toggle,
        /// Date/time overlay.
        pub date_time_overlay: Toggle,
        /// Selected object info overlay.
        pub object_info_overlay: Toggle,
        /// Name of the selected landscape.
        pub landscape_name: FixedStr<64>,
    }
}

impl Reference {
    /// Every flag set to `value`, no landscape selected.
    pub fn filled(value: Toggle) -> Self {
        Self {
            atmosphere: value,
            landscape: value,
            fog: value,
            cardinal_points: value,
            azimuthal_grid: value,
            equatorial_grid: value,
            ecliptic_grid: value,
            galactic_grid: value,
            equator_line: value,
            ecliptic_line: value,
            meridian_line: value,
            galactic_line: value,
            precession_circle: value,
            moon_scaled: value,
            date_time_overlay: value,
            object_info_overlay: value,
            landscape_name: FixedStr::EMPTY,
        }
    }

    /// Initial read side: everything disabled.
    pub fn disabled() -> Self {
        Self::filled(Toggle::Off)
    }

    /// Initial write side: no opinion on any flag.
    pub fn unset() -> Self {
        Self::filled(Toggle::Unset)
    }
}

super::state_record! {
    /// Label, line and orbit visibility of sky objects.
    #[derive(Default)]
    pub struct Objects / ObjectsDelta {
        /// Constellation stick figures.
        pub constellation_lines: Toggle,
        /// Constellation names.
        pub constellation_names: Toggle,
        /// Constellation artwork.
        pub constellation_art: Toggle,
        /// Constellation boundaries.
        pub constellation_boundaries: Toggle,
        /// Star names.
        pub star_names: Toggle,
        /// Nebula names.
        pub nebula_names: Toggle,
        /// Nebula position hints.
        pub nebula_hints: Toggle,
        /// Planet names.
        pub planet_names: Toggle,
        /// Planet orbits.
        pub planet_orbits: Toggle,
        /// Planet trails.
        pub planet_trails: Toggle,
        /// Active sky culture.
        pub sky_culture: FixedStr<64>,
    }
}
