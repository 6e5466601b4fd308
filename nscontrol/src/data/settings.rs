//! Display tuning values.

use super::text::FixedStr;

/// RGB color, components 0.0-1.0.
pub type Color = [f32; 3];

super::state_record! {
    /// Star, nebula and line rendering parameters, transition durations,
    /// colors and UI languages.
    pub struct Settings / SettingsDelta {
        /// Star size multiplier.
        pub star_scale: f32,
        /// Star magnitude scaling.
        pub star_mag_scale: f32,
        /// Star twinkle amount, 0.0-1.0.
        pub star_twinkle_amount: f32,
        /// Faintest star drawn.
        pub star_limiting_mag: f32,
        /// Faintest star labeled.
        pub max_mag_star_name: f32,
        /// Nebula size multiplier.
        pub nebula_scale: f32,
        /// Faintest nebula labeled.
        pub max_mag_nebula_name: f32,
        /// Faintest nebula given a position hint.
        pub nebula_hints_mag: f32,
        /// Nebula brightness, 0.0-1.0.
        pub nebula_brightness: f32,
        /// Moon scale used when the moon is enlarged.
        pub moon_scale: f32,
        /// Milky Way intensity.
        pub milky_way_intensity: f32,
        /// Light pollution expressed as a limiting magnitude.
        pub light_pollution_limiting_mag: f32,
        /// Field of view in degrees.
        pub field_of_view: f32,
        /// Line width in pixels for grids and lines.
        pub line_width: f32,
        /// Constellation art intensity, 0.0-1.0.
        pub constellation_art_intensity: f32,
        /// Constellation art fade, seconds.
        pub constellation_art_fade_duration: f32,
        /// Atmosphere fade, seconds.
        pub atmosphere_fade_duration: f32,
        /// Landscape fade, seconds.
        pub landscape_fade_duration: f32,
        /// Automatic move, seconds.
        pub auto_move_duration: f32,
        /// Zoom, seconds.
        pub zoom_duration: f32,
        /// Flight between bodies, seconds.
        pub flight_duration: f32,
        /// Label font size.
        pub label_font_size: f32,
        /// Time rate multiplier.
        pub time_rate: f32,
        /// Screen-space object selection radius in pixels.
        pub selection_radius: f32,
        /// Planet size multiplier.
        pub planet_scale: f32,
        /// Orbit line opacity, 0.0-1.0.
        pub orbit_opacity: f32,
        /// Azimuthal grid color.
        pub azimuthal_grid_color: Color,
        /// Equatorial grid color.
        pub equatorial_grid_color: Color,
        /// Ecliptic line color.
        pub ecliptic_line_color: Color,
        /// Equator line color.
        pub equator_line_color: Color,
        /// Meridian line color.
        pub meridian_line_color: Color,
        /// Constellation line color.
        pub constellation_line_color: Color,
        /// Constellation name color.
        pub constellation_name_color: Color,
        /// Cardinal points color.
        pub cardinal_points_color: Color,
        /// Planet orbit color.
        pub planet_orbit_color: Color,
        /// User interface language.
        pub ui_language: FixedStr<16>,
        /// Sky object name language.
        pub sky_language: FixedStr<16>,
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            star_scale: 1.0,
            star_mag_scale: 1.0,
            star_twinkle_amount: 0.3,
            star_limiting_mag: 6.5,
            max_mag_star_name: 1.5,
            nebula_scale: 1.0,
            max_mag_nebula_name: 8.0,
            nebula_hints_mag: 10.0,
            nebula_brightness: 1.0,
            moon_scale: 4.0,
            milky_way_intensity: 1.0,
            light_pollution_limiting_mag: 6.5,
            field_of_view: 60.0,
            line_width: 1.0,
            constellation_art_intensity: 0.5,
            constellation_art_fade_duration: 2.0,
            atmosphere_fade_duration: 1.5,
            landscape_fade_duration: 1.0,
            auto_move_duration: 5.0,
            zoom_duration: 2.0,
            flight_duration: 10.0,
            label_font_size: 12.0,
            time_rate: 1.0,
            selection_radius: 15.0,
            planet_scale: 1.0,
            orbit_opacity: 0.6,
            azimuthal_grid_color: [0.2, 0.2, 0.6],
            equatorial_grid_color: [0.2, 0.4, 0.6],
            ecliptic_line_color: [0.6, 0.3, 0.1],
            equator_line_color: [0.6, 0.2, 0.2],
            meridian_line_color: [0.2, 0.6, 0.2],
            constellation_line_color: [0.2, 0.2, 0.6],
            constellation_name_color: [0.6, 0.4, 0.6],
            cardinal_points_color: [0.8, 0.2, 0.1],
            planet_orbit_color: [0.6, 1.0, 1.0],
            ui_language: FixedStr::new("en"),
            sky_language: FixedStr::new("en"),
        }
    }
}
