//! Observer location, heading and civil date/time.

use super::text::FixedStr;

super::state_record! {
    /// Where the observer stands and what time it is there.
    pub struct Observer / ObserverDelta {
        /// Latitude in degrees, north positive.
        pub latitude: f64,
        /// Longitude in degrees, east positive.
        pub longitude: f64,
        /// Altitude above the reference surface in meters.
        pub altitude: f64,
        /// View heading in degrees from north.
        pub heading: f64,
        /// Civil year.
        pub year: i32,
        /// Month, 1-12.
        pub month: i32,
        /// Day of month, 1-31.
        pub day: i32,
        /// Hour, 0-23.
        pub hour: i32,
        /// Minute, 0-59.
        pub minute: i32,
        /// Second, 0-59.
        pub second: i32,
        /// Body the observer stands on.
        pub home_body: FixedStr<32>,
        /// Timezone name.
        pub timezone: FixedStr<64>,
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            heading: 0.0,
            year: 2000,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            home_body: FixedStr::new("Earth"),
            timezone: FixedStr::new("UTC"),
        }
    }
}
