//! Media and script playback state.

use super::text::PlayState;

super::state_record! {
    /// Audio and video playback.
    #[derive(Default)]
    pub struct Media / MediaDelta {
        /// Audio track state.
        pub audio: PlayState,
        /// Video clip state.
        pub video: PlayState,
        /// Playback volume, 0.0-1.0.
        pub volume: f32,
    }
}

super::state_record! {
    /// Script playback.
    #[derive(Default)]
    pub struct Script / ScriptDelta {
        /// Script runner state.
        pub state: PlayState,
        /// Script audio volume, 0.0-1.0.
        pub volume: f32,
    }
}
