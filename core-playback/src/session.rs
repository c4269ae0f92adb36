//! Playback session snapshot published to the UI.

use core_library::models::TrackId;
use serde::Serialize;
use std::fmt;

/// Engine lifecycle: `Idle → Loading → Playing ⇄ Paused → Stopped`, with
/// `Error` when a resource fails and nothing replaced it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    Error,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Loading => "loading",
            EngineState::Playing => "playing",
            EngineState::Paused => "paused",
            EngineState::Stopped => "stopped",
            EngineState::Error => "error",
        }
    }

    /// Pause, resume and seek are only meaningful here.
    pub fn is_active(&self) -> bool {
        matches!(self, EngineState::Playing | EngineState::Paused)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is playing right now.
///
/// Only the player task writes this; everyone else reads a `watch` copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackSession {
    pub current_track_id: Option<TrackId>,
    pub position_ms: u64,
    /// Zero until known.
    pub duration_ms: u64,
    pub is_playing: bool,
    pub shuffle: bool,
    pub state: EngineState,
}

impl PlaybackSession {
    /// Clamp a position into `[0, duration]`. An unknown duration leaves the
    /// upper end open.
    pub fn clamp_position(&self, position_ms: u64) -> u64 {
        if self.duration_ms > 0 {
            position_ms.min(self.duration_ms)
        } else {
            position_ms
        }
    }

    /// Forget the current track. Shuffle is a user preference and survives.
    pub fn reset(&mut self, state: EngineState) {
        *self = Self {
            shuffle: self.shuffle,
            state,
            ..Self::default()
        };
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.position_ms as f64 / 1000.0
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_position() {
        let mut session = PlaybackSession::default();
        assert_eq!(session.clamp_position(90_000), 90_000);

        session.duration_ms = 60_000;
        assert_eq!(session.clamp_position(90_000), 60_000);
        assert_eq!(session.clamp_position(1_000), 1_000);
    }

    #[test]
    fn test_reset_keeps_shuffle() {
        let mut session = PlaybackSession {
            current_track_id: Some(TrackId::from("a")),
            position_ms: 5_000,
            duration_ms: 60_000,
            is_playing: true,
            shuffle: true,
            state: EngineState::Playing,
        };
        session.reset(EngineState::Stopped);

        assert_eq!(session.current_track_id, None);
        assert_eq!(session.position_ms, 0);
        assert!(!session.is_playing);
        assert!(session.shuffle);
        assert_eq!(session.state, EngineState::Stopped);
    }
}
