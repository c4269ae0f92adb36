//! # Playback Error Types

use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

/// Errors that can occur while driving playback.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Load Errors
    // ========================================================================
    /// Only Ready tracks with a local audio file can be loaded.
    #[error("Track {track_id} is not ready for playback ({status})")]
    TrackNotReady { track_id: String, status: String },

    /// The new resource never confirmed it started within the bound.
    #[error("Playback of {track_id} did not start within {timeout_ms} ms")]
    StartTimeout { track_id: String, timeout_ms: u64 },

    /// The new resource reported a failure before starting.
    #[error("Playback of {track_id} failed to start: {message}")]
    StartFailed { track_id: String, message: String },

    // ========================================================================
    // Transition Errors
    // ========================================================================
    /// One traversal of the playlist found nothing playable.
    #[error("No ready track to play")]
    NoReadyTrack,

    // ========================================================================
    // Control Errors
    // ========================================================================
    #[error("Invalid playback state: {0}")]
    InvalidState(String),

    /// The player task is gone.
    #[error("Player controller is not running")]
    ControllerClosed,

    #[error("Playback adapter error: {0}")]
    Adapter(#[from] BridgeError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

impl PlaybackError {
    /// Start failures are skipped over like a finished track.
    pub fn is_start_failure(&self) -> bool {
        matches!(
            self,
            PlaybackError::StartTimeout { .. } | PlaybackError::StartFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
