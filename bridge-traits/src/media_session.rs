//! OS Media Control Surface
//!
//! Lock-screen, notification-shade and media-key integration. The core pushes
//! a [`NowPlaying`] descriptor outward and receives [`MediaCommand`]s inward;
//! the surface never owns playback state.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Outbound "now playing" descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub artwork_url: Option<String>,
    pub duration_secs: f64,
    pub elapsed_secs: f64,
    pub is_playing: bool,
}

/// Inbound command raised by the OS surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value")]
pub enum MediaCommand {
    Play,
    Pause,
    /// Hardware play/pause key with no explicit direction.
    TogglePlayPause,
    NextTrack,
    PreviousTrack,
    /// Absolute position in seconds.
    Seek(f64),
    Stop,
}

/// Channel the surface pushes inbound commands into.
pub type CommandSink = mpsc::UnboundedSender<MediaCommand>;

/// Host media control surface.
///
/// Implementations are expected to be cheap to call; the core pushes on every
/// transport change and at most about once per second for position updates.
#[async_trait::async_trait]
pub trait ControlSurface: Send + Sync {
    /// Register the sink for inbound commands. Called once at startup.
    async fn enable_controls(&self, sink: CommandSink) -> Result<()>;

    /// Replace the full now-playing descriptor.
    async fn set_now_playing(&self, info: NowPlaying) -> Result<()>;

    /// Update elapsed time and transport state only.
    async fn update_playback(&self, elapsed_secs: f64, is_playing: bool) -> Result<()>;

    /// Clear the surface (nothing playing).
    async fn reset(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_command_serializes_tagged() {
        let json = serde_json::to_string(&MediaCommand::Seek(12.5)).unwrap();
        assert_eq!(json, r#"{"command":"Seek","value":12.5}"#);

        let parsed: MediaCommand = serde_json::from_str(r#"{"command":"NextTrack"}"#).unwrap();
        assert_eq!(parsed, MediaCommand::NextTrack);
    }
}
