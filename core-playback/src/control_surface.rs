//! # Control Surface Adapter
//!
//! Mirrors the playback session onto the OS lock-screen / notification
//! surface and relays the surface's commands back into the player.
//!
//! The surface is never a source of truth. Outbound, every transport change
//! replaces the full descriptor and position-only updates are throttled.
//! Inbound, [`relay_media_commands`] calls the same [`PlayerHandle`] methods
//! the UI uses.

use crate::controller::PlayerHandle;
use crate::error::PlaybackError;
use crate::session::PlaybackSession;
use bridge_traits::media_session::{CommandSink, ControlSurface, MediaCommand, NowPlaying};
use core_library::models::Track;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

pub struct SurfaceMirror {
    surface: Option<Arc<dyn ControlSurface>>,
    throttle: Duration,
    last_position_push: Option<Instant>,
}

impl SurfaceMirror {
    pub fn new(surface: Option<Arc<dyn ControlSurface>>, throttle: Duration) -> Self {
        Self {
            surface,
            throttle,
            last_position_push: None,
        }
    }

    /// Register the command sink with the host surface.
    pub async fn enable(&self, sink: CommandSink) -> bool {
        let Some(surface) = &self.surface else {
            return false;
        };
        match surface.enable_controls(sink).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Media controls unavailable");
                false
            }
        }
    }

    /// Replace the whole descriptor. Called on every transport change.
    pub async fn push_now_playing(&mut self, track: &Track, session: &PlaybackSession) {
        let Some(surface) = &self.surface else {
            return;
        };
        let info = now_playing(track, session);
        if let Err(e) = surface.set_now_playing(info).await {
            warn!(error = %e, "Failed to update now playing");
        }
        self.last_position_push = Some(Instant::now());
    }

    /// Position-only update, at most once per throttle window.
    pub async fn push_position(&mut self, session: &PlaybackSession, now: Instant) {
        let Some(surface) = &self.surface else {
            return;
        };
        if let Some(last) = self.last_position_push {
            if now.saturating_duration_since(last) < self.throttle {
                return;
            }
        }
        self.last_position_push = Some(now);
        if let Err(e) = surface
            .update_playback(session.elapsed_secs(), session.is_playing)
            .await
        {
            debug!(error = %e, "Failed to update playback position");
        }
    }

    /// Nothing is playing.
    pub async fn reset(&mut self) {
        let Some(surface) = &self.surface else {
            return;
        };
        self.last_position_push = None;
        if let Err(e) = surface.reset().await {
            warn!(error = %e, "Failed to reset media controls");
        }
    }
}

/// Build the outbound descriptor. The catalog duration hint stands in until
/// the resource reports a real duration.
pub fn now_playing(track: &Track, session: &PlaybackSession) -> NowPlaying {
    let duration_secs = if session.duration_ms > 0 {
        session.duration_secs()
    } else {
        track
            .approximate_duration()
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    };

    NowPlaying {
        title: track.title.clone(),
        artist: track.author.clone(),
        artwork_url: Some(track.thumbnail_url.clone()).filter(|url| !url.is_empty()),
        duration_secs,
        elapsed_secs: session.elapsed_secs(),
        is_playing: session.is_playing,
    }
}

/// Forward surface commands into the player until either side goes away.
pub async fn relay_media_commands(
    handle: PlayerHandle,
    mut commands: mpsc::UnboundedReceiver<MediaCommand>,
) {
    while let Some(command) = commands.recv().await {
        debug!(?command, "Media command received");
        if let Err(e) = handle.handle_media_command(command).await {
            if matches!(e, PlaybackError::ControllerClosed) {
                break;
            }
            debug!(?command, error = %e, "Media command not applied");
        }
    }
    debug!("Media command relay finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use core_library::models::{ReadyAssets, TrackId, TrackStatus};
    use mockall::mock;

    mock! {
        Surface {}

        #[async_trait::async_trait]
        impl ControlSurface for Surface {
            async fn enable_controls(&self, sink: CommandSink) -> BridgeResult<()>;
            async fn set_now_playing(&self, info: NowPlaying) -> BridgeResult<()>;
            async fn update_playback(&self, elapsed_secs: f64, is_playing: bool) -> BridgeResult<()>;
            async fn reset(&self) -> BridgeResult<()>;
        }
    }

    fn track() -> Track {
        Track {
            id: TrackId::from("abc"),
            title: "Song".into(),
            author: "Artist".into(),
            thumbnail_url: "https://img/abc.jpg".into(),
            duration_hint: "3:30".into(),
            added_at: 0,
            status: TrackStatus::Ready(ReadyAssets {
                audio_path: "/music_storage/abc.m4a".into(),
                captions: Vec::new(),
                selected_caption: None,
            }),
        }
    }

    #[test]
    fn test_now_playing_uses_hint_until_duration_known() {
        let mut session = PlaybackSession {
            position_ms: 1_500,
            is_playing: true,
            ..Default::default()
        };
        let info = now_playing(&track(), &session);
        assert_eq!(info.duration_secs, 210.0);
        assert_eq!(info.elapsed_secs, 1.5);
        assert_eq!(info.artwork_url.as_deref(), Some("https://img/abc.jpg"));

        session.duration_ms = 200_000;
        assert_eq!(now_playing(&track(), &session).duration_secs, 200.0);
    }

    #[tokio::test]
    async fn test_position_updates_are_throttled() {
        let mut surface = MockSurface::new();
        surface.expect_set_now_playing().times(1).returning(|_| Ok(()));
        surface.expect_update_playback().times(2).returning(|_, _| Ok(()));

        let mut mirror = SurfaceMirror::new(Some(Arc::new(surface)), Duration::from_secs(1));
        let session = PlaybackSession::default();
        mirror.push_now_playing(&track(), &session).await;

        let start = Instant::now();
        for step in 0..10u64 {
            mirror
                .push_position(&session, start + Duration::from_millis(step * 250))
                .await;
        }
    }

    #[tokio::test]
    async fn test_without_surface_everything_is_a_no_op() {
        let mut mirror = SurfaceMirror::new(None, Duration::from_secs(1));
        let (sink, _rx) = mpsc::unbounded_channel();
        assert!(!mirror.enable(sink).await);
        mirror.push_now_playing(&track(), &PlaybackSession::default()).await;
        mirror.reset().await;
    }
}
