//! Desktop control surface
//!
//! Desktop builds have no lock screen. This surface keeps the last
//! now-playing descriptor in memory, mirrors changes into `tracing`, and lets
//! the host shell (tray menu, global media keys) inject commands.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    media_session::{CommandSink, ControlSurface, MediaCommand, NowPlaying},
};
use parking_lot::Mutex;
use tracing::{debug, info};

#[derive(Default)]
pub struct LoggingControlSurface {
    now_playing: Mutex<Option<NowPlaying>>,
    sink: Mutex<Option<CommandSink>>,
}

impl LoggingControlSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last descriptor pushed by the core, with elapsed/transport updates applied.
    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.now_playing.lock().clone()
    }

    /// Forward a command as if it came from the OS.
    pub fn inject(&self, command: MediaCommand) -> Result<()> {
        let guard = self.sink.lock();
        let sink = guard
            .as_ref()
            .ok_or_else(|| BridgeError::NotAvailable("media controls not enabled".into()))?;
        sink.send(command)
            .map_err(|_| BridgeError::OperationFailed("command receiver dropped".into()))
    }
}

#[async_trait]
impl ControlSurface for LoggingControlSurface {
    async fn enable_controls(&self, sink: CommandSink) -> Result<()> {
        *self.sink.lock() = Some(sink);
        debug!("Desktop media controls enabled");
        Ok(())
    }

    async fn set_now_playing(&self, info: NowPlaying) -> Result<()> {
        info!(
            title = %info.title,
            artist = %info.artist,
            duration_secs = info.duration_secs,
            is_playing = info.is_playing,
            "Now playing"
        );
        *self.now_playing.lock() = Some(info);
        Ok(())
    }

    async fn update_playback(&self, elapsed_secs: f64, is_playing: bool) -> Result<()> {
        if let Some(current) = self.now_playing.lock().as_mut() {
            current.elapsed_secs = elapsed_secs;
            current.is_playing = is_playing;
        }
        debug!(elapsed_secs, is_playing, "Playback position");
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        *self.now_playing.lock() = None;
        debug!("Media controls cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn descriptor() -> NowPlaying {
        NowPlaying {
            title: "Song".into(),
            artist: "Artist".into(),
            artwork_url: None,
            duration_secs: 200.0,
            elapsed_secs: 0.0,
            is_playing: true,
        }
    }

    #[tokio::test]
    async fn test_update_applies_to_current_descriptor() {
        let surface = LoggingControlSurface::new();
        surface.set_now_playing(descriptor()).await.unwrap();
        surface.update_playback(42.0, false).await.unwrap();

        let current = surface.now_playing().unwrap();
        assert_eq!(current.elapsed_secs, 42.0);
        assert!(!current.is_playing);

        surface.reset().await.unwrap();
        assert!(surface.now_playing().is_none());
    }

    #[tokio::test]
    async fn test_inject_requires_enabled_controls() {
        let surface = LoggingControlSurface::new();
        assert!(surface.inject(MediaCommand::Play).is_err());

        let (tx, mut rx) = mpsc::unbounded_channel();
        surface.enable_controls(tx).await.unwrap();
        surface.inject(MediaCommand::Seek(30.0)).unwrap();
        assert_eq!(rx.recv().await, Some(MediaCommand::Seek(30.0)));
    }
}
