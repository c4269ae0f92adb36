//! Core service façade and bootstrap.
//!
//! This crate wires host-provided bridge implementations (HTTP, filesystem,
//! settings, native playback, media controls) into the media core and
//! exposes the API the UI calls. Desktop apps typically enable the
//! `desktop-shims` feature, which fills in `bridge-desktop` defaults for
//! every bridge except the playback adapter.
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .provider_base_url("https://provider.example/api")
//!     .playback_adapter(Arc::new(MyNativePlayer::new()))
//!     .build()?;
//! let core = CoreService::bootstrap(config).await?;
//!
//! let results = core.search("lofi").await?;
//! core.add(results[0].clone()).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;

use core_download::{AcquireOutcome, DownloadManager};
use core_library::models::{CatalogItem, Track, TrackId, TrackStatus};
use core_library::{LibraryError, TrackStore};
use core_metadata::{CatalogClient, LyricsState, LyricsSynchronizer};
use core_playback::{
    PlaybackError, PlaybackSession, PlayerController, PlayerDeps, PlayerHandle,
    TransitionOutcome,
};
use core_runtime::config::{CoreConfig, STORAGE_DIR_NAME};
use core_runtime::events::{CoreEvent, EventBus};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    store: Arc<TrackStore>,
    catalog: Arc<CatalogClient>,
    downloads: Arc<DownloadManager>,
    lyrics: Arc<LyricsSynchronizer>,
    player: PlayerHandle,
    event_bus: EventBus,
}

impl CoreService {
    /// Load the persisted playlist and start the player.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_buffer_size);

        let storage_dir = match &config.storage_dir {
            Some(dir) => dir.clone(),
            None => config
                .file_system
                .get_data_directory()
                .await
                .map_err(|e| CoreError::InitializationFailed(format!("data directory: {}", e)))?
                .join(STORAGE_DIR_NAME),
        };
        config
            .file_system
            .create_dir_all(&storage_dir)
            .await
            .map_err(|e| CoreError::InitializationFailed(format!("storage directory: {}", e)))?;

        let store = Arc::new(
            TrackStore::open(
                config.settings_store.clone(),
                event_bus.clone(),
                config.clock.clone(),
            )
            .await?,
        );
        let catalog = Arc::new(CatalogClient::new(
            config.http_client.clone(),
            config.provider_base_url.clone(),
        ));
        let downloads = Arc::new(DownloadManager::new(
            store.clone(),
            catalog.clone(),
            config.file_system.clone(),
            storage_dir.clone(),
            config.download.clone(),
            event_bus.clone(),
        ));
        let lyrics = Arc::new(LyricsSynchronizer::new(
            config.file_system.clone(),
            event_bus.clone(),
            config.player.lyrics_offset_ms,
        )?);

        let player = PlayerController::spawn(PlayerDeps {
            adapter: config.playback_adapter.clone(),
            store: store.clone(),
            lyrics: Some(lyrics.clone()),
            control_surface: config.control_surface.clone(),
            event_bus: event_bus.clone(),
            config: config.player.clone(),
        })
        .await;

        info!(
            tracks = store.len().await,
            storage = %core_runtime::logging::strip_path(&storage_dir.to_string_lossy()),
            "Core service ready"
        );

        Ok(Self {
            store,
            catalog,
            downloads,
            lyrics,
            player,
            event_bus,
        })
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    pub async fn search(&self, query: &str) -> Result<Vec<CatalogItem>> {
        Ok(self.catalog.search(query).await?)
    }

    pub async fn trending(&self) -> Result<Vec<CatalogItem>> {
        Ok(self.catalog.trending().await?)
    }

    // ========================================================================
    // Playlist
    // ========================================================================

    /// Add an item to the front of the playlist and download it in the
    /// background. Progress is reported through events and the track status.
    pub async fn add(&self, item: CatalogItem) -> Result<()> {
        item.validate().map_err(|message| LibraryError::InvalidInput {
            field: "item".to_string(),
            message,
        })?;

        let downloads = self.downloads.clone();
        tokio::spawn(async move {
            match downloads.acquire(&item).await {
                Ok(AcquireOutcome::Completed(track)) => {
                    debug!(track_id = %track.id, "Background download finished")
                }
                Ok(AcquireOutcome::AlreadyClaimed(track)) => {
                    debug!(track_id = %track.id, status = %track.status, "Already in playlist")
                }
                Err(e) => warn!(track_id = %item.id, error = %e, "Background download failed"),
            }
        });
        Ok(())
    }

    /// Add an item and wait for the download to finish.
    pub async fn acquire(&self, item: &CatalogItem) -> Result<AcquireOutcome> {
        Ok(self.downloads.acquire(item).await?)
    }

    /// Re-run the download of a track in Error.
    pub async fn retry(&self, id: &TrackId) -> Result<()> {
        let track = self.track(id).await?;
        if !matches!(track.status, TrackStatus::Error { .. }) {
            return Err(LibraryError::InvalidInput {
                field: "status".to_string(),
                message: format!("track {} is {}, only failed tracks are retried", id, track.status),
            }
            .into());
        }

        self.add(CatalogItem {
            id: track.id.to_string(),
            title: track.title,
            thumbnail: track.thumbnail_url,
            author: track.author,
            duration: track.duration_hint,
        })
        .await
    }

    /// Remove a track and its files. Stops playback first if it is playing.
    pub async fn remove(&self, id: &TrackId) -> Result<Track> {
        self.player.track_removed(id.clone()).await?;
        let removed = self.store.remove(id).await?;
        self.downloads.delete_files(&removed).await;
        info!(track_id = %id, "Track removed");
        Ok(removed)
    }

    /// Switch the caption language of a Ready track. If it is playing, the
    /// lyrics are cleared right away and reloaded from the new file; a
    /// failed fetch leaves them empty.
    pub async fn select_caption(&self, id: &TrackId, code: &str) -> Result<Track> {
        let is_current = self.player.session().current_track_id.as_ref() == Some(id);
        let ticket = is_current.then(|| self.lyrics.begin_load(id.as_str(), Some(code)));

        match self.downloads.switch_caption(id, code).await {
            Ok(track) => {
                if let Some(ticket) = ticket {
                    self.lyrics
                        .finish_load(ticket, track.caption_path(), track.approximate_duration())
                        .await;
                }
                Ok(track)
            }
            Err(e) => {
                if let Some(ticket) = ticket {
                    self.lyrics.fail_load(ticket, &e.to_string());
                }
                Err(e.into())
            }
        }
    }

    pub async fn playlist(&self) -> Vec<Track> {
        self.store.snapshot().await
    }

    pub async fn track(&self, id: &TrackId) -> Result<Track> {
        self.store.get(id).await.ok_or_else(|| {
            LibraryError::NotFound {
                entity_type: "Track".to_string(),
                id: id.to_string(),
            }
            .into()
        })
    }

    // ========================================================================
    // Playback
    // ========================================================================

    pub async fn play_track(&self, id: &TrackId) -> Result<TrackId> {
        Ok(self.player.play_track(id.clone()).await?)
    }

    /// Next track. `NoReadyTrack` is reported as idle, not as an error.
    pub async fn next(&self) -> Result<Option<TrackId>> {
        Self::settle(self.player.next().await)
    }

    pub async fn previous(&self) -> Result<Option<TrackId>> {
        Self::settle(self.player.previous().await)
    }

    fn settle(
        outcome: std::result::Result<TransitionOutcome, PlaybackError>,
    ) -> Result<Option<TrackId>> {
        match outcome {
            Ok(TransitionOutcome::Started(id)) => Ok(Some(id)),
            Ok(TransitionOutcome::Debounced) | Err(PlaybackError::NoReadyTrack) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn toggle_play(&self) -> Result<bool> {
        Ok(self.player.toggle_play().await?)
    }

    pub async fn pause(&self) -> Result<()> {
        Ok(self.player.pause().await?)
    }

    pub async fn resume(&self) -> Result<()> {
        Ok(self.player.resume().await?)
    }

    pub async fn seek(&self, position_ms: u64) -> Result<u64> {
        Ok(self.player.seek(position_ms).await?)
    }

    pub async fn stop(&self) -> Result<()> {
        Ok(self.player.stop().await?)
    }

    pub async fn set_shuffle(&self, enabled: bool) -> Result<()> {
        Ok(self.player.set_shuffle(enabled).await?)
    }

    pub fn session(&self) -> PlaybackSession {
        self.player.session()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<PlaybackSession> {
        self.player.subscribe()
    }

    pub fn lyrics(&self) -> LyricsState {
        self.lyrics.snapshot()
    }

    pub fn subscribe_lyrics(&self) -> watch::Receiver<LyricsState> {
        self.lyrics.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Handle for hosts that drive the player directly.
    pub fn player(&self) -> PlayerHandle {
        self.player.clone()
    }

    /// Stop playback and end the player task.
    pub async fn shutdown(&self) -> Result<()> {
        match self.player.shutdown().await {
            Ok(()) | Err(PlaybackError::ControllerClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
