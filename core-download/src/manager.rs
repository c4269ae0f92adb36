//! Download manager
//!
//! One `acquire` call owns one track's acquisition from claim to final
//! status. Files are named after the track id inside the storage directory:
//! `{id}.m4a` for audio and `{id}_{lang}.vtt` for captions.

use crate::error::{DownloadError, Result};
use bridge_traits::storage::FileSystemAccess;
use core_library::models::{CaptionSelection, CaptionTrack, CatalogItem, ReadyAssets, Track, TrackId};
use core_library::{Claim, LibraryError, TrackStore};
use core_metadata::CatalogClient;
use core_runtime::config::DownloadConfig;
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

const AUDIO_EXTENSION: &str = "m4a";
const CAPTION_EXTENSION: &str = "vtt";
const PARTIAL_SUFFIX: &str = "part";

/// Result of [`DownloadManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// This call downloaded the assets; the track is Ready.
    Completed(Track),
    /// Another acquisition is in flight or already finished.
    AlreadyClaimed(Track),
}

/// Pick the default caption: preferred languages in order, then an
/// auto-generated track, then whatever comes first.
pub fn select_default_caption<'a>(
    tracks: &'a [CaptionTrack],
    preferred_languages: &[String],
) -> Option<&'a CaptionTrack> {
    preferred_languages
        .iter()
        .find_map(|lang| {
            tracks
                .iter()
                .find(|track| track.code.eq_ignore_ascii_case(lang))
        })
        .or_else(|| {
            tracks
                .iter()
                .find(|track| track.is_auto || track.code.eq_ignore_ascii_case("auto"))
        })
        .or_else(|| tracks.first())
}

/// Keep provider ids and language codes safe to use as file names.
fn file_stem(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub struct DownloadManager {
    store: Arc<TrackStore>,
    catalog: Arc<CatalogClient>,
    file_system: Arc<dyn FileSystemAccess>,
    storage_dir: PathBuf,
    config: DownloadConfig,
    event_bus: EventBus,
}

impl DownloadManager {
    pub fn new(
        store: Arc<TrackStore>,
        catalog: Arc<CatalogClient>,
        file_system: Arc<dyn FileSystemAccess>,
        storage_dir: PathBuf,
        config: DownloadConfig,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            catalog,
            file_system,
            storage_dir,
            config,
            event_bus,
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn audio_path(&self, id: &TrackId) -> PathBuf {
        self.storage_dir
            .join(format!("{}.{}", file_stem(id.as_str()), AUDIO_EXTENSION))
    }

    pub fn caption_path(&self, id: &TrackId, language: &str) -> PathBuf {
        self.storage_dir.join(format!(
            "{}_{}.{}",
            file_stem(id.as_str()),
            file_stem(language),
            CAPTION_EXTENSION
        ))
    }

    fn partial_audio_path(&self, id: &TrackId) -> PathBuf {
        let mut path = self.audio_path(id).into_os_string();
        path.push(".");
        path.push(PARTIAL_SUFFIX);
        PathBuf::from(path)
    }

    // ========================================================================
    // Acquisition
    // ========================================================================

    /// Download audio and default caption for `item`.
    ///
    /// New items are inserted at the front of the playlist. A track that is
    /// already queued, downloading or ready is left alone; an Error track is
    /// retried.
    #[instrument(skip(self, item), fields(track_id = %item.id))]
    pub async fn acquire(&self, item: &CatalogItem) -> Result<AcquireOutcome> {
        let track = match self.store.claim(item).await? {
            Claim::Skipped(track) => {
                debug!(status = %track.status, "Acquisition skipped");
                return Ok(AcquireOutcome::AlreadyClaimed(track));
            }
            Claim::Acquired(track) => track,
        };
        let id = track.id.clone();

        if let Err(e) = self.store.mark_downloading(&id).await {
            return Err(self.fail(&id, e.into()).await);
        }
        self.emit(DownloadEvent::Started {
            track_id: id.to_string(),
        });
        info!("Download started");

        let assets = match self.fetch_assets(&id).await {
            Ok(assets) => assets,
            Err(e) => return Err(self.fail(&id, e).await),
        };

        let caption = assets.selected_caption.as_ref().map(|c| c.code.clone());
        match self.store.mark_ready(&id, assets.clone()).await {
            Ok(track) => {
                info!(caption = ?caption, "Download completed");
                self.emit(DownloadEvent::Completed {
                    track_id: id.to_string(),
                    caption,
                });
                Ok(AcquireOutcome::Completed(track))
            }
            Err(e) => {
                // Removed from the playlist while downloading.
                warn!(error = %e, "Track gone before completion, discarding files");
                self.delete_assets(&id, Some(&assets)).await;
                Err(self.fail(&id, DownloadError::Library(e)).await)
            }
        }
    }

    async fn fetch_assets(&self, id: &TrackId) -> Result<ReadyAssets> {
        self.file_system.create_dir_all(&self.storage_dir).await?;

        let meta = self.catalog.track_meta(id.as_str()).await?;
        let selected = select_default_caption(&meta.tracks, &self.config.preferred_caption_languages)
            .map(|track| track.code.clone());
        debug!(captions = meta.tracks.len(), selected = ?selected, "Caption languages listed");

        let audio = self.download_audio(id);
        let caption = async {
            match &selected {
                Some(code) => self.download_caption(id, code).await.map(Some),
                None => Ok(None),
            }
        };
        // Both halves run to completion so no write is left dangling when
        // the other one fails.
        let (audio_path, selected_caption) = tokio::join!(audio, caption);
        let audio_path = audio_path?;
        let selected_caption = selected_caption?;

        Ok(ReadyAssets {
            audio_path,
            captions: meta.tracks,
            selected_caption,
        })
    }

    async fn download_audio(&self, id: &TrackId) -> Result<PathBuf> {
        let partial = self.partial_audio_path(id);
        let target = self.audio_path(id);

        let mut reader = self
            .catalog
            .audio_stream(id.as_str())
            .await
            .map_err(|e| DownloadError::AudioFetch(e.to_string()))?;
        let mut writer = self.file_system.open_write_stream(&partial).await?;

        let written = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| DownloadError::AudioFetch(e.to_string()))?;
        writer
            .shutdown()
            .await
            .map_err(|e| DownloadError::Storage(e.into()))?;
        drop(writer);

        if written == 0 {
            return Err(DownloadError::AudioFetch("empty audio stream".to_string()));
        }

        self.file_system.rename(&partial, &target).await?;
        debug!(bytes = written, file = ?target.file_name(), "Audio written");
        Ok(target)
    }

    async fn download_caption(&self, id: &TrackId, code: &str) -> Result<CaptionSelection> {
        let body = self
            .catalog
            .caption(id.as_str(), code)
            .await
            .map_err(|e| DownloadError::CaptionFetch(e.to_string()))?
            .ok_or_else(|| {
                DownloadError::CaptionFetch(format!("provider has no '{}' caption", code))
            })?;

        let path = self.caption_path(id, code);
        self.file_system.write_file(&path, body.into_bytes().into()).await?;
        debug!(language = code, file = ?path.file_name(), "Caption written");

        Ok(CaptionSelection {
            code: code.to_string(),
            path,
        })
    }

    async fn fail(&self, id: &TrackId, error: DownloadError) -> DownloadError {
        warn!(track_id = %id, error = %error, "Download failed");
        self.delete_assets(id, None).await;

        match self.store.mark_failed(id, error.to_string()).await {
            Ok(_) => {}
            Err(LibraryError::NotFound { .. }) => {
                debug!(track_id = %id, "Failed track already removed");
            }
            Err(e) => warn!(track_id = %id, error = %e, "Could not record download failure"),
        }

        self.emit(DownloadEvent::Failed {
            track_id: id.to_string(),
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        });
        error
    }

    // ========================================================================
    // Caption switching and cleanup
    // ========================================================================

    /// Download another caption language for a Ready track and make it the
    /// selected one. The previous caption file is deleted.
    #[instrument(skip(self), fields(track_id = %id))]
    pub async fn switch_caption(&self, id: &TrackId, code: &str) -> Result<Track> {
        let track = self.store.get(id).await.ok_or_else(|| LibraryError::NotFound {
            entity_type: "Track".to_string(),
            id: id.to_string(),
        })?;
        let assets = track.assets().ok_or_else(|| LibraryError::InvalidInput {
            field: "status".to_string(),
            message: format!("track {} is {}, captions need a ready track", id, track.status),
        })?;
        if !assets.captions.iter().any(|c| c.code == code) {
            return Err(LibraryError::InvalidInput {
                field: "caption".to_string(),
                message: format!("'{}' is not offered for track {}", code, id),
            }
            .into());
        }

        let previous = assets.selected_caption.clone();
        if previous.as_ref().map(|c| c.code.as_str()) == Some(code) {
            return Ok(track);
        }

        let selection = self.download_caption(id, code).await?;
        let updated = self.store.select_caption(id, Some(selection)).await?;

        if let Some(previous) = previous {
            if let Err(e) = self.file_system.delete_file(&previous.path).await {
                warn!(error = %e, "Could not delete previous caption file");
            }
        }
        info!(language = code, "Caption switched");
        Ok(updated)
    }

    /// Delete every local file of a track: audio, partial audio and captions.
    pub async fn delete_files(&self, track: &Track) {
        self.delete_assets(&track.id, track.assets()).await;
    }

    async fn delete_assets(&self, id: &TrackId, assets: Option<&ReadyAssets>) {
        let mut paths = vec![self.audio_path(id), self.partial_audio_path(id)];
        if let Some(assets) = assets {
            paths.push(assets.audio_path.clone());
            paths.extend(assets.selected_caption.iter().map(|c| c.path.clone()));
        }
        paths.extend(self.caption_files(id).await);
        paths.sort();
        paths.dedup();

        for path in paths {
            if let Err(e) = self.file_system.delete_file(&path).await {
                warn!(file = ?path.file_name(), error = %e, "Could not delete track file");
            }
        }
    }

    /// Caption files of a track currently present in the storage directory.
    async fn caption_files(&self, id: &TrackId) -> Vec<PathBuf> {
        let prefix = format!("{}_", file_stem(id.as_str()));
        let suffix = format!(".{}", CAPTION_EXTENSION);
        match self.file_system.list_directory(&self.storage_dir).await {
            Ok(entries) => entries
                .into_iter()
                .filter(|path| {
                    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                    // "{id}_{lang}.vtt"; another id sharing the prefix leaves a '_' behind
                    name.strip_prefix(&prefix)
                        .and_then(|rest| rest.strip_suffix(&suffix))
                        .map_or(false, |lang| !lang.is_empty() && !lang.contains('_'))
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn emit(&self, event: DownloadEvent) {
        let _ = self.event_bus.emit(CoreEvent::Download(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caption(code: &str, is_auto: bool) -> CaptionTrack {
        CaptionTrack {
            code: code.to_string(),
            name: code.to_uppercase(),
            is_auto,
        }
    }

    fn preferred() -> Vec<String> {
        vec!["vi".to_string(), "en".to_string()]
    }

    #[test]
    fn test_caption_priority() {
        let all = vec![caption("fr", false), caption("en", false), caption("vi", false)];
        assert_eq!(select_default_caption(&all, &preferred()).unwrap().code, "vi");

        let no_native = vec![caption("fr", false), caption("EN", false)];
        assert_eq!(select_default_caption(&no_native, &preferred()).unwrap().code, "EN");

        let auto_only = vec![caption("fr", false), caption("ko", true)];
        assert_eq!(select_default_caption(&auto_only, &preferred()).unwrap().code, "ko");

        let first = vec![caption("fr", false), caption("de", false)];
        assert_eq!(select_default_caption(&first, &preferred()).unwrap().code, "fr");

        assert!(select_default_caption(&[], &preferred()).is_none());
    }

    #[test]
    fn test_file_stem_sanitizes() {
        assert_eq!(file_stem("dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(file_stem("../x/y"), ".._x_y");
        assert_eq!(file_stem("a.en"), "a.en");
    }
}
