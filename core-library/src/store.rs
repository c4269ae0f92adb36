//! Track Store
//!
//! In-memory playlist plus per-id track records, mirrored to the host's
//! durable key-value store as one JSON document under
//! [`PLAYLIST_STORAGE_KEY`].
//!
//! All mutations take the same async lock, so a dedup check and the status
//! write that follows it can never interleave with another caller. The lock
//! is held across the persistence write, which keeps the stored document in
//! mutation order. Changes are staged on a copy and reach memory only after
//! the write succeeds.

use crate::error::{LibraryError, Result};
use crate::models::{CaptionSelection, CatalogItem, Playlist, ReadyAssets, Track, TrackId, TrackStatus};
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Key of the persisted playlist document.
pub const PLAYLIST_STORAGE_KEY: &str = "cold-music-offline";

const INTERRUPTED_MESSAGE: &str = "interrupted";

/// Persisted shape: ordered ids plus records keyed by id.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedLibrary {
    #[serde(default)]
    playlist: Playlist,
    #[serde(default)]
    tracks: BTreeMap<TrackId, Track>,
}

#[derive(Debug, Clone, Default)]
struct LibraryState {
    playlist: Playlist,
    tracks: HashMap<TrackId, Track>,
}

impl LibraryState {
    fn ordered(&self) -> Vec<Track> {
        self.playlist
            .ids()
            .iter()
            .filter_map(|id| self.tracks.get(id).cloned())
            .collect()
    }

    fn to_persisted(&self) -> PersistedLibrary {
        PersistedLibrary {
            playlist: self.playlist.clone(),
            tracks: self
                .tracks
                .iter()
                .map(|(id, track)| (id.clone(), track.clone()))
                .collect(),
        }
    }
}

/// Outcome of [`TrackStore::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The caller now owns the acquisition of this Queued record.
    Acquired(Track),
    /// An acquisition is already in flight or has finished; nothing changed.
    Skipped(Track),
}

pub struct TrackStore {
    state: Mutex<LibraryState>,
    settings: Arc<dyn SettingsStore>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl TrackStore {
    /// Load the persisted playlist, or start empty when none exists.
    ///
    /// Records persisted while Queued or Downloading belong to a process that
    /// died mid-download; they come back as Error so the user can retry.
    pub async fn open(
        settings: Arc<dyn SettingsStore>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let persisted = match settings.get_string(PLAYLIST_STORAGE_KEY).await? {
            Some(raw) => serde_json::from_str::<PersistedLibrary>(&raw)?,
            None => PersistedLibrary::default(),
        };

        let mut state = LibraryState::default();
        let mut recovered = 0usize;
        let mut tracks: HashMap<TrackId, Track> = persisted.tracks.into_iter().collect();

        for id in persisted.playlist.ids() {
            let Some(mut track) = tracks.remove(id) else {
                warn!(track_id = %id, "Dropping playlist entry without a track record");
                continue;
            };
            if track.status.is_in_flight() {
                track.status = TrackStatus::Error {
                    message: INTERRUPTED_MESSAGE.to_string(),
                };
                recovered += 1;
            }
            state.playlist.push_back(id.clone());
            state.tracks.insert(id.clone(), track);
        }

        if !tracks.is_empty() {
            warn!(count = tracks.len(), "Dropping track records missing from the playlist");
        }

        let store = Self {
            state: Mutex::new(state),
            settings,
            event_bus,
            clock,
        };

        if recovered > 0 || !tracks.is_empty() {
            let state = store.state.lock().await;
            store.persist(&state).await?;
        }

        let count = store.state.lock().await.playlist.len();
        info!(tracks = count, recovered, "Track store loaded");
        Ok(store)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get(&self, id: &TrackId) -> Option<Track> {
        self.state.lock().await.tracks.get(id).cloned()
    }

    /// Every track in playlist order.
    pub async fn snapshot(&self) -> Vec<Track> {
        self.state.lock().await.ordered()
    }

    pub async fn playlist(&self) -> Playlist {
        self.state.lock().await.playlist.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.playlist.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Atomically decide whether the caller may start acquiring `item`.
    ///
    /// - unknown id: a Queued record is inserted at the front of the playlist
    /// - Error record: restarts at Queued, keeping its position
    /// - Queued, Downloading or Ready record: left alone
    pub async fn claim(&self, item: &CatalogItem) -> Result<Claim> {
        item.validate().map_err(|message| LibraryError::InvalidInput {
            field: "catalog_item".to_string(),
            message,
        })?;

        let mut state = self.state.lock().await;
        let id = TrackId::new(item.id.trim());
        let mut next = state.clone();

        let (claimed, added) = match next.tracks.get_mut(&id) {
            Some(existing) => match existing.status {
                TrackStatus::Error { .. } => {
                    existing.status = TrackStatus::Queued;
                    (existing.clone(), false)
                }
                _ => {
                    debug!(track_id = %id, status = %existing.status, "Acquisition already claimed");
                    return Ok(Claim::Skipped(existing.clone()));
                }
            },
            None => {
                let track = Track::from_catalog(item, self.clock.unix_timestamp_millis());
                next.playlist.push_front(id.clone());
                next.tracks.insert(id.clone(), track.clone());
                (track, true)
            }
        };

        self.commit(&mut state, next).await?;
        if added {
            self.emit(LibraryEvent::TrackAdded {
                track_id: id.to_string(),
                title: claimed.title.clone(),
                author: claimed.author.clone(),
            });
        }
        self.emit_status(&claimed);
        Ok(Claim::Acquired(claimed))
    }

    pub async fn mark_downloading(&self, id: &TrackId) -> Result<Track> {
        self.transition(id, TrackStatus::Downloading).await
    }

    pub async fn mark_ready(&self, id: &TrackId, assets: ReadyAssets) -> Result<Track> {
        self.transition(id, TrackStatus::Ready(assets)).await
    }

    pub async fn mark_failed(&self, id: &TrackId, message: impl Into<String>) -> Result<Track> {
        self.transition(
            id,
            TrackStatus::Error {
                message: message.into(),
            },
        )
        .await
    }

    /// Change the caption attached to a Ready track (`None` detaches it).
    pub async fn select_caption(
        &self,
        id: &TrackId,
        selection: Option<CaptionSelection>,
    ) -> Result<Track> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let track = next
            .tracks
            .get_mut(id)
            .ok_or_else(|| LibraryError::track_not_found(id.as_str()))?;

        let status = track.status.as_str();
        let TrackStatus::Ready(assets) = &mut track.status else {
            return Err(LibraryError::InvalidInput {
                field: "status".to_string(),
                message: format!("track {} is {}, captions need a ready track", id, status),
            });
        };

        if let Some(selection) = &selection {
            if !assets.captions.iter().any(|c| c.code == selection.code) {
                return Err(LibraryError::InvalidInput {
                    field: "caption".to_string(),
                    message: format!("'{}' is not offered for track {}", selection.code, id),
                });
            }
        }

        assets.selected_caption = selection;
        let updated = track.clone();
        self.commit(&mut state, next).await?;

        self.emit(LibraryEvent::CaptionSelected {
            track_id: id.to_string(),
            code: updated.selected_caption_code().map(str::to_string),
        });
        Ok(updated)
    }

    /// Remove a track; the caller owns deleting the returned record's files.
    pub async fn remove(&self, id: &TrackId) -> Result<Track> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let track = next
            .tracks
            .remove(id)
            .ok_or_else(|| LibraryError::track_not_found(id.as_str()))?;
        next.playlist.remove(id);
        self.commit(&mut state, next).await?;

        info!(track_id = %id, status = %track.status, "Track removed");
        self.emit(LibraryEvent::TrackRemoved {
            track_id: id.to_string(),
        });
        Ok(track)
    }

    async fn transition(&self, id: &TrackId, status: TrackStatus) -> Result<Track> {
        let mut state = self.state.lock().await;
        let current = state
            .tracks
            .get(id)
            .ok_or_else(|| LibraryError::track_not_found(id.as_str()))?;

        if !current.status.can_transition_to(&status) {
            return Err(LibraryError::InvalidTransition {
                id: id.to_string(),
                from: current.status.as_str(),
                to: status.as_str(),
            });
        }

        let mut candidate = current.clone();
        candidate.status = status;
        candidate
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: "track".to_string(),
                message,
            })?;

        debug!(track_id = %id, from = %current.status, to = %candidate.status, "Track status change");
        let mut next = state.clone();
        next.tracks.insert(id.clone(), candidate.clone());
        self.commit(&mut state, next).await?;
        self.emit_status(&candidate);
        Ok(candidate)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Write `next` and only then make it the in-memory state. A failed
    /// write leaves memory matching what is on disk.
    async fn commit(&self, state: &mut LibraryState, next: LibraryState) -> Result<()> {
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    async fn persist(&self, state: &LibraryState) -> Result<()> {
        let document = serde_json::to_string(&state.to_persisted())?;
        self.settings
            .set_string(PLAYLIST_STORAGE_KEY, &document)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to persist playlist");
                LibraryError::from(e)
            })
    }

    fn emit_status(&self, track: &Track) {
        self.emit(LibraryEvent::TrackStatusChanged {
            track_id: track.id.to_string(),
            status: track.status.as_str().to_string(),
        });
    }

    fn emit(&self, event: LibraryEvent) {
        let _ = self.event_bus.emit(CoreEvent::Library(event));
    }
}
