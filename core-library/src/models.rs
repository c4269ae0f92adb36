//! Domain models for the offline library
//!
//! A [`Track`] carries its download state as a tagged union, so the local
//! audio path only exists on Ready records and an Error record can never
//! point at a half-written file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// ID Types
// =============================================================================

/// Stable external key assigned by the catalog provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TrackId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// One entry of a provider search or trending listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub author: String,
    /// Human readable length such as `"3:45"`.
    #[serde(default)]
    pub duration: String,
}

impl CatalogItem {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Catalog item id cannot be empty".to_string());
        }
        if self.title.trim().is_empty() {
            return Err("Catalog item title cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Caption language offered by the provider for one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_auto: bool,
}

/// Parse a provider duration hint (`"m:ss"` or `"h:mm:ss"`).
///
/// Returns `None` for anything else, including an empty hint.
pub fn parse_duration_hint(hint: &str) -> Option<Duration> {
    let parts: Vec<&str> = hint.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }

    let mut seconds: u64 = 0;
    for (idx, part) in parts.iter().enumerate() {
        let value: u64 = part.parse().ok()?;
        if idx > 0 && value >= 60 {
            return None;
        }
        seconds = seconds * 60 + value;
    }
    Some(Duration::from_secs(seconds))
}

// =============================================================================
// Track
// =============================================================================

/// Caption file currently attached to a Ready track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionSelection {
    pub code: String,
    pub path: PathBuf,
}

/// Local assets of a fully downloaded track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyAssets {
    pub audio_path: PathBuf,
    #[serde(default)]
    pub captions: Vec<CaptionTrack>,
    #[serde(default)]
    pub selected_caption: Option<CaptionSelection>,
}

/// Download status of a track, each variant carrying only its valid fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrackStatus {
    Queued,
    Downloading,
    Ready(ReadyAssets),
    Error { message: String },
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Queued => "queued",
            TrackStatus::Downloading => "downloading",
            TrackStatus::Ready(_) => "ready",
            TrackStatus::Error { .. } => "error",
        }
    }

    /// Allowed moves: Queued → Downloading → {Ready, Error}, Error → Queued.
    ///
    /// Queued may also fail directly when a download never got going.
    pub fn can_transition_to(&self, next: &TrackStatus) -> bool {
        matches!(
            (self, next),
            (TrackStatus::Queued, TrackStatus::Downloading)
                | (TrackStatus::Queued, TrackStatus::Error { .. })
                | (TrackStatus::Downloading, TrackStatus::Ready(_))
                | (TrackStatus::Downloading, TrackStatus::Error { .. })
                | (TrackStatus::Error { .. }, TrackStatus::Queued)
        )
    }

    /// Queued and Downloading records have an acquisition in flight.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TrackStatus::Queued | TrackStatus::Downloading)
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Playable unit of audio plus optional captions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub author: String,
    pub thumbnail_url: String,
    /// Length as advertised by the catalog, e.g. `"3:45"`.
    pub duration_hint: String,
    /// Unix milliseconds when the record was first created.
    pub added_at: i64,
    pub status: TrackStatus,
}

impl Track {
    /// New Queued record for a catalog item.
    pub fn from_catalog(item: &CatalogItem, added_at: i64) -> Self {
        Self {
            id: TrackId::new(item.id.trim()),
            title: item.title.trim().to_string(),
            author: item.author.trim().to_string(),
            thumbnail_url: item.thumbnail.clone(),
            duration_hint: item.duration.clone(),
            added_at,
            status: TrackStatus::Queued,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.status, TrackStatus::Ready(_))
    }

    pub fn assets(&self) -> Option<&ReadyAssets> {
        match &self.status {
            TrackStatus::Ready(assets) => Some(assets),
            _ => None,
        }
    }

    pub fn audio_path(&self) -> Option<&Path> {
        self.assets().map(|a| a.audio_path.as_path())
    }

    pub fn caption_path(&self) -> Option<&Path> {
        self.assets()
            .and_then(|a| a.selected_caption.as_ref())
            .map(|c| c.path.as_path())
    }

    pub fn selected_caption_code(&self) -> Option<&str> {
        self.assets()
            .and_then(|a| a.selected_caption.as_ref())
            .map(|c| c.code.as_str())
    }

    pub fn approximate_duration(&self) -> Option<Duration> {
        parse_duration_hint(&self.duration_hint)
    }

    /// Validate track data
    pub fn validate(&self) -> Result<(), String> {
        if self.id.as_str().trim().is_empty() {
            return Err("Track id cannot be empty".to_string());
        }

        if self.title.trim().is_empty() {
            return Err("Track title cannot be empty".to_string());
        }

        if let TrackStatus::Ready(assets) = &self.status {
            if assets.audio_path.as_os_str().is_empty() {
                return Err("Ready track must have a local audio path".to_string());
            }
            if let Some(selection) = &assets.selected_caption {
                if !assets.captions.iter().any(|c| c.code == selection.code) {
                    return Err(format!(
                        "Selected caption '{}' is not offered for this track",
                        selection.code
                    ));
                }
            }
        }

        Ok(())
    }
}

// =============================================================================
// Playlist
// =============================================================================

/// Ordered, duplicate-free sequence of track ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Playlist {
    ids: Vec<TrackId>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted ids, dropping later duplicates.
    pub fn from_ids(ids: impl IntoIterator<Item = TrackId>) -> Self {
        let mut playlist = Self::new();
        for id in ids {
            playlist.push_back(id);
        }
        playlist
    }

    pub fn ids(&self) -> &[TrackId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.ids.contains(id)
    }

    pub fn position(&self, id: &TrackId) -> Option<usize> {
        self.ids.iter().position(|existing| existing == id)
    }

    /// Newest tracks go first. Returns false if the id is already present.
    pub fn push_front(&mut self, id: TrackId) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.ids.insert(0, id);
        true
    }

    pub fn push_back(&mut self, id: TrackId) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    pub fn remove(&mut self, id: &TrackId) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.ids.remove(idx);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> CatalogItem {
        CatalogItem {
            id: id.to_string(),
            title: format!("Song {}", id),
            thumbnail: "https://img/1.jpg".to_string(),
            author: "Artist".to_string(),
            duration: "3:45".to_string(),
        }
    }

    fn ready(captions: Vec<CaptionTrack>, selected: Option<&str>) -> TrackStatus {
        TrackStatus::Ready(ReadyAssets {
            audio_path: PathBuf::from("/music_storage/a.m4a"),
            captions,
            selected_caption: selected.map(|code| CaptionSelection {
                code: code.to_string(),
                path: PathBuf::from(format!("/music_storage/a_{}.vtt", code)),
            }),
        })
    }

    #[test]
    fn test_status_transitions() {
        let error = TrackStatus::Error {
            message: "boom".into(),
        };
        assert!(TrackStatus::Queued.can_transition_to(&TrackStatus::Downloading));
        assert!(TrackStatus::Downloading.can_transition_to(&ready(vec![], None)));
        assert!(TrackStatus::Downloading.can_transition_to(&error));
        assert!(error.can_transition_to(&TrackStatus::Queued));

        assert!(!ready(vec![], None).can_transition_to(&TrackStatus::Downloading));
        assert!(!ready(vec![], None).can_transition_to(&TrackStatus::Queued));
        assert!(!TrackStatus::Queued.can_transition_to(&ready(vec![], None)));
        assert!(!error.can_transition_to(&TrackStatus::Downloading));
    }

    #[test]
    fn test_only_ready_tracks_expose_paths() {
        let mut track = Track::from_catalog(&item("a"), 1);
        assert_eq!(track.status, TrackStatus::Queued);
        assert!(track.audio_path().is_none());

        track.status = TrackStatus::Error {
            message: "network".into(),
        };
        assert!(track.audio_path().is_none());
        assert!(track.caption_path().is_none());

        let en = CaptionTrack {
            code: "en".into(),
            name: "English".into(),
            is_auto: false,
        };
        track.status = ready(vec![en], Some("en"));
        assert_eq!(track.audio_path(), Some(Path::new("/music_storage/a.m4a")));
        assert_eq!(track.caption_path(), Some(Path::new("/music_storage/a_en.vtt")));
        assert_eq!(track.selected_caption_code(), Some("en"));
    }

    #[test]
    fn test_track_validation() {
        let mut track = Track::from_catalog(&item("a"), 1);
        assert!(track.validate().is_ok());

        track.status = ready(vec![], Some("vi"));
        assert!(track.validate().is_err());

        track.status = ready(vec![], None);
        assert!(track.validate().is_ok());

        track.title = "  ".into();
        assert!(track.validate().is_err());
    }

    #[test]
    fn test_status_serializes_as_tagged_union() {
        let json = serde_json::to_value(TrackStatus::Error {
            message: "interrupted".into(),
        })
        .unwrap();
        assert_eq!(json["state"], "error");
        assert_eq!(json["message"], "interrupted");

        let json = serde_json::to_value(ready(vec![], None)).unwrap();
        assert_eq!(json["state"], "ready");
        assert_eq!(json["audio_path"], "/music_storage/a.m4a");
    }

    #[test]
    fn test_caption_track_accepts_provider_shape() {
        let caption: CaptionTrack =
            serde_json::from_str(r#"{"code":"a.en","name":"English (auto)","isAuto":true}"#)
                .unwrap();
        assert!(caption.is_auto);
        assert_eq!(caption.code, "a.en");
    }

    #[test]
    fn test_parse_duration_hint() {
        assert_eq!(parse_duration_hint("3:45"), Some(Duration::from_secs(225)));
        assert_eq!(parse_duration_hint("1:02:03"), Some(Duration::from_secs(3723)));
        assert_eq!(parse_duration_hint(" 0:07 "), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration_hint(""), None);
        assert_eq!(parse_duration_hint("3:75"), None);
        assert_eq!(parse_duration_hint("LIVE"), None);
        assert_eq!(parse_duration_hint("1:2:3:4"), None);
    }

    #[test]
    fn test_playlist_keeps_ids_unique() {
        let mut playlist = Playlist::new();
        assert!(playlist.push_front("a".into()));
        assert!(playlist.push_front("b".into()));
        assert!(!playlist.push_front("a".into()));
        assert_eq!(playlist.ids(), &[TrackId::from("b"), TrackId::from("a")]);

        assert!(playlist.remove(&"b".into()));
        assert!(!playlist.remove(&"b".into()));
        assert_eq!(playlist.position(&"a".into()), Some(0));

        let restored = Playlist::from_ids(vec!["x".into(), "y".into(), "x".into()]);
        assert_eq!(restored.len(), 2);
    }
}
