//! Playback bridge traits and supporting audio types.
//!
//! The core never decodes audio itself. It drives an opaque native output
//! resource owned by the host (AVPlayer, ExoPlayer, a desktop sink) through
//! [`PlaybackAdapter`]. Each prepared resource pushes [`ResourceReport`]s
//! back through the listener channel handed to `prepare`, which is how the
//! core learns that playback actually started, progressed or finished.

use crate::error::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier for playback resources managed by a host adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackSessionId(Uuid);

impl PlaybackSessionId {
    /// Generate a new session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Construct an identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PlaybackSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlaybackSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback lifecycle state of a single native resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Preparing,
    Playing,
    Paused,
    Stopped,
    Completed,
    Error { message: String },
}

/// Additional playback options supplied alongside a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    /// Initial playback position (defaults to start of stream).
    pub start_position: Duration,
    /// Initial volume (0.0 = muted, 1.0 = unity gain).
    pub initial_volume: f32,
    /// How often the resource should emit [`ResourceStatus::Progress`].
    pub progress_interval: Duration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            start_position: Duration::from_secs(0),
            initial_volume: 1.0,
            progress_interval: Duration::from_millis(500),
        }
    }
}

/// Metadata associated with a playback request. Hosts may use it to label
/// the native resource (e.g. audio focus requests).
#[derive(Debug, Clone, Default)]
pub struct PlaybackMetadata {
    pub track_id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
}

/// Request describing the local file a host adapter should load.
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    /// Local audio file produced by the download manager.
    pub path: PathBuf,
    pub options: PlaybackOptions,
    pub metadata: PlaybackMetadata,
}

impl PlaybackRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: PlaybackOptions::default(),
            metadata: PlaybackMetadata::default(),
        }
    }

    /// Attach playback options to the request.
    pub fn with_options(mut self, options: PlaybackOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach metadata to the request.
    pub fn with_metadata(mut self, metadata: PlaybackMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Status notifications emitted by a native resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceStatus {
    /// Audio is audibly playing for the first time after `play`.
    Started,
    /// Periodic position report.
    Progress {
        position: Duration,
        duration: Option<Duration>,
        is_playing: bool,
    },
    /// Reached end of stream.
    Finished,
    /// The resource failed and can no longer play.
    Failed { message: String },
}

/// A status notification tagged with the resource it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReport {
    pub session: PlaybackSessionId,
    pub status: ResourceStatus,
}

impl ResourceReport {
    pub fn new(session: PlaybackSessionId, status: ResourceStatus) -> Self {
        Self { session, status }
    }
}

/// Channel a resource pushes its reports into.
pub type StatusListener = mpsc::UnboundedSender<ResourceReport>;

/// Trait for platform-specific adapters that drive a native audio output.
///
/// Implementations must allow two resources to coexist briefly: the core
/// prepares and starts the next track before releasing the current one.
#[async_trait::async_trait]
pub trait PlaybackAdapter: Send + Sync {
    /// Allocate a native resource for the request. Reports for the returned
    /// session are sent to `listener` until the session is unloaded.
    async fn prepare(
        &self,
        request: PlaybackRequest,
        listener: StatusListener,
    ) -> Result<PlaybackSessionId>;

    /// Begin or resume playback for the provided session.
    async fn play(&self, session: PlaybackSessionId) -> Result<()>;

    /// Pause playback without releasing the session.
    async fn pause(&self, session: PlaybackSessionId) -> Result<()>;

    /// Stop playback and reset position to the start of the stream.
    async fn stop(&self, session: PlaybackSessionId) -> Result<()>;

    /// Seek to an absolute position within the stream.
    async fn seek(&self, session: PlaybackSessionId, position: Duration) -> Result<()>;

    /// Fetch the adapter's current understanding of the session state.
    async fn state(&self, session: PlaybackSessionId) -> Result<PlaybackState>;

    /// Release resources associated with a playback session.
    async fn unload(&self, session: PlaybackSessionId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_options_default_values() {
        let opts = PlaybackOptions::default();
        assert_eq!(opts.start_position, Duration::from_secs(0));
        assert_eq!(opts.initial_volume, 1.0);
        assert_eq!(opts.progress_interval, Duration::from_millis(500));
    }

    #[test]
    fn session_id_is_unique() {
        let a = PlaybackSessionId::new();
        let b = PlaybackSessionId::new();
        assert_ne!(a, b);
        assert_eq!(a, PlaybackSessionId::from_uuid(*a.as_uuid()));
    }

    #[test]
    fn request_builder_keeps_path() {
        let request = PlaybackRequest::new("/tmp/music_storage/abc.m4a").with_metadata(
            PlaybackMetadata {
                track_id: Some("abc".into()),
                ..Default::default()
            },
        );
        assert_eq!(request.path, PathBuf::from("/tmp/music_storage/abc.m4a"));
        assert_eq!(request.metadata.track_id.as_deref(), Some("abc"));
    }
}
