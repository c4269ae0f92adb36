//! # Core Configuration Module
//!
//! Provides configuration management for the media orchestration core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all bridges and tuning values the core needs. It
//! enforces fail-fast validation so a missing capability is reported at
//! startup rather than on the first play or download.
//!
//! ## Required
//!
//! - `provider_base_url` - Root of the catalog provider HTTP API
//! - `PlaybackAdapter` - Native audio output (always host-provided)
//!
//! ## Optional (with desktop defaults)
//!
//! - `HttpClient` - desktop default: reqwest
//! - `FileSystemAccess` - desktop default: tokio fs
//! - `SettingsStore` - desktop default: SQLite key-value table
//! - `ControlSurface` - lock-screen integration (none by default)
//! - `Clock` - defaults to the system clock
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults are
//! injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .provider_base_url("http://192.168.1.20:8000")
//!     .playback_adapter(Arc::new(MyNativePlayer::new()))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // No playback adapter: fails with an actionable CapabilityMissing error
//! let config = CoreConfig::builder()
//!     .provider_base_url("http://localhost:8000")
//!     .build()
//!     .expect("Should fail - missing playback adapter");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, ControlSurface, FileSystemAccess, HttpClient, PlaybackAdapter, SettingsStore,
    SystemClock,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Directory (under the data directory) holding downloaded assets.
pub const STORAGE_DIR_NAME: &str = "music_storage";

/// Core configuration for the media orchestration core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Base URL of the catalog provider (no trailing slash).
    pub provider_base_url: String,

    /// Directory for downloaded audio and caption files. When `None`, the
    /// service uses `<data dir>/music_storage`.
    pub storage_dir: Option<PathBuf>,

    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub playback_adapter: Arc<dyn PlaybackAdapter>,
    pub control_surface: Option<Arc<dyn ControlSurface>>,
    pub clock: Arc<dyn Clock>,

    /// Player timing and lyric tuning.
    pub player: PlayerConfig,

    /// Download behaviour.
    pub download: DownloadConfig,

    /// Event bus capacity.
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("provider_base_url", &self.provider_base_url)
            .field("storage_dir", &self.storage_dir)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("playback_adapter", &"PlaybackAdapter { ... }")
            .field(
                "control_surface",
                &self
                    .control_surface
                    .as_ref()
                    .map(|_| "ControlSurface { ... }"),
            )
            .field("player", &self.player)
            .field("download", &self.download)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

// ============================================================================
// Player tuning
// ============================================================================

/// Timing and lyric tuning for the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Manual next/previous requests closer together than this are dropped.
    ///
    /// Default: 300 ms.
    #[serde(default = "default_transition_debounce")]
    pub transition_debounce: Duration,

    /// How long a new resource has to confirm it started before the load is
    /// declared failed.
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_start_confirm_timeout")]
    pub start_confirm_timeout: Duration,

    /// Progress report interval requested from the native resource.
    ///
    /// Default: 500 ms.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: Duration,

    /// Minimum spacing of position-only pushes to the control surface.
    ///
    /// Default: 1 second.
    #[serde(default = "default_surface_position_throttle")]
    pub surface_position_throttle: Duration,

    /// Added to the playback position before looking up the active lyric
    /// line. Captions from the provider consistently lag the audio.
    ///
    /// Default: 760 ms.
    #[serde(default = "default_lyrics_offset_ms")]
    pub lyrics_offset_ms: i64,
}

fn default_transition_debounce() -> Duration {
    Duration::from_millis(300)
}

fn default_start_confirm_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_progress_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_surface_position_throttle() -> Duration {
    Duration::from_secs(1)
}

fn default_lyrics_offset_ms() -> i64 {
    760
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            transition_debounce: default_transition_debounce(),
            start_confirm_timeout: default_start_confirm_timeout(),
            progress_interval: default_progress_interval(),
            surface_position_throttle: default_surface_position_throttle(),
            lyrics_offset_ms: default_lyrics_offset_ms(),
        }
    }
}

impl PlayerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.start_confirm_timeout.is_zero() {
            return Err(Error::Config(
                "start_confirm_timeout must be greater than zero".to_string(),
            ));
        }

        if self.progress_interval.is_zero() {
            return Err(Error::Config(
                "progress_interval must be greater than zero".to_string(),
            ));
        }

        if self.transition_debounce > Duration::from_secs(5) {
            return Err(Error::Config(
                "transition_debounce above 5 seconds would swallow deliberate skips".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Download tuning
// ============================================================================

/// Download manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Caption languages tried in order before falling back to an
    /// auto-generated track, then to whatever the provider lists first.
    /// The first entry is the user's native locale.
    ///
    /// Default: `["vi", "en"]`.
    #[serde(default = "default_caption_languages")]
    pub preferred_caption_languages: Vec<String>,
}

fn default_caption_languages() -> Vec<String> {
    vec!["vi".to_string(), "en".to_string()]
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            preferred_caption_languages: default_caption_languages(),
        }
    }
}

impl DownloadConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.preferred_caption_languages.is_empty() {
            return Err(Error::Config(
                "preferred_caption_languages must contain at least one language".to_string(),
            ));
        }

        if self
            .preferred_caption_languages
            .iter()
            .any(|code| code.trim().is_empty())
        {
            return Err(Error::Config(
                "preferred_caption_languages cannot contain empty codes".to_string(),
            ));
        }

        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        let url = self.provider_base_url.trim();
        if url.is_empty() {
            return Err(Error::Config("Provider base URL cannot be empty".to_string()));
        }

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Provider base URL must start with http:// or https://, got '{}'",
                url
            )));
        }

        if let Some(dir) = &self.storage_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::Config("Storage directory cannot be empty".to_string()));
            }
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.player.validate()?;
        self.download.validate()?;

        Ok(())
    }
}

// ============================================================================
// Capability defaults
// ============================================================================

fn playback_adapter_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "PlaybackAdapter".to_string(),
        message: "A native audio output is required. \
                 The core never decodes audio itself; inject the host's player \
                 (AVPlayer/ExoPlayer/desktop sink) with .playback_adapter()."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing_error(capability: &str, detail: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} Desktop: enable the 'desktop-shims' feature to use the default. \
             Mobile: inject the platform-native implementation.",
            detail
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing_error(
        "HttpClient",
        "An HTTP client is required to reach the catalog provider.",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(data_dir: Option<&PathBuf>) -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs = match data_dir {
        Some(dir) => TokioFileSystem::with_data_directory(dir.clone()),
        None => TokioFileSystem::new(),
    };
    Ok(Arc::new(fs))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_data_dir: Option<&PathBuf>) -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing_error(
        "FileSystemAccess",
        "File system access is required to store downloaded tracks.",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(data_dir: Option<&PathBuf>) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::{SqliteSettingsStore, TokioFileSystem};
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let base = data_dir
        .cloned()
        .unwrap_or_else(|| TokioFileSystem::new().data_dir().to_path_buf());
    let candidate = base.join("settings.db");

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Runtime::new().map_err(|e| {
            Error::Internal(format!(
                "Failed to create Tokio runtime for default settings store: {}",
                e
            ))
        })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
            })
    };

    // block_on inside a running runtime panics; hop to a plain thread instead
    let store = match Handle::try_current() {
        Ok(_) => {
            let path = candidate.clone();
            thread::spawn(move || init_store(path))
                .join()
                .map_err(|_| {
                    Error::Internal(
                        "Worker thread panicked while creating default SettingsStore".to_string(),
                    )
                })??
        }
        Err(_) => init_store(candidate)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_data_dir: Option<&PathBuf>) -> Result<Arc<dyn SettingsStore>> {
    Err(capability_missing_error(
        "SettingsStore",
        "A durable key-value store is required to persist the playlist.",
    ))
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    provider_base_url: Option<String>,
    data_dir: Option<PathBuf>,
    storage_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    playback_adapter: Option<Arc<dyn PlaybackAdapter>>,
    control_surface: Option<Arc<dyn ControlSurface>>,
    clock: Option<Arc<dyn Clock>>,
    player: Option<PlayerConfig>,
    download: Option<DownloadConfig>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the catalog provider base URL.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().provider_base_url("http://localhost:8000/");
    /// ```
    pub fn provider_base_url(mut self, url: impl Into<String>) -> Self {
        self.provider_base_url = Some(url.into());
        self
    }

    /// Root directory for desktop defaults (settings database, storage).
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Directory for downloaded audio and caption files.
    pub fn storage_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage_dir = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Sets the native audio output. Required.
    pub fn playback_adapter(mut self, adapter: Arc<dyn PlaybackAdapter>) -> Self {
        self.playback_adapter = Some(adapter);
        self
    }

    pub fn control_surface(mut self, surface: Arc<dyn ControlSurface>) -> Self {
        self.control_surface = Some(surface);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn player_config(mut self, config: PlayerConfig) -> Self {
        self.player = Some(config);
        self
    }

    pub fn download_config(mut self, config: DownloadConfig) -> Self {
        self.download = Some(config);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if the provider URL or playback adapter is missing,
    /// a bridge has no default on this platform, or a value is invalid.
    pub fn build(self) -> Result<CoreConfig> {
        let provider_base_url = self
            .provider_base_url
            .ok_or_else(|| {
                Error::Config(
                    "Provider base URL is required. Use .provider_base_url() to set it."
                        .to_string(),
                )
            })?
            .trim()
            .trim_end_matches('/')
            .to_string();

        let playback_adapter = self
            .playback_adapter
            .ok_or_else(playback_adapter_missing_error)?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(self.data_dir.as_ref())?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(self.data_dir.as_ref())?,
        };

        let storage_dir = self
            .storage_dir
            .or_else(|| self.data_dir.map(|dir| dir.join(STORAGE_DIR_NAME)));

        let config = CoreConfig {
            provider_base_url,
            storage_dir,
            http_client,
            file_system,
            settings_store,
            playback_adapter,
            control_surface: self.control_surface,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            player: self.player.unwrap_or_default(),
            download: self.download.unwrap_or_default(),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bridge_traits::playback::{
        PlaybackRequest, PlaybackSessionId, PlaybackState, StatusListener,
    };
    use bridge_traits::storage::FileMetadata;
    use bytes::Bytes;
    use std::path::Path;

    struct MockHttp;

    #[async_trait]
    impl HttpClient for MockHttp {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            unimplemented!()
        }

        async fn download_stream(
            &self,
            _url: String,
        ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
            unimplemented!()
        }
    }

    struct MockFs;

    #[async_trait]
    impl FileSystemAccess for MockFs {
        async fn get_data_directory(&self) -> BridgeResult<PathBuf> {
            Ok(PathBuf::from("/data"))
        }
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }
        async fn metadata(&self, _path: &Path) -> BridgeResult<FileMetadata> {
            unimplemented!()
        }
        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn read_file(&self, _path: &Path) -> BridgeResult<Bytes> {
            unimplemented!()
        }
        async fn write_file(&self, _path: &Path, _data: Bytes) -> BridgeResult<()> {
            Ok(())
        }
        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn rename(&self, _from: &Path, _to: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn list_directory(&self, _path: &Path) -> BridgeResult<Vec<PathBuf>> {
            Ok(Vec::new())
        }
        async fn open_write_stream(
            &self,
            _path: &Path,
        ) -> BridgeResult<Box<dyn tokio::io::AsyncWrite + Send + Unpin>> {
            unimplemented!()
        }
    }

    struct MockSettingsStore;

    #[async_trait]
    impl SettingsStore for MockSettingsStore {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }
        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct MockPlayer;

    #[async_trait]
    impl PlaybackAdapter for MockPlayer {
        async fn prepare(
            &self,
            _request: PlaybackRequest,
            _listener: StatusListener,
        ) -> BridgeResult<PlaybackSessionId> {
            Ok(PlaybackSessionId::new())
        }
        async fn play(&self, _session: PlaybackSessionId) -> BridgeResult<()> {
            Ok(())
        }
        async fn pause(&self, _session: PlaybackSessionId) -> BridgeResult<()> {
            Ok(())
        }
        async fn stop(&self, _session: PlaybackSessionId) -> BridgeResult<()> {
            Ok(())
        }
        async fn seek(&self, _session: PlaybackSessionId, _position: Duration) -> BridgeResult<()> {
            Ok(())
        }
        async fn state(&self, _session: PlaybackSessionId) -> BridgeResult<PlaybackState> {
            Ok(PlaybackState::Playing)
        }
        async fn unload(&self, _session: PlaybackSessionId) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn complete_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .provider_base_url("http://localhost:8000/")
            .http_client(Arc::new(MockHttp))
            .file_system(Arc::new(MockFs))
            .settings_store(Arc::new(MockSettingsStore))
            .playback_adapter(Arc::new(MockPlayer))
    }

    #[test]
    fn test_builder_with_all_required_fields() {
        let config = complete_builder().build().unwrap();

        assert_eq!(config.provider_base_url, "http://localhost:8000");
        assert!(config.storage_dir.is_none());
        assert!(config.control_surface.is_none());
        assert_eq!(config.player, PlayerConfig::default());
        assert_eq!(config.event_buffer_size, crate::events::DEFAULT_EVENT_BUFFER_SIZE);
    }

    #[test]
    fn test_builder_requires_provider_url() {
        let result = CoreConfig::builder()
            .playback_adapter(Arc::new(MockPlayer))
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_requires_playback_adapter() {
        let result = CoreConfig::builder()
            .provider_base_url("http://localhost:8000")
            .http_client(Arc::new(MockHttp))
            .file_system(Arc::new(MockFs))
            .settings_store(Arc::new(MockSettingsStore))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "PlaybackAdapter")
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let result = complete_builder().provider_base_url("ftp://host").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_storage_dir_derived_from_data_dir() {
        let config = complete_builder().data_dir("/tmp/cold").build().unwrap();
        assert_eq!(
            config.storage_dir,
            Some(PathBuf::from("/tmp/cold").join(STORAGE_DIR_NAME))
        );

        let explicit = complete_builder()
            .data_dir("/tmp/cold")
            .storage_dir("/mnt/music")
            .build()
            .unwrap();
        assert_eq!(explicit.storage_dir, Some(PathBuf::from("/mnt/music")));
    }

    #[test]
    fn test_player_config_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.transition_debounce, Duration::from_millis(300));
        assert_eq!(config.start_confirm_timeout, Duration::from_secs(5));
        assert_eq!(config.progress_interval, Duration::from_millis(500));
        assert_eq!(config.surface_position_throttle, Duration::from_secs(1));
        assert_eq!(config.lyrics_offset_ms, 760);
    }

    #[test]
    fn test_validate_rejects_zero_confirm_timeout() {
        let result = complete_builder()
            .player_config(PlayerConfig {
                start_confirm_timeout: Duration::ZERO,
                ..Default::default()
            })
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_language_list() {
        let result = complete_builder()
            .download_config(DownloadConfig {
                preferred_caption_languages: Vec::new(),
            })
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_player_config_deserializes_with_defaults() {
        let config: PlayerConfig =
            serde_json::from_str(r#"{"lyrics_offset_ms": 500}"#).unwrap();
        assert_eq!(config.lyrics_offset_ms, 500);
        assert_eq!(config.transition_debounce, Duration::from_millis(300));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let base = std::env::temp_dir().join(format!("core-runtime-test-{}", uuid::Uuid::new_v4()));

        let config = CoreConfig::builder()
            .provider_base_url("http://localhost:8000")
            .data_dir(&base)
            .playback_adapter(Arc::new(MockPlayer))
            .build()
            .expect("desktop defaults should succeed");

        let settings = config.settings_store.clone();
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            settings.set_string("cold-music-offline", "{}").await.unwrap();
            let value = settings.get_string("cold-music-offline").await.unwrap();
            assert_eq!(value.as_deref(), Some("{}"));
        });

        drop(config);
        let _ = std::fs::remove_dir_all(&base);
    }
}
