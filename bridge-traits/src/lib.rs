//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the media orchestration core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that must be implemented differently per platform
//! (desktop, iOS, Android).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Provider requests and streaming audio downloads
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Local asset storage
//! - [`SettingsStore`](storage::SettingsStore) - Durable key-value store for the playlist
//!
//! ### Media
//! - [`PlaybackAdapter`](playback::PlaybackAdapter) - Opaque native audio output
//! - [`ControlSurface`](media_session::ControlSurface) - OS lock-screen / notification controls
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! let adapter = config.playback_adapter
//!     .ok_or_else(|| CoreError::CapabilityMissing {
//!         capability: "PlaybackAdapter".to_string(),
//!         message: "The host must provide a native audio output.".to_string(),
//!     })?;
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across tokio
//! tasks behind `Arc<dyn Trait>`.

pub mod error;
pub mod http;
pub mod media_session;
pub mod playback;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use media_session::{CommandSink, ControlSurface, MediaCommand, NowPlaying};
pub use playback::{
    PlaybackAdapter, PlaybackMetadata, PlaybackOptions, PlaybackRequest, PlaybackSessionId,
    PlaybackState, ResourceReport, ResourceStatus, StatusListener,
};
pub use storage::{FileMetadata, FileSystemAccess, SettingsStore};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
