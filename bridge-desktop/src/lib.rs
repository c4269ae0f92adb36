//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `FileSystemAccess` using `tokio::fs`
//! - `SettingsStore` using a SQLite-backed key-value table
//! - `ControlSurface` mirrored into `tracing`, with command injection for
//!   tray menus and global media keys
//!
//! Native audio output is not provided here; hosts inject their own
//! `PlaybackAdapter`.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client = ReqwestHttpClient::new();
//!     let fs = TokioFileSystem::new();
//!     // Use in core configuration
//! }
//! ```

mod filesystem;
mod http;
mod media_session;
mod settings;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use media_session::LoggingControlSurface;
pub use settings::SqliteSettingsStore;
