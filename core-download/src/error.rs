use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use core_metadata::MetadataError;
use thiserror::Error;

/// Failure while acquiring a track's assets. The track ends up in Error.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Caption metadata unavailable: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Audio fetch failed: {0}")]
    AudioFetch(String),

    #[error("Caption fetch failed: {0}")]
    CaptionFetch(String),

    #[error("Storage error: {0}")]
    Storage(#[from] BridgeError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

impl DownloadError {
    /// Whether calling `acquire` again may succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DownloadError::Library(_))
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
