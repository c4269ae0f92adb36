use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Provider request to {endpoint} failed: {message}")]
    ProviderRequest {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Caption unavailable for track {track_id}: {reason}")]
    UnsupportedCaption { track_id: String, reason: String },

    #[error("Caption pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

impl MetadataError {
    /// Transport failures and 5xx responses may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            MetadataError::ProviderRequest { status: None, .. } => true,
            MetadataError::ProviderRequest {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 429,
            MetadataError::Bridge(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
