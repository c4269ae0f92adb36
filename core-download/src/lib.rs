//! # Download Module
//!
//! Acquires the audio asset and default caption of a track, writes them to
//! local storage and drives the track's status from Queued through
//! Downloading to Ready or Error.
//!
//! ## Overview
//!
//! - Repeated `acquire` calls for a track that is queued, downloading or
//!   ready are no-ops; the claim is atomic with respect to the track store.
//! - Audio and caption are fetched concurrently. Audio is streamed into a
//!   `.part` file and renamed only once complete, so an interrupted download
//!   never looks playable.
//! - There is no automatic retry. A failed track stays in Error until the
//!   caller acquires it again.

pub mod error;
pub mod manager;

pub use error::{DownloadError, Result};
pub use manager::{select_default_caption, AcquireOutcome, DownloadManager};
