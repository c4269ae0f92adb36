//! # Metadata & Lyrics Module
//!
//! Talks to the catalog provider and turns caption files into synchronized
//! lyric lines.
//!
//! ## Overview
//!
//! This module handles:
//! - Catalog search and trending listings
//! - Caption language metadata, audio streams and caption bodies
//! - Caption parsing (block `start --> end` cues and inline `[mm:ss.xx]` tags)
//! - Mapping the playback position to the active lyric line

pub mod error;
pub mod lyrics;
pub mod provider;

pub use error::{MetadataError, Result};
pub use lyrics::{
    active_line_index, CaptionFormat, CaptionParser, LoadTicket, LyricLine, LyricsState,
    LyricsSynchronizer,
};
pub use provider::{CatalogClient, TrackMeta, DEFAULT_REQUEST_TIMEOUT};
