//! # Library Management Module
//!
//! Owns the playlist and the per-track records that every other component
//! reads from.
//!
//! ## Overview
//!
//! This module manages:
//! - Domain models: [`Track`] as a tagged union over its download status,
//!   [`Playlist`] ordering, catalog search results and caption listings
//! - The [`TrackStore`], the single source of truth for track status,
//!   persisted as one JSON document in the host's durable key-value store
//!
//! Mutations go through the store's operations only. Each one validates the
//! status transition, persists the new document and emits a
//! [`LibraryEvent`](core_runtime::events::LibraryEvent).

pub mod error;
pub mod models;
pub mod store;

pub use error::{LibraryError, Result};
pub use models::{
    parse_duration_hint, CaptionSelection, CaptionTrack, CatalogItem, Playlist, ReadyAssets,
    Track, TrackId, TrackStatus,
};
pub use store::{Claim, TrackStore, PLAYLIST_STORAGE_KEY};
