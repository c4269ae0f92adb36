//! Workspace facade crate.
//!
//! Exposes feature flags that map onto the individual workspace crates
//! (`core-service`, `core-metadata`, `core-playback`). Host applications can
//! depend on `cold-music-workspace` and enable the documented features without
//! wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;

#[cfg(feature = "lyrics")]
pub use core_metadata as metadata;

#[cfg(feature = "playback")]
pub use core_playback as playback;
