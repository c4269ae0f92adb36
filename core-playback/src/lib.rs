//! # Playback Module
//!
//! Drives the host's native audio output and decides what plays next.
//!
//! ## Overview
//!
//! - [`engine`]: one native resource at a time, new-before-old switching
//! - [`transition`]: sequential/shuffle selection over Ready tracks, debounce
//! - [`control_surface`]: lock-screen mirror and OS command relay
//! - [`controller`]: the serialized player task and its [`PlayerHandle`]

pub mod control_surface;
pub mod controller;
pub mod engine;
pub mod error;
pub mod session;
pub mod transition;

pub use controller::{PlayerController, PlayerDeps, PlayerHandle, TransitionOutcome};
pub use error::{PlaybackError, Result};
pub use session::{EngineState, PlaybackSession};
pub use transition::{Transition, TransitionCoordinator, TransitionKind};
