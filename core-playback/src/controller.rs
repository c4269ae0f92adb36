//! # Player Controller
//!
//! One task owns the [`PlaybackEngine`], the [`TransitionCoordinator`] and
//! the [`SurfaceMirror`]. UI calls, OS media commands and resource reports
//! are all processed by that task one at a time, so a transition can never
//! race another transition, and the debounce decision is taken in the same
//! step that updates its timestamp.
//!
//! ## Usage
//!
//! ```ignore
//! let player = PlayerController::spawn(PlayerDeps {
//!     adapter,
//!     store: store.clone(),
//!     lyrics: Some(lyrics.clone()),
//!     control_surface: None,
//!     event_bus: event_bus.clone(),
//!     config: PlayerConfig::default(),
//! })
//! .await;
//!
//! player.play_track(TrackId::from("abc")).await?;
//! let mut session = player.subscribe();
//! ```

use crate::control_surface::{relay_media_commands, SurfaceMirror};
use crate::engine::{EngineConfig, EngineSignal, PlaybackEngine};
use crate::error::{PlaybackError, Result};
use crate::session::{EngineState, PlaybackSession};
use crate::transition::{Transition, TransitionCoordinator, TransitionKind};
use bridge_traits::media_session::{ControlSurface, MediaCommand};
use bridge_traits::playback::{PlaybackAdapter, ResourceReport};
use core_library::models::{Track, TrackId};
use core_library::{LibraryError, TrackStore};
use core_metadata::LyricsSynchronizer;
use core_runtime::config::PlayerConfig;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Result of a manual next/previous request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// This track is now playing.
    Started(TrackId),
    /// Swallowed by the debounce window.
    Debounced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Next,
    Previous,
}

enum PlayerCommand {
    PlayTrack { id: TrackId, reply: Reply<TrackId> },
    Transition {
        direction: Direction,
        /// Taken when the request is made, not when the task dequeues it,
        /// so requests queued behind a slow load are still debounced.
        requested_at: Instant,
        reply: Reply<TransitionOutcome>,
    },
    TogglePlay { reply: Reply<bool> },
    Pause { reply: Reply<()> },
    Resume { reply: Reply<()> },
    Seek { position_ms: u64, reply: Reply<u64> },
    Stop { reply: Reply<()> },
    SetShuffle { enabled: bool, reply: Reply<()> },
    TrackRemoved { id: TrackId, reply: Reply<bool> },
    Shutdown { reply: Reply<()> },
}

/// Everything the player needs from the rest of the core.
pub struct PlayerDeps {
    pub adapter: Arc<dyn PlaybackAdapter>,
    pub store: Arc<TrackStore>,
    pub lyrics: Option<Arc<LyricsSynchronizer>>,
    pub control_surface: Option<Arc<dyn ControlSurface>>,
    pub event_bus: EventBus,
    pub config: PlayerConfig,
}

// ============================================================================
// Handle
// ============================================================================

/// Cheap, cloneable entry point into the player task.
#[derive(Clone)]
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<PlayerCommand>,
    session: watch::Receiver<PlaybackSession>,
}

impl PlayerHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> PlayerCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| PlaybackError::ControllerClosed)?;
        response.await.map_err(|_| PlaybackError::ControllerClosed)?
    }

    /// Play a specific track. Not debounced. If it fails to start, playback
    /// skips forward as it would after a failed auto-advance; the returned
    /// id is the track that actually started.
    pub async fn play_track(&self, id: TrackId) -> Result<TrackId> {
        self.request(|reply| PlayerCommand::PlayTrack { id, reply })
            .await
    }

    pub async fn next(&self) -> Result<TransitionOutcome> {
        self.transition(Direction::Next).await
    }

    pub async fn previous(&self) -> Result<TransitionOutcome> {
        self.transition(Direction::Previous).await
    }

    async fn transition(&self, direction: Direction) -> Result<TransitionOutcome> {
        let requested_at = Instant::now();
        self.request(|reply| PlayerCommand::Transition {
            direction,
            requested_at,
            reply,
        })
        .await
    }

    /// Pause when playing, resume when paused. Returns the new `is_playing`.
    pub async fn toggle_play(&self) -> Result<bool> {
        self.request(|reply| PlayerCommand::TogglePlay { reply })
            .await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| PlayerCommand::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(|reply| PlayerCommand::Resume { reply }).await
    }

    /// Seek within the current track. Returns the clamped position.
    pub async fn seek(&self, position_ms: u64) -> Result<u64> {
        self.request(|reply| PlayerCommand::Seek { position_ms, reply })
            .await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| PlayerCommand::Stop { reply }).await
    }

    pub async fn set_shuffle(&self, enabled: bool) -> Result<()> {
        self.request(|reply| PlayerCommand::SetShuffle { enabled, reply })
            .await
    }

    /// Tell the player a track left the playlist. Stops playback if it was
    /// the current one; returns whether it was.
    pub async fn track_removed(&self, id: TrackId) -> Result<bool> {
        self.request(|reply| PlayerCommand::TrackRemoved { id, reply })
            .await
    }

    /// Release the resource and end the player task.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| PlayerCommand::Shutdown { reply }).await
    }

    /// Route an OS surface command to the matching entry point.
    pub async fn handle_media_command(&self, command: MediaCommand) -> Result<()> {
        match command {
            MediaCommand::Play => self.resume().await,
            MediaCommand::Pause => self.pause().await,
            MediaCommand::TogglePlayPause => self.toggle_play().await.map(|_| ()),
            MediaCommand::NextTrack => self.next().await.map(|_| ()),
            MediaCommand::PreviousTrack => self.previous().await.map(|_| ()),
            MediaCommand::Seek(seconds) => self
                .seek((seconds.max(0.0) * 1000.0) as u64)
                .await
                .map(|_| ()),
            MediaCommand::Stop => self.stop().await,
        }
    }

    pub fn session(&self) -> PlaybackSession {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSession> {
        self.session.clone()
    }
}

// ============================================================================
// Controller
// ============================================================================

pub struct PlayerController {
    engine: PlaybackEngine,
    coordinator: TransitionCoordinator,
    surface: SurfaceMirror,
    store: Arc<TrackStore>,
    lyrics: Option<Arc<LyricsSynchronizer>>,
    event_bus: EventBus,
    session: watch::Sender<PlaybackSession>,
    /// Record of the loaded track, for the surface descriptor.
    current: Option<Track>,
    commands: mpsc::UnboundedReceiver<PlayerCommand>,
    reports: mpsc::UnboundedReceiver<ResourceReport>,
}

impl PlayerController {
    /// Start the player task and return its handle.
    pub async fn spawn(deps: PlayerDeps) -> PlayerHandle {
        let PlayerDeps {
            adapter,
            store,
            lyrics,
            control_surface,
            event_bus,
            config,
        } = deps;

        let (engine, reports) = PlaybackEngine::new(
            adapter,
            EngineConfig {
                start_confirm_timeout: config.start_confirm_timeout,
                progress_interval: config.progress_interval,
            },
        );
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (session, session_rx) = watch::channel(PlaybackSession::default());
        let surface = SurfaceMirror::new(control_surface, config.surface_position_throttle);

        let handle = PlayerHandle {
            commands: commands_tx,
            session: session_rx,
        };

        let (sink, media_commands) = mpsc::unbounded_channel();
        if surface.enable(sink).await {
            tokio::spawn(relay_media_commands(handle.clone(), media_commands));
        }

        let controller = Self {
            engine,
            coordinator: TransitionCoordinator::new(config.transition_debounce),
            surface,
            store,
            lyrics,
            event_bus,
            session,
            current: None,
            commands,
            reports,
        };
        tokio::spawn(controller.run());
        handle
    }

    async fn run(mut self) {
        info!("Player controller started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(PlayerCommand::Shutdown { reply }) => {
                        self.stop_playback().await;
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(report) = self.reports.recv() => self.handle_report(report).await,
            }
        }

        if self.engine.current_session().is_some() {
            self.stop_playback().await;
        }
        info!("Player controller stopped");
    }

    async fn handle_command(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::PlayTrack { id, reply } => {
                let _ = reply.send(self.play_track(id).await);
            }
            PlayerCommand::Transition {
                direction,
                requested_at,
                reply,
            } => {
                let _ = reply.send(self.manual_transition(direction, requested_at).await);
            }
            PlayerCommand::TogglePlay { reply } => {
                let result = match self.engine.state() {
                    EngineState::Playing => self.pause().await.map(|_| false),
                    EngineState::Paused => self.resume().await.map(|_| true),
                    state => Err(PlaybackError::InvalidState(format!(
                        "nothing to toggle while {}",
                        state
                    ))),
                };
                let _ = reply.send(result);
            }
            PlayerCommand::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            PlayerCommand::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            PlayerCommand::Seek { position_ms, reply } => {
                let _ = reply.send(self.seek(position_ms).await);
            }
            PlayerCommand::Stop { reply } => {
                self.stop_playback().await;
                let _ = reply.send(Ok(()));
            }
            PlayerCommand::SetShuffle { enabled, reply } => {
                self.session.send_modify(|s| s.shuffle = enabled);
                debug!(enabled, "Shuffle changed");
                let _ = reply.send(Ok(()));
            }
            PlayerCommand::TrackRemoved { id, reply } => {
                let was_current = self.session.borrow().current_track_id.as_ref() == Some(&id);
                if was_current {
                    info!(track_id = %id, "Current track removed, stopping");
                    self.stop_playback().await;
                }
                let _ = reply.send(Ok(was_current));
            }
            PlayerCommand::Shutdown { reply } => {
                let _ = reply.send(Ok(()));
            }
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    #[instrument(skip(self, id), fields(track_id = %id))]
    async fn play_track(&mut self, id: TrackId) -> Result<TrackId> {
        let track = self.store.get(&id).await.ok_or_else(|| LibraryError::NotFound {
            entity_type: "Track".to_string(),
            id: id.to_string(),
        })?;
        if !track.is_ready() {
            return Err(PlaybackError::TrackNotReady {
                track_id: id.to_string(),
                status: track.status.to_string(),
            });
        }

        match self.start_with_fallback(id).await {
            Err(PlaybackError::NoReadyTrack) => {
                self.conclude_manual_without_track().await;
                Err(PlaybackError::NoReadyTrack)
            }
            other => other,
        }
    }

    async fn manual_transition(
        &mut self,
        direction: Direction,
        requested_at: Instant,
    ) -> Result<TransitionOutcome> {
        if !self.coordinator.admit(TransitionKind::Manual, requested_at) {
            return Ok(TransitionOutcome::Debounced);
        }

        let playlist = self.store.snapshot().await;
        let (current, shuffle) = {
            let session = self.session.borrow();
            (session.current_track_id.clone(), session.shuffle)
        };
        let pick = match direction {
            Direction::Next => self.coordinator.next(&playlist, current.as_ref(), shuffle),
            Direction::Previous => self.coordinator.previous(&playlist, current.as_ref()),
        };

        let result = match pick {
            Some(transition) => {
                debug!(?direction, target = %transition.target, "Manual transition");
                let target = self.note_skipped(transition);
                self.start_with_fallback(target).await
            }
            None => Err(PlaybackError::NoReadyTrack),
        };

        match result {
            Ok(id) => Ok(TransitionOutcome::Started(id)),
            Err(PlaybackError::NoReadyTrack) => {
                self.conclude_manual_without_track().await;
                Err(PlaybackError::NoReadyTrack)
            }
            Err(e) => Err(e),
        }
    }

    /// Finished or failed track: move on regardless of any manual request
    /// in flight.
    async fn auto_advance(&mut self, from: TrackId) {
        self.coordinator.admit(TransitionKind::Auto, Instant::now());

        let playlist = self.store.snapshot().await;
        let shuffle = self.session.borrow().shuffle;
        let result = match self.coordinator.next(&playlist, Some(&from), shuffle) {
            Some(transition) => {
                let target = self.note_skipped(transition);
                self.start_with_fallback(target).await
            }
            None => Err(PlaybackError::NoReadyTrack),
        };

        if let Err(e) = result {
            warn!(error = %e, "Auto-advance found nothing to play");
            self.stop_playback().await;
        }
    }

    /// Start `target`; on a start failure keep skipping forward. At most one
    /// attempt per playlist entry, and no track is tried twice.
    async fn start_with_fallback(&mut self, mut target: TrackId) -> Result<TrackId> {
        let bound = self.store.len().await.max(1);
        let mut tried = HashSet::new();

        loop {
            let error = match self.start_track(&target).await {
                Ok(()) => return Ok(target),
                Err(e) => e,
            };
            if !(error.is_start_failure() || matches!(error, PlaybackError::TrackNotReady { .. })) {
                return Err(error);
            }

            self.emit(PlaybackEvent::Skipped {
                track_id: target.to_string(),
                reason: error.to_string(),
            });
            tried.insert(target.clone());
            if tried.len() >= bound {
                warn!(failures = tried.len(), "Every candidate failed to start");
                return Err(PlaybackError::NoReadyTrack);
            }

            let playlist = self.store.snapshot().await;
            let shuffle = self.session.borrow().shuffle;
            match self
                .coordinator
                .next_excluding(&playlist, Some(&target), shuffle, &tried)
            {
                Some(transition) => target = self.note_skipped(transition),
                None => return Err(PlaybackError::NoReadyTrack),
            }
        }
    }

    fn note_skipped(&self, transition: Transition) -> TrackId {
        for id in transition.skipped {
            debug!(track_id = %id, "Skipping track that is not ready");
            self.emit(PlaybackEvent::Skipped {
                track_id: id.to_string(),
                reason: "not ready".to_string(),
            });
        }
        transition.target
    }

    /// A manual request found nothing to play. A resource that is still
    /// loaded keeps playing; otherwise the player goes idle.
    async fn conclude_manual_without_track(&mut self) {
        if self.engine.current_session().is_none() {
            self.stop_playback().await;
        } else {
            let state = self.engine.state();
            self.session.send_modify(|s| s.state = state);
        }
    }

    async fn start_track(&mut self, id: &TrackId) -> Result<()> {
        let track = match self.store.get(id).await {
            Some(track) if track.is_ready() => track,
            other => {
                return Err(PlaybackError::TrackNotReady {
                    track_id: id.to_string(),
                    status: other
                        .map(|t| t.status.to_string())
                        .unwrap_or_else(|| "removed".to_string()),
                })
            }
        };

        self.emit(PlaybackEvent::Loading {
            track_id: id.to_string(),
        });
        self.session.send_modify(|s| s.state = EngineState::Loading);

        if let Err(e) = self.engine.load(&track).await {
            self.after_failed_load().await;
            self.emit(PlaybackEvent::Error {
                track_id: Some(id.to_string()),
                message: e.to_string(),
                recoverable: true,
            });
            return Err(e);
        }

        self.session.send_modify(|s| {
            s.current_track_id = Some(track.id.clone());
            s.position_ms = 0;
            s.duration_ms = 0;
            s.is_playing = true;
            s.state = EngineState::Playing;
        });
        self.emit(PlaybackEvent::Started {
            track_id: id.to_string(),
            title: track.title.clone(),
        });

        let snapshot = self.session.borrow().clone();
        self.surface.push_now_playing(&track, &snapshot).await;
        self.load_lyrics(&track);
        self.current = Some(track);
        Ok(())
    }

    async fn after_failed_load(&mut self) {
        let state = self.engine.state();
        if self.engine.current_session().is_none() && self.current.is_some() {
            // The previous resource did not survive the attempt.
            self.current = None;
            self.session.send_modify(|s| s.reset(state));
            self.surface.reset().await;
            if let Some(lyrics) = &self.lyrics {
                lyrics.clear();
            }
        } else {
            self.session.send_modify(|s| s.state = state);
        }
    }

    fn load_lyrics(&self, track: &Track) {
        let Some(lyrics) = &self.lyrics else {
            return;
        };

        // Clear before the read so the previous track's lines never linger.
        let ticket = lyrics.begin_load(track.id.as_str(), track.selected_caption_code());
        let lyrics = Arc::clone(lyrics);
        let caption_path = track.caption_path().map(|p| p.to_path_buf());
        let track_end = track.approximate_duration();
        tokio::spawn(async move {
            lyrics
                .finish_load(ticket, caption_path.as_deref(), track_end)
                .await;
        });
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn pause(&mut self) -> Result<()> {
        match self.engine.state() {
            EngineState::Paused => return Ok(()),
            EngineState::Playing => {}
            state => {
                return Err(PlaybackError::InvalidState(format!(
                    "cannot pause while {}",
                    state
                )))
            }
        }

        self.session.send_modify(|s| {
            s.is_playing = false;
            s.state = EngineState::Paused;
        });
        if let Err(e) = self.engine.pause().await {
            self.session.send_modify(|s| {
                s.is_playing = true;
                s.state = EngineState::Playing;
            });
            return Err(e);
        }

        let position_ms = self.session.borrow().position_ms;
        if let Some(id) = self.engine.current_track() {
            self.emit(PlaybackEvent::Paused {
                track_id: id.to_string(),
                position_ms,
            });
        }
        self.push_surface().await;
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        match self.engine.state() {
            EngineState::Playing => return Ok(()),
            EngineState::Paused => {}
            state => {
                return Err(PlaybackError::InvalidState(format!(
                    "cannot resume while {}",
                    state
                )))
            }
        }

        self.session.send_modify(|s| {
            s.is_playing = true;
            s.state = EngineState::Playing;
        });
        if let Err(e) = self.engine.resume().await {
            self.session.send_modify(|s| {
                s.is_playing = false;
                s.state = EngineState::Paused;
            });
            return Err(e);
        }

        let position_ms = self.session.borrow().position_ms;
        if let Some(id) = self.engine.current_track() {
            self.emit(PlaybackEvent::Resumed {
                track_id: id.to_string(),
                position_ms,
            });
        }
        self.push_surface().await;
        Ok(())
    }

    async fn seek(&mut self, position_ms: u64) -> Result<u64> {
        if !self.engine.state().is_active() {
            return Err(PlaybackError::InvalidState(format!(
                "cannot seek while {}",
                self.engine.state()
            )));
        }

        let (previous, clamped) = {
            let session = self.session.borrow();
            (session.position_ms, session.clamp_position(position_ms))
        };
        self.session.send_modify(|s| s.position_ms = clamped);

        if let Err(e) = self.engine.seek(Duration::from_millis(clamped)).await {
            self.session.send_modify(|s| s.position_ms = previous);
            return Err(e);
        }

        if let Some(lyrics) = &self.lyrics {
            lyrics.update_position(clamped);
        }
        self.push_surface().await;
        Ok(clamped)
    }

    async fn stop_playback(&mut self) {
        let stopped = self.engine.stop().await;
        let previous = stopped.or_else(|| self.session.borrow().current_track_id.clone());
        self.session.send_modify(|s| s.reset(EngineState::Stopped));
        self.current = None;

        self.emit(PlaybackEvent::Stopped {
            track_id: previous.map(|id| id.to_string()),
        });
        self.surface.reset().await;
        if let Some(lyrics) = &self.lyrics {
            lyrics.clear();
        }
    }

    async fn push_surface(&mut self) {
        if let Some(track) = &self.current {
            let snapshot = self.session.borrow().clone();
            self.surface.push_now_playing(track, &snapshot).await;
        }
    }

    // ========================================================================
    // Reports
    // ========================================================================

    async fn handle_report(&mut self, report: ResourceReport) {
        let Some(signal) = self.engine.handle_report(report) else {
            return;
        };

        match signal {
            EngineSignal::Progress {
                track_id,
                position,
                duration,
                ..
            } => {
                let position_ms = position.as_millis() as u64;
                self.session.send_modify(|s| {
                    if let Some(duration) = duration {
                        s.duration_ms = duration.as_millis() as u64;
                    }
                    s.position_ms = s.clamp_position(position_ms);
                });
                let snapshot = self.session.borrow().clone();

                self.emit(PlaybackEvent::PositionChanged {
                    track_id: track_id.to_string(),
                    position_ms: snapshot.position_ms,
                    duration_ms: snapshot.duration_ms,
                });
                if let Some(lyrics) = &self.lyrics {
                    lyrics.update_position(snapshot.position_ms);
                }
                self.surface.push_position(&snapshot, Instant::now()).await;
            }
            EngineSignal::Finished { track_id } => {
                info!(track_id = %track_id, "Track finished");
                self.emit(PlaybackEvent::Completed {
                    track_id: track_id.to_string(),
                });
                self.auto_advance(track_id).await;
            }
            EngineSignal::Failed { track_id, message } => {
                warn!(track_id = %track_id, error = %message, "Playback failed");
                self.emit(PlaybackEvent::Error {
                    track_id: Some(track_id.to_string()),
                    message,
                    recoverable: true,
                });
                self.auto_advance(track_id).await;
            }
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.event_bus.emit(CoreEvent::Playback(event));
    }
}
