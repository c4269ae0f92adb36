//! # Playback Engine
//!
//! Owns the native output resource through a [`PlaybackAdapter`].
//!
//! ## Switching tracks
//!
//! `load` prepares and starts a new resource while the old one keeps
//! playing. The old resource is stopped and released only after the new one
//! reports [`ResourceStatus::Started`] through its listener. A small router
//! task sits between the adapter and the player: it resolves the pending
//! start waiter for `Started`/`Failed` and forwards every report onward, so
//! the caller can wait on a oneshot instead of polling the adapter.
//!
//! ## Completion
//!
//! `Finished` and `Failed` of the active resource surface once per load. A
//! fast switch can leave late reports from a released resource in the
//! queue; those are ignored by session id.

use crate::error::{PlaybackError, Result};
use crate::session::EngineState;
use bridge_traits::playback::{
    PlaybackAdapter, PlaybackMetadata, PlaybackOptions, PlaybackRequest, PlaybackSessionId,
    PlaybackState, ResourceReport, ResourceStatus,
};
use core_library::models::{Track, TrackId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

type StartWaiters = Arc<Mutex<HashMap<PlaybackSessionId, oneshot::Sender<StartSignal>>>>;

#[derive(Debug)]
enum StartSignal {
    Started,
    Failed(String),
}

/// Engine timing.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Bound on waiting for a new resource to report `Started`.
    pub start_confirm_timeout: Duration,
    /// Requested progress report interval.
    pub progress_interval: Duration,
}

/// Something the player has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    Progress {
        track_id: TrackId,
        position: Duration,
        duration: Option<Duration>,
        is_playing: bool,
    },
    Finished {
        track_id: TrackId,
    },
    Failed {
        track_id: TrackId,
        message: String,
    },
}

#[derive(Debug)]
struct ActiveResource {
    session: PlaybackSessionId,
    track_id: TrackId,
    /// Single-shot guard for Finished/Failed; a new load gets a fresh one.
    end_reported: bool,
}

pub struct PlaybackEngine {
    adapter: Arc<dyn PlaybackAdapter>,
    config: EngineConfig,
    listener: mpsc::UnboundedSender<ResourceReport>,
    waiters: StartWaiters,
    active: Option<ActiveResource>,
    state: EngineState,
}

impl PlaybackEngine {
    /// Create the engine and the receiver the player reads reports from.
    ///
    /// Spawns the report router, so this must run inside a tokio runtime.
    pub fn new(
        adapter: Arc<dyn PlaybackAdapter>,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ResourceReport>) {
        let (listener, raw_reports) = mpsc::unbounded_channel();
        let (forward, reports) = mpsc::unbounded_channel();
        let waiters: StartWaiters = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(route_reports(raw_reports, forward, waiters.clone()));

        let engine = Self {
            adapter,
            config,
            listener,
            waiters,
            active: None,
            state: EngineState::Idle,
        };
        (engine, reports)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn current_track(&self) -> Option<&TrackId> {
        self.active.as_ref().map(|a| &a.track_id)
    }

    pub fn current_session(&self) -> Option<PlaybackSessionId> {
        self.active.as_ref().map(|a| a.session)
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Start `track` on a new resource, then release the previous one.
    ///
    /// On failure the new resource is released. The previous resource is
    /// kept if the adapter still considers it alive, otherwise it is
    /// released too and the engine ends in `Error`.
    pub async fn load(&mut self, track: &Track) -> Result<()> {
        let path = track.audio_path().ok_or_else(|| PlaybackError::TrackNotReady {
            track_id: track.id.to_string(),
            status: track.status.to_string(),
        })?;

        let resume_state = self.state;
        self.state = EngineState::Loading;

        let request = PlaybackRequest::new(path)
            .with_options(PlaybackOptions {
                progress_interval: self.config.progress_interval,
                ..PlaybackOptions::default()
            })
            .with_metadata(PlaybackMetadata {
                track_id: Some(track.id.to_string()),
                title: Some(track.title.clone()),
                artist: Some(track.author.clone()),
            });

        let session = match self.adapter.prepare(request, self.listener.clone()).await {
            Ok(session) => session,
            Err(e) => {
                self.recover_previous(resume_state).await;
                return Err(PlaybackError::StartFailed {
                    track_id: track.id.to_string(),
                    message: e.to_string(),
                });
            }
        };
        debug!(track_id = %track.id, session = %session, "Resource prepared");

        match self.confirm_start(session, &track.id).await {
            Ok(()) => {
                let previous = self.active.replace(ActiveResource {
                    session,
                    track_id: track.id.clone(),
                    end_reported: false,
                });
                self.state = EngineState::Playing;
                if let Some(previous) = previous {
                    self.release(previous.session).await;
                }
                info!(track_id = %track.id, session = %session, "Playback started");
                Ok(())
            }
            Err(e) => {
                self.waiters.lock().remove(&session);
                self.release(session).await;
                self.recover_previous(resume_state).await;
                warn!(track_id = %track.id, error = %e, "Playback start failed");
                Err(e)
            }
        }
    }

    async fn confirm_start(&self, session: PlaybackSessionId, track_id: &TrackId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(session, tx);

        self.adapter
            .play(session)
            .await
            .map_err(|e| PlaybackError::StartFailed {
                track_id: track_id.to_string(),
                message: e.to_string(),
            })?;

        match tokio::time::timeout(self.config.start_confirm_timeout, rx).await {
            Ok(Ok(StartSignal::Started)) => Ok(()),
            Ok(Ok(StartSignal::Failed(message))) => Err(PlaybackError::StartFailed {
                track_id: track_id.to_string(),
                message,
            }),
            Ok(Err(_)) => Err(PlaybackError::StartFailed {
                track_id: track_id.to_string(),
                message: "status listener closed".to_string(),
            }),
            Err(_) => Err(PlaybackError::StartTimeout {
                track_id: track_id.to_string(),
                timeout_ms: self.config.start_confirm_timeout.as_millis() as u64,
            }),
        }
    }

    /// After a failed load: keep the old resource if it is still usable.
    async fn recover_previous(&mut self, resume_state: EngineState) {
        let Some(active) = &self.active else {
            self.state = match resume_state {
                EngineState::Loading => EngineState::Idle,
                other => other,
            };
            return;
        };

        let alive = match self.adapter.state(active.session).await {
            Ok(PlaybackState::Playing) | Ok(PlaybackState::Paused) | Ok(PlaybackState::Preparing) => {
                !active.end_reported
            }
            Ok(_) => false,
            Err(e) => {
                debug!(session = %active.session, error = %e, "Previous resource state unknown");
                false
            }
        };

        if alive {
            self.state = resume_state;
        } else if let Some(previous) = self.active.take() {
            debug!(track_id = %previous.track_id, "Previous resource no longer valid, releasing");
            self.release(previous.session).await;
            self.state = EngineState::Error;
        }
    }

    async fn release(&self, session: PlaybackSessionId) {
        if let Err(e) = self.adapter.stop(session).await {
            debug!(session = %session, error = %e, "Stop before unload failed");
        }
        if let Err(e) = self.adapter.unload(session).await {
            warn!(session = %session, error = %e, "Failed to unload playback resource");
        }
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Pause the active resource. Pausing while paused is a no-op.
    pub async fn pause(&mut self) -> Result<()> {
        let session = self.require_active("pause")?;
        if self.state == EngineState::Paused {
            return Ok(());
        }

        self.state = EngineState::Paused;
        if let Err(e) = self.adapter.pause(session).await {
            self.state = EngineState::Playing;
            return Err(e.into());
        }
        Ok(())
    }

    /// Resume the active resource. Resuming while playing is a no-op.
    pub async fn resume(&mut self) -> Result<()> {
        let session = self.require_active("resume")?;
        if self.state == EngineState::Playing {
            return Ok(());
        }

        self.state = EngineState::Playing;
        if let Err(e) = self.adapter.play(session).await {
            self.state = EngineState::Paused;
            return Err(e.into());
        }
        Ok(())
    }

    /// Seek the active resource. The caller clamps the position.
    pub async fn seek(&mut self, position: Duration) -> Result<()> {
        let session = self.require_active("seek")?;
        self.adapter.seek(session, position).await?;
        Ok(())
    }

    /// Release the resource. Returns the track that was loaded.
    pub async fn stop(&mut self) -> Option<TrackId> {
        self.state = EngineState::Stopped;
        let active = self.active.take()?;
        self.release(active.session).await;
        info!(track_id = %active.track_id, "Playback stopped");
        Some(active.track_id)
    }

    fn require_active(&self, operation: &str) -> Result<PlaybackSessionId> {
        match &self.active {
            Some(active) if self.state.is_active() => Ok(active.session),
            _ => Err(PlaybackError::InvalidState(format!(
                "cannot {} while {}",
                operation, self.state
            ))),
        }
    }

    // ========================================================================
    // Reports
    // ========================================================================

    /// Translate a resource report. Reports from released resources and
    /// repeated end notifications yield nothing.
    pub fn handle_report(&mut self, report: ResourceReport) -> Option<EngineSignal> {
        let active = match self.active.as_mut() {
            Some(active) if active.session == report.session => active,
            _ => {
                debug!(session = %report.session, "Ignoring report from inactive resource");
                return None;
            }
        };

        match report.status {
            ResourceStatus::Started => None,
            ResourceStatus::Progress {
                position,
                duration,
                is_playing,
            } => Some(EngineSignal::Progress {
                track_id: active.track_id.clone(),
                position,
                duration,
                is_playing,
            }),
            ResourceStatus::Finished => {
                if active.end_reported {
                    return None;
                }
                active.end_reported = true;
                self.state = EngineState::Stopped;
                Some(EngineSignal::Finished {
                    track_id: active.track_id.clone(),
                })
            }
            ResourceStatus::Failed { message } => {
                if active.end_reported {
                    return None;
                }
                active.end_reported = true;
                self.state = EngineState::Error;
                Some(EngineSignal::Failed {
                    track_id: active.track_id.clone(),
                    message,
                })
            }
        }
    }
}

async fn route_reports(
    mut raw: mpsc::UnboundedReceiver<ResourceReport>,
    forward: mpsc::UnboundedSender<ResourceReport>,
    waiters: StartWaiters,
) {
    while let Some(report) = raw.recv().await {
        let signal = match &report.status {
            ResourceStatus::Started => Some(StartSignal::Started),
            ResourceStatus::Failed { message } => Some(StartSignal::Failed(message.clone())),
            _ => None,
        };
        if let Some(signal) = signal {
            if let Some(waiter) = waiters.lock().remove(&report.session) {
                let _ = waiter.send(signal);
            }
        }

        if forward.send(report).is_err() {
            debug!("Player gone, report router exiting");
            break;
        }
    }
}
