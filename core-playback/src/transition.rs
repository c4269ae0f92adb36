//! # Transition Coordinator
//!
//! Picks the next or previous track and debounces manual requests.
//!
//! Candidates are always Ready tracks. Sequential mode walks the playlist
//! cyclically for at most one full traversal; shuffle picks uniformly among
//! the Ready tracks other than the current one.

use core_library::models::{Track, TrackId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Who asked for the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// User input from the UI or the OS surface. Debounced.
    Manual,
    /// Raised by a finished or failed track. Never debounced.
    Auto,
}

/// A chosen track plus the ones passed over on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub target: TrackId,
    pub skipped: Vec<TrackId>,
}

pub struct TransitionCoordinator {
    debounce: Duration,
    last_manual: Option<Instant>,
    rng: StdRng,
}

impl TransitionCoordinator {
    pub fn new(debounce: Duration) -> Self {
        Self::with_rng(debounce, StdRng::from_entropy())
    }

    pub fn with_rng(debounce: Duration, rng: StdRng) -> Self {
        Self {
            debounce,
            last_manual: None,
            rng,
        }
    }

    /// Decide whether a request goes through.
    ///
    /// A manual request within the window of the last accepted manual one is
    /// rejected; the window is measured from accepted requests only.
    pub fn admit(&mut self, kind: TransitionKind, now: Instant) -> bool {
        if kind == TransitionKind::Auto {
            return true;
        }
        if let Some(last) = self.last_manual {
            if now.saturating_duration_since(last) < self.debounce {
                debug!("Manual transition debounced");
                return false;
            }
        }
        self.last_manual = Some(now);
        true
    }

    /// Next track after `current`.
    pub fn next(
        &mut self,
        playlist: &[Track],
        current: Option<&TrackId>,
        shuffle: bool,
    ) -> Option<Transition> {
        self.next_excluding(playlist, current, shuffle, &HashSet::new())
    }

    /// Like [`next`](Self::next), but never picks a track in `exclude`.
    /// Excluded tracks are passed over without being reported as skipped.
    pub fn next_excluding(
        &mut self,
        playlist: &[Track],
        current: Option<&TrackId>,
        shuffle: bool,
        exclude: &HashSet<TrackId>,
    ) -> Option<Transition> {
        if shuffle {
            self.shuffle_pick(playlist, current, exclude)
        } else {
            sequential(playlist, current, Step::Forward, exclude)
        }
    }

    /// Previous track before `current`. Shuffle keeps no history, so this is
    /// always sequential.
    pub fn previous(&self, playlist: &[Track], current: Option<&TrackId>) -> Option<Transition> {
        sequential(playlist, current, Step::Backward, &HashSet::new())
    }

    fn shuffle_pick(
        &mut self,
        playlist: &[Track],
        current: Option<&TrackId>,
        exclude: &HashSet<TrackId>,
    ) -> Option<Transition> {
        let eligible = |t: &Track| t.is_ready() && !exclude.contains(&t.id);
        let candidates: Vec<&Track> = playlist
            .iter()
            .filter(|t| eligible(*t) && Some(&t.id) != current)
            .collect();

        match candidates.choose(&mut self.rng) {
            Some(track) => Some(Transition {
                target: track.id.clone(),
                skipped: Vec::new(),
            }),
            None => playlist
                .iter()
                .find(|t| eligible(*t) && Some(&t.id) == current)
                .map(|t| Transition {
                    target: t.id.clone(),
                    skipped: Vec::new(),
                }),
        }
    }
}

#[derive(Clone, Copy)]
enum Step {
    Forward,
    Backward,
}

/// Walk at most one full lap from `current`. With no current track the walk
/// starts just outside the playlist, so Forward begins at the first entry
/// and Backward at the last.
fn sequential(
    playlist: &[Track],
    current: Option<&TrackId>,
    step: Step,
    exclude: &HashSet<TrackId>,
) -> Option<Transition> {
    let len = playlist.len();
    if len == 0 {
        return None;
    }

    let origin = current.and_then(|id| playlist.iter().position(|t| &t.id == id));
    let mut skipped = Vec::new();

    for offset in 1..=len {
        let index = match (step, origin) {
            (Step::Forward, Some(i)) => (i + offset) % len,
            (Step::Forward, None) => offset - 1,
            (Step::Backward, Some(i)) => (i + len - offset % len) % len,
            (Step::Backward, None) => len - offset,
        };
        let track = &playlist[index];
        if exclude.contains(&track.id) {
            continue;
        }
        if track.is_ready() {
            return Some(Transition {
                target: track.id.clone(),
                skipped,
            });
        }
        skipped.push(track.id.clone());
    }

    debug!(len, "One traversal found no ready track");
    None
}
