//! # Lyrics Synchronizer
//!
//! Parses caption files into time-ordered [`LyricLine`]s and maps the
//! playback position onto the active line.
//!
//! ## Formats
//!
//! - **Block** (`WEBVTT` style): a `start --> end` line followed by one or
//!   more text lines, blocks separated by blank lines. Headers, numeric cue
//!   identifiers and inline `<...>` markup are dropped; multi-line cue text is
//!   joined with spaces.
//! - **Tag** (LRC style): `[mm:ss.xx] text` per line. A line ends where the
//!   next one starts; the last line runs to the end of the track.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let sync = LyricsSynchronizer::new(file_system, event_bus, 760)?;
//! let mut view = sync.subscribe();
//!
//! // Previous lines are gone as soon as this returns, before any I/O.
//! let ticket = sync.begin_load("abc", Some("en"));
//! sync.finish_load(ticket, Some(&caption_path), None).await;
//!
//! sync.update_position(12_500);
//! let active = view.borrow().active_index;
//! ```
//!
//! Every load hands out a [`LoadTicket`]. A ticket whose load was superseded
//! by a newer `begin_load` (track or language change) is ignored when it
//! resolves, so a slow read for the previous track can never overwrite the
//! current one.

use crate::error::Result;
use bridge_traits::storage::FileSystemAccess;
use core_runtime::events::{CoreEvent, EventBus, LyricsEvent};
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

// =============================================================================
// Core Types
// =============================================================================

/// One timed caption line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LyricLine {
    pub start_ms: u64,
    /// `None` when the line runs to the end of the track.
    pub end_ms: Option<u64>,
    pub text: String,
}

/// Caption encodings understood by [`CaptionParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionFormat {
    /// `start --> end` cue blocks.
    Block,
    /// Inline `[mm:ss.xx]` tags.
    Tag,
}

/// Index of the last line whose start is at or before `position + offset`.
///
/// A line becomes active exactly at its start boundary and stays active
/// until the next line starts.
pub fn active_line_index(lines: &[LyricLine], position_ms: u64, offset_ms: i64) -> Option<usize> {
    let adjusted = (position_ms as i64).saturating_add(offset_ms).max(0) as u64;
    lines
        .partition_point(|line| line.start_ms <= adjusted)
        .checked_sub(1)
}

// =============================================================================
// Parsing
// =============================================================================

pub struct CaptionParser {
    tag: Regex,
    markup: Regex,
}

impl CaptionParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tag: Regex::new(r"\[(\d{1,3}):(\d{2})\.(\d{2,3})\]")?,
            markup: Regex::new(r"<[^>]*>")?,
        })
    }

    pub fn detect(&self, body: &str) -> Option<CaptionFormat> {
        if body.contains("-->") {
            Some(CaptionFormat::Block)
        } else if self.tag.is_match(body) {
            Some(CaptionFormat::Tag)
        } else {
            None
        }
    }

    /// Parse a caption body of either format. Unknown formats yield no lines.
    pub fn parse(&self, body: &str, track_end: Option<Duration>) -> Vec<LyricLine> {
        match self.detect(body) {
            Some(CaptionFormat::Block) => self.parse_block(body),
            Some(CaptionFormat::Tag) => self.parse_tag(body, track_end),
            None => Vec::new(),
        }
    }

    pub fn parse_block(&self, body: &str) -> Vec<LyricLine> {
        let mut lines = Vec::new();
        let mut cue: Option<(u64, u64, Vec<String>)> = None;

        let flush = |cue: &mut Option<(u64, u64, Vec<String>)>, lines: &mut Vec<LyricLine>| {
            if let Some((start, end, text)) = cue.take() {
                if !text.is_empty() {
                    lines.push(LyricLine {
                        start_ms: start,
                        end_ms: Some(end.max(start)),
                        text: text.join(" "),
                    });
                }
            }
        };

        for raw in body.lines() {
            let line = raw.trim().trim_start_matches('\u{feff}');

            if let Some((start, rest)) = line.split_once("-->") {
                flush(&mut cue, &mut lines);
                // Cue settings may follow the end timestamp.
                let end = rest.split_whitespace().next().unwrap_or_default();
                cue = match (parse_timestamp(start.trim()), parse_timestamp(end)) {
                    (Some(start), Some(end)) => Some((start, end, Vec::new())),
                    _ => {
                        debug!(line, "Skipping cue with unreadable timestamps");
                        None
                    }
                };
                continue;
            }

            if line.is_empty() {
                flush(&mut cue, &mut lines);
                continue;
            }

            if is_block_header(line) || line.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }

            if let Some((_, _, text)) = cue.as_mut() {
                let cleaned = decode_entities(self.markup.replace_all(line, "").trim());
                if !cleaned.is_empty() {
                    text.push(cleaned);
                }
            }
        }
        flush(&mut cue, &mut lines);

        lines.sort_by_key(|line| line.start_ms);
        lines
    }

    pub fn parse_tag(&self, body: &str, track_end: Option<Duration>) -> Vec<LyricLine> {
        let mut lines = Vec::new();

        for raw in body.lines() {
            let stamps: Vec<u64> = self
                .tag
                .captures_iter(raw)
                .filter_map(|caps| {
                    let minutes: u64 = caps[1].parse().ok()?;
                    let seconds: u64 = caps[2].parse().ok()?;
                    let millis = fraction_to_millis(&caps[3])?;
                    Some((minutes * 60 + seconds) * 1000 + millis)
                })
                .collect();
            if stamps.is_empty() {
                continue;
            }

            let text = self.tag.replace_all(raw, "").trim().to_string();
            if text.is_empty() {
                continue;
            }

            // Repeated choruses share one text line with several tags.
            for start_ms in stamps {
                lines.push(LyricLine {
                    start_ms,
                    end_ms: None,
                    text: text.clone(),
                });
            }
        }

        lines.sort_by_key(|line| line.start_ms);
        let track_end_ms = track_end.map(|d| d.as_millis() as u64);
        for idx in 0..lines.len() {
            let end = match lines.get(idx + 1) {
                Some(next) => Some(next.start_ms),
                None => track_end_ms.filter(|end| *end >= lines[idx].start_ms),
            };
            lines[idx].end_ms = end;
        }
        lines
    }
}

fn is_block_header(line: &str) -> bool {
    line.starts_with("WEBVTT")
        || line.starts_with("Kind:")
        || line.starts_with("Language:")
        || line.starts_with("NOTE")
        || line.starts_with("STYLE")
        || line.starts_with("REGION")
}

/// `hh:mm:ss.mmm` or `mm:ss.mmm`, with `.` or `,` before the fraction.
fn parse_timestamp(value: &str) -> Option<u64> {
    let parts: Vec<&str> = value.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [m, s] => (0, m.parse::<u64>().ok()?, *s),
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, *s),
        _ => return None,
    };

    let (whole, fraction) = match seconds.split_once(|c: char| c == '.' || c == ',') {
        Some((whole, fraction)) => (whole, fraction_to_millis(fraction)?),
        None => (seconds, 0),
    };
    let whole: u64 = whole.parse().ok()?;

    Some(((hours * 60 + minutes) * 60 + whole) * 1000 + fraction)
}

/// `"5"` → 500, `"45"` → 450, `"123"` → 123; digits past the third are cut.
fn fraction_to_millis(fraction: &str) -> Option<u64> {
    if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut padded: String = fraction.chars().take(3).collect();
    while padded.len() < 3 {
        padded.push('0');
    }
    padded.parse().ok()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

// =============================================================================
// Synchronizer
// =============================================================================

/// Lyric view state published to the UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LyricsState {
    pub track_id: Option<String>,
    pub language: Option<String>,
    pub lines: Arc<Vec<LyricLine>>,
    pub active_index: Option<usize>,
    /// True between `begin_load` and its resolution.
    pub loading: bool,
    /// Bumped by every load or clear.
    pub generation: u64,
}

impl LyricsState {
    pub fn active_line(&self) -> Option<&LyricLine> {
        self.active_index.and_then(|idx| self.lines.get(idx))
    }
}

/// Handle for one in-flight load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

pub struct LyricsSynchronizer {
    file_system: Arc<dyn FileSystemAccess>,
    parser: CaptionParser,
    offset_ms: i64,
    event_bus: EventBus,
    state: watch::Sender<LyricsState>,
}

impl LyricsSynchronizer {
    /// `offset_ms` is added to every position before the line lookup to
    /// compensate for caption clock skew.
    pub fn new(
        file_system: Arc<dyn FileSystemAccess>,
        event_bus: EventBus,
        offset_ms: i64,
    ) -> Result<Self> {
        let (state, _) = watch::channel(LyricsState::default());
        Ok(Self {
            file_system,
            parser: CaptionParser::new()?,
            offset_ms,
            event_bus,
            state,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<LyricsState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> LyricsState {
        self.state.borrow().clone()
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    /// Drop the current lines and mark a new load in progress.
    ///
    /// Runs without suspending, so the UI never sees the previous track's
    /// text once this returns.
    pub fn begin_load(&self, track_id: &str, language: Option<&str>) -> LoadTicket {
        let mut generation = 0;
        let previous = self.state.borrow().track_id.clone();
        self.state.send_modify(|state| {
            state.generation += 1;
            generation = state.generation;
            state.track_id = Some(track_id.to_string());
            state.language = language.map(str::to_string);
            state.lines = Arc::new(Vec::new());
            state.active_index = None;
            state.loading = true;
        });

        self.emit(LyricsEvent::Cleared {
            track_id: previous,
        });
        LoadTicket { generation }
    }

    /// Read and parse the caption file for a ticket from [`begin_load`].
    ///
    /// Returns the number of lines published, or `None` when the ticket was
    /// superseded. A missing, unreadable or unparsable caption leaves the
    /// lines empty; playback is never affected.
    ///
    /// [`begin_load`]: Self::begin_load
    pub async fn finish_load(
        &self,
        ticket: LoadTicket,
        caption_path: Option<&Path>,
        track_end: Option<Duration>,
    ) -> Option<usize> {
        let Some(path) = caption_path else {
            return self.fail_load(ticket, "no caption selected").then_some(0);
        };

        let body = match self.file_system.read_file(path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(file = ?path.file_name(), error = %e, "Caption file unreadable");
                return self.fail_load(ticket, &format!("caption unreadable: {}", e)).then_some(0);
            }
        };

        let lines = self.parser.parse(&body, track_end);
        if lines.is_empty() {
            return self.fail_load(ticket, "caption has no timed lines").then_some(0);
        }

        let count = lines.len();
        let lines = Arc::new(lines);
        let mut applied = false;
        let mut loaded_for = (None, None);
        self.state.send_if_modified(|state| {
            if state.generation != ticket.generation {
                return false;
            }
            state.lines = lines;
            state.active_index = None;
            state.loading = false;
            loaded_for = (state.track_id.clone(), state.language.clone());
            applied = true;
            true
        });

        if !applied {
            debug!(generation = ticket.generation, "Discarding superseded lyrics load");
            return None;
        }

        if let (Some(track_id), language) = loaded_for {
            debug!(track_id = %track_id, lines = count, "Lyrics loaded");
            self.emit(LyricsEvent::Loaded {
                track_id,
                language,
                line_count: count,
            });
        }
        Some(count)
    }

    /// Resolve a ticket with no lines. Returns false if it was superseded.
    pub fn fail_load(&self, ticket: LoadTicket, reason: &str) -> bool {
        let mut track_id = None;
        self.state.send_if_modified(|state| {
            if state.generation != ticket.generation {
                return false;
            }
            state.lines = Arc::new(Vec::new());
            state.active_index = None;
            state.loading = false;
            track_id = state.track_id.clone();
            true
        });

        match track_id {
            Some(track_id) => {
                debug!(track_id = %track_id, reason, "Lyrics unavailable");
                self.emit(LyricsEvent::Unavailable {
                    track_id,
                    reason: reason.to_string(),
                });
                true
            }
            None => false,
        }
    }

    /// Begin and finish a load in one call.
    pub async fn load(
        &self,
        track_id: &str,
        language: Option<&str>,
        caption_path: Option<&Path>,
        track_end: Option<Duration>,
    ) -> Option<usize> {
        let ticket = self.begin_load(track_id, language);
        self.finish_load(ticket, caption_path, track_end).await
    }

    /// Recompute the active line; publishes only when it changed.
    pub fn update_position(&self, position_ms: u64) -> Option<usize> {
        let mut active = None;
        let offset = self.offset_ms;
        self.state.send_if_modified(|state| {
            let idx = active_line_index(&state.lines, position_ms, offset);
            active = idx;
            if idx != state.active_index {
                state.active_index = idx;
                true
            } else {
                false
            }
        });
        active
    }

    /// Forget the current track entirely (playback stopped).
    pub fn clear(&self) {
        let previous = self.state.borrow().track_id.clone();
        self.state.send_modify(|state| {
            let generation = state.generation + 1;
            *state = LyricsState {
                generation,
                ..LyricsState::default()
            };
        });
        self.emit(LyricsEvent::Cleared {
            track_id: previous,
        });
    }

    fn emit(&self, event: LyricsEvent) {
        let _ = self.event_bus.emit(CoreEvent::Lyrics(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::storage::FileMetadata;
    use bytes::Bytes;
    use mockall::mock;
    use std::path::PathBuf;

    mock! {
        FileSystem {}

        #[async_trait]
        impl FileSystemAccess for FileSystem {
            async fn get_data_directory(&self) -> BridgeResult<PathBuf>;
            async fn exists(&self, path: &Path) -> BridgeResult<bool>;
            async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata>;
            async fn create_dir_all(&self, path: &Path) -> BridgeResult<()>;
            async fn read_file(&self, path: &Path) -> BridgeResult<Bytes>;
            async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()>;
            async fn delete_file(&self, path: &Path) -> BridgeResult<()>;
            async fn rename(&self, from: &Path, to: &Path) -> BridgeResult<()>;
            async fn list_directory(&self, path: &Path) -> BridgeResult<Vec<PathBuf>>;
            async fn open_write_stream(&self, path: &Path) -> BridgeResult<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>;
        }
    }

    const BLOCK: &str = "WEBVTT\nKind: captions\nLanguage: en\n\n1\n00:00:01.000 --> 00:00:03.500 align:start position:0%\nHello <c.colorE5E5E5>there</c>\nfriend\n\n2\n00:00:04.000 --> 00:00:06.000\n&amp; again\n\n3\n00:00:07.000 --> 00:00:08.000\n<i></i>\n";

    fn lines(starts: &[(u64, &str)]) -> Vec<LyricLine> {
        starts
            .iter()
            .map(|(start, text)| LyricLine {
                start_ms: *start,
                end_ms: None,
                text: text.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_block_format_cleanup() {
        let parser = CaptionParser::new().unwrap();
        assert_eq!(parser.detect(BLOCK), Some(CaptionFormat::Block));

        let parsed = parser.parse(BLOCK, None);
        assert_eq!(
            parsed,
            vec![
                LyricLine {
                    start_ms: 1000,
                    end_ms: Some(3500),
                    text: "Hello there friend".into(),
                },
                LyricLine {
                    start_ms: 4000,
                    end_ms: Some(6000),
                    text: "& again".into(),
                },
            ]
        );
    }

    #[test]
    fn test_block_format_short_timestamps() {
        let parser = CaptionParser::new().unwrap();
        let parsed = parser.parse_block("01:02.5 --> 01:03,25\nline\n");
        assert_eq!(parsed[0].start_ms, 62_500);
        assert_eq!(parsed[0].end_ms, Some(63_250));
    }

    #[test]
    fn test_tag_format_ends_at_next_line() {
        let parser = CaptionParser::new().unwrap();
        let body = "[ar:Someone]\n[00:12.50]first\n[00:10.123]zero\n[00:15.00]\n[01:00.00][02:00.00]chorus\n";
        assert_eq!(parser.detect(body), Some(CaptionFormat::Tag));

        let parsed = parser.parse(body, Some(Duration::from_secs(150)));
        let summary: Vec<(u64, Option<u64>, &str)> = parsed
            .iter()
            .map(|l| (l.start_ms, l.end_ms, l.text.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (10_123, Some(12_500), "zero"),
                (12_500, Some(60_000), "first"),
                (60_000, Some(120_000), "chorus"),
                (120_000, Some(150_000), "chorus"),
            ]
        );
    }

    #[test]
    fn test_unknown_format_has_no_lines() {
        let parser = CaptionParser::new().unwrap();
        assert_eq!(parser.detect("just some words"), None);
        assert!(parser.parse("just some words", None).is_empty());
    }

    #[test]
    fn test_active_line_is_start_inclusive() {
        let lines = lines(&[(0, "a"), (1000, "b"), (2000, "c")]);
        assert_eq!(active_line_index(&lines, 1500, 0), Some(1));
        assert_eq!(active_line_index(&lines, 1000, 0), Some(1));
        assert_eq!(active_line_index(&lines, 999, 0), Some(0));
        assert_eq!(active_line_index(&lines, 5000, 0), Some(2));
        assert_eq!(active_line_index(&[], 5000, 0), None);
    }

    #[test]
    fn test_active_line_applies_offset() {
        let lines = lines(&[(1000, "a"), (2000, "b")]);
        assert_eq!(active_line_index(&lines, 240, 760), Some(0));
        assert_eq!(active_line_index(&lines, 239, 760), None);
        assert_eq!(active_line_index(&lines, 100, -500), None);
    }

    #[tokio::test]
    async fn test_begin_load_clears_before_read_resolves() {
        let mut fs = MockFileSystem::new();
        fs.expect_read_file()
            .returning(|_| Ok(Bytes::from_static(b"[00:00.00]one\n[00:01.00]two\n")));
        let bus = EventBus::new(16);
        let sync = LyricsSynchronizer::new(Arc::new(fs), bus.clone(), 0).unwrap();

        sync.load("a", None, Some(Path::new("/m/a_en.vtt")), None).await;
        assert_eq!(sync.snapshot().lines.len(), 2);

        let ticket = sync.begin_load("b", Some("vi"));
        let state = sync.snapshot();
        assert!(state.lines.is_empty());
        assert!(state.loading);
        assert_eq!(state.track_id.as_deref(), Some("b"));

        assert_eq!(sync.finish_load(ticket, Some(Path::new("/m/b_vi.vtt")), None).await, Some(2));
        assert!(!sync.snapshot().loading);
    }

    #[tokio::test]
    async fn test_superseded_load_is_discarded() {
        let mut fs = MockFileSystem::new();
        fs.expect_read_file()
            .returning(|path| {
                if path.ends_with("a.lrc") {
                    Ok(Bytes::from_static(b"[00:00.00]stale\n"))
                } else {
                    Ok(Bytes::from_static(b"[00:00.00]fresh\n"))
                }
            });
        let sync = LyricsSynchronizer::new(Arc::new(fs), EventBus::new(16), 0).unwrap();

        let stale = sync.begin_load("a", None);
        let fresh = sync.begin_load("b", None);
        assert_eq!(sync.finish_load(fresh, Some(Path::new("/m/b.lrc")), None).await, Some(1));
        assert_eq!(sync.finish_load(stale, Some(Path::new("/m/a.lrc")), None).await, None);

        let state = sync.snapshot();
        assert_eq!(state.lines[0].text, "fresh");
        assert_eq!(state.track_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_unreadable_caption_falls_back_to_empty() {
        let mut fs = MockFileSystem::new();
        fs.expect_read_file()
            .returning(|_| Err(BridgeError::OperationFailed("gone".into())));
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let sync = LyricsSynchronizer::new(Arc::new(fs), bus.clone(), 0).unwrap();

        assert_eq!(sync.load("a", Some("en"), Some(Path::new("/m/a_en.vtt")), None).await, Some(0));
        assert!(sync.snapshot().lines.is_empty());

        let mut unavailable = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, CoreEvent::Lyrics(LyricsEvent::Unavailable { .. })) {
                unavailable = true;
            }
        }
        assert!(unavailable);
    }

    #[tokio::test]
    async fn test_update_position_publishes_changes_only() {
        let mut fs = MockFileSystem::new();
        fs.expect_read_file().returning(|_| Ok(Bytes::from_static(BLOCK.as_bytes())));
        let sync = LyricsSynchronizer::new(Arc::new(fs), EventBus::new(16), 760).unwrap();
        let mut view = sync.subscribe();

        sync.load("a", Some("en"), Some(Path::new("/m/a_en.vtt")), None).await;
        view.borrow_and_update();

        assert_eq!(sync.update_position(0), None);
        assert!(!view.has_changed().unwrap());

        assert_eq!(sync.update_position(300), Some(0));
        assert!(view.has_changed().unwrap());
        assert_eq!(view.borrow_and_update().active_line().unwrap().text, "Hello there friend");

        assert_eq!(sync.update_position(400), Some(0));
        assert!(!view.has_changed().unwrap());

        sync.clear();
        assert!(sync.snapshot().track_id.is_none());
        assert_eq!(sync.update_position(5000), None);
    }
}
