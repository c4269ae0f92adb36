//! Download manager tests against the desktop file system and settings store
//! with a scripted provider.

use async_trait::async_trait;
use bridge_desktop::{SqliteSettingsStore, TokioFileSystem};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::SystemClock;
use bytes::Bytes;
use core_download::{AcquireOutcome, DownloadError, DownloadManager};
use core_library::models::{CatalogItem, TrackId, TrackStatus};
use core_library::{LibraryError, TrackStore};
use core_metadata::CatalogClient;
use core_runtime::config::DownloadConfig;
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

// ============================================================================
// Scripted provider
// ============================================================================

#[derive(Default)]
struct FakeProvider {
    meta: Mutex<HashMap<String, String>>,
    captions: Mutex<HashMap<(String, String), String>>,
    audio: Mutex<HashMap<String, Vec<u8>>>,
    /// When set, audio streams wait for a permit before returning.
    gate: Mutex<Option<Arc<Semaphore>>>,
    meta_calls: AtomicUsize,
    audio_calls: AtomicUsize,
}

impl FakeProvider {
    fn with_track(self, id: &str, languages: &[&str]) -> Self {
        let tracks: Vec<String> = languages
            .iter()
            .map(|code| format!(r#"{{"code":"{}","name":"{}","isAuto":false}}"#, code, code))
            .collect();
        self.meta.lock().insert(
            id.to_string(),
            format!(r#"{{"id":"{}","title":"Song","tracks":[{}]}}"#, id, tracks.join(",")),
        );
        for code in languages {
            self.captions.lock().insert(
                (id.to_string(), code.to_string()),
                format!("WEBVTT\n\n00:00:01.000 --> 00:00:02.000\n{} line\n", code),
            );
        }
        self.audio.lock().insert(id.to_string(), b"fake-m4a-bytes".to_vec());
        self
    }

    fn gated(self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        (self, gate)
    }

    fn query_param<'a>(url: &'a str, key: &str) -> Option<&'a str> {
        let query = url.split_once('?')?.1;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    fn respond(status: u16, body: impl Into<Bytes>) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }
}

#[async_trait]
impl HttpClient for FakeProvider {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let url = request.url.as_str();
        let id = Self::query_param(url, "id").unwrap_or_default().to_string();

        if url.contains("/meta?") {
            self.meta_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(match self.meta.lock().get(&id) {
                Some(body) => Self::respond(200, body.clone()),
                None => Self::respond(500, "Meta Error"),
            });
        }

        if url.contains("/download-lyrics?") {
            let lang = Self::query_param(url, "lang").unwrap_or_default().to_string();
            return Ok(match self.captions.lock().get(&(id, lang)) {
                Some(body) => Self::respond(200, body.clone()),
                None => Self::respond(404, "Lyrics not found"),
            });
        }

        Ok(Self::respond(404, "unknown endpoint"))
    }

    async fn download_stream(
        &self,
        url: String,
    ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        self.audio_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| BridgeError::OperationFailed("gate closed".into()))?
                .forget();
        }

        let id = Self::query_param(&url, "id").unwrap_or_default().to_string();
        match self.audio.lock().get(&id) {
            Some(bytes) => Ok(Box::new(std::io::Cursor::new(bytes.clone()))),
            None => Err(BridgeError::OperationFailed("HTTP 500".into())),
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    dir: PathBuf,
    store: Arc<TrackStore>,
    manager: Arc<DownloadManager>,
    provider: Arc<FakeProvider>,
    bus: EventBus,
}

impl Harness {
    async fn new(provider: FakeProvider) -> Self {
        let dir = std::env::temp_dir().join(format!("cold-music-dl-{}", uuid::Uuid::new_v4()));
        let storage_dir = dir.join("music_storage");
        let bus = EventBus::new(256);
        let provider = Arc::new(provider);

        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let store = Arc::new(
            TrackStore::open(settings, bus.clone(), Arc::new(SystemClock))
                .await
                .unwrap(),
        );
        let catalog = Arc::new(CatalogClient::new(provider.clone(), "http://provider/api"));
        let manager = Arc::new(DownloadManager::new(
            store.clone(),
            catalog,
            Arc::new(TokioFileSystem::with_data_directory(dir.clone())),
            storage_dir,
            DownloadConfig::default(),
            bus.clone(),
        ));

        Self {
            dir,
            store,
            manager,
            provider,
            bus,
        }
    }

    fn storage_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.manager.storage_dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    async fn wait_for_audio_calls(&self, count: usize) {
        for _ in 0..200 {
            if self.provider.audio_calls.load(Ordering::SeqCst) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("audio stream never requested");
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn item(id: &str) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        title: format!("Song {}", id),
        thumbnail: String::new(),
        author: "Artist".to_string(),
        duration: "3:30".to_string(),
    }
}

fn exists(path: &Path) -> bool {
    path.exists()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_acquire_writes_audio_and_preferred_caption() {
    let h = Harness::new(FakeProvider::default().with_track("abc", &["en", "vi", "fr"])).await;

    let outcome = h.manager.acquire(&item("abc")).await.unwrap();
    let AcquireOutcome::Completed(track) = outcome else {
        panic!("expected a completed download");
    };

    assert!(track.is_ready());
    assert_eq!(track.selected_caption_code(), Some("vi"));
    assert_eq!(track.assets().unwrap().captions.len(), 3);
    assert!(exists(track.audio_path().unwrap()));
    assert!(exists(track.caption_path().unwrap()));
    assert_eq!(h.storage_files(), vec!["abc.m4a", "abc_vi.vtt"]);
}

#[tokio::test]
async fn test_track_without_captions_is_ready_without_selection() {
    let h = Harness::new(FakeProvider::default().with_track("abc", &[])).await;

    let AcquireOutcome::Completed(track) = h.manager.acquire(&item("abc")).await.unwrap() else {
        panic!("expected a completed download");
    };
    assert!(track.caption_path().is_none());
    assert_eq!(h.storage_files(), vec!["abc.m4a"]);
}

#[tokio::test]
async fn test_concurrent_acquire_fetches_once() {
    let (provider, gate) = FakeProvider::default().with_track("abc", &["en"]).gated();
    let h = Harness::new(provider).await;

    let manager = h.manager.clone();
    let first = tokio::spawn(async move { manager.acquire(&item("abc")).await });
    h.wait_for_audio_calls(1).await;

    match h.manager.acquire(&item("abc")).await.unwrap() {
        AcquireOutcome::AlreadyClaimed(track) => assert_eq!(track.status, TrackStatus::Downloading),
        other => panic!("second acquire should be skipped, got {:?}", other),
    }

    gate.add_permits(1);
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, AcquireOutcome::Completed(_)));

    assert_eq!(h.provider.meta_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.provider.audio_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.len().await, 1);

    // Ready is terminal for acquire as well.
    assert!(matches!(
        h.manager.acquire(&item("abc")).await.unwrap(),
        AcquireOutcome::AlreadyClaimed(_)
    ));
    assert_eq!(h.provider.audio_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_caption_failure_marks_error_and_discards_audio() {
    let provider = FakeProvider::default().with_track("abc", &["en"]);
    provider.captions.lock().clear();
    let h = Harness::new(provider).await;
    let mut events = h.bus.subscribe();

    let err = h.manager.acquire(&item("abc")).await.unwrap_err();
    assert!(matches!(err, DownloadError::CaptionFetch(_)));

    let track = h.store.get(&TrackId::from("abc")).await.unwrap();
    assert!(matches!(track.status, TrackStatus::Error { .. }));
    assert!(track.audio_path().is_none());
    assert!(h.storage_files().is_empty());

    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Download(DownloadEvent::Failed { recoverable, .. }) = event {
            assert!(recoverable);
            failed = true;
        }
    }
    assert!(failed);
}

#[tokio::test]
async fn test_audio_failure_then_explicit_retry() {
    let provider = FakeProvider::default().with_track("abc", &["en"]);
    let audio = provider.audio.lock().remove("abc").unwrap();
    let h = Harness::new(provider).await;

    let err = h.manager.acquire(&item("abc")).await.unwrap_err();
    assert!(matches!(err, DownloadError::AudioFetch(_)));
    assert!(h.storage_files().is_empty());

    h.provider.audio.lock().insert("abc".to_string(), audio);
    let outcome = h.manager.acquire(&item("abc")).await.unwrap();
    assert!(matches!(outcome, AcquireOutcome::Completed(_)));
    assert!(h.store.get(&TrackId::from("abc")).await.unwrap().is_ready());
}

#[tokio::test]
async fn test_metadata_failure_marks_error() {
    let h = Harness::new(FakeProvider::default()).await;

    let err = h.manager.acquire(&item("missing")).await.unwrap_err();
    assert!(matches!(err, DownloadError::Metadata(_)));
    let track = h.store.get(&TrackId::from("missing")).await.unwrap();
    assert!(matches!(track.status, TrackStatus::Error { .. }));
}

#[tokio::test]
async fn test_removed_while_downloading_leaves_no_files() {
    let (provider, gate) = FakeProvider::default().with_track("abc", &["en"]).gated();
    let h = Harness::new(provider).await;

    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.acquire(&item("abc")).await });
    h.wait_for_audio_calls(1).await;

    let removed = h.store.remove(&TrackId::from("abc")).await.unwrap();
    h.manager.delete_files(&removed).await;
    gate.add_permits(1);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        DownloadError::Library(LibraryError::NotFound { .. })
    ));
    assert!(h.store.get(&TrackId::from("abc")).await.is_none());
    assert!(h.storage_files().is_empty());
}

#[tokio::test]
async fn test_switch_caption_replaces_file() {
    let h = Harness::new(FakeProvider::default().with_track("abc", &["en", "vi"])).await;
    h.manager.acquire(&item("abc")).await.unwrap();

    let track = h
        .manager
        .switch_caption(&TrackId::from("abc"), "en")
        .await
        .unwrap();
    assert_eq!(track.selected_caption_code(), Some("en"));
    assert_eq!(h.storage_files(), vec!["abc.m4a", "abc_en.vtt"]);

    let err = h
        .manager
        .switch_caption(&TrackId::from("abc"), "de")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DownloadError::Library(LibraryError::InvalidInput { .. })
    ));
}
