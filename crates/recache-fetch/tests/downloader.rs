use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures_util::stream;
use parking_lot::Mutex;
use recache_disk::{BlobCache, DiskCache};
use recache_fetch::{
    CacheKey, Cancel, DownloadProgress, Downloader, DownloaderConfig, FetchError, FetchOutcome, HttpClient,
    HttpResponse, NeverCancel, NoopSink,
};
use tempfile::{TempDir, tempdir};

const URL: &str = "https://downloads.example.com/payload.bin";

#[derive(Debug, Clone, Copy)]
enum Mode {
    /// Honors `Range` with 206.
    Ranged,
    /// Always answers 200 with the whole body.
    IgnoreRange,
    Status(u16),
    /// Like `Ranged`, but the body breaks after this many bytes.
    BreakAfter(usize),
}

struct Script {
    body:     Bytes,
    chunk:    usize,
    mode:     Mutex<Mode>,
    requests: AtomicUsize,
    ranges:   Mutex<Vec<Option<String>>>,
}

#[derive(Clone)]
struct ScriptedClient(Arc<Script>);

impl ScriptedClient {
    fn new(body: Vec<u8>, chunk: usize, mode: Mode) -> Self {
        Self(Arc::new(Script {
            body: Bytes::from(body),
            chunk,
            mode: Mutex::new(mode),
            requests: AtomicUsize::new(0),
            ranges: Mutex::new(Vec::new()),
        }))
    }

    fn set_mode(&self, mode: Mode) { *self.0.mode.lock() = mode; }

    fn requests(&self) -> usize { self.0.requests.load(Ordering::SeqCst) }

    fn ranges(&self) -> Vec<Option<String>> { self.0.ranges.lock().clone() }

    fn respond(&self, headers: &[(String, String)]) -> HttpResponse<std::io::Error> {
        let script = &self.0;
        script.requests.fetch_add(1, Ordering::SeqCst);
        let range = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("range"))
            .map(|(_, value)| value.clone());
        script.ranges.lock().push(range.clone());

        let len = script.body.len();
        let offset = range
            .as_deref()
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.strip_suffix('-'))
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mode = *script.mode.lock();
        let (status, content_range, payload, break_after) = match mode {
            Mode::Status(status) => (status, None, Bytes::new(), None),
            Mode::IgnoreRange => (200, None, script.body.clone(), None),
            Mode::Ranged | Mode::BreakAfter(_) if offset >= len => {
                (416, Some(format!("bytes */{len}")), Bytes::new(), None)
            }
            Mode::Ranged => (206, Some(format!("bytes {offset}-{}/{len}", len - 1)), script.body.slice(offset..), None),
            Mode::BreakAfter(n) => (206, Some(format!("bytes {offset}-{}/{len}", len - 1)), script.body.slice(offset..), Some(n)),
        };

        let content_length = Some(payload.len() as u64);
        let mut chunks: Vec<Result<Bytes, std::io::Error>> = Vec::new();
        let mut sent = 0;
        for piece in payload.chunks(script.chunk) {
            if let Some(limit) = break_after {
                if sent + piece.len() > limit {
                    chunks.push(Ok(Bytes::copy_from_slice(&piece[..limit - sent])));
                    chunks.push(Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset")));
                    break;
                }
            }
            sent += piece.len();
            chunks.push(Ok(Bytes::copy_from_slice(piece)));
        }

        HttpResponse {
            status,
            content_range,
            content_length,
            body: Box::pin(stream::iter(chunks)),
        }
    }
}

impl HttpClient for ScriptedClient {
    type Error = std::io::Error;

    async fn stream(
        &self,
        _url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse<Self::Error>, Self::Error> {
        Ok(self.respond(headers))
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<DownloadProgress>>);

impl Recorder {
    fn events(&self) -> Vec<DownloadProgress> { self.0.lock().clone() }
}

impl recache_fetch::ProgressSink for Recorder {
    fn on_progress(&self, progress: DownloadProgress) { self.0.lock().push(progress); }
}

fn payload(len: usize) -> Vec<u8> { (0..len).map(|i| (i % 251) as u8).collect() }

fn staging(dir: &Path, suffix: &str) -> PathBuf {
    dir.join(format!("{}{suffix}", CacheKey::derive(URL)))
}

fn setup(body: Vec<u8>, mode: Mode) -> (TempDir, ScriptedClient, Downloader<ScriptedClient>) {
    let dir = tempdir().unwrap();
    let client = ScriptedClient::new(body, 1000, mode);
    let config = DownloaderConfig::new(dir.path()).buffer_size(1000);
    let downloader = Downloader::open(client.clone(), config).unwrap();
    (dir, client, downloader)
}

#[tokio::test]
async fn test_end_to_end_and_cache_hit() {
    let body = payload(10_000);
    let (dir, client, downloader) = setup(body.clone(), Mode::Ranged);

    let recorder = Recorder::default();
    let outcome = downloader.fetch(URL, &recorder, &NeverCancel).await;
    assert!(outcome.is_cached(), "{outcome:?}");
    let path = outcome.path().unwrap().to_path_buf();
    assert_eq!(path, dir.path().join(format!("{}.0", CacheKey::derive(URL))));
    assert_eq!(fs::read(&path).unwrap(), body);

    let events = recorder.events();
    assert_eq!(events.len(), 10);
    assert!(events.windows(2).all(|w| w[0].downloaded <= w[1].downloaded));
    assert_eq!(events.last().copied(), Some(DownloadProgress {
        percent:    100,
        downloaded: 10_000,
        total:      Some(10_000),
    }));
    assert_eq!(client.ranges(), vec![Some("bytes=0-".to_string())]);

    assert!(!staging(dir.path(), "_downloading").exists());
    assert!(!staging(dir.path(), "_done").exists());
    assert!(!staging(dir.path(), "_lock").exists());

    let again = Recorder::default();
    let second = downloader.fetch(URL, &again, &NeverCancel).await;
    assert_eq!(second.path(), Some(path.as_path()));
    assert!(again.events().is_empty());
    assert_eq!(client.requests(), 1);
}

#[tokio::test]
async fn test_resume_requests_only_the_remainder() {
    let body = payload(10_000);
    let (dir, client, downloader) = setup(body.clone(), Mode::Ranged);
    fs::write(staging(dir.path(), "_downloading"), &body[..4000]).unwrap();

    let recorder = Recorder::default();
    let outcome = downloader.fetch(URL, &recorder, &NeverCancel).await;

    assert_eq!(fs::read(outcome.into_result().unwrap()).unwrap(), body);
    assert_eq!(client.ranges(), vec![Some("bytes=4000-".to_string())]);
    let events = recorder.events();
    assert_eq!(events.first().map(|p| p.downloaded), Some(5000));
    assert_eq!(events.len(), 6);
}

#[tokio::test]
async fn test_ignored_range_restarts_from_zero() {
    let body = payload(5000);
    let (dir, client, downloader) = setup(body.clone(), Mode::IgnoreRange);
    fs::write(staging(dir.path(), "_downloading"), vec![0xAA; 3000]).unwrap();

    let recorder = Recorder::default();
    let outcome = downloader.fetch(URL, &recorder, &NeverCancel).await;

    assert_eq!(fs::read(outcome.into_result().unwrap()).unwrap(), body);
    assert_eq!(client.ranges(), vec![Some("bytes=3000-".to_string())]);
    let events = recorder.events();
    assert_eq!(events.first().map(|p| p.downloaded), Some(1000));
    assert_eq!(events.last().map(|p| (p.percent, p.total)), Some((100, Some(5000))));
}

#[tokio::test]
async fn test_done_file_is_promoted_without_network() {
    let body = payload(2048);
    let (dir, client, downloader) = setup(body.clone(), Mode::Status(500));
    fs::write(staging(dir.path(), "_done"), &body).unwrap();

    let recorder = Recorder::default();
    let outcome = downloader.fetch(URL, &recorder, &NeverCancel).await;

    assert!(outcome.is_cached(), "{outcome:?}");
    assert_eq!(fs::read(outcome.path().unwrap()).unwrap(), body);
    assert_eq!(client.requests(), 0);
    assert!(recorder.events().is_empty());
    assert!(!staging(dir.path(), "_done").exists());
}

#[tokio::test]
async fn test_cancellation_keeps_staged_bytes_for_resume() {
    let body = payload(10_000);
    let (dir, client, downloader) = setup(body.clone(), Mode::Ranged);

    let written = AtomicUsize::new(0);
    let sink = |_: DownloadProgress| {
        written.fetch_add(1, Ordering::SeqCst);
    };
    let cancel = || written.load(Ordering::SeqCst) >= 3;

    let outcome = downloader.fetch(URL, &sink, &cancel).await;
    assert!(matches!(outcome, FetchOutcome::Failed(FetchError::Cancelled(3000))), "{outcome:?}");
    assert_eq!(fs::metadata(staging(dir.path(), "_downloading")).unwrap().len(), 3000);
    assert_eq!(outcome.into_path_string(), "");

    let outcome = downloader.fetch(URL, &NoopSink, &NeverCancel).await;
    assert_eq!(fs::read(outcome.into_result().unwrap()).unwrap(), body);
    assert_eq!(client.ranges(), vec![Some("bytes=0-".to_string()), Some("bytes=3000-".to_string())]);
}

#[tokio::test]
async fn test_cancelled_before_first_write() {
    let (dir, client, downloader) = setup(payload(4000), Mode::Ranged);

    let outcome = downloader.fetch(URL, &NoopSink, &|| true).await;

    assert!(matches!(outcome.error(), Some(FetchError::Cancelled(0))));
    assert_eq!(client.requests(), 1);
    assert_eq!(fs::metadata(staging(dir.path(), "_downloading")).unwrap().len(), 0);
}

#[tokio::test]
async fn test_broken_stream_resumes_on_next_call() {
    let body = payload(6000);
    let (dir, client, downloader) = setup(body.clone(), Mode::BreakAfter(2500));

    let outcome = downloader.fetch(URL, &NoopSink, &NeverCancel).await;
    assert!(matches!(outcome.error(), Some(FetchError::Transport(_))), "{outcome:?}");
    assert_eq!(fs::metadata(staging(dir.path(), "_downloading")).unwrap().len(), 2500);

    client.set_mode(Mode::Ranged);
    let outcome = downloader.fetch(URL, &NoopSink, &NeverCancel).await;
    assert_eq!(fs::read(outcome.into_result().unwrap()).unwrap(), body);
    assert_eq!(client.ranges().last().cloned().flatten().as_deref(), Some("bytes=2500-"));
}

#[tokio::test]
async fn test_error_status_fails_and_keeps_progress() {
    let body = payload(3000);
    let (dir, client, downloader) = setup(body.clone(), Mode::Status(503));
    fs::write(staging(dir.path(), "_downloading"), &body[..1200]).unwrap();

    let outcome = downloader.fetch(URL, &NoopSink, &NeverCancel).await;

    assert!(matches!(outcome.error(), Some(FetchError::UnexpectedStatus(503))));
    assert_eq!(fs::read(staging(dir.path(), "_downloading")).unwrap(), &body[..1200]);

    client.set_mode(Mode::Ranged);
    let outcome = downloader.fetch(URL, &NoopSink, &NeverCancel).await;
    assert_eq!(fs::read(outcome.into_result().unwrap()).unwrap(), body);
}

#[tokio::test]
async fn test_fully_staged_download_is_finished_by_416() {
    let body = payload(3000);
    let (dir, client, downloader) = setup(body.clone(), Mode::Ranged);
    fs::write(staging(dir.path(), "_downloading"), &body).unwrap();

    let outcome = downloader.fetch(URL, &NoopSink, &NeverCancel).await;

    assert!(outcome.is_cached(), "{outcome:?}");
    assert_eq!(fs::read(outcome.path().unwrap()).unwrap(), body);
    assert_eq!(client.requests(), 1);
}

#[tokio::test]
async fn test_blank_url_is_rejected() {
    let (_dir, client, downloader) = setup(payload(10), Mode::Ranged);

    for url in ["", "   \t"] {
        let outcome = downloader.fetch(url, &NoopSink, &NeverCancel).await;
        assert!(matches!(outcome.error(), Some(FetchError::InvalidInput(_))));
    }
    assert_eq!(client.requests(), 0);
}

#[tokio::test]
async fn test_surrounding_whitespace_maps_to_same_entry() {
    let (_dir, client, downloader) = setup(payload(100), Mode::Ranged);

    let first = downloader.fetch(URL, &NoopSink, &NeverCancel).await;
    let second = downloader.fetch(&format!("  {URL}\n"), &NoopSink, &NeverCancel).await;

    assert_eq!(first.path(), second.path());
    assert_eq!(client.requests(), 1);
}

#[tokio::test]
async fn test_clear_cache_forces_refetch() {
    let (dir, client, downloader) = setup(payload(1500), Mode::Ranged);

    assert!(downloader.fetch(URL, &NoopSink, &NeverCancel).await.is_cached());
    downloader.clear_cache().await.unwrap();
    assert!(dir.path().is_dir());
    assert!(downloader.cache().is_empty());

    assert!(downloader.fetch(URL, &NoopSink, &NeverCancel).await.is_cached());
    assert_eq!(client.requests(), 2);
}

#[tokio::test]
async fn test_contention_degrades_to_staging_file() {
    let dir = tempdir().unwrap();
    let body = payload(2000);
    let client = ScriptedClient::new(body.clone(), 1000, Mode::Ranged);
    let cache = DiskCache::open(dir.path(), 1, 1 << 20).unwrap();
    let downloader = Downloader::with_cache(client.clone(), cache.clone(), DownloaderConfig::new(dir.path()));

    let key = CacheKey::derive(URL);
    let editor = cache.begin_edit(key.as_str()).unwrap().unwrap();

    let outcome = downloader.fetch(URL, &NoopSink, &NeverCancel).await;
    assert!(outcome.is_recovered(), "{outcome:?}");
    let done = outcome.path().unwrap();
    assert!(done.is_absolute());
    assert!(done.ends_with(format!("{key}_done")));
    assert_eq!(fs::read(done).unwrap(), body);

    drop(editor);
    let outcome = downloader.fetch(URL, &NoopSink, &NeverCancel).await;
    assert!(outcome.is_cached(), "{outcome:?}");
    assert_eq!(client.requests(), 1);
}

#[tokio::test]
async fn test_entry_larger_than_cache_is_recovered() {
    let dir = tempdir().unwrap();
    let body = payload(4000);
    let client = ScriptedClient::new(body.clone(), 1000, Mode::Ranged);
    let config = DownloaderConfig::new(dir.path()).max_size(1000);
    let downloader = Downloader::open(client, config).unwrap();

    let outcome = downloader.fetch(URL, &NoopSink, &NeverCancel).await;

    assert!(outcome.is_recovered(), "{outcome:?}");
    assert_eq!(fs::read(outcome.path().unwrap()).unwrap(), body);
    assert!(downloader.cache().is_empty());
}

#[tokio::test]
async fn test_journal_write_failure_still_caches() {
    let body = payload(3000);
    let (dir, client, downloader) = setup(body.clone(), Mode::Ranged);
    let journal = dir.path().join("journal");
    fs::remove_file(&journal).unwrap();
    fs::create_dir(&journal).unwrap();
    fs::write(journal.join("occupied"), b"").unwrap();

    let outcome = downloader.fetch(URL, &NoopSink, &NeverCancel).await;

    assert!(outcome.is_cached(), "{outcome:?}");
    assert_eq!(fs::read(outcome.path().unwrap()).unwrap(), body);
    assert!(!staging(dir.path(), "_done").exists());

    let again = downloader.fetch(URL, &NoopSink, &NeverCancel).await;
    assert_eq!(again.path(), outcome.path());
    assert_eq!(client.requests(), 1);
}

#[tokio::test]
async fn test_lock_files_do_not_accumulate() {
    let (dir, client, downloader) = setup(payload(200), Mode::Ranged);

    for i in 0..20 {
        let outcome = downloader
            .fetch(&format!("https://example.com/{i}"), &NoopSink, &NeverCancel)
            .await;
        assert!(outcome.is_cached(), "{outcome:?}");
    }

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with("_lock"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
    assert_eq!(client.requests(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetches_of_one_key_share_a_download() {
    let body = payload(8000);
    let (dir, client, downloader) = setup(body.clone(), Mode::Ranged);
    let downloader = Arc::new(downloader);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let downloader = Arc::clone(&downloader);
            tokio::spawn(async move { downloader.fetch(URL, &NoopSink, &NeverCancel).await })
        })
        .collect();

    let mut paths = Vec::new();
    for task in tasks {
        let outcome = task.await.unwrap();
        assert!(outcome.is_cached(), "{outcome:?}");
        paths.push(outcome.into_result().unwrap());
    }

    paths.dedup();
    assert_eq!(paths.len(), 1);
    assert_eq!(fs::read(&paths[0]).unwrap(), body);
    assert_eq!(client.requests(), 1);
    assert!(!staging(dir.path(), "_lock").exists());
}

#[tokio::test]
async fn test_distinct_urls_use_distinct_entries() {
    let (_dir, client, downloader) = setup(payload(500), Mode::Ranged);

    let a = downloader.fetch("https://example.com/a", &NoopSink, &NeverCancel).await;
    let b = downloader.fetch("https://example.com/b", &NoopSink, &NeverCancel).await;

    assert_ne!(a.path(), b.path());
    assert_eq!(downloader.cache().len(), 2);
    assert_eq!(client.requests(), 2);
}

#[tokio::test]
async fn test_cancel_trait_object_from_token() {
    let token = recache_fetch::CancelToken::new();
    token.cancel();
    let cancel: &dyn Cancel = &token;
    let (_dir, _client, downloader) = setup(payload(100), Mode::Ranged);

    let outcome = downloader.fetch(URL, &NoopSink, cancel).await;
    assert!(matches!(outcome.error(), Some(FetchError::Cancelled(0))));
}
