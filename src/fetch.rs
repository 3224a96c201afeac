//! Remote file fetcher.
//!
//! Downloads a URL to a local path, streaming the body to disk. Transient
//! failures are retried with exponential backoff; HTTP 404 is terminal.
//! Throughput is sampled per window and a transfer that stays below the
//! minimum rate for consecutive windows is restarted instead of being left
//! to crawl.
//!
//! | Failure | Handling |
//! |---------|----------|
//! | 404 | [`FetchOutcome::NotFound`], no retry |
//! | Other HTTP status / network error | retry after `base * 2^attempt` |
//! | Stalled transfer | restart the same attempt (bounded) |
//! | No response headers in time | counts as a failed attempt |

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::progress::{NoProgress, SyncProgressEvent, SyncProgressReporter};

/// Retry, backoff and stall-detection parameters.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Total attempts before giving up.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub stall_window: Duration,
    pub min_bytes_per_sec: u64,
    /// Consecutive slow windows that count as a stall.
    pub stall_windows: u32,
    /// Stall restarts allowed within one attempt.
    pub max_stall_restarts: u32,
    /// Longest wait for response headers; an attempt that exceeds it fails.
    pub response_timeout: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for FetchPolicy {
    fn from(c: &FetchConfig) -> Self {
        Self {
            max_retries: c.max_retries.max(1),
            backoff_base: Duration::from_secs(c.backoff_secs),
            stall_window: Duration::from_secs(c.stall_window_secs),
            min_bytes_per_sec: c.min_bytes_per_sec,
            stall_windows: c.stall_windows,
            max_stall_restarts: c.max_stall_restarts,
            response_timeout: Duration::from_secs(c.timeout_secs),
        }
    }
}

/// Result of [`Fetcher::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success { bytes: u64 },
    NotFound,
    ExhaustedRetries { attempts: u32, last_error: String },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

enum AttemptError {
    NotFound,
    Stalled { bytes: u64 },
    Failed(anyhow::Error),
}

/// Delay before retry number `attempt` (1-based): `base * 2^attempt`.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}

/// Tracks bytes per window and flags a stall after enough slow windows.
struct StallMonitor {
    window: Duration,
    min_bytes_per_sec: u64,
    limit: u32,
    window_start: Instant,
    window_bytes: u64,
    slow_windows: u32,
}

impl StallMonitor {
    fn new(policy: &FetchPolicy, now: Instant) -> Self {
        Self {
            window: policy.stall_window,
            min_bytes_per_sec: policy.min_bytes_per_sec,
            limit: policy.stall_windows,
            window_start: now,
            window_bytes: 0,
            slow_windows: 0,
        }
    }

    fn record(&mut self, bytes: u64) {
        self.window_bytes += bytes;
    }

    fn time_left(&self, now: Instant) -> Duration {
        self.window
            .saturating_sub(now.saturating_duration_since(self.window_start))
    }

    /// Close the current window if it has elapsed. Returns true on a stall.
    fn check(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return false;
        }
        let rate = self.window_bytes as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        if rate < self.min_bytes_per_sec as f64 {
            self.slow_windows += 1;
        } else {
            self.slow_windows = 0;
        }
        self.window_start = now;
        self.window_bytes = 0;
        self.slow_windows >= self.limit
    }
}

/// HTTP downloader shared by the table loader and the icon resolver.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    policy: FetchPolicy,
    progress: Arc<dyn SyncProgressReporter>,
}

impl Fetcher {
    pub fn new(policy: FetchPolicy, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(policy.response_timeout)
            .build()?;
        Ok(Self {
            client,
            policy,
            progress: Arc::new(NoProgress),
        })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        Self::new(
            FetchPolicy::from(config),
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    pub fn with_progress(mut self, progress: Arc<dyn SyncProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Lightweight skip check: is there already a local copy?
    pub fn exists_locally(path: &Path) -> bool {
        path.is_file()
    }

    /// Download `url` to `dest`, replacing any existing file.
    ///
    /// Only local filesystem problems (creating the parent directory,
    /// removing the old file) are returned as errors; network failures are
    /// reported through [`FetchOutcome`].
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<FetchOutcome> {
        if dest.exists() {
            tokio::fs::remove_file(dest)
                .await
                .with_context(|| format!("Failed to remove stale file {}", dest.display()))?;
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_retries {
            if attempt > 1 {
                let delay = backoff_delay(attempt - 1, self.policy.backoff_base);
                debug!(url, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::time::sleep(delay).await;
            }

            let mut restarts = 0;
            let result = loop {
                match self.attempt(url, dest).await {
                    Err(AttemptError::Stalled { bytes }) if restarts < self.policy.max_stall_restarts => {
                        restarts += 1;
                        warn!(url, bytes, restarts, "transfer stalled, restarting");
                    }
                    other => break other,
                }
            };

            match result {
                Ok(bytes) => {
                    info!(url, bytes, "downloaded");
                    return Ok(FetchOutcome::Success { bytes });
                }
                Err(AttemptError::NotFound) => {
                    discard_partial(dest).await;
                    warn!(url, "not found");
                    return Ok(FetchOutcome::NotFound);
                }
                Err(AttemptError::Stalled { bytes }) => {
                    last_error = format!("transfer stalled after {} bytes", bytes);
                }
                Err(AttemptError::Failed(e)) => {
                    last_error = format!("{:#}", e);
                }
            }
            discard_partial(dest).await;
            warn!(url, attempt, error = %last_error, "download attempt failed");
        }

        Ok(FetchOutcome::ExhaustedRetries {
            attempts: self.policy.max_retries,
            last_error,
        })
    }

    async fn attempt(&self, url: &str, dest: &Path) -> std::result::Result<u64, AttemptError> {
        let response = tokio::time::timeout(self.policy.response_timeout, self.client.get(url).send())
            .await
            .map_err(|_| {
                AttemptError::Failed(anyhow::anyhow!(
                    "no response within {} ms",
                    self.policy.response_timeout.as_millis()
                ))
            })?
            .map_err(|e| AttemptError::Failed(e.into()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AttemptError::NotFound);
        }
        if !status.is_success() {
            return Err(AttemptError::Failed(anyhow::anyhow!("HTTP {}", status)));
        }

        let total = response.content_length();
        let file_label = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| url.to_string());

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| AttemptError::Failed(e.into()))?;
        let mut stream = response.bytes_stream();
        let mut monitor = StallMonitor::new(&self.policy, Instant::now());
        let mut written: u64 = 0;

        loop {
            let wait = monitor.time_left(Instant::now());
            match tokio::time::timeout(wait, stream.next()).await {
                Ok(Some(chunk)) => {
                    let chunk = chunk.map_err(|e| AttemptError::Failed(e.into()))?;
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| AttemptError::Failed(e.into()))?;
                    written += chunk.len() as u64;
                    monitor.record(chunk.len() as u64);
                }
                Ok(None) => break,
                // Window elapsed without data; fall through to the check
                Err(_) => {}
            }

            let now = Instant::now();
            if monitor.time_left(now).is_zero() {
                self.progress.report(SyncProgressEvent::Downloading {
                    file: file_label.clone(),
                    bytes: written,
                    total,
                });
                if monitor.check(now) {
                    return Err(AttemptError::Stalled { bytes: written });
                }
            }
        }

        file.flush().await.map_err(|e| AttemptError::Failed(e.into()))?;
        self.progress.report(SyncProgressEvent::Downloading {
            file: file_label,
            bytes: written,
            total,
        });
        Ok(written)
    }
}

async fn discard_partial(dest: &Path) {
    if dest.exists() {
        let _ = tokio::fs::remove_file(dest).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn quick_policy() -> FetchPolicy {
        FetchPolicy {
            max_retries: 3,
            backoff_base: Duration::from_millis(1),
            stall_window: Duration::from_secs(10),
            min_bytes_per_sec: 0,
            stall_windows: 2,
            max_stall_restarts: 3,
            response_timeout: Duration::from_secs(10),
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(1, base), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, base), Duration::from_secs(4));
        assert_eq!(backoff_delay(3, base), Duration::from_secs(8));
        assert_eq!(backoff_delay(5, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn stall_needs_consecutive_slow_windows() {
        let policy = FetchPolicy {
            stall_window: Duration::from_secs(10),
            min_bytes_per_sec: 1024 * 1024,
            stall_windows: 2,
            ..quick_policy()
        };
        let start = Instant::now();
        let mut monitor = StallMonitor::new(&policy, start);

        // Window not elapsed yet
        assert!(!monitor.check(start + Duration::from_secs(5)));

        // Slow window 1
        monitor.record(1024);
        assert!(!monitor.check(start + Duration::from_secs(10)));

        // Fast window resets the count
        monitor.record(50 * 1024 * 1024);
        assert!(!monitor.check(start + Duration::from_secs(20)));

        // Two slow windows in a row
        monitor.record(10);
        assert!(!monitor.check(start + Duration::from_secs(30)));
        assert!(monitor.check(start + Duration::from_secs(40)));
    }

    #[tokio::test]
    async fn fetch_writes_body_and_replaces_existing() {
        let base = serve(Router::new().route("/data.json", get(|| async { "{\"a\":1}" }))).await;
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("nested").join("data.json");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, "old contents that are longer").unwrap();

        let fetcher = Fetcher::new(quick_policy(), Duration::from_secs(5)).unwrap();
        let outcome = fetcher
            .fetch(&format!("{}/data.json", base), &dest)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Success { bytes: 7 });
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "{\"a\":1}");
        assert!(Fetcher::exists_locally(&dest));
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/missing.png",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    AxumStatus::NOT_FOUND
                }),
            )
            .with_state(hits.clone());
        let base = serve(router).await;
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("missing.png");

        let fetcher = Fetcher::new(quick_policy(), Duration::from_secs(5)).unwrap();
        let outcome = fetcher
            .fetch(&format!("{}/missing.png", base), &dest)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::NotFound);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/flaky",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                        (AxumStatus::INTERNAL_SERVER_ERROR, "boom")
                    } else {
                        (AxumStatus::OK, "ok")
                    }
                }),
            )
            .with_state(hits.clone());
        let base = serve(router).await;
        let tmp = TempDir::new().unwrap();

        let fetcher = Fetcher::new(quick_policy(), Duration::from_secs(5)).unwrap();
        let outcome = fetcher
            .fetch(&format!("{}/flaky", base), &tmp.path().join("flaky"))
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Success { bytes: 2 });
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn silent_server_fails_the_attempt() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/slow",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    "late"
                }),
            )
            .with_state(hits.clone());
        let base = serve(router).await;
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("slow");

        let policy = FetchPolicy {
            max_retries: 2,
            response_timeout: Duration::from_millis(200),
            ..quick_policy()
        };
        let fetcher = Fetcher::new(policy, Duration::from_secs(5)).unwrap();
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            fetcher.fetch(&format!("{}/slow", base), &dest),
        )
        .await
        .expect("fetch gave up on the silent server")
        .unwrap();

        match outcome {
            FetchOutcome::ExhaustedRetries { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected exhausted retries, got {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn retries_are_exhausted() {
        let router = Router::new().route(
            "/down",
            get(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "nope") }),
        );
        let base = serve(router).await;
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("down");

        let fetcher = Fetcher::new(quick_policy(), Duration::from_secs(5)).unwrap();
        let outcome = fetcher.fetch(&format!("{}/down", base), &dest).await.unwrap();

        match outcome {
            FetchOutcome::ExhaustedRetries { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("503"));
            }
            other => panic!("expected exhausted retries, got {:?}", other),
        }
        assert!(!dest.exists());
    }
}
