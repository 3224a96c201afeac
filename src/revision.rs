//! Upstream change detection.
//!
//! A source publishes a revision identifier (a git head sha, a dataset
//! version string). The last identifier a pass completed against is stored as
//! a marker under `revision:<game>`; a differing or absent marker means the
//! source must be refreshed.
//!
//! Querying and recording are separate operations. [`check_for_update`] only
//! reads; [`record_revision`] writes. The orchestrator records only after a
//! source's pass succeeded, so a failed pass is retried on the next tick.
//! [`has_update`] composes the two for callers that want the
//! record-and-report behavior in one call.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use gamedata_sync_core::models::Game;
use gamedata_sync_core::store::DocumentStore;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Marker key holding the last synchronized revision of a source.
pub fn revision_key(game: Game) -> String {
    format!("revision:{}", game)
}

/// Something that can report the latest upstream revision of a source.
#[async_trait]
pub trait RevisionProbe: Send + Sync {
    async fn latest_revision(&self) -> Result<String>;

    /// Human-readable target, for logs.
    fn describe(&self) -> String;
}

/// Queries a remote git repository with `git ls-remote`.
pub struct GitRemoteProbe {
    repo: String,
    branch: String,
    timeout: Duration,
}

impl GitRemoteProbe {
    pub fn new(repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RevisionProbe for GitRemoteProbe {
    async fn latest_revision(&self) -> Result<String> {
        let head = format!("refs/heads/{}", self.branch);
        let mut command = Command::new("git");
        command.args(["ls-remote", &self.repo, &head]).kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow::anyhow!("git ls-remote timed out after {} s", self.timeout.as_secs()))?
            .with_context(|| "Failed to execute 'git ls-remote'. Is git installed?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git ls-remote failed: {}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ls_remote(&stdout, &self.branch)
            .with_context(|| format!("Branch '{}' not found in {}", self.branch, self.repo))
    }

    fn describe(&self) -> String {
        format!("{}#{}", self.repo, self.branch)
    }
}

/// Extract the sha of `refs/heads/<branch>` from `git ls-remote` output.
fn parse_ls_remote(stdout: &str, branch: &str) -> Option<String> {
    let head = format!("refs/heads/{}", branch);
    stdout.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let sha = parts.next()?;
        let reference = parts.next()?;
        (reference == head).then(|| sha.to_string())
    })
}

/// Reads a version field out of a JSON document served over HTTP.
///
/// `field` may be a dotted path (`meta.version`). String and number values
/// are accepted.
pub struct JsonFieldProbe {
    client: reqwest::Client,
    url: String,
    field: String,
    timeout: Duration,
}

impl JsonFieldProbe {
    pub fn new(client: reqwest::Client, url: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            field: field.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Bound on the whole request, headers and body.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RevisionProbe for JsonFieldProbe {
    async fn latest_revision(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", self.url))?;
        if !response.status().is_success() {
            bail!("{} returned HTTP {}", self.url, response.status());
        }
        let doc: Value = response
            .json()
            .await
            .with_context(|| format!("{} is not valid JSON", self.url))?;
        extract_field(&doc, &self.field)
            .with_context(|| format!("Field '{}' missing from {}", self.field, self.url))
    }

    fn describe(&self) -> String {
        format!("{} [{}]", self.url, self.field)
    }
}

fn extract_field(doc: &Value, path: &str) -> Option<String> {
    let value = path.split('.').try_fold(doc, |v, key| v.get(key))?;
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Result of comparing the upstream revision with the stored marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    /// Revision checks are disabled; no network call was made.
    Bypassed,
    UpToDate { revision: String },
    Available {
        revision: String,
        previous: Option<String>,
    },
    /// The probe or the store failed; treat as "no update".
    Unavailable { error: String },
}

impl UpdateCheck {
    pub fn is_available(&self) -> bool {
        matches!(self, UpdateCheck::Available { .. })
    }
}

pub async fn get_latest_remote_revision(probe: &dyn RevisionProbe) -> Result<String> {
    let revision = probe.latest_revision().await?;
    debug!(probe = %probe.describe(), %revision, "latest upstream revision");
    Ok(revision)
}

pub async fn record_revision(
    store: &dyn DocumentStore,
    key: &str,
    revision: &str,
    reason: &str,
) -> Result<()> {
    store
        .set_marker(key, revision, reason)
        .await
        .with_context(|| format!("Failed to record marker '{}'", key))
}

/// Compare the latest upstream revision with the marker under `key`.
///
/// Never writes and never fails: errors become [`UpdateCheck::Unavailable`].
pub async fn check_for_update(
    store: &dyn DocumentStore,
    probe: &dyn RevisionProbe,
    key: &str,
    skip: bool,
) -> UpdateCheck {
    if skip {
        return UpdateCheck::Bypassed;
    }

    let revision = match get_latest_remote_revision(probe).await {
        Ok(r) => r,
        Err(e) => {
            warn!(probe = %probe.describe(), error = %format!("{:#}", e), "revision query failed");
            return UpdateCheck::Unavailable {
                error: format!("{:#}", e),
            };
        }
    };

    let previous = match store.get_marker(key).await {
        Ok(m) => m.map(|m| m.value),
        Err(e) => {
            warn!(key, error = %format!("{:#}", e), "failed to read revision marker");
            return UpdateCheck::Unavailable {
                error: format!("{:#}", e),
            };
        }
    };

    if previous.as_deref() == Some(revision.as_str()) {
        UpdateCheck::UpToDate { revision }
    } else {
        UpdateCheck::Available { revision, previous }
    }
}

/// Record-and-report: true when an update is available, in which case the
/// marker has already been overwritten with the new revision.
///
/// Returns false when `skip` is set and on any failure.
pub async fn has_update(
    store: &dyn DocumentStore,
    probe: &dyn RevisionProbe,
    key: &str,
    skip: bool,
) -> bool {
    match check_for_update(store, probe, key, skip).await {
        UpdateCheck::Available { revision, previous } => {
            let reason = match previous {
                Some(p) => format!("changed from {}", p),
                None => "first observation".to_string(),
            };
            match record_revision(store, key, &revision, &reason).await {
                Ok(()) => {
                    info!(key, %revision, "update available");
                    true
                }
                Err(e) => {
                    warn!(key, error = %format!("{:#}", e), "could not record revision");
                    false
                }
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamedata_sync_core::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe {
        revision: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedProbe {
        fn new(revision: Option<&'static str>) -> Self {
            Self {
                revision,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RevisionProbe for FixedProbe {
        async fn latest_revision(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.revision {
                Some(r) => Ok(r.to_string()),
                None => bail!("remote unreachable"),
            }
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    #[test]
    fn parses_ls_remote_output() {
        let out = "abc123\trefs/heads/master\ndef456\trefs/heads/master-old\n";
        assert_eq!(parse_ls_remote(out, "master").as_deref(), Some("abc123"));
        assert_eq!(parse_ls_remote(out, "master-old").as_deref(), Some("def456"));
        assert_eq!(parse_ls_remote(out, "main"), None);
        assert_eq!(parse_ls_remote("", "master"), None);
    }

    #[test]
    fn extracts_nested_and_numeric_fields() {
        let doc = serde_json::json!({"version": "2.3.1", "meta": {"build": 42}, "empty": ""});
        assert_eq!(extract_field(&doc, "version").as_deref(), Some("2.3.1"));
        assert_eq!(extract_field(&doc, "meta.build").as_deref(), Some("42"));
        assert_eq!(extract_field(&doc, "empty"), None);
        assert_eq!(extract_field(&doc, "missing"), None);
    }

    #[test]
    fn revision_key_per_game() {
        assert_eq!(revision_key(Game::StarRail), "revision:starrail");
    }

    #[tokio::test]
    async fn skip_bypasses_without_probing() {
        let store = InMemoryStore::new();
        let probe = FixedProbe::new(Some("r1"));
        assert_eq!(
            check_for_update(&store, &probe, "revision:genshin", true).await,
            UpdateCheck::Bypassed
        );
        assert!(!has_update(&store, &probe, "revision:genshin", true).await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn absent_marker_is_an_update_and_gets_recorded() {
        let store = InMemoryStore::new();
        let probe = FixedProbe::new(Some("r1"));

        assert!(has_update(&store, &probe, "revision:genshin", false).await);
        let marker = store.get_marker("revision:genshin").await.unwrap().unwrap();
        assert_eq!(marker.value, "r1");
        assert_eq!(marker.reason, "first observation");

        // Same revision again: no update
        assert!(!has_update(&store, &probe, "revision:genshin", false).await);
    }

    #[tokio::test]
    async fn check_does_not_write() {
        let store = InMemoryStore::new();
        store.set_marker("revision:zzz", "old", "seed").await.unwrap();
        let probe = FixedProbe::new(Some("new"));

        let check = check_for_update(&store, &probe, "revision:zzz", false).await;
        assert_eq!(
            check,
            UpdateCheck::Available {
                revision: "new".to_string(),
                previous: Some("old".to_string()),
            }
        );
        let marker = store.get_marker("revision:zzz").await.unwrap().unwrap();
        assert_eq!(marker.value, "old");
    }

    #[tokio::test]
    async fn probe_failure_fails_closed() {
        let store = InMemoryStore::new();
        let probe = FixedProbe::new(None);

        let check = check_for_update(&store, &probe, "revision:zzz", false).await;
        assert!(matches!(check, UpdateCheck::Unavailable { .. }));
        assert!(!has_update(&store, &probe, "revision:zzz", false).await);
        assert!(store.get_marker("revision:zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_field_probe_reads_version() {
        use axum::routing::get;
        use axum::{Json, Router};

        let router = Router::new().route(
            "/version.json",
            get(|| async { Json(serde_json::json!({"version": "1.4"})) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let probe = JsonFieldProbe::new(
            reqwest::Client::new(),
            format!("http://{}/version.json", addr),
            "version",
        );
        assert_eq!(probe.latest_revision().await.unwrap(), "1.4");

        let missing = JsonFieldProbe::new(
            reqwest::Client::new(),
            format!("http://{}/version.json", addr),
            "build",
        );
        assert!(missing.latest_revision().await.is_err());
    }

    #[tokio::test]
    async fn json_field_probe_gives_up_on_silent_server() {
        use axum::routing::get;
        use axum::Router;

        let router = Router::new().route(
            "/version.json",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                "{}"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let probe = JsonFieldProbe::new(
            reqwest::Client::new(),
            format!("http://{}/version.json", addr),
            "version",
        )
        .with_timeout(Duration::from_millis(200));
        let result = tokio::time::timeout(Duration::from_secs(10), probe.latest_revision())
            .await
            .expect("probe gave up on the silent server");
        assert!(result.is_err());

        let store = InMemoryStore::new();
        assert!(matches!(
            check_for_update(&store, &probe, "revision:zzz", false).await,
            UpdateCheck::Unavailable { .. }
        ));
    }
}
