//! Update pass orchestration.
//!
//! A pass walks the registered sources one after another. For each source:
//! check the upstream revision, load its tables, normalize and persist, then
//! record the revision. A failure aborts only that source; its marker is not
//! advanced, so the next pass retries it.
//!
//! | Revision check | Behavior |
//! |----------------|----------|
//! | `Available` | download, normalize, record revision on success |
//! | `UpToDate` | skipped (no downloads) unless forced |
//! | `Bypassed` | normalize from cached files, nothing recorded |
//! | `Unavailable` | skipped (fail-closed) unless forced |
//!
//! [`Updater::run_scheduler`] performs a startup pass and then one pass per
//! interval. Only one pass runs at a time; a tick that fires while a pass is
//! in flight is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use gamedata_sync_core::models::Game;
use gamedata_sync_core::store::DocumentStore;

use crate::config::{Config, SyncConfig};
use crate::db;
use crate::fetch::Fetcher;
use crate::icon::IconResolver;
use crate::migrate;
use crate::persist::Gateway;
use crate::progress::{NoProgress, SyncProgressEvent, SyncProgressReporter};
use crate::revision::{check_for_update, record_revision, UpdateCheck};
use crate::sqlite_store::SqliteStore;
use crate::tables;
use crate::textmap::{TextCache, TextResolver};
use crate::traits::{source_root, GameSource, NormalizeReport, SourceRegistry, SyncContext};

/// Per-pass switches, defaulted from `[sync]` and overridden by the CLI.
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Restrict the pass to one source.
    pub only: Option<Game>,
    /// Run sources even when their revision is unchanged or unknown.
    pub force: bool,
    pub rebuild: bool,
    pub replace: bool,
    pub skip_download: bool,
    pub skip_revision_check: bool,
}

impl PassOptions {
    pub fn from_config(sync: &SyncConfig) -> Self {
        Self {
            only: None,
            force: false,
            rebuild: sync.rebuild,
            replace: sync.replace,
            skip_download: sync.skip_download,
            skip_revision_check: sync.skip_revision_check,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    Updated {
        report: NormalizeReport,
        revision: Option<String>,
    },
    UpToDate {
        revision: String,
    },
    /// The revision could not be determined; nothing was touched.
    Unavailable {
        error: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub game: Game,
    pub status: SourceStatus,
}

#[derive(Debug, Clone)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceOutcome>,
}

impl PassReport {
    pub fn failed(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.status, SourceStatus::Failed { .. }))
            .count()
    }
}

/// Resets the in-flight flag when a pass ends, including on panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns everything a pass needs: sources, gateway, fetcher and text cache.
pub struct Updater {
    config: Arc<Config>,
    registry: SourceRegistry,
    gateway: Arc<Gateway>,
    fetcher: Fetcher,
    text: Mutex<TextCache>,
    progress: Arc<dyn SyncProgressReporter>,
    in_flight: AtomicBool,
}

impl Updater {
    pub fn new(config: Arc<Config>, registry: SourceRegistry, gateway: Arc<Gateway>, fetcher: Fetcher) -> Self {
        Self {
            config,
            registry,
            gateway,
            fetcher,
            text: Mutex::new(TextCache::new()),
            progress: Arc::new(NoProgress),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Wire the SQLite store, fetcher and configured sources together.
    pub async fn from_config(config: Arc<Config>) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::apply_schema(&pool).await?;
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(pool));
        let fetcher = Fetcher::from_config(&config.fetch)?;
        let registry = SourceRegistry::from_config(&config, fetcher.client());
        Ok(Self::new(config, registry, Arc::new(Gateway::new(store)), fetcher))
    }

    pub fn with_progress(mut self, progress: Arc<dyn SyncProgressReporter>) -> Self {
        self.fetcher = self.fetcher.with_progress(progress.clone());
        self.progress = progress;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run one pass. Returns `None` when another pass is already running.
    pub async fn run_pass(&self, opts: &PassOptions) -> Option<PassReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("update pass already in progress, skipping");
            return None;
        }
        let _guard = InFlight(&self.in_flight);

        let started_at = Utc::now();
        let mut text = self.text.lock().await;
        text.invalidate();

        let mut sources = Vec::new();
        for source in self.registry.sources() {
            let game = source.game();
            if opts.only.is_some_and(|only| only != game) {
                continue;
            }
            let status = match self.update_source(source.as_ref(), &mut text, opts).await {
                Ok(status) => status,
                Err(e) => {
                    let error = format!("{:#}", e);
                    error!(source = %game, error = %error, "source update failed");
                    SourceStatus::Failed { error }
                }
            };
            sources.push(SourceOutcome { game, status });
        }

        let report = PassReport {
            started_at,
            finished_at: Utc::now(),
            sources,
        };
        info!(
            sources = report.sources.len(),
            failed = report.failed(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "update pass finished"
        );
        Some(report)
    }

    async fn update_source(
        &self,
        source: &dyn GameSource,
        text: &mut TextCache,
        opts: &PassOptions,
    ) -> Result<SourceStatus> {
        let game = source.game();
        let key = source.marker_key();
        let store = self.gateway.store().as_ref();

        self.progress.report(SyncProgressEvent::Checking {
            source: game.to_string(),
        });
        let check = check_for_update(store, source.probe(), &key, opts.skip_revision_check).await;

        let (revision, skip_download) = match check {
            UpdateCheck::Available { revision, previous } => {
                info!(source = %game, %revision, previous = ?previous, "upstream changed");
                (Some(revision), opts.skip_download)
            }
            UpdateCheck::Bypassed => (None, true),
            UpdateCheck::UpToDate { revision } if !opts.force => {
                info!(source = %game, %revision, "up to date");
                return Ok(SourceStatus::UpToDate { revision });
            }
            UpdateCheck::UpToDate { revision } => (Some(revision), opts.skip_download),
            UpdateCheck::Unavailable { error } if !opts.force => {
                return Ok(SourceStatus::Unavailable { error });
            }
            UpdateCheck::Unavailable { .. } => (None, opts.skip_download),
        };

        let root = source_root(&self.config, game);
        let tables = tables::load_all(
            &self.fetcher,
            &root,
            source.base_url(),
            source.languages(),
            &source.table_specs(),
            skip_download,
        )
        .await;
        info!(source = %game, tables = tables.len(), downloads = tables.downloads(), "tables loaded");

        let templates = self.icon_templates(game);
        let icons = IconResolver::new(
            self.fetcher.clone(),
            self.config.storage.icon_root.join(game.as_str()),
            &format!("{}/{}", self.config.storage.public_url.trim_end_matches('/'), game),
        );
        let mut ctx = SyncContext {
            game,
            text: TextResolver::new(
                text,
                root.join(source.text_folder().unwrap_or_default()),
                source.languages().to_vec(),
                source.nickname().map(str::to_string),
            ),
            icons,
            icon_templates: &templates,
            gateway: &self.gateway,
            rebuild: opts.rebuild,
            replace: opts.replace,
            progress: self.progress.as_ref(),
        };

        let report = source.normalize(&tables, &mut ctx).await?;
        drop(tables);

        if let Some(revision) = &revision {
            let reason = format!(
                "pass completed: {} inserted, {} updated, {} skipped",
                report.inserted, report.updated, report.skipped
            );
            record_revision(store, &key, revision, &reason).await?;
        }

        info!(
            source = %game,
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            invalid = report.invalid,
            "source updated"
        );
        Ok(SourceStatus::Updated { report, revision })
    }

    fn icon_templates(&self, game: Game) -> Vec<String> {
        let sources = &self.config.sources;
        match game {
            Game::Genshin => sources.genshin.as_ref().map(|s| s.icon_templates.clone()),
            Game::StarRail => sources.starrail.as_ref().map(|s| s.icon_templates.clone()),
            Game::Zzz => sources.zzz.as_ref().map(|s| s.icon_templates.clone()),
        }
        .unwrap_or_default()
    }

    /// Startup pass, then one pass per `interval` until `shutdown` flips to
    /// true. Shutdown is honored between passes only.
    pub async fn run_scheduler(
        self: Arc<Self>,
        opts: PassOptions,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(interval_secs = interval.as_secs(), "scheduler started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut running: Option<tokio::task::JoinHandle<()>> = None;
        loop {
            tokio::select! {
                // The first tick completes immediately: that is the startup pass
                _ = ticker.tick() => {
                    if running.as_ref().is_some_and(|h| !h.is_finished()) {
                        warn!("previous pass still running, tick skipped");
                        continue;
                    }
                    let updater = self.clone();
                    let opts = opts.clone();
                    running = Some(tokio::spawn(async move {
                        updater.run_pass(&opts).await;
                    }));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(handle) = running {
            info!("waiting for the running pass to finish");
            let _ = handle.await;
        }
        info!("scheduler stopped");
        Ok(())
    }
}

/// Print a pass summary on stdout.
pub fn print_report(report: &PassReport) {
    println!(
        "Update pass finished in {} ms",
        (report.finished_at - report.started_at).num_milliseconds()
    );
    for outcome in &report.sources {
        match &outcome.status {
            SourceStatus::Updated { report, revision } => {
                println!(
                    "  {:<10} updated    {} inserted, {} updated, {} skipped, {} invalid (revision {})",
                    outcome.game,
                    report.inserted,
                    report.updated,
                    report.skipped,
                    report.invalid,
                    revision.as_deref().unwrap_or("not recorded")
                );
                for (kind, n) in &report.by_type {
                    println!("  {:<10}   {:<20} {}", "", kind.as_str(), n);
                }
                if !report.missing_tables.is_empty() {
                    println!("  {:<10}   missing: {}", "", report.missing_tables.join(", "));
                }
            }
            SourceStatus::UpToDate { revision } => {
                println!("  {:<10} up to date (revision {})", outcome.game, revision);
            }
            SourceStatus::Unavailable { error } => {
                println!("  {:<10} skipped    revision unavailable: {}", outcome.game, error);
            }
            SourceStatus::Failed { error } => {
                println!("  {:<10} FAILED     {}", outcome.game, error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchPolicy;
    use crate::revision::RevisionProbe;
    use crate::tables::{SourceTables, TableSpec};
    use anyhow::bail;
    use async_trait::async_trait;
    use gamedata_sync_core::models::{ItemData, ItemDetails, MonsterDetails, MonsterKind};
    use gamedata_sync_core::store::memory::InMemoryStore;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    struct StaticProbe(Option<&'static str>);

    #[async_trait]
    impl RevisionProbe for StaticProbe {
        async fn latest_revision(&self) -> Result<String> {
            match self.0 {
                Some(r) => Ok(r.to_string()),
                None => bail!("offline"),
            }
        }

        fn describe(&self) -> String {
            "static".to_string()
        }
    }

    /// Writes one monster per pass; can fail or block on demand.
    struct FakeSource {
        game: Game,
        probe: StaticProbe,
        fail: bool,
        gate: Option<Arc<Notify>>,
        calls: Arc<AtomicUsize>,
        languages: Vec<String>,
    }

    impl FakeSource {
        fn new(game: Game, revision: Option<&'static str>) -> Self {
            Self {
                game,
                probe: StaticProbe(revision),
                fail: false,
                gate: None,
                calls: Arc::new(AtomicUsize::new(0)),
                languages: vec!["EN".to_string()],
            }
        }
    }

    #[async_trait]
    impl GameSource for FakeSource {
        fn game(&self) -> Game {
            self.game
        }

        fn description(&self) -> String {
            "fake".to_string()
        }

        fn probe(&self) -> &dyn RevisionProbe {
            &self.probe
        }

        fn base_url(&self) -> &str {
            "http://127.0.0.1:9"
        }

        fn languages(&self) -> &[String] {
            &self.languages
        }

        fn table_specs(&self) -> Vec<TableSpec> {
            Vec::new()
        }

        async fn normalize(&self, _tables: &SourceTables, ctx: &mut SyncContext<'_>) -> Result<NormalizeReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                bail!("malformed upstream data");
            }
            let mut report = NormalizeReport::default();
            let mut item = ItemData::new(
                1,
                self.game,
                ItemDetails::Monster(MonsterDetails {
                    monster_kind: MonsterKind::Boss,
                }),
            );
            item.name.insert("EN".to_string(), "Boss".to_string());
            ctx.save(&item, &BTreeMap::new(), &mut report).await?;
            Ok(report)
        }
    }

    fn config(tmp: &TempDir) -> Arc<Config> {
        let toml = format!(
            r#"
[db]
path = "{root}/db.sqlite"

[storage]
root = "{root}/raw"
icon_root = "{root}/public"
public_url = "https://static.example.com"
"#,
            root = tmp.path().display()
        );
        Arc::new(toml::from_str(&toml).unwrap())
    }

    fn updater(tmp: &TempDir, sources: Vec<FakeSource>) -> (Arc<InMemoryStore>, Updater) {
        let store = Arc::new(InMemoryStore::new());
        let mut registry = SourceRegistry::new();
        for s in sources {
            registry.register(Box::new(s));
        }
        let fetcher = Fetcher::new(FetchPolicy::default(), Duration::from_secs(1)).unwrap();
        let updater = Updater::new(config(tmp), registry, Arc::new(Gateway::new(store.clone())), fetcher);
        (store, updater)
    }

    #[tokio::test]
    async fn records_revision_only_after_success() {
        let tmp = TempDir::new().unwrap();
        let mut broken = FakeSource::new(Game::StarRail, Some("sr-2"));
        broken.fail = true;
        let (store, updater) = updater(&tmp, vec![FakeSource::new(Game::Genshin, Some("gi-1")), broken]);

        let report = updater.run_pass(&PassOptions::default()).await.unwrap();
        assert_eq!(report.sources.len(), 2);
        assert!(matches!(report.sources[0].status, SourceStatus::Updated { .. }));
        assert!(matches!(report.sources[1].status, SourceStatus::Failed { .. }));
        assert_eq!(report.failed(), 1);

        let genshin = store.get_marker("revision:genshin").await.unwrap().unwrap();
        assert_eq!(genshin.value, "gi-1");
        assert!(store.get_marker("revision:starrail").await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn unchanged_revision_skips_source_unless_forced() {
        let tmp = TempDir::new().unwrap();
        let source = FakeSource::new(Game::Zzz, Some("v1"));
        let calls = source.calls.clone();
        let (_store, updater) = updater(&tmp, vec![source]);

        updater.run_pass(&PassOptions::default()).await.unwrap();
        let second = updater.run_pass(&PassOptions::default()).await.unwrap();
        assert_eq!(
            second.sources[0].status,
            SourceStatus::UpToDate {
                revision: "v1".to_string()
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let forced = PassOptions {
            force: true,
            ..PassOptions::default()
        };
        let third = updater.run_pass(&forced).await.unwrap();
        assert!(matches!(third.sources[0].status, SourceStatus::Updated { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_upstream_fails_closed() {
        let tmp = TempDir::new().unwrap();
        let source = FakeSource::new(Game::Zzz, None);
        let calls = source.calls.clone();
        let (store, updater) = updater(&tmp, vec![source]);

        let report = updater.run_pass(&PassOptions::default()).await.unwrap();
        assert!(matches!(report.sources[0].status, SourceStatus::Unavailable { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn bypass_normalizes_without_recording() {
        let tmp = TempDir::new().unwrap();
        let (store, updater) = updater(&tmp, vec![FakeSource::new(Game::Genshin, Some("gi-1"))]);
        let opts = PassOptions {
            skip_revision_check: true,
            ..PassOptions::default()
        };

        let report = updater.run_pass(&opts).await.unwrap();
        match &report.sources[0].status {
            SourceStatus::Updated { revision, report } => {
                assert!(revision.is_none());
                assert_eq!(report.inserted, 1);
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert!(store.get_marker("revision:genshin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn only_filter_limits_sources() {
        let tmp = TempDir::new().unwrap();
        let (_store, updater) = updater(
            &tmp,
            vec![FakeSource::new(Game::Genshin, Some("a")), FakeSource::new(Game::Zzz, Some("b"))],
        );
        let opts = PassOptions {
            only: Some(Game::Zzz),
            ..PassOptions::default()
        };
        let report = updater.run_pass(&opts).await.unwrap();
        assert_eq!(report.sources.len(), 1);
        assert_eq!(report.sources[0].game, Game::Zzz);
    }

    #[tokio::test]
    async fn overlapping_pass_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let mut slow = FakeSource::new(Game::Genshin, Some("a"));
        slow.gate = Some(gate.clone());
        let calls = slow.calls.clone();
        let (_store, updater) = updater(&tmp, vec![slow]);
        let updater = Arc::new(updater);

        let first = {
            let updater = updater.clone();
            tokio::spawn(async move { updater.run_pass(&PassOptions::default()).await })
        };
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(updater.is_running());
        assert!(updater.run_pass(&PassOptions::default()).await.is_none());

        gate.notify_one();
        assert!(first.await.unwrap().is_some());
        assert!(!updater.is_running());
    }

    #[tokio::test]
    async fn scheduler_runs_startup_pass_and_stops() {
        let tmp = TempDir::new().unwrap();
        let source = FakeSource::new(Game::Genshin, Some("a"));
        let calls = source.calls.clone();
        let (store, updater) = updater(&tmp, vec![source]);
        let updater = Arc::new(updater);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(updater.clone().run_scheduler(
            PassOptions::default(),
            Duration::from_secs(3600),
            rx,
        ));
        while store.get_marker("revision:genshin").await.unwrap().is_none() {
            tokio::task::yield_now().await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
