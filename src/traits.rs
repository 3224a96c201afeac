//! The source extension seam.
//!
//! Every upstream game is a [`GameSource`]: it declares the raw files it
//! needs, how to probe its upstream revision, and how to turn the loaded
//! tables into canonical records. The orchestrator owns the pass; a source
//! only ever sees the [`SourceTables`] loaded for it and a [`SyncContext`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             SourceRegistry               │
//! │  ┌─────────┐ ┌──────────┐ ┌───────────┐ │
//! │  │ genshin │ │ starrail │ │    zzz    │ │
//! │  │git dump │ │ git dump │ │ community │ │
//! │  └─────────┘ └──────────┘ └───────────┘ │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!      Updater::run_pass() → Gateway → DocumentStore
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use gamedata_sync_core::models::{Game, ItemData, ItemType, UpsertOutcome};

use crate::config::Config;
use crate::icon::IconResolver;
use crate::persist::Gateway;
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::revision::{revision_key, RevisionProbe};
use crate::tables::{RawTable, SourceTables, TableSpec};
use crate::textmap::TextResolver;

// ═══════════════════════════════════════════════════════════════════════
// GameSource Trait
// ═══════════════════════════════════════════════════════════════════════

/// An upstream game-data provider.
///
/// # Lifecycle
///
/// 1. The source is registered via [`SourceRegistry::register`].
/// 2. Each pass, the orchestrator asks [`probe`](GameSource::probe) for the
///    upstream revision and compares it with the marker under
///    [`marker_key`](GameSource::marker_key).
/// 3. When a refresh is due, the files from
///    [`table_specs`](GameSource::table_specs) are loaded below
///    [`base_url`](GameSource::base_url).
/// 4. [`normalize`](GameSource::normalize) writes canonical records through
///    the context's gateway.
#[async_trait]
pub trait GameSource: Send + Sync {
    fn game(&self) -> Game;

    /// One-line description, shown by `gds sources`.
    fn description(&self) -> String;

    /// Marker holding the last synchronized revision.
    fn marker_key(&self) -> String {
        revision_key(self.game())
    }

    fn probe(&self) -> &dyn RevisionProbe;

    /// URL the declared table paths are relative to.
    fn base_url(&self) -> &str;

    fn languages(&self) -> &[String];

    fn table_specs(&self) -> Vec<TableSpec>;

    /// Folder (relative to the source root) holding `TextMap<LANG>.json`.
    fn text_folder(&self) -> Option<&str> {
        None
    }

    /// Value substituted for the nickname token in display text.
    fn nickname(&self) -> Option<&str> {
        None
    }

    async fn normalize(&self, tables: &SourceTables, ctx: &mut SyncContext<'_>) -> Result<NormalizeReport>;
}

// ═══════════════════════════════════════════════════════════════════════
// Context & Report
// ═══════════════════════════════════════════════════════════════════════

/// Everything a normalizer needs for one source's pass.
pub struct SyncContext<'a> {
    pub game: Game,
    pub text: TextResolver<'a>,
    pub icons: IconResolver,
    pub icon_templates: &'a [String],
    pub gateway: &'a Gateway,
    pub rebuild: bool,
    pub replace: bool,
    pub progress: &'a dyn SyncProgressReporter,
}

impl SyncContext<'_> {
    /// Public URL for an icon name, or empty when none materializes.
    pub async fn icon(&self, name: &str) -> String {
        self.icons
            .resolve_name(name, self.icon_templates, self.replace)
            .await
    }

    /// Persist a record under the pass's policy and count the outcome.
    pub async fn save(
        &self,
        record: &ItemData,
        extra: &BTreeMap<String, Value>,
        report: &mut NormalizeReport,
    ) -> Result<UpsertOutcome> {
        let outcome = self
            .gateway
            .upsert(record, self.rebuild, self.replace, extra)
            .await?;
        report.record(record.kind(), outcome);
        Ok(outcome)
    }

    pub fn tick(&self, n: usize, total: usize) {
        if n % 100 == 0 || n == total {
            self.progress.report(SyncProgressEvent::Normalizing {
                source: self.game.to_string(),
                n: n as u64,
                total: total as u64,
            });
        }
    }
}

/// Per-source outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Rows dropped because they could not be read.
    pub invalid: usize,
    /// Tables a normalizer expected but the loader could not provide.
    pub missing_tables: Vec<String>,
    pub by_type: BTreeMap<ItemType, usize>,
}

impl NormalizeReport {
    pub fn record(&mut self, kind: ItemType, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Skipped => self.skipped += 1,
        }
        *self.by_type.entry(kind).or_insert(0) += 1;
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.skipped
    }

    /// Look up a table, noting it as missing when absent.
    pub fn require<'t>(&mut self, tables: &'t SourceTables, path: &str) -> Option<&'t RawTable> {
        let table = tables.get(path);
        if table.is_none() {
            warn!(table = path, "table unavailable, skipping");
            self.missing_tables.push(path.to_string());
        }
        table
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════

/// Map an upstream string through a lookup table, with a default for
/// unknown values.
pub fn lookup<T: Copy>(table: &[(&str, T)], key: &str, default: T) -> T {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
        .unwrap_or(default)
}

/// Deserialize every row of a table, skipping (and counting) rows that do
/// not match the expected shape.
pub fn parse_rows<T: DeserializeOwned>(
    table: &RawTable,
    report: &mut NormalizeReport,
) -> Vec<(String, T)> {
    let mut rows = Vec::with_capacity(table.len());
    for (key, raw) in table {
        match T::deserialize(raw) {
            Ok(row) => rows.push((key.clone(), row)),
            Err(e) => {
                warn!(key = %key, error = %e, "unreadable row skipped");
                report.invalid += 1;
            }
        }
    }
    rows
}

/// File stem of an upstream asset path (`SpriteOutput/ItemIcon/1.png` → `1`).
pub fn icon_stem(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => file.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of configured sources, in pass order.
pub struct SourceRegistry {
    sources: Vec<Box<dyn GameSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Create a registry with every source present in the config.
    pub fn from_config(config: &Config, client: &reqwest::Client) -> Self {
        use crate::source_genshin::GenshinSource;
        use crate::source_starrail::StarRailSource;
        use crate::source_zzz::ZzzSource;

        let mut registry = Self::new();
        let timeout = std::time::Duration::from_secs(config.fetch.timeout_secs);

        if let Some(cfg) = &config.sources.genshin {
            let languages = config.languages_for(&cfg.languages).to_vec();
            registry.register(Box::new(GenshinSource::new(cfg.clone(), languages).with_probe_timeout(timeout)));
        }
        if let Some(cfg) = &config.sources.starrail {
            let languages = config.languages_for(&cfg.languages).to_vec();
            registry.register(Box::new(StarRailSource::new(cfg.clone(), languages).with_probe_timeout(timeout)));
        }
        if let Some(cfg) = &config.sources.zzz {
            let languages = config.languages_for(&cfg.languages).to_vec();
            let source = ZzzSource::new(cfg.clone(), languages, client.clone()).with_probe_timeout(timeout);
            registry.register(Box::new(source));
        }

        registry
    }

    pub fn register(&mut self, source: Box<dyn GameSource>) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[Box<dyn GameSource>] {
        &self.sources
    }

    pub fn find(&self, game: Game) -> Option<&dyn GameSource> {
        self.sources
            .iter()
            .find(|s| s.game() == game)
            .map(|s| s.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Local cache folder of a source's raw files.
pub fn source_root(config: &Config, game: Game) -> PathBuf {
    config.storage.root.join(game.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    const SIZES: &[(&str, u8)] = &[("SMALL", 1), ("LARGE", 3)];

    #[test]
    fn lookup_uses_default_for_unknown() {
        assert_eq!(lookup(SIZES, "LARGE", 0), 3);
        assert_eq!(lookup(SIZES, "HUGE", 0), 0);
        assert_eq!(lookup(SIZES, "", 9), 9);
    }

    #[test]
    fn icon_stem_strips_folder_and_extension() {
        assert_eq!(icon_stem("SpriteOutput/ItemIcon/110000.png"), "110000");
        assert_eq!(icon_stem("UI_AvatarIcon_Hero"), "UI_AvatarIcon_Hero");
        assert_eq!(icon_stem(""), "");
    }

    #[test]
    fn parse_rows_counts_bad_rows() {
        #[derive(Deserialize)]
        struct Row {
            id: i64,
        }
        let mut table = RawTable::new();
        table.insert("1".into(), json!({"id": 1}));
        table.insert("2".into(), json!({"id": "two"}));
        table.insert("3".into(), json!({"id": 3, "extra": true}));

        let mut report = NormalizeReport::default();
        let rows: Vec<(String, Row)> = parse_rows(&table, &mut report);
        assert_eq!(rows.iter().map(|(_, r)| r.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(report.invalid, 1);
    }

    #[test]
    fn report_counts_outcomes() {
        let mut report = NormalizeReport::default();
        report.record(ItemType::Avatar, UpsertOutcome::Inserted);
        report.record(ItemType::Avatar, UpsertOutcome::Skipped);
        report.record(ItemType::Weapon, UpsertOutcome::Updated);
        assert_eq!(report.total(), 3);
        assert_eq!(report.by_type[&ItemType::Avatar], 2);
    }

    #[test]
    fn require_notes_missing_tables() {
        let tables = SourceTables::new();
        let mut report = NormalizeReport::default();
        assert!(report.require(&tables, "a.json").is_none());
        assert_eq!(report.missing_tables, vec!["a.json".to_string()]);
    }
}
