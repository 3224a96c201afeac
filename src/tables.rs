//! Source table loading.
//!
//! Each source declares the raw files it needs as [`TableSpec`]s. For every
//! file × language combination the loader reuses a cached copy (when
//! downloads are skipped and the copy exists) or fetches it, then parses it
//! into an ordered [`RawTable`]. Per-language tables may be pruned to an
//! allow-list of fields while loading.
//!
//! One bad file never aborts the pass: it is logged and its table is simply
//! absent from the returned [`SourceTables`].

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::fetch::{FetchOutcome, Fetcher};

/// Raw records of one file, keyed by record key in file order.
pub type RawTable = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum TableFormat {
    /// Parse into a [`RawTable`].
    ///
    /// Arrays are keyed by `key_field` (or by position without one); objects
    /// are keyed by their own keys. `keep_fields` prunes each record.
    Table {
        key_field: Option<String>,
        keep_fields: Option<Vec<String>>,
    },
    /// Only make sure the file exists locally (text maps, read later).
    Download,
}

/// One declared source file.
///
/// `path` is relative to both the source's base URL and its local cache
/// root, and may contain `{lang}` / `{lang_lower}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub path: String,
    pub per_language: bool,
    pub format: TableFormat,
}

impl TableSpec {
    pub fn table(path: &str, key_field: &str) -> Self {
        Self {
            path: path.to_string(),
            per_language: false,
            format: TableFormat::Table {
                key_field: Some(key_field.to_string()),
                keep_fields: None,
            },
        }
    }

    /// An array table keyed by row position.
    pub fn rows(path: &str) -> Self {
        Self {
            path: path.to_string(),
            per_language: false,
            format: TableFormat::Table {
                key_field: None,
                keep_fields: None,
            },
        }
    }

    pub fn download(path: &str) -> Self {
        Self {
            path: path.to_string(),
            per_language: false,
            format: TableFormat::Download,
        }
    }

    pub fn per_language(mut self) -> Self {
        self.per_language = true;
        self
    }

    pub fn keep(mut self, fields: &[&str]) -> Self {
        if let TableFormat::Table { keep_fields, .. } = &mut self.format {
            *keep_fields = Some(fields.iter().map(|f| f.to_string()).collect());
        }
        self
    }

    /// Render the path for a language.
    pub fn render(&self, lang: Option<&str>) -> String {
        match lang {
            Some(l) => self
                .path
                .replace("{lang}", l)
                .replace("{lang_lower}", &l.to_lowercase()),
            None => self.path.clone(),
        }
    }
}

/// Tables loaded for one source's pass. Dropped when the pass ends.
#[derive(Debug, Default)]
pub struct SourceTables {
    tables: HashMap<(String, Option<String>), RawTable>,
    downloads: usize,
}

impl SourceTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, lang: Option<&str>, table: RawTable) {
        self.tables
            .insert((path.to_string(), lang.map(str::to_string)), table);
    }

    /// A language-independent table, by its declared path.
    pub fn get(&self, path: &str) -> Option<&RawTable> {
        self.tables.get(&(path.to_string(), None))
    }

    /// A per-language table, by its declared (unrendered) path.
    pub fn get_lang(&self, path: &str, lang: &str) -> Option<&RawTable> {
        self.tables.get(&(path.to_string(), Some(lang.to_string())))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Number of files fetched over the network while loading.
    pub fn downloads(&self) -> usize {
        self.downloads
    }
}

/// Load every declared file × language combination.
pub async fn load_all(
    fetcher: &Fetcher,
    source_root: &Path,
    base_url: &str,
    languages: &[String],
    specs: &[TableSpec],
    skip_download: bool,
) -> SourceTables {
    let mut out = SourceTables::new();
    let base = base_url.trim_end_matches('/');

    for spec in specs {
        let langs: Vec<Option<&str>> = if spec.per_language {
            languages.iter().map(|l| Some(l.as_str())).collect()
        } else {
            vec![None]
        };

        for lang in langs {
            let rel = spec.render(lang);
            let local = source_root.join(&rel);

            if !(skip_download && Fetcher::exists_locally(&local)) {
                let url = format!("{}/{}", base, rel);
                match fetcher.fetch(&url, &local).await {
                    Ok(FetchOutcome::Success { .. }) => out.downloads += 1,
                    Ok(outcome) => {
                        warn!(file = %rel, ?outcome, "source file unavailable, skipping");
                        continue;
                    }
                    Err(e) => {
                        warn!(file = %rel, error = %format!("{:#}", e), "source file unavailable, skipping");
                        continue;
                    }
                }
            } else {
                debug!(file = %rel, "reusing cached copy");
            }

            if let TableFormat::Table {
                key_field,
                keep_fields,
            } = &spec.format
            {
                match read_table(&local, key_field.as_deref(), keep_fields.as_deref()).await {
                    Ok(table) => {
                        debug!(file = %rel, records = table.len(), "table loaded");
                        out.insert(&spec.path, lang, table);
                    }
                    Err(e) => warn!(file = %rel, error = %format!("{:#}", e), "table unreadable, skipping"),
                }
            }
        }
    }

    out
}

async fn read_table(
    path: &Path,
    key_field: Option<&str>,
    keep_fields: Option<&[String]>,
) -> Result<RawTable> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    build_table(value, key_field, keep_fields)
}

/// Key (and optionally prune) the records of a parsed file.
pub fn build_table(
    value: Value,
    key_field: Option<&str>,
    keep_fields: Option<&[String]>,
) -> Result<RawTable> {
    let mut table = RawTable::new();
    match value {
        Value::Array(rows) => {
            for (index, row) in rows.into_iter().enumerate() {
                let key = match key_field {
                    Some(field) => match row.get(field).and_then(key_string) {
                        Some(k) => k,
                        None => {
                            debug!(field, index, "row without key skipped");
                            continue;
                        }
                    },
                    None => index.to_string(),
                };
                table.insert(key, prune(row, key_field, keep_fields));
            }
        }
        Value::Object(map) => {
            for (key, row) in map {
                table.insert(key, prune(row, key_field, keep_fields));
            }
        }
        _ => bail!("expected a JSON array or object"),
    }
    Ok(table)
}

fn key_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn prune(row: Value, key_field: Option<&str>, keep_fields: Option<&[String]>) -> Value {
    match (row, keep_fields) {
        (Value::Object(mut map), Some(keep)) => {
            map.retain(|k, _| Some(k.as_str()) == key_field || keep.iter().any(|f| f == k));
            Value::Object(map)
        }
        (row, _) => row,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchPolicy;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn render_substitutes_language() {
        let spec = TableSpec::table("{lang_lower}/character.json", "id").per_language();
        assert_eq!(spec.render(Some("EN")), "en/character.json");
        let spec = TableSpec::download("TextMap/TextMap{lang}.json");
        assert_eq!(spec.render(Some("CHS")), "TextMap/TextMapCHS.json");
        assert_eq!(spec.render(None), "TextMap/TextMap{lang}.json");
    }

    #[test]
    fn arrays_are_keyed_by_field() {
        let table = build_table(
            json!([{"id": 7, "a": 1}, {"id": "x", "a": 2}, {"a": 3}]),
            Some("id"),
            None,
        )
        .unwrap();
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["7", "x"]);
        assert_eq!(table["7"]["a"], 1);
    }

    #[test]
    fn arrays_without_key_field_use_position() {
        let table = build_table(json!([{"a": 1}, {"a": 2}]), None, None).unwrap();
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["0", "1"]);
    }

    #[test]
    fn objects_keep_their_keys_and_order() {
        let table = build_table(json!({"b": {"x": 1}, "a": {"x": 2}}), None, None).unwrap();
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn object_files_keep_file_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plane.json");
        std::fs::write(&path, r#"{"30": {"n": 1}, "4": {"n": 2}, "120": {"n": 3}}"#).unwrap();

        let table = read_table(&path, None, None).await.unwrap();
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["30", "4", "120"]);
    }

    #[test]
    fn prunes_to_allow_list_and_keeps_key() {
        let keep = vec!["name".to_string()];
        let table = build_table(
            json!([{"id": 1, "name": "a", "story": "long text", "voice": []}]),
            Some("id"),
            Some(&keep),
        )
        .unwrap();
        assert_eq!(table["1"], json!({"id": 1, "name": "a"}));
    }

    #[test]
    fn scalars_are_rejected() {
        assert!(build_table(json!(3), None, None).is_err());
    }

    #[tokio::test]
    async fn skip_download_reuses_cache_and_tolerates_bad_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("en")).unwrap();
        std::fs::write(root.join("en/item.json"), r#"[{"id": 1, "name": "Coin"}]"#).unwrap();
        std::fs::write(root.join("broken.json"), "{not json").unwrap();

        let fetcher = Fetcher::new(
            FetchPolicy {
                max_retries: 1,
                backoff_base: Duration::ZERO,
                ..FetchPolicy::default()
            },
            Duration::from_millis(200),
        )
        .unwrap();

        // Unroutable base: any download attempt fails
        let specs = vec![
            TableSpec::table("{lang_lower}/item.json", "id").per_language(),
            TableSpec::table("broken.json", "id"),
            TableSpec::table("absent.json", "id"),
        ];
        let tables = load_all(
            &fetcher,
            root,
            "http://127.0.0.1:9",
            &["EN".to_string()],
            &specs,
            true,
        )
        .await;

        assert_eq!(tables.len(), 1);
        assert_eq!(tables.downloads(), 0);
        let items = tables.get_lang("{lang_lower}/item.json", "EN").unwrap();
        assert_eq!(items["1"]["name"], "Coin");
        assert!(tables.get("broken.json").is_none());
        assert!(tables.get("absent.json").is_none());
    }
}
