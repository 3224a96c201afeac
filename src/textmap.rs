//! Multi-language text resolution.
//!
//! Upstream records reference display text by hash. Each language has one
//! text-map file (`TextMap<LANG>.json`, hash → string) in the source's locale
//! folder. Tables are loaded lazily the first time a language is needed and
//! kept in a [`TextCache`] owned by the orchestrator, which invalidates it at
//! the start of every pass so upstream text edits are picked up.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use gamedata_sync_core::models::{LangMap, DEFAULT_LANGUAGE};

/// Name-template token substituted with the configured player nickname.
pub const NICKNAME_TOKEN: &str = "{NICKNAME}";

/// File name of the text map for a language.
pub fn text_map_file(lang: &str) -> String {
    format!("TextMap{}.json", lang)
}

/// A text-map hash.
///
/// Deserializes from a JSON number, a string, or a `{"Hash": n}` object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextId(String);

impl TextId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty() || self.0 == "0"
    }
}

impl fmt::Display for TextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TextId {
    fn from(s: &str) -> Self {
        TextId(s.to_string())
    }
}

impl From<i64> for TextId {
    fn from(n: i64) -> Self {
        TextId(n.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTextId {
    Number(serde_json::Number),
    Text(String),
    Hashed {
        #[serde(rename = "Hash")]
        hash: serde_json::Number,
    },
}

impl<'de> Deserialize<'de> for TextId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawTextId::deserialize(deserializer)? {
            RawTextId::Number(n) | RawTextId::Hashed { hash: n } => TextId(n.to_string()),
            RawTextId::Text(s) => TextId(s),
        })
    }
}

type Table = Arc<HashMap<String, String>>;

/// Owned cache of loaded text-map tables, keyed by file path.
#[derive(Default)]
pub struct TextCache {
    tables: HashMap<PathBuf, Table>,
}

impl TextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every loaded table.
    pub fn invalidate(&mut self) {
        if !self.tables.is_empty() {
            debug!(tables = self.tables.len(), "text cache invalidated");
        }
        self.tables.clear();
    }

    /// Number of loaded tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    async fn table(&mut self, locale_folder: &Path, lang: &str) -> Result<Table> {
        let path = locale_folder.join(text_map_file(lang));
        if let Some(t) = self.tables.get(&path) {
            return Ok(t.clone());
        }

        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read text map {}", path.display()))?;
        let table: HashMap<String, String> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse text map {}", path.display()))?;
        debug!(path = %path.display(), entries = table.len(), "text map loaded");

        let table = Arc::new(table);
        self.tables.insert(path, table.clone());
        Ok(table)
    }

    /// Resolve a hash in every requested language.
    ///
    /// A missing key skips that language; a missing or malformed table is an
    /// error. When no language resolves, the fallback literal is returned
    /// under the default language, or an empty map without one.
    pub async fn resolve_name(
        &mut self,
        text_id: &TextId,
        languages: &[String],
        locale_folder: &Path,
        fallback_literal: Option<&str>,
        suffix: &str,
        nickname: Option<&str>,
    ) -> Result<LangMap> {
        let mut names = LangMap::new();
        if !text_id.is_empty() {
            for lang in languages {
                let table = self.table(locale_folder, lang).await?;
                if let Some(text) = table.get(text_id.as_str()).filter(|t| !t.is_empty()) {
                    names.insert(lang.clone(), finish(text, suffix, nickname));
                }
            }
        }

        if names.is_empty() {
            if let Some(literal) = fallback_literal.filter(|l| !l.is_empty()) {
                names.insert(DEFAULT_LANGUAGE.to_string(), finish(literal, suffix, nickname));
            }
        }
        Ok(names)
    }

    /// Resolve a hash to a single string.
    ///
    /// Tries `preferred`, then the other languages in order, then the
    /// literal, then `unknown-<id>`. Table load failures count as misses.
    pub async fn resolve_first_match(
        &mut self,
        text_id: &TextId,
        preferred: &str,
        languages: &[String],
        locale_folder: &Path,
        fallback_literal: Option<&str>,
    ) -> String {
        let order = std::iter::once(preferred)
            .chain(languages.iter().map(String::as_str).filter(|l| *l != preferred));

        if !text_id.is_empty() {
            for lang in order {
                match self.table(locale_folder, lang).await {
                    Ok(table) => {
                        if let Some(text) = table.get(text_id.as_str()).filter(|t| !t.is_empty()) {
                            return text.clone();
                        }
                    }
                    Err(e) => warn!(lang, error = %format!("{:#}", e), "text map unavailable"),
                }
            }
        }

        match fallback_literal.filter(|l| !l.is_empty()) {
            Some(literal) => literal.to_string(),
            None => format!("unknown-{}", text_id),
        }
    }
}

fn finish(text: &str, suffix: &str, nickname: Option<&str>) -> String {
    let mut out = match nickname {
        Some(n) if text.contains(NICKNAME_TOKEN) => text.replace(NICKNAME_TOKEN, n),
        _ => text.to_string(),
    };
    out.push_str(suffix);
    out
}

/// Per-source view over the shared cache: locale folder, languages and
/// nickname fixed for one source's pass.
pub struct TextResolver<'a> {
    cache: &'a mut TextCache,
    locale_folder: PathBuf,
    languages: Vec<String>,
    nickname: Option<String>,
}

impl<'a> TextResolver<'a> {
    pub fn new(
        cache: &'a mut TextCache,
        locale_folder: PathBuf,
        languages: Vec<String>,
        nickname: Option<String>,
    ) -> Self {
        Self {
            cache,
            locale_folder,
            languages,
            nickname,
        }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub async fn name(&mut self, text_id: &TextId, fallback_literal: Option<&str>) -> Result<LangMap> {
        self.name_with_suffix(text_id, fallback_literal, "").await
    }

    pub async fn name_with_suffix(
        &mut self,
        text_id: &TextId,
        fallback_literal: Option<&str>,
        suffix: &str,
    ) -> Result<LangMap> {
        self.cache
            .resolve_name(
                text_id,
                &self.languages,
                &self.locale_folder,
                fallback_literal,
                suffix,
                self.nickname.as_deref(),
            )
            .await
    }

    pub async fn first_match(&mut self, text_id: &TextId, fallback_literal: Option<&str>) -> String {
        let preferred = self
            .languages
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        self.cache
            .resolve_first_match(
                text_id,
                &preferred,
                &self.languages,
                &self.locale_folder,
                fallback_literal,
            )
            .await
    }
}
