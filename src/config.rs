//! TOML configuration parsing and validation.
//!
//! Everything the engine consumes (repository identifiers, branches,
//! language lists, storage roots, public URL prefix, and the
//! skip/rebuild/replace flags) comes from this file; no component reads the
//! environment on its own.
//!
//! ```toml
//! [db]
//! path = "./data/gamedata.sqlite"
//!
//! [storage]
//! root = "./data/raw"
//! icon_root = "./data/public"
//! public_url = "https://static.example.com/gamedata"
//!
//! [sync]
//! languages = ["EN", "JA", "KO", "CHS"]
//!
//! [sources.genshin]
//! repo = "https://gitlab.com/example/GenshinData.git"
//! branch = "master"
//! raw_base = "https://gitlab.com/example/GenshinData/-/raw/master"
//! icon_templates = ["/srv/dump/genshin/{icon}.png", "https://cdn.example.com/ui/{icon}.png"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Local cache for downloaded source files.
    pub root: PathBuf,
    /// Directory served under `public_url`; icons are materialized here.
    pub icon_root: PathBuf,
    pub public_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    /// Reuse cached source files instead of downloading them again.
    #[serde(default)]
    pub skip_download: bool,
    /// Do not query upstream revisions (local development runs).
    #[serde(default)]
    pub skip_revision_check: bool,
    #[serde(default)]
    pub rebuild: bool,
    #[serde(default)]
    pub replace: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            languages: default_languages(),
            skip_download: false,
            skip_revision_check: false,
            rebuild: false,
            replace: false,
        }
    }
}

fn default_interval_secs() -> u64 {
    3600
}
fn default_languages() -> Vec<String> {
    vec!["EN".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_stall_window_secs")]
    pub stall_window_secs: u64,
    #[serde(default = "default_min_bytes_per_sec")]
    pub min_bytes_per_sec: u64,
    #[serde(default = "default_stall_windows")]
    pub stall_windows: u32,
    #[serde(default = "default_max_stall_restarts")]
    pub max_stall_restarts: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Longest wait for response headers, or between two body reads.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
            stall_window_secs: default_stall_window_secs(),
            min_bytes_per_sec: default_min_bytes_per_sec(),
            stall_windows: default_stall_windows(),
            max_stall_restarts: default_max_stall_restarts(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_backoff_secs() -> u64 {
    1
}
fn default_stall_window_secs() -> u64 {
    10
}
fn default_min_bytes_per_sec() -> u64 {
    1024 * 1024
}
fn default_stall_windows() -> u32 {
    2
}
fn default_max_stall_restarts() -> u32 {
    3
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    pub genshin: Option<GitSourceConfig>,
    pub starrail: Option<GitSourceConfig>,
    pub zzz: Option<CommunitySourceConfig>,
}

/// A version-controlled data dump.
#[derive(Debug, Deserialize, Clone)]
pub struct GitSourceConfig {
    /// Clone URL, queried with `git ls-remote` for the head revision.
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Base URL raw files are downloaded from.
    pub raw_base: String,
    #[serde(default)]
    pub icon_templates: Vec<String>,
    /// Substituted for the `{NICKNAME}` token in display text.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Overrides `sync.languages` for this source.
    #[serde(default)]
    pub languages: Option<Vec<String>>,
}

/// The third-party community database.
#[derive(Debug, Deserialize, Clone)]
pub struct CommunitySourceConfig {
    pub base_url: String,
    /// Document (relative to `base_url`) that carries the dataset version.
    #[serde(default = "default_version_path")]
    pub version_path: String,
    #[serde(default = "default_version_field")]
    pub version_field: String,
    #[serde(default)]
    pub icon_templates: Vec<String>,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
}

fn default_branch() -> String {
    "master".to_string()
}
fn default_version_path() -> String {
    "version.json".to_string()
}
fn default_version_field() -> String {
    "version".to_string()
}

impl Config {
    /// Languages for a source: its own list when set, else `sync.languages`.
    pub fn languages_for<'a>(&'a self, own: &'a Option<Vec<String>>) -> &'a [String] {
        own.as_deref().unwrap_or(&self.sync.languages)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.sync.languages.is_empty() {
        anyhow::bail!("sync.languages must list at least one language");
    }
    if config.sync.interval_secs == 0 {
        anyhow::bail!("sync.interval_secs must be > 0");
    }
    if config.storage.public_url.trim().is_empty() {
        anyhow::bail!("storage.public_url must not be empty");
    }
    if config.fetch.max_retries == 0 {
        anyhow::bail!("fetch.max_retries must be >= 1");
    }
    if config.fetch.timeout_secs == 0 {
        anyhow::bail!("fetch.timeout_secs must be > 0");
    }
    if config.fetch.stall_window_secs == 0 || config.fetch.stall_windows == 0 {
        anyhow::bail!("fetch.stall_window_secs and fetch.stall_windows must be > 0");
    }

    for (name, git) in [
        ("genshin", &config.sources.genshin),
        ("starrail", &config.sources.starrail),
    ] {
        if let Some(git) = git {
            url::Url::parse(&git.raw_base)
                .with_context(|| format!("sources.{}.raw_base is not a valid URL", name))?;
            validate_languages(name, &git.languages)?;
            validate_icon_templates(name, &git.icon_templates)?;
        }
    }

    if let Some(zzz) = &config.sources.zzz {
        url::Url::parse(&zzz.base_url)
            .with_context(|| "sources.zzz.base_url is not a valid URL")?;
        validate_languages("zzz", &zzz.languages)?;
        validate_icon_templates("zzz", &zzz.icon_templates)?;
    }

    Ok(())
}

fn validate_languages(source: &str, languages: &Option<Vec<String>>) -> Result<()> {
    if matches!(languages, Some(l) if l.is_empty()) {
        anyhow::bail!("sources.{}.languages must not be empty when set", source);
    }
    Ok(())
}

fn validate_icon_templates(source: &str, templates: &[String]) -> Result<()> {
    for t in templates {
        if !t.contains("{icon}") {
            anyhow::bail!(
                "sources.{}.icon_templates entry '{}' has no {{icon}} placeholder",
                source,
                t
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/gamedata.sqlite"

[storage]
root = "./data/raw"
icon_root = "./data/public"
public_url = "https://static.example.com"
"#;

    fn parse(extra: &str) -> Result<Config> {
        let config: Config = toml::from_str(&format!("{}{}", MINIMAL, extra))?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn defaults_apply() {
        let config = parse("").unwrap();
        assert_eq!(config.sync.interval_secs, 3600);
        assert_eq!(config.sync.languages, vec!["EN"]);
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.fetch.min_bytes_per_sec, 1024 * 1024);
        assert_eq!(config.fetch.timeout_secs, 60);
        assert!(config.sources.genshin.is_none());
    }

    #[test]
    fn source_languages_override_global() {
        let config = parse(
            r#"
[sync]
languages = ["EN", "JA"]

[sources.zzz]
base_url = "https://db.example.com/zzz"
languages = ["KO"]
"#,
        )
        .unwrap();
        let zzz = config.sources.zzz.as_ref().unwrap();
        assert_eq!(config.languages_for(&zzz.languages), ["KO".to_string()]);
        assert_eq!(config.languages_for(&None), ["EN".to_string(), "JA".to_string()]);
        assert_eq!(zzz.version_field, "version");
    }

    #[test]
    fn rejects_template_without_placeholder() {
        let err = parse(
            r#"
[sources.genshin]
repo = "https://example.com/data.git"
raw_base = "https://example.com/raw"
icon_templates = ["https://cdn.example.com/ui/static.png"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("{icon}"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = parse("[fetch]\ntimeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn rejects_empty_languages() {
        assert!(parse("[sync]\nlanguages = []\n").is_err());
    }
}
