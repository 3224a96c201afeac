//! `gds sources`: configured sources and their last synchronized revision.

use anyhow::Result;

use gamedata_sync_core::store::DocumentStore;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;
use crate::traits::{source_root, SourceRegistry};

pub async fn list_sources(config: &Config) -> Result<()> {
    let client = reqwest::Client::new();
    let registry = SourceRegistry::from_config(config, &client);

    if registry.is_empty() {
        println!("No sources configured. Add [sources.genshin], [sources.starrail] or [sources.zzz].");
        return Ok(());
    }

    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let store = SqliteStore::new(pool);

    println!("{:<10} {:<14} {:<20} {:<8} UPSTREAM", "SOURCE", "REVISION", "SYNCED", "CACHED");
    for source in registry.sources() {
        let marker = store.get_marker(&source.marker_key()).await?;
        let (revision, synced) = match &marker {
            Some(m) => (
                short_revision(&m.value),
                m.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            ),
            None => ("-".to_string(), "never".to_string()),
        };
        let cached = source_root(config, source.game()).is_dir();
        println!(
            "{:<10} {:<14} {:<20} {:<8} {}",
            source.game(),
            revision,
            synced,
            if cached { "yes" } else { "no" },
            source.description()
        );
    }

    store.pool().close().await;
    Ok(())
}

/// Commit hashes are cut to 12 characters; version strings pass through.
fn short_revision(revision: &str) -> String {
    let is_hash = revision.len() == 40 && revision.chars().all(|c| c.is_ascii_hexdigit());
    if is_hash {
        revision[..12].to_string()
    } else {
        revision.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_shortened() {
        assert_eq!(
            short_revision("0123456789abcdef0123456789abcdef01234567"),
            "0123456789ab"
        );
        assert_eq!(short_revision("1.4.0"), "1.4.0");
    }
}
