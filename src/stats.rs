//! Store statistics.
//!
//! A quick summary of what has been synchronized: record counts per game
//! and type plus each source's revision marker. Used by `gds stats` to give
//! confidence that passes are landing as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::migrate;

/// Record count for one (game, type) pair.
struct TypeStats {
    game: String,
    kind: String,
    count: i64,
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Gamedata Sync store stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Records:     {}", total);

    let rows = sqlx::query(
        r#"
        SELECT game, type, COUNT(*) AS count
        FROM items
        GROUP BY game, type
        ORDER BY game, type
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let stats: Vec<TypeStats> = rows
        .iter()
        .map(|row| TypeStats {
            game: row.get("game"),
            kind: row.get("type"),
            count: row.get("count"),
        })
        .collect();

    if !stats.is_empty() {
        println!();
        println!("  By type:");
        println!("  {:<10} {:<16} {:>8}", "GAME", "TYPE", "RECORDS");
        println!("  {}", "-".repeat(36));
        for s in &stats {
            println!("  {:<10} {:<16} {:>8}", s.game, s.kind, s.count);
        }
    }

    let markers = sqlx::query(
        "SELECT key, value, updated_at FROM markers WHERE key LIKE 'revision:%' ORDER BY key",
    )
    .fetch_all(&pool)
    .await?;

    if !markers.is_empty() {
        println!();
        println!("  Revisions:");
        for m in &markers {
            let key: String = m.get("key");
            let value: String = m.get("value");
            let ts: i64 = m.get("updated_at");
            println!(
                "  {:<10} {:<42} {}",
                key.trim_start_matches("revision:"),
                value,
                format_ts_relative(ts)
            );
        }
    }

    println!();
    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Relative time for a Unix timestamp ("3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    match delta {
        d if d < 60 => "just now".to_string(),
        d if d < 3600 => format!("{} min{} ago", d / 60, plural(d / 60)),
        d if d < 86400 => format!("{} hour{} ago", d / 3600, plural(d / 3600)),
        d if d < 86400 * 30 => format!("{} day{} ago", d / 86400, plural(d / 86400)),
        _ => format_ts_iso(ts),
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
        assert_eq!(format_ts_relative(now - 86400 * 3), "3 days ago");
    }
}
