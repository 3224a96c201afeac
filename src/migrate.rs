use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Canonical records; `extra` is the canonical JSON of the extra identity filter
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id INTEGER NOT NULL,
            type TEXT NOT NULL,
            game TEXT NOT NULL,
            extra TEXT NOT NULL DEFAULT '{}',
            doc TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(id, type, game, extra)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Revision markers and counters
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS markers (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            reason TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_game_type ON items(game, type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_extra ON items(game, type, extra)")
        .execute(pool)
        .await?;

    Ok(())
}
