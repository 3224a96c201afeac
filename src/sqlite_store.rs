//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Records live in the `items` table as complete JSON documents, addressed
//! by the `(id, type, game, extra)` unique key. Field filters and the
//! distinct-value query use SQLite's JSON operators (`->`, `->>`).

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use gamedata_sync_core::models::{Filter, IdentityFilter, IdentityKey, Marker};
use gamedata_sync_core::store::{merge_document, DocumentStore};

/// SQLite implementation of the [`DocumentStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', ""))
}

/// A scalar filter value bound into a query.
enum Bound {
    Text(String),
    Int(i64),
    Real(f64),
}

fn to_bound(field: &str, value: &Value) -> Result<Bound> {
    Ok(match value {
        Value::String(s) => Bound::Text(s.clone()),
        Value::Bool(b) => Bound::Int(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Bound::Int(i),
            None => Bound::Real(n.as_f64().unwrap_or_default()),
        },
        _ => bail!("filter on '{}' must be a scalar value", field),
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find_one(&self, filter: &IdentityFilter) -> Result<Option<Value>> {
        let mut sql =
            String::from("SELECT doc FROM items WHERE type = ? AND game = ? AND extra = ?");
        if filter.id.is_some() {
            sql.push_str(" AND id = ?");
        }
        sql.push_str(" ORDER BY id ASC LIMIT 1");

        let mut query = sqlx::query(&sql)
            .bind(filter.kind.as_str())
            .bind(filter.game.as_str())
            .bind(filter.extra_json());
        if let Some(id) = filter.id {
            query = query.bind(id);
        }

        let row = query.fetch_optional(&self.pool).await?;
        match row {
            Some(r) => {
                let doc: String = r.get("doc");
                Ok(Some(serde_json::from_str(&doc)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert_merge(&self, key: &IdentityKey, partial: &Value) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let extra = key.extra_json();
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT doc FROM items WHERE id = ? AND type = ? AND game = ? AND extra = ?",
        )
        .bind(key.id)
        .bind(key.kind.as_str())
        .bind(key.game.as_str())
        .bind(&extra)
        .fetch_optional(&mut *tx)
        .await?;

        match existing {
            Some(doc) => {
                let mut merged: Value = serde_json::from_str(&doc)?;
                merge_document(&mut merged, partial);
                sqlx::query(
                    "UPDATE items SET doc = ?, updated_at = ? WHERE id = ? AND type = ? AND game = ? AND extra = ?",
                )
                .bind(serde_json::to_string(&merged)?)
                .bind(now)
                .bind(key.id)
                .bind(key.kind.as_str())
                .bind(key.game.as_str())
                .bind(&extra)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO items (id, type, game, extra, doc, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(key.id)
                .bind(key.kind.as_str())
                .bind(key.game.as_str())
                .bind(&extra)
                .bind(serde_json::to_string(partial)?)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_replace(&self, key: &IdentityKey, doc: &Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO items (id, type, game, extra, doc, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id, type, game, extra) DO UPDATE SET
                doc = excluded.doc,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key.id)
        .bind(key.kind.as_str())
        .bind(key.game.as_str())
        .bind(key.extra_json())
        .bind(serde_json::to_string(doc)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_one(&self, key: &IdentityKey, doc: &Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO items (id, type, game, extra, doc, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(key.id)
        .bind(key.kind.as_str())
        .bind(key.game.as_str())
        .bind(key.extra_json())
        .bind(serde_json::to_string(doc)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn distinct_values(&self, field: &str, filter: &Filter) -> Result<Vec<Value>> {
        let mut sql = String::from("SELECT DISTINCT doc -> ? AS v FROM items WHERE doc -> ? IS NOT NULL");
        let mut binds = Vec::with_capacity(filter.len());
        for (k, v) in filter {
            sql.push_str(" AND doc ->> ? = ?");
            binds.push((json_path(k), to_bound(k, v)?));
        }

        let path = json_path(field);
        let mut query = sqlx::query(&sql).bind(path.clone()).bind(path);
        for (p, b) in binds {
            query = query.bind(p);
            query = match b {
                Bound::Text(s) => query.bind(s),
                Bound::Int(i) => query.bind(i),
                Bound::Real(f) => query.bind(f),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: Option<String> = row.get("v");
            if let Some(raw) = raw {
                values.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(values)
    }

    async fn get_marker(&self, key: &str) -> Result<Option<Marker>> {
        let row = sqlx::query("SELECT key, value, updated_at, reason FROM markers WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| {
            let ts: i64 = r.get("updated_at");
            Marker {
                key: r.get("key"),
                value: r.get("value"),
                updated_at: chrono::DateTime::from_timestamp(ts, 0).unwrap_or_default(),
                reason: r.get("reason"),
            }
        }))
    }

    async fn set_marker(&self, key: &str, value: &str, reason: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO markers (key, value, updated_at, reason) VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at,
                reason = excluded.reason
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
