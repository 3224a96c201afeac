//! In-memory [`DocumentStore`] implementation for testing.
//!
//! Uses `Vec` and `HashMap` behind `std::sync::RwLock` for thread safety.
//! Identity lookups are linear scans.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{matches_filter, Filter, IdentityFilter, IdentityKey, Marker};

use super::{merge_document, DocumentStore};

struct StoredItem {
    id: i64,
    kind: String,
    game: String,
    extra: String,
    doc: Value,
}

impl StoredItem {
    fn is_at(&self, key: &IdentityKey) -> bool {
        self.id == key.id
            && self.kind == key.kind.as_str()
            && self.game == key.game.as_str()
            && self.extra == key.extra_json()
    }
}

/// In-memory store for tests and dry runs.
pub struct InMemoryStore {
    items: RwLock<Vec<StoredItem>>,
    markers: RwLock<HashMap<String, Marker>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            markers: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored document, in insertion order.
    pub fn documents(&self) -> Vec<Value> {
        self.items
            .read()
            .unwrap()
            .iter()
            .map(|s| s.doc.clone())
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find_one(&self, filter: &IdentityFilter) -> Result<Option<Value>> {
        let extra = filter.extra_json();
        let items = self.items.read().unwrap();
        Ok(items
            .iter()
            .find(|s| {
                filter.id.map_or(true, |id| id == s.id)
                    && s.kind == filter.kind.as_str()
                    && s.game == filter.game.as_str()
                    && s.extra == extra
            })
            .map(|s| s.doc.clone()))
    }

    async fn upsert_merge(&self, key: &IdentityKey, partial: &Value) -> Result<()> {
        let mut items = self.items.write().unwrap();
        match items.iter_mut().find(|s| s.is_at(key)) {
            Some(stored) => merge_document(&mut stored.doc, partial),
            None => items.push(StoredItem {
                id: key.id,
                kind: key.kind.as_str().to_string(),
                game: key.game.as_str().to_string(),
                extra: key.extra_json(),
                doc: partial.clone(),
            }),
        }
        Ok(())
    }

    async fn upsert_replace(&self, key: &IdentityKey, doc: &Value) -> Result<()> {
        let mut items = self.items.write().unwrap();
        match items.iter_mut().find(|s| s.is_at(key)) {
            Some(stored) => stored.doc = doc.clone(),
            None => items.push(StoredItem {
                id: key.id,
                kind: key.kind.as_str().to_string(),
                game: key.game.as_str().to_string(),
                extra: key.extra_json(),
                doc: doc.clone(),
            }),
        }
        Ok(())
    }

    async fn insert_one(&self, key: &IdentityKey, doc: &Value) -> Result<()> {
        let mut items = self.items.write().unwrap();
        if items.iter().any(|s| s.is_at(key)) {
            bail!(
                "duplicate identity ({}, {}, {}, {})",
                key.id,
                key.kind,
                key.game,
                key.extra_json()
            );
        }
        items.push(StoredItem {
            id: key.id,
            kind: key.kind.as_str().to_string(),
            game: key.game.as_str().to_string(),
            extra: key.extra_json(),
            doc: doc.clone(),
        });
        Ok(())
    }

    async fn distinct_values(&self, field: &str, filter: &Filter) -> Result<Vec<Value>> {
        let items = self.items.read().unwrap();
        let mut values: Vec<Value> = Vec::new();
        for stored in items.iter().filter(|s| matches_filter(&s.doc, filter)) {
            if let Some(v) = stored.doc.get(field) {
                if !values.contains(v) {
                    values.push(v.clone());
                }
            }
        }
        Ok(values)
    }

    async fn get_marker(&self, key: &str) -> Result<Option<Marker>> {
        Ok(self.markers.read().unwrap().get(key).cloned())
    }

    async fn set_marker(&self, key: &str, value: &str, reason: &str) -> Result<()> {
        self.markers.write().unwrap().insert(
            key.to_string(),
            Marker {
                key: key.to_string(),
                value: value.to_string(),
                updated_at: chrono::Utc::now(),
                reason: reason.to_string(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Game, ItemType};
    use serde_json::json;

    #[tokio::test]
    async fn insert_one_rejects_duplicate_identity() {
        let store = InMemoryStore::new();
        let key = IdentityKey::new(1, ItemType::Avatar, Game::Genshin);
        store.insert_one(&key, &json!({"id": 1})).await.unwrap();
        assert!(store.insert_one(&key, &json!({"id": 1})).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn find_one_without_id_uses_extra() {
        let store = InMemoryStore::new();
        let mut extra = std::collections::BTreeMap::new();
        extra.insert("mode".to_string(), json!("a"));
        let key = IdentityKey::new(42, ItemType::Stage, Game::Zzz).with_extra(extra.clone());
        store.insert_one(&key, &json!({"id": 42, "mode": "a"})).await.unwrap();

        let found = store
            .find_one(&IdentityFilter {
                id: None,
                kind: ItemType::Stage,
                game: Game::Zzz,
                extra,
            })
            .await
            .unwrap();
        assert_eq!(found.unwrap()["id"], 42);
    }

    #[tokio::test]
    async fn distinct_values_filters_and_dedups() {
        let store = InMemoryStore::new();
        for (id, game) in [(1, "zzz"), (2, "zzz"), (2, "genshin")] {
            let g: Game = game.parse().unwrap();
            store
                .insert_one(
                    &IdentityKey::new(id, ItemType::Weapon, g),
                    &json!({"id": id, "game": game, "rarity": 4}),
                )
                .await
                .unwrap();
        }
        let mut filter = Filter::new();
        filter.insert("game".to_string(), json!("zzz"));
        let ids = store.distinct_values("id", &filter).await.unwrap();
        assert_eq!(ids, vec![json!(1), json!(2)]);
        let rarities = store.distinct_values("rarity", &Filter::new()).await.unwrap();
        assert_eq!(rarities, vec![json!(4)]);
    }

    #[tokio::test]
    async fn markers_are_overwritten() {
        let store = InMemoryStore::new();
        assert!(store.get_marker("revision:zzz").await.unwrap().is_none());
        store.set_marker("revision:zzz", "a", "first").await.unwrap();
        store.set_marker("revision:zzz", "b", "second").await.unwrap();
        let marker = store.get_marker("revision:zzz").await.unwrap().unwrap();
        assert_eq!(marker.value, "b");
        assert_eq!(marker.reason, "second");
    }
}
