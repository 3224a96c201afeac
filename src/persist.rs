//! Persistence gateway.
//!
//! Turns canonical records into store writes under one of three policies:
//!
//! | `rebuild` | `replace` | Behavior |
//! |-----------|-----------|----------|
//! | false | - | insert only; an existing record is left untouched (`Skipped`) |
//! | true | false | merge the record's fields into the stored document |
//! | true | true | replace the stored document |
//!
//! Records with `id == 0` get an id from the `seq:item_id` counter. Before
//! allocating, the gateway looks for a stored record with the same
//! `{type, game, extra}` and reuses its id, so repeated passes over the same
//! upstream rows do not mint new records.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use gamedata_sync_core::models::{Filter, IdentityFilter, IdentityKey, ItemData, UpsertOutcome};
use gamedata_sync_core::store::DocumentStore;

/// Counter marker for allocated item ids.
pub const ITEM_ID_SEQUENCE: &str = "seq:item_id";

pub struct Gateway {
    store: Arc<dyn DocumentStore>,
    sequence: Mutex<()>,
    allocation: Mutex<()>,
}

impl Gateway {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            sequence: Mutex::new(()),
            allocation: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Write one record. `extra` narrows the identity and is written into
    /// the document.
    pub async fn upsert(
        &self,
        record: &ItemData,
        rebuild: bool,
        replace: bool,
        extra: &BTreeMap<String, Value>,
    ) -> Result<UpsertOutcome> {
        let mut doc = record.to_document()?;
        let Some(fields) = doc.as_object_mut() else {
            bail!("record {} did not serialize to an object", record.id);
        };
        for (k, v) in extra {
            fields.insert(k.clone(), v.clone());
        }

        if record.id != 0 {
            let key = IdentityKey::new(record.id, record.kind(), record.game).with_extra(extra.clone());
            return self.write(&key, &doc, rebuild, replace).await;
        }

        if extra.is_empty() {
            bail!(
                "{} {} record without id needs extra identity fields",
                record.game,
                record.kind()
            );
        }

        // Held until the write lands so two allocations for the same row
        // cannot both miss the lookup.
        let _guard = self.allocation.lock().await;
        let lookup = IdentityFilter {
            id: None,
            kind: record.kind(),
            game: record.game,
            extra: extra.clone(),
        };
        let id = match self.store.find_one(&lookup).await? {
            Some(existing) => existing
                .get("id")
                .and_then(Value::as_i64)
                .context("stored record has no numeric id")?,
            None => self.next_sequence(ITEM_ID_SEQUENCE).await?,
        };
        doc["id"] = Value::from(id);

        let key = IdentityKey::new(id, record.kind(), record.game).with_extra(extra.clone());
        self.write(&key, &doc, rebuild, replace).await
    }

    async fn write(
        &self,
        key: &IdentityKey,
        doc: &Value,
        rebuild: bool,
        replace: bool,
    ) -> Result<UpsertOutcome> {
        let exists = self
            .store
            .find_one(&IdentityFilter::from(key))
            .await?
            .is_some();

        let outcome = match (rebuild, replace) {
            (false, _) if exists => UpsertOutcome::Skipped,
            (false, _) => {
                self.store.insert_one(key, doc).await?;
                UpsertOutcome::Inserted
            }
            (true, false) => {
                self.store.upsert_merge(key, doc).await?;
                if exists { UpsertOutcome::Updated } else { UpsertOutcome::Inserted }
            }
            (true, true) => {
                self.store.upsert_replace(key, doc).await?;
                if exists { UpsertOutcome::Updated } else { UpsertOutcome::Inserted }
            }
        };
        debug!(id = key.id, kind = %key.kind, game = %key.game, ?outcome, "upsert");
        Ok(outcome)
    }

    /// Allocate the next value of a counter.
    ///
    /// The item id counter is seeded from the largest stored id the first
    /// time it is used; other counters start at 1.
    pub async fn next_sequence(&self, name: &str) -> Result<i64> {
        let _guard = self.sequence.lock().await;

        let current = match self.store.get_marker(name).await? {
            Some(marker) => marker
                .value
                .parse::<i64>()
                .with_context(|| format!("counter '{}' holds a non-integer value", name))?,
            None if name == ITEM_ID_SEQUENCE => self.max_stored_id().await?,
            None => 0,
        };

        let next = current + 1;
        self.store
            .set_marker(name, &next.to_string(), "allocate")
            .await?;
        Ok(next)
    }

    async fn max_stored_id(&self) -> Result<i64> {
        let ids = self.store.distinct_values("id", &Filter::new()).await?;
        Ok(ids.iter().filter_map(Value::as_i64).max().unwrap_or(0))
    }
}
