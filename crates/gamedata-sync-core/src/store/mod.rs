//! Document store abstraction used by the persistence gateway.
//!
//! The [`DocumentStore`] trait is the whole contract the sync engine needs
//! from its backing store: identity-keyed reads and writes over complete
//! JSON documents, a distinct-value query, and key/value markers.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Filter, IdentityFilter, IdentityKey, Marker};

/// Abstract storage backend for canonical records and markers.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_one`](DocumentStore::find_one) | Look up a record by identity |
/// | [`upsert_merge`](DocumentStore::upsert_merge) | Merge top-level fields into a record, or create it |
/// | [`upsert_replace`](DocumentStore::upsert_replace) | Replace the whole record, or create it |
/// | [`insert_one`](DocumentStore::insert_one) | Insert a record that must not exist yet |
/// | [`distinct_values`](DocumentStore::distinct_values) | Distinct values of a field over matching records |
/// | [`get_marker`](DocumentStore::get_marker) | Read a marker |
/// | [`set_marker`](DocumentStore::set_marker) | Create or overwrite a marker |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Return the first record matching the identity filter.
    async fn find_one(&self, filter: &IdentityFilter) -> Result<Option<Value>>;

    /// Merge the top-level fields of `partial` into the record at `key`,
    /// creating the record if absent.
    async fn upsert_merge(&self, key: &IdentityKey, partial: &Value) -> Result<()>;

    /// Replace the record at `key` with `doc`, creating it if absent.
    async fn upsert_replace(&self, key: &IdentityKey, doc: &Value) -> Result<()>;

    /// Insert a new record. Fails if a record already exists at `key`.
    async fn insert_one(&self, key: &IdentityKey, doc: &Value) -> Result<()>;

    /// Distinct values of `field` across records matching `filter`.
    ///
    /// Records without the field are ignored.
    async fn distinct_values(&self, field: &str, filter: &Filter) -> Result<Vec<Value>>;

    async fn get_marker(&self, key: &str) -> Result<Option<Marker>>;

    async fn set_marker(&self, key: &str, value: &str, reason: &str) -> Result<()>;
}

/// Merge the top-level fields of `partial` into `existing`.
///
/// Non-object values replace `existing` wholesale.
pub fn merge_document(existing: &mut Value, partial: &Value) {
    match (existing.as_object_mut(), partial.as_object()) {
        (Some(target), Some(fields)) => {
            for (k, v) in fields {
                target.insert(k.clone(), v.clone());
            }
        }
        _ => *existing = partial.clone(),
    }
}
