//! # gamedata-sync core
//!
//! Storage-agnostic pieces of gamedata-sync: the canonical item schema,
//! identity keys, change markers, and the [`store::DocumentStore`] trait
//! with an in-memory implementation.
//!
//! This crate contains no tokio, sqlx, or network dependencies so that the
//! schema can be shared with the read side without pulling in the engine.

pub mod models;
pub mod store;
