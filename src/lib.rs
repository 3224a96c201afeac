//! # Gamedata Sync
//!
//! Keeps a canonical, multilingual catalog of game content (characters,
//! items, monsters, weapons, scenes, quests, stages) synchronized with the
//! upstream data dumps of three games.
//!
//! Each source is watched for upstream revision changes. When one changes,
//! its raw tables are downloaded, localized names are resolved through the
//! per-language text maps, icons are materialized to local storage, and
//! every entry is written to the document store as a canonical record.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Sources    │──▶│ Normalizers │──▶│   Gateway    │
//! │ git / HTTP   │   │ text + icon │   │ SQLite store │
//! └──────┬───────┘   └─────────────┘   └──────────────┘
//!        │ revision probe
//!        ▼
//!   ┌──────────┐
//!   │ markers  │  (last synchronized revision per source)
//!   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gds init                      # create database
//! gds sources                   # configured sources and revisions
//! gds update                    # one pass over every source
//! gds update --source zzz --force
//! gds watch                     # startup pass + hourly scheduler
//! gds stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`fetch`] | Resilient downloads (retry, stall detection) |
//! | [`revision`] | Upstream revision probes and markers |
//! | [`textmap`] | Localized text resolution |
//! | [`tables`] | Declared source files and table keying |
//! | [`icon`] | Icon materialization and fallback |
//! | [`persist`] | Write policies and id allocation |
//! | [`traits`] | The [`traits::GameSource`] seam and registry |
//! | [`ingest`] | Update passes and the scheduler |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod fetch;
pub mod icon;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod persist;
pub mod progress;
pub mod revision;
pub mod source_genshin;
pub mod source_starrail;
pub mod source_zzz;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
pub mod tables;
pub mod textmap;
pub mod traits;
