//! # Topic Readiness
//!
//! Scores how well a local literature corpus supports writing about a topic,
//! and grows that corpus iteratively until the topic is ready or stops
//! improving.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────┐
//! │  Sources     │──▶│  Ingest      │──▶│  SQLite    │
//! │ PubMed / S2  │   │ chunk+embed  │   │ docs+vecs  │
//! └──────────────┘   └──────────────┘   └─────┬──────┘
//!        ▲                                    │
//!        │ queries                            ▼
//! ┌──────┴───────┐                     ┌────────────┐
//! │  Learning    │◀────── score ───────│ Readiness  │
//! │  controller  │                     │  (core)    │
//! └──────────────┘                     └────────────┘
//! ```
//!
//! The scoring engine itself lives in `topic-readiness-core` and has no I/O
//! of its own; this crate supplies the SQLite stores, the connectors, the
//! learning loop and the `trs` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Literature records, documents, topics, iteration logs |
//! | [`error`] | Errors surfaced by topic actions |
//! | [`db`] / [`migrate`] | Connection pool and schema |
//! | [`sqlite_store`] | Corpus, catalogue and topic stores over SQLite |
//! | [`embedding`] | Concrete embedding providers |
//! | [`chunk`] | Record chunking and dedup keys |
//! | [`traits`] | `LiteratureSource` and `Ingestor` seams, source registry |
//! | [`connector_pubmed`] | PubMed E-utilities source |
//! | [`connector_semantic_scholar`] | Semantic Scholar source |
//! | [`ingest`] | Search, chunk, embed, store |
//! | [`embed_cmd`] | Vector backfill and rebuild |
//! | [`topics`] | Topic store seam and manual transitions |
//! | [`learning`] | One learning iteration per call |
//! | [`driver`] | Iterate to a terminal status |
//! | [`jobs`] | Concurrent batch learning |
//! | [`app`] | Wiring for the CLI |
//! | [`sources`] / [`stats`] | Reporting commands |

pub mod app;
pub mod chunk;
pub mod config;
pub mod connector_pubmed;
pub mod connector_semantic_scholar;
pub mod db;
pub mod driver;
pub mod embed_cmd;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod learning;
pub mod migrate;
pub mod models;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
pub mod topics;
pub mod traits;
