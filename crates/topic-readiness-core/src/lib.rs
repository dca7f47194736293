//! # Topic Readiness Core
//!
//! The pure readiness engine: similarity and dedup, evidence signals, the
//! versioned cumulative state, dimension scoring, and the corpus/catalogue
//! traits the engine reads through.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Callers
//! supply an [`EmbeddingProvider`](embedding::EmbeddingProvider), a
//! [`CorpusStore`](store::CorpusStore) and a [`Catalogue`](store::Catalogue),
//! and own persistence of the [`CumulativeState`](state::CumulativeState).
//!
//! ```text
//! topic ─▶ embed ─▶ nearest chunks ─▶ relevance gate ─▶ dedup
//!                                                        │
//!                 prior state ─▶ merge (∪ / OR) ◀─ signals
//!                                   │
//!                                   ▼
//!                          six-dimension score
//! ```

pub mod embedding;
pub mod models;
pub mod readiness;
pub mod score;
pub mod signals;
pub mod similarity;
pub mod state;
pub mod store;
