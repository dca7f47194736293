//! Corpus and catalogue abstractions.
//!
//! The readiness engine only ever *reads* the corpus. [`CorpusStore`] covers
//! the nearest-neighbour lookup it scores from and the existence checks used
//! to garbage-collect stale identifiers out of a cumulative state.
//! [`Catalogue`] answers whether a topic names a known procedure.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CatalogueEntry, CorpusChunk};

/// Read access to the embedded literature corpus.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`nearest_chunks`](CorpusStore::nearest_chunks) | Top-`limit` chunks by cosine similarity |
/// | [`chunks_exist`](CorpusStore::chunks_exist) | Which of the given chunk ids still exist |
/// | [`docs_exist`](CorpusStore::docs_exist) | Which of the given document ids still exist |
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Return up to `limit` chunks ordered by descending similarity to `query_vec`.
    async fn nearest_chunks(&self, query_vec: &[f32], limit: usize) -> Result<Vec<CorpusChunk>>;

    /// Return the subset of `ids` that name existing chunks.
    async fn chunks_exist(&self, ids: &[String]) -> Result<HashSet<String>>;

    /// Return the subset of `ids` that name existing documents.
    async fn docs_exist(&self, ids: &[String]) -> Result<HashSet<String>>;
}

/// The procedure catalogue.
#[async_trait]
pub trait Catalogue: Send + Sync {
    /// True when any entry's name or tag matches `topic`
    /// (case-insensitive substring, either direction).
    async fn matches(&self, topic: &str) -> Result<bool>;
}

/// Shared matching rule for catalogue backends that hold entries in memory.
pub fn any_entry_matches(entries: &[CatalogueEntry], topic: &str) -> bool {
    entries.iter().any(|e| e.matches_topic(topic))
}
