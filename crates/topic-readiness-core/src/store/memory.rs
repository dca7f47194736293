//! In-memory [`CorpusStore`] and [`Catalogue`] for tests and embedding.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Nearest-neighbour lookup is
//! brute-force cosine similarity over every stored chunk.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CatalogueEntry, CorpusChunk};
use crate::similarity::cosine_similarity;

use super::{any_entry_matches, Catalogue, CorpusStore};

/// In-memory corpus.
pub struct InMemoryCorpus {
    chunks: RwLock<Vec<CorpusChunk>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Append a chunk. A chunk whose id is already stored is ignored.
    pub fn insert(&self, chunk: CorpusChunk) -> bool {
        let mut chunks = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        if chunks.iter().any(|c| c.chunk_id == chunk.chunk_id) {
            return false;
        }
        chunks.push(chunk);
        true
    }

    /// Remove a document and all of its chunks.
    pub fn remove_document(&self, document_id: &str) -> usize {
        let mut chunks = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        let before = chunks.len();
        chunks.retain(|c| c.document_id != document_id);
        before - chunks.len()
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCorpus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CorpusStore for InMemoryCorpus {
    async fn nearest_chunks(&self, query_vec: &[f32], limit: usize) -> Result<Vec<CorpusChunk>> {
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<(f32, &CorpusChunk)> = chunks
            .iter()
            .map(|c| (cosine_similarity(query_vec, &c.embedding), c))
            .collect();
        // Stable sort: ties keep insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn chunks_exist(&self, ids: &[String]) -> Result<HashSet<String>> {
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        Ok(ids
            .iter()
            .filter(|id| chunks.iter().any(|c| &c.chunk_id == *id))
            .cloned()
            .collect())
    }

    async fn docs_exist(&self, ids: &[String]) -> Result<HashSet<String>> {
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        Ok(ids
            .iter()
            .filter(|id| chunks.iter().any(|c| &c.document_id == *id))
            .cloned()
            .collect())
    }
}

/// In-memory catalogue.
#[derive(Default)]
pub struct InMemoryCatalogue {
    entries: RwLock<Vec<CatalogueEntry>>,
}

impl InMemoryCatalogue {
    pub fn new(entries: Vec<CatalogueEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn add(&self, entry: CatalogueEntry) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }
}

#[async_trait]
impl Catalogue for InMemoryCatalogue {
    async fn matches(&self, topic: &str) -> Result<bool> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(any_entry_matches(&entries, topic))
    }
}
