//! Data types shared between the readiness engine and its collaborators.
//!
//! These are the shapes that cross the corpus boundary: what a nearest-neighbour
//! lookup returns, and what the procedure catalogue holds.

use serde::{Deserialize, Serialize};

/// A chunk returned by a nearest-neighbour lookup against the corpus.
///
/// Chunks are immutable once ingested. The engine only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusChunk {
    /// Chunk identifier (stable across lookups).
    pub chunk_id: String,
    /// Owning document identifier.
    pub document_id: String,
    /// Chunk text. Carries the `Year:` marker when the source provided one.
    pub text: String,
    /// Stored embedding. Empty when the chunk was never embedded.
    pub embedding: Vec<f32>,
    /// Year recorded by the store at ingestion time, if any.
    ///
    /// Only a hint: the engine prefers the marker in `text` and falls back to this.
    pub publication_year_hint: Option<i32>,
    /// Title of the owning document.
    pub doc_title: Option<String>,
}

/// A procedure known to the catalogue (the "atlas").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueEntry {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CatalogueEntry {
    pub fn new(name: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            name: name.into(),
            tags,
        }
    }

    /// Case-insensitive substring match in either direction against the
    /// name or any tag.
    pub fn matches_topic(&self, topic: &str) -> bool {
        let topic_lower = topic.trim().to_lowercase();
        if topic_lower.is_empty() {
            return false;
        }
        let hit = |candidate: &str| {
            let c = candidate.trim().to_lowercase();
            !c.is_empty() && (c.contains(&topic_lower) || topic_lower.contains(&c))
        };
        hit(&self.name) || self.tags.iter().any(|t| hit(t))
    }
}
