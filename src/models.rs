//! Data types for literature ingestion and the topic learning lifecycle.
//!
//! Everything here that is persisted serializes to JSON, because topic
//! records, cumulative state, and iteration logs cross the storage boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use topic_readiness_core::score::ReadinessBreakdown;
use topic_readiness_core::signals::CoverageDimension;
use topic_readiness_core::state::CumulativeState;

/// A publication returned by a literature source, before chunking.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteratureRecord {
    /// Source label, e.g. `"pubmed"`.
    pub source: String,
    /// Identifier within the source (PMID, paperId).
    pub source_id: String,
    pub title: String,
    pub abstract_text: String,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub url: Option<String>,
}

/// A stored document row.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// `"{source}:{source_id}"`.
    pub id: String,
    pub source: String,
    pub source_id: String,
    pub title: String,
    pub url: Option<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub created_at: i64,
    /// Cross-source key; `None` for titles too generic to compare.
    pub dedup_hash: Option<String>,
}

/// A retrieval unit cut from a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic: `"{document_id}#{chunk_index}"`.
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`, hex.
    pub hash: String,
    pub publication_year: Option<i32>,
}

/// Lifecycle of a topic.
///
/// ```text
/// proposed ─approve─▶ approved ─▶ learning ─▶ ready
///    ▲  │                             │
///    │  └─reject─▶ rejected           └─────▶ stagnated
///    └──────defer───────────────────────────────┘
/// ```
///
/// `ready` and `stagnated` are terminal for automatic iteration; a manual
/// trigger resets the run and goes back to `learning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicStatus {
    Proposed,
    Approved,
    Rejected,
    Learning,
    Ready,
    Stagnated,
}

impl TopicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicStatus::Proposed => "proposed",
            TopicStatus::Approved => "approved",
            TopicStatus::Rejected => "rejected",
            TopicStatus::Learning => "learning",
            TopicStatus::Ready => "ready",
            TopicStatus::Stagnated => "stagnated",
        }
    }

    /// Statuses from which a learning iteration may run.
    pub fn allows_learning(&self) -> bool {
        matches!(
            self,
            TopicStatus::Approved
                | TopicStatus::Learning
                | TopicStatus::Ready
                | TopicStatus::Stagnated
        )
    }

    /// True for `ready` and `stagnated`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TopicStatus::Ready | TopicStatus::Stagnated)
    }
}

impl fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "proposed" => Ok(TopicStatus::Proposed),
            "approved" => Ok(TopicStatus::Approved),
            "rejected" => Ok(TopicStatus::Rejected),
            "learning" => Ok(TopicStatus::Learning),
            "ready" => Ok(TopicStatus::Ready),
            "stagnated" => Ok(TopicStatus::Stagnated),
            other => anyhow::bail!("Unknown topic status: '{}'", other),
        }
    }
}

/// Outcome of one connector call during an iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub source: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_fill: Option<CoverageDimension>,
}

impl QueryOutcome {
    pub fn chunks_added(&self) -> usize {
        self.results.unwrap_or(0)
    }
}

/// One entry of a topic's learning log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationLogEntry {
    pub iteration: u32,
    pub queries: Vec<QueryOutcome>,
    pub new_chunks: usize,
    pub score_before: f64,
    pub score_after: f64,
    pub score_after_raw: f64,
    pub delta: f64,
    pub stagnated: bool,
    pub recorded_at: i64,
}

/// A topic and its learning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRecord {
    pub id: String,
    pub title: String,
    pub status: TopicStatus,
    /// Base queries for ingestion. Empty means "use the title".
    #[serde(default)]
    pub search_queries: Vec<String>,
    pub score: f64,
    /// `None` until the first readiness computation.
    #[serde(default)]
    pub state: Option<CumulativeState>,
    #[serde(default)]
    pub details: Option<ReadinessBreakdown>,
    pub iteration_count: u32,
    #[serde(default)]
    pub last_delta: Option<f64>,
    #[serde(default)]
    pub learning_log: Vec<IterationLogEntry>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TopicRecord {
    /// A freshly proposed topic with a random UUID.
    pub fn new(title: &str, search_queries: Vec<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.trim().to_string(),
            status: TopicStatus::Proposed,
            search_queries,
            score: 0.0,
            state: None,
            details: None,
            iteration_count: 0,
            last_delta: None,
            learning_log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The base queries to run: configured ones, or the title alone.
    pub fn effective_queries(&self) -> Vec<String> {
        let queries: Vec<String> = self
            .search_queries
            .iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            vec![self.title.clone()]
        } else {
            queries
        }
    }

    /// Clear the learning run (counter, delta, log). Cumulative state is kept.
    pub fn reset_run(&mut self) {
        self.iteration_count = 0;
        self.last_delta = None;
        self.learning_log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_and_guards() {
        for s in [
            TopicStatus::Proposed,
            TopicStatus::Approved,
            TopicStatus::Rejected,
            TopicStatus::Learning,
            TopicStatus::Ready,
            TopicStatus::Stagnated,
        ] {
            assert_eq!(s.as_str().parse::<TopicStatus>().unwrap(), s);
        }
        assert!(!TopicStatus::Proposed.allows_learning());
        assert!(!TopicStatus::Rejected.allows_learning());
        assert!(TopicStatus::Stagnated.allows_learning());
        assert!("bogus".parse::<TopicStatus>().is_err());
    }

    #[test]
    fn test_effective_queries_fall_back_to_title() {
        let t = TopicRecord::new("  Exosomes  ", vec![" ".into()]);
        assert_eq!(t.title, "Exosomes");
        assert_eq!(t.effective_queries(), vec!["Exosomes".to_string()]);
        let t = TopicRecord::new("Exosomes", vec!["exosome skin".into()]);
        assert_eq!(t.effective_queries(), vec!["exosome skin".to_string()]);
    }

    #[test]
    fn test_query_outcome_json_omits_absent_fields() {
        let o = QueryOutcome {
            source: "pubmed".into(),
            query: "q".into(),
            results: Some(3),
            error: None,
            gap_fill: Some(CoverageDimension::Safety),
        };
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["gap_fill"], "safety");
        assert!(json.get("error").is_none());
        assert_eq!(o.chunks_added(), 3);
    }
}
