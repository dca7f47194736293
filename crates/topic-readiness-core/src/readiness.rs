//! Topic Readiness Score (TRS) engine.
//!
//! [`compute_readiness`] answers "is the corpus rich enough to write about
//! this topic?" with a 0 to 100 score. It is pure with respect to its inputs:
//! the caller hands in the prior [`CumulativeState`] and receives the merged
//! state back inside the [`ReadinessReport`]; nothing is stored here.
//!
//! # Algorithm
//!
//! 1. Embed the topic (failure → zero vector).
//! 2. Fetch up to `candidate_limit` nearest chunks (failure → none).
//! 3. Relevance gate, then greedy dedup → the fresh relevant set.
//! 4. Detect diversity and coverage flags in the fresh set's text.
//! 5. Collect fresh chunks whose publication year is recent.
//! 6. Merge into the (version-checked) prior by union / OR.
//! 7. Score six dimensions from the merged state and sum them.
//!
//! The engine never returns an error: every upstream failure degrades to an
//! empty contribution, so a learning loop calling it always gets a score.

use std::collections::BTreeSet;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::models::CorpusChunk;
use crate::score::{score_state, ReadinessBreakdown, ReadinessStatus, TRS_MINIMUM_FOR_GENERATION};
use crate::signals::{detect_coverage, detect_diversity, extract_publication_year, is_recent};
use crate::similarity::{deduplicate, filter_relevant, DUPLICATE_THRESHOLD, RELEVANCE_THRESHOLD};
use crate::state::{CumulativeState, FreshDiscovery};
use crate::store::{Catalogue, CorpusStore};

/// Scoring tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct ReadinessParams {
    /// Maximum chunks fetched from the nearest-neighbour lookup.
    pub candidate_limit: usize,
    /// Minimum similarity to the topic for a chunk to count.
    pub relevance_threshold: f32,
    /// Similarity above which two chunks are the same evidence.
    pub duplicate_threshold: f32,
    /// Publication years within this many years of the reference year are recent.
    pub recency_window_years: i32,
    /// Score at or above which the topic is ready for generation.
    pub readiness_minimum: f64,
    /// Year recency is measured from. `None` means the current UTC year.
    pub reference_year: Option<i32>,
}

impl Default for ReadinessParams {
    fn default() -> Self {
        Self {
            candidate_limit: 200,
            relevance_threshold: RELEVANCE_THRESHOLD,
            duplicate_threshold: DUPLICATE_THRESHOLD,
            recency_window_years: 3,
            readiness_minimum: TRS_MINIMUM_FOR_GENERATION,
            reference_year: None,
        }
    }
}

impl ReadinessParams {
    fn current_year(&self) -> i32 {
        self.reference_year
            .unwrap_or_else(|| chrono::Utc::now().year())
    }
}

/// The collaborators a readiness computation reads from.
#[derive(Clone, Copy)]
pub struct ReadinessDeps<'a> {
    pub embedder: &'a dyn EmbeddingProvider,
    pub corpus: &'a dyn CorpusStore,
    pub catalogue: &'a dyn Catalogue,
}

/// Counts describing this computation's fresh discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshSummary {
    /// Chunks returned by the nearest-neighbour lookup.
    pub retrieved: usize,
    /// Chunks that passed the relevance gate.
    pub relevant: usize,
    /// Relevant chunks left after dedup.
    pub unique: usize,
    /// Unique chunks not already in the prior state.
    pub new_chunks: usize,
}

/// Result of one readiness computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub topic: String,
    pub score: f64,
    pub status: ReadinessStatus,
    pub ready_for_generation: bool,
    pub details: ReadinessBreakdown,
    pub fresh: FreshSummary,
    /// Upstream components that failed and were treated as empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
    /// Merged state to persist and pass back as the next prior.
    pub state: CumulativeState,
}

/// Build the fresh discovery from a relevant, deduplicated chunk set.
pub fn summarize_fresh(chunks: &[CorpusChunk], current_year: i32, window_years: i32) -> FreshDiscovery {
    let chunk_ids: BTreeSet<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
    let doc_ids: BTreeSet<String> = chunks.iter().map(|c| c.document_id.clone()).collect();

    let diversity = detect_diversity(
        chunks
            .iter()
            .map(|c| c.text.as_str())
            .chain(chunks.iter().filter_map(|c| c.doc_title.as_deref())),
    );
    let coverage = detect_coverage(chunks.iter().map(|c| c.text.as_str()));

    let max_year = current_year + 1;
    let recency_chunk_ids = chunks
        .iter()
        .filter(|c| {
            extract_publication_year(&c.text, max_year)
                .or(c.publication_year_hint)
                .map(|y| is_recent(y, current_year, window_years))
                .unwrap_or(false)
        })
        .map(|c| c.chunk_id.clone())
        .collect();

    FreshDiscovery {
        chunk_ids,
        doc_ids,
        diversity,
        coverage,
        recency_chunk_ids,
    }
}

/// Score a merged state into a report. Exposed so callers holding a state
/// can re-label it without touching the corpus.
pub fn report_from_state(
    topic: &str,
    state: CumulativeState,
    catalogue_match: bool,
    readiness_minimum: f64,
) -> ReadinessReport {
    let details = score_state(&state, catalogue_match);
    let score = f64::from(details.total());
    ReadinessReport {
        topic: topic.to_string(),
        score,
        status: ReadinessStatus::from_score(score),
        ready_for_generation: score >= readiness_minimum,
        details,
        fresh: FreshSummary::default(),
        degraded: Vec::new(),
        state,
    }
}

/// Compute the readiness score for `topic`, merging into `prior`.
///
/// A `prior` with a schema version other than the engine's is ignored, which
/// scores exactly as if no prior had been given.
pub async fn compute_readiness(
    deps: ReadinessDeps<'_>,
    params: &ReadinessParams,
    topic: &str,
    prior: Option<&CumulativeState>,
) -> ReadinessReport {
    let mut degraded = Vec::new();

    let topic_vec = match deps.embedder.embed(topic).await {
        Ok(v) if !v.is_empty() => v,
        Ok(_) => vec![0.0; deps.embedder.dims()],
        Err(e) => {
            warn!(topic, error = %e, "topic embedding failed, using zero vector");
            degraded.push(format!("embedding: {}", e));
            vec![0.0; deps.embedder.dims()]
        }
    };

    let candidates = match deps
        .corpus
        .nearest_chunks(&topic_vec, params.candidate_limit)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            warn!(topic, error = %e, "corpus lookup failed, treating as zero fresh chunks");
            degraded.push(format!("corpus: {}", e));
            Vec::new()
        }
    };
    let retrieved = candidates.len();

    let relevant = filter_relevant(candidates, &topic_vec, params.relevance_threshold);
    let relevant_count = relevant.len();
    let unique = deduplicate(relevant, params.duplicate_threshold);

    let fresh = summarize_fresh(&unique, params.current_year(), params.recency_window_years);

    let base = CumulativeState::upgrade(prior);
    if prior.is_some_and(|p| !p.is_current()) {
        debug!(topic, "prior state has a stale schema version, starting fresh");
    }
    let new_chunks = fresh.chunk_ids.difference(&base.seen_chunk_ids).count();
    let merged = base.merge(&fresh);

    let catalogue_match = match deps.catalogue.matches(topic).await {
        Ok(m) => m,
        Err(e) => {
            warn!(topic, error = %e, "catalogue lookup failed, assuming no match");
            degraded.push(format!("catalogue: {}", e));
            false
        }
    };

    let mut report = report_from_state(topic, merged, catalogue_match, params.readiness_minimum);
    report.fresh = FreshSummary {
        retrieved,
        relevant: relevant_count,
        unique: unique.len(),
        new_chunks,
    };
    report.degraded = degraded;

    debug!(
        topic,
        score = report.score,
        retrieved,
        relevant = relevant_count,
        unique = unique.len(),
        new_chunks,
        "readiness computed"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogueEntry;
    use crate::state::SCHEMA_VERSION;
    use crate::store::memory::{InMemoryCatalogue, InMemoryCorpus};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::collections::HashSet;

    const DIMS: usize = 128;

    /// Every topic embeds to axis 0.
    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            DIMS
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0; DIMS];
            v[0] = 1.0;
            Ok(v)
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            DIMS
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            bail!("provider offline")
        }
    }

    struct FailingCorpus;

    #[async_trait]
    impl CorpusStore for FailingCorpus {
        async fn nearest_chunks(&self, _q: &[f32], _limit: usize) -> Result<Vec<CorpusChunk>> {
            bail!("connection refused")
        }
        async fn chunks_exist(&self, _ids: &[String]) -> Result<HashSet<String>> {
            bail!("connection refused")
        }
        async fn docs_exist(&self, _ids: &[String]) -> Result<HashSet<String>> {
            bail!("connection refused")
        }
    }

    fn params() -> ReadinessParams {
        ReadinessParams {
            reference_year: Some(2026),
            ..Default::default()
        }
    }

    /// Relevant (cos ≈ 0.707 to the topic) and distinct (cos 0.5 between
    /// any two) because each chunk owns its own secondary axis.
    fn relevant_chunk(n: usize, doc: &str, text: &str) -> CorpusChunk {
        let mut v = vec![0.0; DIMS];
        v[0] = 1.0;
        v[1 + n] = 1.0;
        CorpusChunk {
            chunk_id: format!("chunk-{}", n),
            document_id: doc.to_string(),
            text: text.to_string(),
            embedding: v,
            publication_year_hint: None,
            doc_title: None,
        }
    }

    fn off_topic_chunk(n: usize) -> CorpusChunk {
        let mut v = vec![0.0; DIMS];
        v[0] = 0.2;
        v[1 + n] = 1.0;
        CorpusChunk {
            chunk_id: format!("stray-{}", n),
            document_id: format!("stray-doc-{}", n),
            text: "meta-analysis efficacy safety recovery".to_string(),
            embedding: v,
            publication_year_hint: None,
            doc_title: None,
        }
    }

    async fn compute(
        corpus: &InMemoryCorpus,
        catalogue: &InMemoryCatalogue,
        topic: &str,
        prior: Option<&CumulativeState>,
    ) -> ReadinessReport {
        let deps = ReadinessDeps {
            embedder: &AxisEmbedder,
            corpus,
            catalogue,
        };
        compute_readiness(deps, &params(), topic, prior).await
    }

    #[tokio::test]
    async fn test_cold_start_scores_red() {
        let corpus = InMemoryCorpus::new();
        corpus.insert(relevant_chunk(0, "d0", "Topical retinoid applied nightly. Year: 2025"));
        corpus.insert(relevant_chunk(1, "d1", "Topical retinoid formulation notes. Year: 2024"));
        let catalogue = InMemoryCatalogue::default();

        let report = compute(&corpus, &catalogue, "Topical Retinoid X", None).await;
        assert!(report.score <= 6.0, "score was {}", report.score);
        assert_eq!(report.status, ReadinessStatus::Red);
        assert!(!report.ready_for_generation);
        assert_eq!(report.details.chunks.score, 0);
        assert_eq!(report.details.documents.score, 0);
        assert_eq!(report.details.recency.score, 5);
        assert_eq!(report.state.chunk_count(), 2);
        assert_eq!(report.fresh.new_chunks, 2);
    }

    #[tokio::test]
    async fn test_relevance_gate_excludes_stray_neighbour() {
        let corpus = InMemoryCorpus::new();
        corpus.insert(off_topic_chunk(0));
        let report = compute(&corpus, &InMemoryCatalogue::default(), "topic", None).await;
        assert_eq!(report.fresh.retrieved, 1);
        assert_eq!(report.fresh.relevant, 0);
        assert_eq!(report.score, 0.0);
        assert!(report.state.seen_chunk_ids.is_empty());
    }

    #[tokio::test]
    async fn test_accumulation_across_iterations() {
        let corpus = InMemoryCorpus::new();
        let catalogue = InMemoryCatalogue::default();
        for n in 0..12 {
            let doc = format!("d{}", n % 6);
            corpus.insert(relevant_chunk(
                n,
                &doc,
                "A randomized controlled trial. Efficacy was good; adverse events were mild.",
            ));
        }
        let first = compute(&corpus, &catalogue, "topic", None).await;
        assert_eq!(first.details.documents.score, 6);
        assert_eq!(first.details.chunks.score, 6);
        assert_eq!(first.details.diversity.score, 10);
        assert_eq!(first.details.coverage.score, 10);
        assert!(first.score >= 22.0 && first.score <= 51.0);

        for n in 12..22 {
            let doc = format!("d{}", 6 + n % 3);
            corpus.insert(relevant_chunk(n, &doc, "Patients reported short downtime."));
        }
        let second = compute(&corpus, &catalogue, "topic", Some(&first.state)).await;
        assert_eq!(second.details.coverage.score, 15);
        assert_eq!(second.details.documents.count, 9);
        assert_eq!(second.details.chunks.count, 22);
        assert!(second.score > first.score);
    }

    #[tokio::test]
    async fn test_monotone_when_lookup_shrinks() {
        let corpus = InMemoryCorpus::new();
        let catalogue = InMemoryCatalogue::default();
        for n in 0..25 {
            corpus.insert(relevant_chunk(n, &format!("d{}", n), "Efficacy outcome"));
        }
        let first = compute(&corpus, &catalogue, "topic", None).await;

        let smaller = InMemoryCorpus::new();
        smaller.insert(relevant_chunk(0, "d0", "nothing of note"));
        let second = compute(&smaller, &catalogue, "topic", Some(&first.state)).await;
        assert!(second.score >= first.score);
        assert_eq!(second.state, first.state);
    }

    #[tokio::test]
    async fn test_merge_idempotent_score() {
        let corpus = InMemoryCorpus::new();
        let catalogue = InMemoryCatalogue::default();
        for n in 0..6 {
            corpus.insert(relevant_chunk(n, &format!("d{}", n), "Year: 2025 safety"));
        }
        let first = compute(&corpus, &catalogue, "topic", None).await;
        let again = compute(&corpus, &catalogue, "topic", Some(&first.state)).await;
        assert_eq!(again.state, first.state);
        assert_eq!(again.score, first.score);
        assert_eq!(again.fresh.new_chunks, 0);
    }

    #[tokio::test]
    async fn test_stale_schema_version_scores_like_no_prior() {
        let corpus = InMemoryCorpus::new();
        let catalogue = InMemoryCatalogue::default();
        corpus.insert(relevant_chunk(0, "d0", "efficacy"));

        let mut stale = CumulativeState::empty();
        stale.schema_version = SCHEMA_VERSION + 1;
        for n in 0..50 {
            stale.seen_chunk_ids.insert(format!("old-{}", n));
            stale.seen_doc_ids.insert(format!("old-doc-{}", n));
        }
        stale.seen_coverage_flags.safety = true;

        let with_stale = compute(&corpus, &catalogue, "topic", Some(&stale)).await;
        let without = compute(&corpus, &catalogue, "topic", None).await;
        assert_eq!(with_stale.score, without.score);
        assert_eq!(with_stale.state, without.state);
        assert_eq!(with_stale.state.schema_version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_catalogue_match_gives_atlas_points_on_empty_corpus() {
        let corpus = InMemoryCorpus::new();
        let catalogue = InMemoryCatalogue::new(vec![CatalogueEntry::new("Microneedling", vec![])]);
        let report = compute(&corpus, &catalogue, "Microneedling", None).await;
        assert_eq!(report.details.atlas.score, 15);
        assert_eq!(report.score, 15.0);
    }

    #[tokio::test]
    async fn test_duplicates_counted_once() {
        let corpus = InMemoryCorpus::new();
        let mut a = relevant_chunk(0, "d0", "text");
        a.chunk_id = "a".into();
        let mut b = a.clone();
        b.chunk_id = "b".into();
        b.document_id = "d1".into();
        corpus.insert(a);
        corpus.insert(b);
        let report = compute(&corpus, &InMemoryCatalogue::default(), "topic", None).await;
        assert_eq!(report.fresh.relevant, 2);
        assert_eq!(report.fresh.unique, 1);
        assert_eq!(report.state.chunk_count(), 1);
        assert_eq!(report.state.doc_count(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_zero() {
        let corpus = InMemoryCorpus::new();
        corpus.insert(relevant_chunk(0, "d0", "meta-analysis"));
        let catalogue = InMemoryCatalogue::default();
        let deps = ReadinessDeps {
            embedder: &FailingEmbedder,
            corpus: &corpus,
            catalogue: &catalogue,
        };
        let report = compute_readiness(deps, &params(), "topic", None).await;
        assert_eq!(report.score, 0.0);
        assert_eq!(report.degraded.len(), 1);
    }

    #[tokio::test]
    async fn test_corpus_failure_keeps_prior() {
        let mut prior = CumulativeState::empty();
        prior.seen_diversity_flags.has_meta_analysis = true;
        let catalogue = InMemoryCatalogue::default();
        let deps = ReadinessDeps {
            embedder: &AxisEmbedder,
            corpus: &FailingCorpus,
            catalogue: &catalogue,
        };
        let report = compute_readiness(deps, &params(), "topic", Some(&prior)).await;
        assert_eq!(report.score, 15.0);
        assert_eq!(report.fresh.retrieved, 0);
        assert!(report.degraded[0].starts_with("corpus"));
    }

    #[test]
    fn test_summarize_fresh_uses_year_hint_as_fallback() {
        let mut c = relevant_chunk(0, "d0", "no marker here");
        c.publication_year_hint = Some(2025);
        let mut old = relevant_chunk(1, "d1", "Year: 2001");
        old.publication_year_hint = Some(2025);
        let fresh = summarize_fresh(&[c, old], 2026, 3);
        assert_eq!(fresh.recency_chunk_ids.len(), 1);
        assert!(fresh.recency_chunk_ids.contains("chunk-0"));
    }

    #[test]
    fn test_summarize_fresh_reads_titles_for_diversity() {
        let mut c = relevant_chunk(0, "d0", "body");
        c.doc_title = Some("A Meta-Analysis of peels".into());
        let fresh = summarize_fresh(&[c], 2026, 3);
        assert!(fresh.diversity.has_meta_analysis);
        assert!(!fresh.coverage.efficacy);
    }
}
