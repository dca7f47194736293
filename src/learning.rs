//! Learning iteration controller.
//!
//! [`LearningController::run_one_iteration`] moves a topic one step through
//! `approved → learning → {ready | learning | stagnated}`:
//!
//! ```text
//!   lock(topic) ─▶ guards ─▶ prune state ─▶ score "before" (floor)
//!        │
//!        ▼
//!   base queries + gap-fill queries ──concurrent, timed──▶ ingestors
//!        │
//!        ▼
//!   score "after" (chained from before) ─▶ floor ─▶ delta ─▶ status ─▶ persist
//! ```
//!
//! Iterations on the same topic are serialized by a per-topic async mutex;
//! different topics run in parallel. Connector failures and timeouts are
//! recorded in the iteration log and never abort the iteration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use topic_readiness_core::embedding::EmbeddingProvider;
use topic_readiness_core::readiness::{
    compute_readiness, ReadinessDeps, ReadinessParams, ReadinessReport,
};
use topic_readiness_core::score::ReadinessBreakdown;
use topic_readiness_core::signals::{CoverageDimension, CoverageFlags};
use topic_readiness_core::state::CumulativeState;
use topic_readiness_core::store::{Catalogue, CorpusStore};

use crate::config::LearningConfig;
use crate::error::{LearningError, Result};
use crate::models::{IterationLogEntry, QueryOutcome, TopicRecord, TopicStatus};
use crate::topics::{self, load_topic, TopicStore};
use crate::traits::Ingestor;

/// Query templates per missing coverage dimension. `{topic}` is the title.
pub fn gap_fill_templates(dimension: CoverageDimension) -> [&'static str; 2] {
    match dimension {
        CoverageDimension::Efficacy => [
            "{topic} efficacy systematic review",
            "{topic} effectiveness clinical outcomes",
        ],
        CoverageDimension::Safety => [
            "{topic} adverse effects safety profile",
            "{topic} complications side effects risk",
        ],
        CoverageDimension::Recovery => [
            "{topic} downtime recovery social",
            "{topic} healing time patient satisfaction",
        ],
    }
}

/// Result of one call to [`LearningController::run_one_iteration`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationResult {
    pub topic_id: String,
    pub title: String,
    pub iteration: u32,
    pub score_before: f64,
    pub score_after: f64,
    pub score_after_raw: f64,
    /// `score_after - score_before`, rounded to 0.1.
    pub delta: f64,
    pub new_chunks: usize,
    pub queries_used: usize,
    pub stagnated: bool,
    pub status: TopicStatus,
    pub ready_for_generation: bool,
    pub details: Option<ReadinessBreakdown>,
    /// True when the iteration cap was already reached and nothing ran.
    #[serde(default)]
    pub capped: bool,
}

struct PlannedQuery {
    ingestor: Arc<dyn Ingestor>,
    query: String,
    gap_fill: Option<CoverageDimension>,
}

/// Drives learning iterations for topics held in a [`TopicStore`].
pub struct LearningController {
    topics: Arc<dyn TopicStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    corpus: Arc<dyn CorpusStore>,
    catalogue: Arc<dyn Catalogue>,
    ingestors: Vec<Arc<dyn Ingestor>>,
    params: ReadinessParams,
    config: LearningConfig,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LearningController {
    pub fn new(
        topics: Arc<dyn TopicStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        corpus: Arc<dyn CorpusStore>,
        catalogue: Arc<dyn Catalogue>,
    ) -> Self {
        Self {
            topics,
            embedder,
            corpus,
            catalogue,
            ingestors: Vec::new(),
            params: ReadinessParams::default(),
            config: LearningConfig::default(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ingestors(mut self, ingestors: Vec<Arc<dyn Ingestor>>) -> Self {
        self.ingestors = ingestors;
        self
    }

    pub fn with_params(mut self, params: ReadinessParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_config(mut self, config: LearningConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn topics(&self) -> &Arc<dyn TopicStore> {
        &self.topics
    }

    fn topic_lock(&self, topic_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(topic_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn deps(&self) -> ReadinessDeps<'_> {
        ReadinessDeps {
            embedder: self.embedder.as_ref(),
            corpus: self.corpus.as_ref(),
            catalogue: self.catalogue.as_ref(),
        }
    }

    /// Score any topic string against a prior state. Stores nothing.
    pub async fn compute(&self, topic: &str, prior: Option<&CumulativeState>) -> ReadinessReport {
        compute_readiness(self.deps(), &self.params, topic, prior).await
    }

    /// Score a stored topic and persist the merged state and score.
    /// The status is left untouched.
    pub async fn score_topic(&self, topic_id: &str) -> Result<ReadinessReport> {
        let lock = self.topic_lock(topic_id);
        let _guard = lock.lock().await;

        let mut topic = load_topic(self.topics.as_ref(), topic_id).await?;
        let prior = self.prune(topic.state.as_ref()).await;
        let report = self.compute(&topic.title, prior.as_ref()).await;

        topic.score = report.score;
        topic.state = Some(report.state.clone());
        topic.details = Some(report.details.clone());
        topic.updated_at = chrono::Utc::now().timestamp();
        self.topics.save(&topic).await?;
        Ok(report)
    }

    /// Approve a topic for learning.
    ///
    /// Resets the learning run, then scores the existing corpus: a topic that
    /// already clears the readiness minimum goes straight to `ready`.
    pub async fn approve_topic(&self, topic_id: &str) -> Result<TopicRecord> {
        let lock = self.topic_lock(topic_id);
        let _guard = lock.lock().await;

        let mut topic = load_topic(self.topics.as_ref(), topic_id).await?;
        if matches!(topic.status, TopicStatus::Approved | TopicStatus::Learning) {
            return Err(LearningError::conflict(topic_id, topic.status, "approval"));
        }

        topic.reset_run();
        let prior = self.prune(topic.state.as_ref()).await;
        let report = self.compute(&topic.title, prior.as_ref()).await;

        topic.score = report.score;
        topic.state = Some(report.state);
        topic.details = Some(report.details);
        topic.status = if report.ready_for_generation {
            TopicStatus::Ready
        } else {
            TopicStatus::Approved
        };
        topic.updated_at = chrono::Utc::now().timestamp();
        self.topics.save(&topic).await?;

        info!(topic_id, score = topic.score, status = %topic.status, "topic approved");
        Ok(topic)
    }

    /// Reset the learning run and mark the topic `learning`, under the topic lock.
    pub async fn reset_for_learning(&self, topic_id: &str) -> Result<TopicRecord> {
        let lock = self.topic_lock(topic_id);
        let _guard = lock.lock().await;
        topics::reset_for_learning(self.topics.as_ref(), topic_id).await
    }

    /// Reject a topic, waiting for any running iteration on it to finish.
    pub async fn reject_topic(&self, topic_id: &str) -> Result<TopicRecord> {
        let lock = self.topic_lock(topic_id);
        let _guard = lock.lock().await;
        topics::reject_topic(self.topics.as_ref(), topic_id).await
    }

    /// Send a topic back to `proposed`, under the topic lock.
    pub async fn defer_topic(&self, topic_id: &str) -> Result<TopicRecord> {
        let lock = self.topic_lock(topic_id);
        let _guard = lock.lock().await;
        topics::defer_topic(self.topics.as_ref(), topic_id).await
    }

    /// Replace the base queries, under the topic lock.
    pub async fn update_queries(
        &self,
        topic_id: &str,
        queries: Vec<String>,
    ) -> Result<TopicRecord> {
        let lock = self.topic_lock(topic_id);
        let _guard = lock.lock().await;
        topics::update_queries(self.topics.as_ref(), topic_id, queries).await
    }

    /// Delete a topic once no iteration holds it, then forget its lock.
    pub async fn delete_topic(&self, topic_id: &str) -> Result<()> {
        let lock = self.topic_lock(topic_id);
        let result = {
            let _guard = lock.lock().await;
            topics::delete_topic(self.topics.as_ref(), topic_id).await
        };
        self.release_lock(topic_id, &lock);
        result
    }

    /// Drop the lock entry unless another caller is holding or waiting on it.
    fn release_lock(&self, topic_id: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one in the caller.
        if Arc::strong_count(lock) <= 2 {
            locks.remove(topic_id);
        }
    }

    /// Number of topics with a live lock entry.
    pub fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Run one learning iteration.
    ///
    /// # Errors
    ///
    /// [`LearningError::NotFound`] for an unknown id and
    /// [`LearningError::StateConflict`] when the status does not allow
    /// learning. Nothing is written in either case.
    pub async fn run_one_iteration(&self, topic_id: &str) -> Result<IterationResult> {
        let lock = self.topic_lock(topic_id);
        let _guard = lock.lock().await;

        let mut topic = load_topic(self.topics.as_ref(), topic_id).await?;
        if !topic.status.allows_learning() {
            return Err(LearningError::conflict(topic_id, topic.status, "learning"));
        }

        if topic.iteration_count >= self.config.max_iterations {
            topic.status = TopicStatus::Stagnated;
            topic.updated_at = chrono::Utc::now().timestamp();
            self.topics.save(&topic).await?;
            info!(topic_id, iterations = topic.iteration_count, "iteration cap reached");
            return Ok(IterationResult {
                topic_id: topic.id.clone(),
                title: topic.title.clone(),
                iteration: topic.iteration_count,
                score_before: topic.score,
                score_after: topic.score,
                score_after_raw: topic.score,
                delta: 0.0,
                new_chunks: 0,
                queries_used: 0,
                stagnated: true,
                status: topic.status,
                ready_for_generation: topic.score >= self.params.readiness_minimum,
                details: topic.details.clone(),
                capped: true,
            });
        }

        let iteration = topic.iteration_count + 1;

        // The floor is fixed before any ingestion starts.
        let prior = self.prune(topic.state.as_ref()).await;
        let before = self.compute(&topic.title, prior.as_ref()).await;

        let plan = self.plan_queries(&topic, &before.state.seen_coverage_flags);
        let outcomes = self.dispatch(plan).await;
        let new_chunks: usize = outcomes.iter().map(QueryOutcome::chunks_added).sum();

        let after = self.compute(&topic.title, Some(&before.state)).await;

        let score_before = before.score;
        let score_after_raw = after.score;
        let score_after = score_before.max(score_after_raw);
        let raw_delta = score_after - score_before;
        let delta = round_tenth(raw_delta);

        let stagnated = raw_delta < self.config.stagnation_threshold && iteration >= 2;
        let ready = score_after >= self.params.readiness_minimum;
        let status = if ready {
            TopicStatus::Ready
        } else if stagnated {
            TopicStatus::Stagnated
        } else {
            TopicStatus::Learning
        };

        let now = chrono::Utc::now().timestamp();
        let queries_used = outcomes.len();
        topic.learning_log.push(IterationLogEntry {
            iteration,
            queries: outcomes,
            new_chunks,
            score_before,
            score_after,
            score_after_raw,
            delta,
            stagnated,
            recorded_at: now,
        });
        topic.iteration_count = iteration;
        topic.last_delta = Some(delta);
        topic.score = score_after;
        topic.state = Some(after.state);
        topic.details = Some(after.details.clone());
        topic.status = status;
        topic.updated_at = now;
        self.topics.save(&topic).await?;

        info!(
            topic_id,
            iteration,
            score_before,
            score_after,
            delta,
            new_chunks,
            status = %status,
            "learning iteration finished"
        );

        Ok(IterationResult {
            topic_id: topic.id,
            title: topic.title,
            iteration,
            score_before,
            score_after,
            score_after_raw,
            delta,
            new_chunks,
            queries_used,
            stagnated,
            status,
            ready_for_generation: ready,
            details: Some(after.details),
            capped: false,
        })
    }

    /// Drop state references to chunks and documents that no longer exist.
    ///
    /// A failing existence check leaves the state as it was.
    async fn prune(&self, state: Option<&CumulativeState>) -> Option<CumulativeState> {
        let state = state?;
        if !self.config.prune_stale_state || !state.is_current() {
            return Some(state.clone());
        }

        let chunk_ids: Vec<String> = state.seen_chunk_ids.iter().cloned().collect();
        let doc_ids: Vec<String> = state.seen_doc_ids.iter().cloned().collect();
        let live = tokio::try_join!(
            self.corpus.chunks_exist(&chunk_ids),
            self.corpus.docs_exist(&doc_ids)
        );

        match live {
            Ok((live_chunks, live_docs)) => {
                let pruned = state.retain_existing(&live_chunks, &live_docs);
                let dropped = state.chunk_count() - pruned.chunk_count();
                if dropped > 0 {
                    debug!(dropped, "pruned stale chunk references");
                }
                Some(pruned)
            }
            Err(e) => {
                warn!(error = %e, "existence check failed, keeping state unpruned");
                Some(state.clone())
            }
        }
    }

    fn plan_queries(&self, topic: &TopicRecord, coverage: &CoverageFlags) -> Vec<PlannedQuery> {
        let base = topic.effective_queries();
        let mut plan = Vec::new();

        for ingestor in &self.ingestors {
            if ingestor.title_only() {
                plan.push(PlannedQuery {
                    ingestor: ingestor.clone(),
                    query: topic.title.clone(),
                    gap_fill: None,
                });
                continue;
            }
            for query in &base {
                plan.push(PlannedQuery {
                    ingestor: ingestor.clone(),
                    query: query.clone(),
                    gap_fill: None,
                });
            }
        }

        let per_dimension = self.config.gap_fill_queries_per_dimension;
        for dimension in coverage.missing() {
            for template in gap_fill_templates(dimension).iter().take(per_dimension) {
                let query = template.replace("{topic}", &topic.title);
                for ingestor in self.ingestors.iter().filter(|i| !i.title_only()) {
                    plan.push(PlannedQuery {
                        ingestor: ingestor.clone(),
                        query: query.clone(),
                        gap_fill: Some(dimension),
                    });
                }
            }
        }

        plan
    }

    /// Run every planned query concurrently.
    ///
    /// Each call is bounded by `query_timeout_secs` and the whole phase by
    /// `ingestion_timeout_secs`; unfinished calls are aborted and logged as
    /// timed out. Outcomes keep plan order.
    async fn dispatch(&self, plan: Vec<PlannedQuery>) -> Vec<QueryOutcome> {
        let per_call = Duration::from_secs(self.config.query_timeout_secs);
        let deadline = Instant::now() + Duration::from_secs(self.config.ingestion_timeout_secs);

        let tasks: Vec<_> = plan
            .into_iter()
            .map(|planned| {
                let ingestor = planned.ingestor.clone();
                let query = planned.query.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::timeout(per_call, ingestor.ingest_query(&query)).await
                });
                (planned, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (planned, mut handle) in tasks {
            let mut outcome = QueryOutcome {
                source: planned.ingestor.name().to_string(),
                query: planned.query,
                results: None,
                error: None,
                gap_fill: planned.gap_fill,
            };

            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(Ok(count)))) => outcome.results = Some(count),
                Ok(Ok(Ok(Err(e)))) => {
                    warn!(source = %outcome.source, query = %outcome.query, error = %e, "ingestion query failed");
                    outcome.error = Some(e.to_string());
                }
                Ok(Ok(Err(_))) => {
                    warn!(source = %outcome.source, query = %outcome.query, "ingestion query timed out");
                    outcome.error = Some(format!("timed out after {}s", per_call.as_secs()));
                }
                Ok(Err(join_err)) => {
                    outcome.error = Some(format!("ingestion task failed: {}", join_err));
                }
                Err(_) => {
                    handle.abort();
                    warn!(source = %outcome.source, query = %outcome.query, "ingestion phase timed out");
                    outcome.error = Some("timed out".to_string());
                }
            }
            outcomes.push(outcome);
        }

        outcomes
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_tenth() {
        assert_eq!(round_tenth(2.96), 3.0);
        assert_eq!(round_tenth(0.04), 0.0);
        assert_eq!(round_tenth(12.0), 12.0);
    }

    #[test]
    fn test_templates_mention_dimension() {
        assert!(gap_fill_templates(CoverageDimension::Safety)[0].contains("safety"));
        assert!(gap_fill_templates(CoverageDimension::Recovery)[0].contains("recovery"));
        for d in [
            CoverageDimension::Efficacy,
            CoverageDimension::Safety,
            CoverageDimension::Recovery,
        ] {
            for t in gap_fill_templates(d) {
                assert!(t.starts_with("{topic} "));
            }
        }
    }
}
