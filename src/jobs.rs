//! Batch learning jobs.
//!
//! A job runs [`run_until_terminal`] over several topics at once and is
//! tracked by a UUID. Job records live in the registry that created them;
//! nothing here is global.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::driver::run_until_terminal;
use crate::learning::LearningController;
use crate::models::TopicStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
}

/// How one topic of a job ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_status: Option<TopicStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
    pub iterations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub topic_ids: Vec<String>,
    pub results: BTreeMap<String, TopicOutcome>,
    pub ok: usize,
    pub failed: usize,
    pub created_at: i64,
    #[serde(default)]
    pub finished_at: Option<i64>,
    /// Creation order within the registry.
    #[serde(default)]
    pub sequence: u64,
}

type JobMap = Arc<Mutex<HashMap<String, JobRecord>>>;

/// Finished jobs kept for polling by default.
pub const DEFAULT_RETAIN_FINISHED: usize = 64;

pub struct JobRegistry {
    controller: Arc<LearningController>,
    jobs: JobMap,
    retain_finished: usize,
    next_sequence: AtomicU64,
}

impl JobRegistry {
    pub fn new(controller: Arc<LearningController>) -> Self {
        Self {
            controller,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            retain_finished: DEFAULT_RETAIN_FINISHED,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Keep at most `n` finished jobs; older ones are evicted when a new
    /// job starts.
    pub fn with_retention(mut self, n: usize) -> Self {
        self.retain_finished = n;
        self
    }

    fn create(&self, topic_ids: &[String]) -> String {
        let job_id = uuid::Uuid::new_v4().to_string();
        let record = JobRecord {
            job_id: job_id.clone(),
            status: JobStatus::Pending,
            topic_ids: topic_ids.to_vec(),
            results: BTreeMap::new(),
            ok: 0,
            failed: 0,
            created_at: chrono::Utc::now().timestamp(),
            finished_at: None,
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        };
        let mut jobs = lock(&self.jobs);
        evict_finished(&mut jobs, self.retain_finished);
        jobs.insert(job_id.clone(), record);
        job_id
    }

    /// Start a job in the background and return its id.
    pub fn submit(&self, topic_ids: Vec<String>) -> String {
        let job_id = self.create(&topic_ids);
        let controller = self.controller.clone();
        let jobs = self.jobs.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            execute(controller, jobs, id, topic_ids).await;
        });
        job_id
    }

    /// Run a job to completion and return its final record.
    pub async fn run(&self, topic_ids: Vec<String>) -> Option<JobRecord> {
        let job_id = self.create(&topic_ids);
        execute(self.controller.clone(), self.jobs.clone(), job_id.clone(), topic_ids).await;
        self.get(&job_id)
    }

    /// Snapshot of a job, if the id is known.
    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        lock(&self.jobs).get(job_id).cloned()
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = lock(&self.jobs).values().cloned().collect();
        jobs.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        jobs
    }
}

fn evict_finished(jobs: &mut HashMap<String, JobRecord>, keep: usize) {
    let mut finished: Vec<(u64, String)> = jobs
        .values()
        .filter(|j| j.finished_at.is_some())
        .map(|j| (j.sequence, j.job_id.clone()))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort();
    let excess = finished.len() - keep;
    for (_, job_id) in finished.into_iter().take(excess) {
        jobs.remove(&job_id);
    }
}

fn lock(jobs: &JobMap) -> std::sync::MutexGuard<'_, HashMap<String, JobRecord>> {
    jobs.lock().unwrap_or_else(|e| e.into_inner())
}

async fn execute(
    controller: Arc<LearningController>,
    jobs: JobMap,
    job_id: String,
    topic_ids: Vec<String>,
) {
    if let Some(job) = lock(&jobs).get_mut(&job_id) {
        job.status = JobStatus::Running;
    }
    info!(job_id = %job_id, topics = topic_ids.len(), "batch learning started");

    let handles: Vec<_> = topic_ids
        .into_iter()
        .map(|topic_id| {
            let controller = controller.clone();
            let handle = tokio::spawn({
                let topic_id = topic_id.clone();
                async move { run_until_terminal(&controller, &topic_id).await }
            });
            (topic_id, handle)
        })
        .collect();

    for (topic_id, handle) in handles {
        let outcome = match handle.await {
            Ok(Ok(summary)) => TopicOutcome {
                final_status: Some(summary.final_status),
                final_score: Some(summary.final_score),
                iterations: summary.iterations.len(),
                error: None,
            },
            Ok(Err(e)) => {
                warn!(job_id = %job_id, topic_id = %topic_id, error = %e, "topic learning failed");
                TopicOutcome {
                    final_status: None,
                    final_score: None,
                    iterations: 0,
                    error: Some(e.to_string()),
                }
            }
            Err(join_err) => TopicOutcome {
                final_status: None,
                final_score: None,
                iterations: 0,
                error: Some(format!("learning task failed: {}", join_err)),
            },
        };

        if let Some(job) = lock(&jobs).get_mut(&job_id) {
            if outcome.error.is_some() {
                job.failed += 1;
            } else {
                job.ok += 1;
            }
            job.results.insert(topic_id, outcome);
        }
    }

    if let Some(job) = lock(&jobs).get_mut(&job_id) {
        job.status = JobStatus::Completed;
        job.finished_at = Some(chrono::Utc::now().timestamp());
        info!(job_id = %job_id, ok = job.ok, failed = job.failed, "batch learning finished");
    }
}
