//! Full-learning driver.
//!
//! Calls [`LearningController::run_one_iteration`] until the topic is
//! `ready` or `stagnated`, an iteration errors, or the iteration cap is hit.
//! Iteration count is the only bound; there is no wall-clock deadline here.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::learning::{IterationResult, LearningController};
use crate::models::TopicStatus;

/// Outcome of [`run_until_terminal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSummary {
    pub topic_id: String,
    pub iterations: Vec<IterationResult>,
    pub final_status: TopicStatus,
    pub final_score: f64,
}

/// Iterate a topic to a terminal status.
///
/// An error from the first iteration (unknown topic, wrong status) is
/// returned as is. A topic still `learning` once the cap is spent is closed
/// out as `stagnated` by one final capped call that runs no queries.
pub async fn run_until_terminal(
    controller: &LearningController,
    topic_id: &str,
) -> Result<LearningSummary> {
    let cap = controller.config().max_iterations;
    let mut iterations: Vec<IterationResult> = Vec::new();

    for _ in 0..cap {
        let result = controller.run_one_iteration(topic_id).await?;
        let done = result.status.is_terminal();
        iterations.push(result);
        if done {
            break;
        }
    }

    if iterations.last().is_some_and(|r| !r.status.is_terminal()) {
        let closing = controller.run_one_iteration(topic_id).await?;
        iterations.push(closing);
    }

    let (final_status, final_score) = iterations
        .last()
        .map(|r| (r.status, r.score_after))
        .unwrap_or((TopicStatus::Learning, 0.0));

    info!(
        topic_id,
        iterations = iterations.len(),
        final_status = %final_status,
        final_score,
        "learning run finished"
    );

    Ok(LearningSummary {
        topic_id: topic_id.to_string(),
        iterations,
        final_status,
        final_score,
    })
}

/// Manual trigger: reset the learning run, then iterate to a terminal status.
pub async fn trigger_learning(
    controller: &LearningController,
    topic_id: &str,
) -> Result<LearningSummary> {
    controller.reset_for_learning(topic_id).await?;
    run_until_terminal(controller, topic_id).await
}
