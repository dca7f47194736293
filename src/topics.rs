//! Topic persistence and lifecycle actions.
//!
//! [`TopicStore`] is the seam between the learning controller and whatever
//! holds topic records. [`MemoryTopicStore`] backs tests and embedded use;
//! the SQLite implementation lives in [`crate::sqlite_store`].
//!
//! Topics are created here. Every later transition goes through
//! [`LearningController`](crate::learning::LearningController), which holds
//! the per-topic lock around the helpers below.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::LearningError;
use crate::models::{TopicRecord, TopicStatus};

/// Storage for topic records.
#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<TopicRecord>>;
    /// Insert or replace the record with `topic.id`.
    async fn save(&self, topic: &TopicRecord) -> Result<()>;
    /// All topics, newest first, optionally filtered by status.
    async fn list(&self, status: Option<TopicStatus>) -> Result<Vec<TopicRecord>>;
    /// Returns true if a record was removed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// In-memory topic store.
#[derive(Default)]
pub struct MemoryTopicStore {
    topics: RwLock<HashMap<String, TopicRecord>>,
}

impl MemoryTopicStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TopicStore for MemoryTopicStore {
    async fn get(&self, id: &str) -> Result<Option<TopicRecord>> {
        let topics = self.topics.read().unwrap_or_else(|e| e.into_inner());
        Ok(topics.get(id).cloned())
    }

    async fn save(&self, topic: &TopicRecord) -> Result<()> {
        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        topics.insert(topic.id.clone(), topic.clone());
        Ok(())
    }

    async fn list(&self, status: Option<TopicStatus>) -> Result<Vec<TopicRecord>> {
        let topics = self.topics.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<TopicRecord> = topics
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        Ok(topics.remove(id).is_some())
    }
}

/// Load a topic or fail with [`LearningError::NotFound`].
pub async fn load_topic(
    store: &dyn TopicStore,
    topic_id: &str,
) -> crate::error::Result<TopicRecord> {
    store
        .get(topic_id)
        .await?
        .ok_or_else(|| LearningError::not_found(topic_id))
}

/// Propose a new topic.
pub async fn create_topic(
    store: &dyn TopicStore,
    title: &str,
    search_queries: Vec<String>,
) -> Result<TopicRecord> {
    if title.trim().is_empty() {
        anyhow::bail!("Topic title must not be empty");
    }
    let topic = TopicRecord::new(title, search_queries);
    store.save(&topic).await?;
    Ok(topic)
}

async fn transition(
    store: &dyn TopicStore,
    topic_id: &str,
    to: TopicStatus,
) -> crate::error::Result<TopicRecord> {
    let mut topic = load_topic(store, topic_id).await?;
    topic.status = to;
    topic.updated_at = chrono::Utc::now().timestamp();
    store.save(&topic).await?;
    Ok(topic)
}

/// Reject a topic. Any status may be rejected.
pub(crate) async fn reject_topic(
    store: &dyn TopicStore,
    topic_id: &str,
) -> crate::error::Result<TopicRecord> {
    transition(store, topic_id, TopicStatus::Rejected).await
}

/// Send a topic back to the proposal queue.
pub(crate) async fn defer_topic(
    store: &dyn TopicStore,
    topic_id: &str,
) -> crate::error::Result<TopicRecord> {
    transition(store, topic_id, TopicStatus::Proposed).await
}

/// Replace the base query list.
pub(crate) async fn update_queries(
    store: &dyn TopicStore,
    topic_id: &str,
    queries: Vec<String>,
) -> crate::error::Result<TopicRecord> {
    let mut topic = load_topic(store, topic_id).await?;
    topic.search_queries = queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    topic.updated_at = chrono::Utc::now().timestamp();
    store.save(&topic).await?;
    Ok(topic)
}

/// Reset the learning run and mark the topic as learning.
///
/// Allowed from approved, learning, ready and stagnated. The cumulative
/// state survives, so the score picks up where it left off.
pub(crate) async fn reset_for_learning(
    store: &dyn TopicStore,
    topic_id: &str,
) -> crate::error::Result<TopicRecord> {
    let mut topic = load_topic(store, topic_id).await?;
    if !topic.status.allows_learning() {
        return Err(LearningError::conflict(topic_id, topic.status, "learning"));
    }
    topic.reset_run();
    topic.status = TopicStatus::Learning;
    topic.updated_at = chrono::Utc::now().timestamp();
    store.save(&topic).await?;
    Ok(topic)
}

pub(crate) async fn delete_topic(
    store: &dyn TopicStore,
    topic_id: &str,
) -> crate::error::Result<()> {
    if store.delete(topic_id).await? {
        Ok(())
    } else {
        Err(LearningError::not_found(topic_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_list() {
        let store = MemoryTopicStore::new();
        let t = create_topic(&store, "Polynucleotides", vec![]).await.unwrap();
        assert_eq!(t.status, TopicStatus::Proposed);
        assert_eq!(store.list(None).await.unwrap().len(), 1);
        assert!(store
            .list(Some(TopicStatus::Ready))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_blank_title() {
        let store = MemoryTopicStore::new();
        assert!(create_topic(&store, "  ", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_requires_learnable_status() {
        let store = MemoryTopicStore::new();
        let t = create_topic(&store, "Exosomes", vec![]).await.unwrap();
        let err = reset_for_learning(&store, &t.id).await.unwrap_err();
        assert!(matches!(err, LearningError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_reset_clears_run_keeps_state() {
        let store = MemoryTopicStore::new();
        let mut t = TopicRecord::new("Exosomes", vec![]);
        t.status = TopicStatus::Stagnated;
        t.iteration_count = 3;
        t.last_delta = Some(0.0);
        t.state = Some(Default::default());
        store.save(&t).await.unwrap();

        let reset = reset_for_learning(&store, &t.id).await.unwrap();
        assert_eq!(reset.status, TopicStatus::Learning);
        assert_eq!(reset.iteration_count, 0);
        assert!(reset.last_delta.is_none());
        assert!(reset.state.is_some());
    }

    #[tokio::test]
    async fn test_missing_topic_is_not_found() {
        let store = MemoryTopicStore::new();
        assert!(matches!(
            reject_topic(&store, "nope").await.unwrap_err(),
            LearningError::NotFound { .. }
        ));
        assert!(matches!(
            delete_topic(&store, "nope").await.unwrap_err(),
            LearningError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_queries_trims() {
        let store = MemoryTopicStore::new();
        let t = create_topic(&store, "Exosomes", vec![]).await.unwrap();
        let t = update_queries(&store, &t.id, vec![" a ".into(), "".into()])
            .await
            .unwrap();
        assert_eq!(t.search_queries, vec!["a".to_string()]);
    }
}
