//! Errors surfaced by the learning controller and topic actions.
//!
//! Only two conditions abort an operation on purpose: the topic does not
//! exist, or its status forbids the requested transition. Everything
//! upstream (embedding, corpus, connectors) degrades instead of failing.
//! [`LearningError::Storage`] covers the topic store itself breaking.

use thiserror::Error;

use crate::models::TopicStatus;

#[derive(Debug, Error)]
pub enum LearningError {
    /// The referenced topic does not exist.
    #[error("Topic not found: {topic_id}")]
    NotFound { topic_id: String },

    /// The topic's status does not allow the requested action.
    #[error("Topic {topic_id} has status '{status}', which does not allow {action}")]
    StateConflict {
        topic_id: String,
        status: TopicStatus,
        action: &'static str,
    },

    /// Reading or writing the topic record failed.
    #[error("Topic store error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl LearningError {
    pub fn not_found(topic_id: &str) -> Self {
        LearningError::NotFound {
            topic_id: topic_id.to_string(),
        }
    }

    pub fn conflict(topic_id: &str, status: TopicStatus, action: &'static str) -> Self {
        LearningError::StateConflict {
            topic_id: topic_id.to_string(),
            status,
            action,
        }
    }
}

pub type Result<T> = std::result::Result<T, LearningError>;
