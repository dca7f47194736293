//! Wiring for the command-line commands that touch topics.
//!
//! [`App::open`] connects to the database, runs migrations, builds the
//! embedding provider and source registry from config, and assembles a
//! [`LearningController`] over the SQLite stores.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use topic_readiness_core::embedding::EmbeddingProvider;

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::ingest::ingestors_for;
use crate::learning::LearningController;
use crate::migrate::migrate_pool;
use crate::sqlite_store::{SqliteCatalogue, SqliteCorpus, SqliteTopicStore};
use crate::topics::TopicStore;
use crate::traits::SourceRegistry;

pub struct App {
    pub pool: SqlitePool,
    pub catalogue: Arc<SqliteCatalogue>,
    pub controller: Arc<LearningController>,
}

impl App {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate_pool(&pool).await?;

        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let corpus = Arc::new(SqliteCorpus::new(pool.clone()));
        let catalogue = Arc::new(SqliteCatalogue::new(pool.clone()));
        let topics: Arc<dyn TopicStore> = Arc::new(SqliteTopicStore::new(pool.clone()));

        let registry = SourceRegistry::from_config(config)?;
        let ingestors = ingestors_for(
            &registry,
            corpus.clone(),
            embedder.clone(),
            config.chunking.max_tokens,
        );

        let controller = LearningController::new(topics, embedder, corpus, catalogue.clone())
            .with_ingestors(ingestors)
            .with_params(config.readiness.params())
            .with_config(config.learning.clone());

        Ok(Self {
            pool,
            catalogue,
            controller: Arc::new(controller),
        })
    }

    pub fn topics(&self) -> &dyn TopicStore {
        self.controller.topics().as_ref()
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
