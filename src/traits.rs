//! Extension traits for literature sources and ingestors.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             SourceRegistry               │
//! │  ┌─────────┐ ┌──────────────────┐        │
//! │  │ PubMed  │ │ Semantic Scholar │  ...   │
//! │  └─────────┘ └──────────────────┘        │
//! └──────────────┬───────────────────────────┘
//!                ▼  LiteratureSource::search
//!       SourceIngestor (chunk → embed → store)
//!                ▼  Ingestor::ingest_query
//!          LearningController iterations
//! ```
//!
//! A [`LiteratureSource`] only fetches records. An [`Ingestor`] turns a
//! query into stored chunks and reports how many it added. The learning
//! controller only ever talks to [`Ingestor`]s, so tests can script them.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::models::LiteratureRecord;

// ═══════════════════════════════════════════════════════════════════════
// LiteratureSource Trait
// ═══════════════════════════════════════════════════════════════════════

/// A search API that returns publication records.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use topic_readiness::models::LiteratureRecord;
/// use topic_readiness::traits::LiteratureSource;
///
/// pub struct FixedSource;
///
/// #[async_trait]
/// impl LiteratureSource for FixedSource {
///     fn name(&self) -> &str { "fixed" }
///     fn description(&self) -> &str { "Returns nothing" }
///
///     async fn search(&self, _query: &str) -> Result<Vec<LiteratureRecord>> {
///         Ok(vec![])
///     }
/// }
/// ```
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Source label stored on every document (e.g. `"pubmed"`).
    fn name(&self) -> &str;

    /// One-line description, shown by `trs sources`.
    fn description(&self) -> &str;

    /// When true, the learning loop sends this source the topic title only,
    /// never the expanded base queries.
    fn title_only(&self) -> bool {
        false
    }

    /// Run one query. The source applies its own result limit.
    async fn search(&self, query: &str) -> Result<Vec<LiteratureRecord>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Ingestor Trait
// ═══════════════════════════════════════════════════════════════════════

/// Runs a query against a source and stores what comes back.
#[async_trait]
pub trait Ingestor: Send + Sync {
    fn name(&self) -> &str;

    fn title_only(&self) -> bool {
        false
    }

    /// Fetch, chunk, embed and store. Returns the number of new chunks.
    async fn ingest_query(&self, query: &str) -> Result<usize>;
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// The configured literature sources.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn LiteratureSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Build from `[connectors.*]`, skipping disabled sections.
    pub fn from_config(config: &Config) -> Result<Self> {
        use crate::connector_pubmed::PubMedSource;
        use crate::connector_semantic_scholar::SemanticScholarSource;

        let mut registry = Self::new();

        if let Some(cfg) = config.connectors.pubmed.as_ref().filter(|c| c.enabled) {
            registry.register(Arc::new(PubMedSource::new(cfg.clone())?));
        }
        if let Some(cfg) = config
            .connectors
            .semantic_scholar
            .as_ref()
            .filter(|c| c.enabled)
        {
            registry.register(Arc::new(SemanticScholarSource::new(cfg.clone())?));
        }

        Ok(registry)
    }

    pub fn register(&mut self, source: Arc<dyn LiteratureSource>) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[Arc<dyn LiteratureSource>] {
        &self.sources
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn LiteratureSource>> {
        self.sources.iter().find(|s| s.name() == name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl LiteratureSource for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test"
        }
        async fn search(&self, _query: &str) -> Result<Vec<LiteratureRecord>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_register_and_find() {
        let mut registry = SourceRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(Named("a")));
        registry.register(Arc::new(Named("b")));
        assert_eq!(registry.len(), 2);
        assert!(registry.find("b").is_some());
        assert!(registry.find("c").is_none());
        assert!(!registry.sources()[0].title_only());
    }

    #[test]
    fn test_from_config_skips_disabled() {
        let mut config = Config::minimal("x.sqlite");
        let registry = SourceRegistry::from_config(&config).unwrap();
        assert!(registry.is_empty());

        config.connectors = toml::from_str(
            "[pubmed]\nenabled = false\n[semantic_scholar]\napi_key = \"k\"\n",
        )
        .unwrap();
        let registry = SourceRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.sources()[0].name(), "semantic_scholar");
        assert!(registry.sources()[0].title_only());
    }
}
