//! Ingestion pipeline.
//!
//! source search → chunk → embed (inline, non-fatal) → store.
//!
//! [`SourceIngestor`] wraps one [`LiteratureSource`] as an [`Ingestor`] for
//! the learning loop. [`run_ingest`] is the `trs ingest` command.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use topic_readiness_core::embedding::EmbeddingProvider;

use crate::chunk::{chunk_record, dedup_hash, document_id};
use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::migrate::migrate_pool;
use crate::models::{Document, LiteratureRecord};
use crate::sqlite_store::SqliteCorpus;
use crate::traits::{Ingestor, LiteratureSource, SourceRegistry};

/// What one ingestion pass wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub records: usize,
    pub documents_added: usize,
    pub chunks_added: usize,
    pub embeddings_written: usize,
    pub embeddings_pending: usize,
}

/// Chunk, embed and store `records`.
///
/// Records already in the corpus add nothing. An embedding failure leaves
/// that document's chunks without vectors for `trs embed pending`.
pub async fn store_records(
    corpus: &SqliteCorpus,
    embedder: &dyn EmbeddingProvider,
    records: &[LiteratureRecord],
    max_tokens: usize,
) -> Result<IngestStats> {
    let mut stats = IngestStats {
        records: records.len(),
        ..Default::default()
    };
    let now = chrono::Utc::now().timestamp();

    for record in records {
        let doc = Document {
            id: document_id(record),
            source: record.source.clone(),
            source_id: record.source_id.clone(),
            title: record.title.clone(),
            url: record.url.clone(),
            journal: record.journal.clone(),
            year: record.year,
            created_at: now,
            dedup_hash: dedup_hash(record),
        };
        let chunks = chunk_record(record, max_tokens);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let vectors = match embedder.embed_batch(&texts).await {
            Ok(v) if v.len() == texts.len() => Some(v),
            Ok(v) => {
                warn!(doc = %doc.id, got = v.len(), want = texts.len(), "embedding count mismatch");
                None
            }
            Err(e) => {
                debug!(doc = %doc.id, error = %e, "inline embedding skipped");
                None
            }
        };

        let added = corpus
            .insert_document(&doc, &chunks, vectors.as_deref(), embedder.model_name())
            .await?;
        if added > 0 {
            stats.documents_added += 1;
            stats.chunks_added += added;
            if vectors.is_some() {
                stats.embeddings_written += added;
            } else {
                stats.embeddings_pending += added;
            }
        }
    }

    Ok(stats)
}

/// A literature source bound to the corpus it feeds.
pub struct SourceIngestor {
    source: Arc<dyn LiteratureSource>,
    corpus: Arc<SqliteCorpus>,
    embedder: Arc<dyn EmbeddingProvider>,
    max_tokens: usize,
}

impl SourceIngestor {
    pub fn new(
        source: Arc<dyn LiteratureSource>,
        corpus: Arc<SqliteCorpus>,
        embedder: Arc<dyn EmbeddingProvider>,
        max_tokens: usize,
    ) -> Self {
        Self {
            source,
            corpus,
            embedder,
            max_tokens,
        }
    }
}

#[async_trait]
impl Ingestor for SourceIngestor {
    fn name(&self) -> &str {
        self.source.name()
    }

    fn title_only(&self) -> bool {
        self.source.title_only()
    }

    async fn ingest_query(&self, query: &str) -> Result<usize> {
        let records = self.source.search(query).await?;
        let stats = store_records(
            &self.corpus,
            self.embedder.as_ref(),
            &records,
            self.max_tokens,
        )
        .await?;
        debug!(
            source = self.source.name(),
            query,
            records = stats.records,
            chunks = stats.chunks_added,
            "query ingested"
        );
        Ok(stats.chunks_added)
    }
}

/// One [`SourceIngestor`] per configured source.
pub fn ingestors_for(
    registry: &SourceRegistry,
    corpus: Arc<SqliteCorpus>,
    embedder: Arc<dyn EmbeddingProvider>,
    max_tokens: usize,
) -> Vec<Arc<dyn Ingestor>> {
    registry
        .sources()
        .iter()
        .map(|source| {
            Arc::new(SourceIngestor::new(
                source.clone(),
                corpus.clone(),
                embedder.clone(),
                max_tokens,
            )) as Arc<dyn Ingestor>
        })
        .collect()
}

/// `trs ingest <query> [--source name]`. Without a source name every
/// configured source is searched.
pub async fn run_ingest(
    config: &Config,
    source_name: Option<&str>,
    query: &str,
    dry_run: bool,
) -> Result<()> {
    let registry = SourceRegistry::from_config(config)?;
    let sources: Vec<Arc<dyn LiteratureSource>> = match source_name {
        Some(name) => vec![registry.find(name).ok_or_else(|| {
            let available: Vec<&str> = registry.sources().iter().map(|s| s.name()).collect();
            anyhow!(
                "Unknown or disabled source: '{}'. Available: {}",
                name,
                if available.is_empty() {
                    "(none configured)".to_string()
                } else {
                    available.join(", ")
                }
            )
        })?],
        None => registry.sources().to_vec(),
    };
    if sources.is_empty() {
        bail!("No literature sources configured. Add [connectors.pubmed] or [connectors.semantic_scholar] to the config.");
    }

    if dry_run {
        for source in &sources {
            let records = source.search(query).await?;
            let total_chunks: usize = records
                .iter()
                .map(|r| chunk_record(r, config.chunking.max_tokens).len())
                .sum();
            println!("ingest {} (dry-run)", source.name());
            println!("  records found: {}", records.len());
            println!("  estimated chunks: {}", total_chunks);
        }
        return Ok(());
    }

    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    let corpus = SqliteCorpus::new(pool.clone());
    let embedder = create_provider(&config.embedding)?;

    for source in &sources {
        let records = match source.search(query).await {
            Ok(records) => records,
            Err(e) => {
                warn!(source = source.name(), query, error = %e, "search failed");
                println!("ingest {}", source.name());
                println!("  error: {}", e);
                continue;
            }
        };
        let stats = store_records(
            &corpus,
            embedder.as_ref(),
            &records,
            config.chunking.max_tokens,
        )
        .await?;

        info!(source = source.name(), query, chunks = stats.chunks_added, "ingest finished");
        println!("ingest {}", source.name());
        println!("  fetched: {} records", stats.records);
        println!("  new documents: {}", stats.documents_added);
        println!("  chunks written: {}", stats.chunks_added);
        if config.embedding.is_enabled() {
            println!("  embeddings written: {}", stats.embeddings_written);
            println!("  embeddings pending: {}", stats.embeddings_pending);
        }
    }
    println!("ok");

    pool.close().await;
    Ok(())
}
