//! `trs embed pending` / `trs embed rebuild`.
//!
//! Backfills vectors for chunks stored while the provider was disabled or
//! failing, so they become visible to readiness scoring.

use anyhow::{bail, Result};
use tracing::warn;

use topic_readiness_core::embedding::EmbeddingProvider;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::migrate::migrate_pool;
use crate::sqlite_store::SqliteCorpus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedStats {
    pub total: usize,
    pub embedded: usize,
    pub failed: usize,
}

/// Embed every pending chunk in batches. A failed batch is counted and
/// skipped; the next run retries it.
pub async fn embed_pending(
    corpus: &SqliteCorpus,
    provider: &dyn EmbeddingProvider,
    limit: Option<usize>,
    batch_size: usize,
) -> Result<EmbedStats> {
    let pending = corpus.pending_chunks(limit).await?;
    let mut stats = EmbedStats {
        total: pending.len(),
        ..Default::default()
    };

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();

        match provider.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                for (item, vec) in batch.iter().zip(vectors.iter()) {
                    corpus
                        .upsert_vector(&item.id, &item.document_id, vec, provider.model_name())
                        .await?;
                    stats.embedded += 1;
                }
            }
            Ok(vectors) => {
                warn!(got = vectors.len(), want = batch.len(), "embedding batch size mismatch");
                stats.failed += batch.len();
            }
            Err(e) => {
                warn!(error = %e, "embedding batch failed");
                stats.failed += batch.len();
            }
        }
    }

    Ok(stats)
}

pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    let corpus = SqliteCorpus::new(pool.clone());
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    if dry_run {
        let pending = corpus.pending_chunks(limit).await?;
        println!("embed pending (dry-run)");
        println!("  chunks needing embeddings: {}", pending.len());
        pool.close().await;
        return Ok(());
    }

    let stats = embed_pending(&corpus, provider.as_ref(), limit, batch_size).await?;

    println!("embed pending");
    if stats.total == 0 {
        println!("  all chunks up to date");
    } else {
        println!("  total pending: {}", stats.total);
        println!("  embedded: {}", stats.embedded);
        println!("  failed: {}", stats.failed);
    }

    pool.close().await;
    Ok(())
}

/// Delete all vectors and regenerate them with the current provider.
pub async fn run_embed_rebuild(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    let corpus = SqliteCorpus::new(pool.clone());
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let cleared = corpus.clear_vectors().await?;
    let stats = embed_pending(&corpus, provider.as_ref(), None, batch_size).await?;

    println!("embed rebuild");
    println!("  cleared: {}", cleared);
    println!("  embedded: {}", stats.embedded);
    println!("  failed: {}", stats.failed);

    pool.close().await;
    Ok(())
}
