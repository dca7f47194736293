//! SQLite-backed stores.
//!
//! - [`SqliteCorpus`]: documents, chunks and vectors; implements
//!   [`CorpusStore`] with a brute-force cosine scan over `chunk_vectors`.
//! - [`SqliteCatalogue`]: the procedure catalogue; implements [`Catalogue`].
//! - [`SqliteTopicStore`]: topic records; implements [`TopicStore`]. The
//!   cumulative state, breakdown and learning log are stored as JSON.

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use topic_readiness_core::embedding::{blob_to_vec, vec_to_blob};
use topic_readiness_core::models::{CatalogueEntry, CorpusChunk};
use topic_readiness_core::similarity::cosine_similarity;
use topic_readiness_core::state::CumulativeState;
use topic_readiness_core::store::{any_entry_matches, Catalogue, CorpusStore};

use crate::models::{Chunk, Document, TopicRecord, TopicStatus};
use crate::topics::TopicStore;

/// SQLite caps bound parameters per statement; stay well below it.
const ID_BATCH: usize = 500;

// ============ Corpus ============

pub struct SqliteCorpus {
    pool: SqlitePool,
}

/// A chunk still waiting for a vector.
#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
}

/// Row counts shown by `trs stats`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusCounts {
    pub documents: i64,
    pub chunks: i64,
    pub vectors: i64,
}

impl SqliteCorpus {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a document with its chunks and (optionally) their vectors.
    ///
    /// Returns the number of chunks added, which is 0 when the document is
    /// already stored under the same `(source, source_id)` or the same
    /// `dedup_hash`. A missing hash never matches.
    pub async fn insert_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: Option<&[Vec<f32>]>,
        model: &str,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM documents WHERE (source = ? AND source_id = ?) OR dedup_hash = ?",
        )
        .bind(&doc.source)
        .bind(&doc.source_id)
        .bind(&doc.dedup_hash)
        .fetch_one(&mut *tx)
        .await?;
        if exists {
            return Ok(0);
        }

        sqlx::query(
            r#"
            INSERT INTO documents (id, source, source_id, title, url, journal, year, created_at, dedup_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.source)
        .bind(&doc.source_id)
        .bind(&doc.title)
        .bind(&doc.url)
        .bind(&doc.journal)
        .bind(doc.year)
        .bind(doc.created_at)
        .bind(&doc.dedup_hash)
        .execute(&mut *tx)
        .await?;

        let now = chrono::Utc::now().timestamp();
        for (i, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, text, hash, publication_year) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(chunk.publication_year)
            .execute(&mut *tx)
            .await?;

            if let Some(vec) = vectors.and_then(|v| v.get(i)) {
                sqlx::query(
                    r#"
                    INSERT INTO chunk_vectors (chunk_id, document_id, model, dims, embedding, created_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&chunk.id)
                .bind(&doc.id)
                .bind(model)
                .bind(vec.len() as i64)
                .bind(vec_to_blob(vec))
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(chunks.len())
    }

    pub async fn upsert_vector(
        &self,
        chunk_id: &str,
        document_id: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, document_id, model, dims, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            "#,
        )
        .bind(chunk_id)
        .bind(document_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Chunks with no vector, oldest document first.
    pub async fn pending_chunks(&self, limit: Option<usize>) -> Result<Vec<PendingChunk>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.text
            FROM chunks c
            LEFT JOIN chunk_vectors v ON v.chunk_id = c.id
            WHERE v.chunk_id IS NULL
            ORDER BY c.document_id, c.chunk_index
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PendingChunk {
                id: row.get("id"),
                document_id: row.get("document_id"),
                text: row.get("text"),
            })
            .collect())
    }

    /// Delete a document with its chunks and vectors. Returns true if it existed.
    pub async fn remove_document(&self, document_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed > 0)
    }

    /// Drop every stored vector. Returns the number removed.
    pub async fn clear_vectors(&self) -> Result<u64> {
        let removed = sqlx::query("DELETE FROM chunk_vectors")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed)
    }

    pub async fn counts(&self) -> Result<CorpusCounts> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(CorpusCounts {
            documents,
            chunks,
            vectors,
        })
    }

    async fn existing_ids(&self, table: &str, ids: &[String]) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        for batch in ids.chunks(ID_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!("SELECT id FROM {} WHERE id IN ({})", table, placeholders);
            let mut query = sqlx::query_scalar::<_, String>(&sql);
            for id in batch {
                query = query.bind(id);
            }
            found.extend(query.fetch_all(&self.pool).await?);
        }
        Ok(found)
    }
}

#[async_trait]
impl CorpusStore for SqliteCorpus {
    async fn nearest_chunks(&self, query_vec: &[f32], limit: usize) -> Result<Vec<CorpusChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT v.chunk_id, v.document_id, v.embedding, c.text, c.publication_year, d.title
            FROM chunk_vectors v
            JOIN chunks c ON c.id = v.chunk_id
            JOIN documents d ON d.id = v.document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, CorpusChunk)> = rows
            .iter()
            .map(|row| {
                let chunk = corpus_chunk_from_row(row);
                (cosine_similarity(query_vec, &chunk.embedding), chunk)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.chunk_id.cmp(&b.1.chunk_id))
        });
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, c)| c).collect())
    }

    async fn chunks_exist(&self, ids: &[String]) -> Result<HashSet<String>> {
        self.existing_ids("chunks", ids).await
    }

    async fn docs_exist(&self, ids: &[String]) -> Result<HashSet<String>> {
        self.existing_ids("documents", ids).await
    }
}

fn corpus_chunk_from_row(row: &SqliteRow) -> CorpusChunk {
    let blob: Vec<u8> = row.get("embedding");
    CorpusChunk {
        chunk_id: row.get("chunk_id"),
        document_id: row.get("document_id"),
        text: row.get("text"),
        embedding: blob_to_vec(&blob),
        publication_year_hint: row.get("publication_year"),
        doc_title: row.get("title"),
    }
}

// ============ Catalogue ============

pub struct SqliteCatalogue {
    pool: SqlitePool,
}

impl SqliteCatalogue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace an entry by name.
    pub async fn add(&self, entry: &CatalogueEntry) -> Result<()> {
        let tags_json = serde_json::to_string(&entry.tags)?;
        sqlx::query(
            r#"
            INSERT INTO catalogue_entries (name, tags_json) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET tags_json = excluded.tags_json
            "#,
        )
        .bind(&entry.name)
        .bind(&tags_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<CatalogueEntry>> {
        let rows = sqlx::query("SELECT name, tags_json FROM catalogue_entries ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let name: String = row.get("name");
                let tags_json: String = row.get("tags_json");
                let tags: Vec<String> = serde_json::from_str(&tags_json)
                    .with_context(|| format!("Corrupt tags for catalogue entry '{}'", name))?;
                Ok(CatalogueEntry::new(name, tags))
            })
            .collect()
    }
}

#[async_trait]
impl Catalogue for SqliteCatalogue {
    async fn matches(&self, topic: &str) -> Result<bool> {
        Ok(any_entry_matches(&self.list().await?, topic))
    }
}

// ============ Topics ============

pub struct SqliteTopicStore {
    pool: SqlitePool,
}

impl SqliteTopicStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const TOPIC_COLUMNS: &str = "id, title, status, search_queries_json, score, state_json, details_json, iteration_count, last_delta, learning_log_json, created_at, updated_at";

fn topic_from_row(row: &SqliteRow) -> Result<TopicRecord> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let queries: String = row.get("search_queries_json");
    let state_json: Option<String> = row.get("state_json");
    let details_json: Option<String> = row.get("details_json");
    let log_json: String = row.get("learning_log_json");
    let iteration_count: i64 = row.get("iteration_count");

    Ok(TopicRecord {
        title: row.get("title"),
        status: status.parse::<TopicStatus>()?,
        search_queries: serde_json::from_str(&queries)
            .with_context(|| format!("Corrupt search queries for topic {}", id))?,
        score: row.get("score"),
        // Unreadable or foreign state is treated as absent.
        state: state_json.as_deref().and_then(CumulativeState::from_json),
        details: details_json
            .as_deref()
            .and_then(|d| serde_json::from_str(d).ok()),
        iteration_count: iteration_count.max(0) as u32,
        last_delta: row.get("last_delta"),
        learning_log: serde_json::from_str(&log_json)
            .with_context(|| format!("Corrupt learning log for topic {}", id))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        id,
    })
}

#[async_trait]
impl TopicStore for SqliteTopicStore {
    async fn get(&self, id: &str) -> Result<Option<TopicRecord>> {
        let sql = format!("SELECT {} FROM topics WHERE id = ?", TOPIC_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(topic_from_row).transpose()
    }

    async fn save(&self, topic: &TopicRecord) -> Result<()> {
        let state_json = topic.state.as_ref().map(serde_json::to_string).transpose()?;
        let details_json = topic.details.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO topics (id, title, status, search_queries_json, score, state_json,
                                details_json, iteration_count, last_delta, learning_log_json,
                                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                status = excluded.status,
                search_queries_json = excluded.search_queries_json,
                score = excluded.score,
                state_json = excluded.state_json,
                details_json = excluded.details_json,
                iteration_count = excluded.iteration_count,
                last_delta = excluded.last_delta,
                learning_log_json = excluded.learning_log_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&topic.id)
        .bind(&topic.title)
        .bind(topic.status.as_str())
        .bind(serde_json::to_string(&topic.search_queries)?)
        .bind(topic.score)
        .bind(state_json)
        .bind(details_json)
        .bind(i64::from(topic.iteration_count))
        .bind(topic.last_delta)
        .bind(serde_json::to_string(&topic.learning_log)?)
        .bind(topic.created_at)
        .bind(topic.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, status: Option<TopicStatus>) -> Result<Vec<TopicRecord>> {
        let rows = match status {
            Some(s) => {
                let sql = format!(
                    "SELECT {} FROM topics WHERE status = ? ORDER BY created_at DESC, id",
                    TOPIC_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(s.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM topics ORDER BY created_at DESC, id",
                    TOPIC_COLUMNS
                );
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        rows.iter().map(topic_from_row).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM topics WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }
}
