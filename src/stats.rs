//! Corpus and topic overview for `trs stats`.
//!
//! Shows how much literature is stored, how much of it has vectors, where it
//! came from, and how many topics sit in each lifecycle status.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate::migrate_pool;

/// Per-source document, chunk and vector counts.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStats {
    pub source: String,
    pub doc_count: i64,
    pub chunk_count: i64,
    pub embedded_count: i64,
    pub last_ingest_ts: Option<i64>,
}

pub async fn source_stats(pool: &SqlitePool) -> Result<Vec<SourceStats>> {
    let rows = sqlx::query(
        r#"
        SELECT
            d.source,
            COUNT(DISTINCT d.id) AS doc_count,
            COUNT(DISTINCT c.id) AS chunk_count,
            COUNT(DISTINCT cv.chunk_id) AS embedded_count,
            MAX(d.created_at) AS last_ingest
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id
        LEFT JOIN chunk_vectors cv ON cv.chunk_id = c.id
        GROUP BY d.source
        ORDER BY doc_count DESC, d.source
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            doc_count: row.get("doc_count"),
            chunk_count: row.get("chunk_count"),
            embedded_count: row.get("embedded_count"),
            last_ingest_ts: row.get("last_ingest"),
        })
        .collect())
}

/// `(status, count)` pairs for every status with at least one topic.
pub async fn topic_status_counts(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM topics GROUP BY status ORDER BY status")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("status"), row.get("n")))
        .collect())
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;

    let corpus = crate::sqlite_store::SqliteCorpus::new(pool.clone());
    let counts = corpus.counts().await?;
    let catalogue_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalogue_entries")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Topic Readiness Stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", counts.documents);
    println!("  Chunks:      {}", counts.chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        counts.vectors,
        counts.chunks,
        if counts.chunks > 0 {
            (counts.vectors * 100) / counts.chunks
        } else {
            0
        }
    );
    println!("  Catalogue:   {} entries", catalogue_entries);

    let sources = source_stats(&pool).await?;
    if !sources.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<20} {:>6} {:>8} {:>10}   {}",
            "SOURCE", "DOCS", "CHUNKS", "EMBEDDED", "LAST INGEST"
        );
        println!("  {}", "-".repeat(70));
        for s in &sources {
            let when = s
                .last_ingest_ts
                .map(format_ts_relative)
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {:<20} {:>6} {:>8} {:>10}   {}",
                s.source, s.doc_count, s.chunk_count, s.embedded_count, when
            );
        }
    }

    let topics = topic_status_counts(&pool).await?;
    if !topics.is_empty() {
        println!();
        println!("  Topics:");
        for (status, n) in &topics {
            println!("  {:<20} {:>6}", status, n);
        }
    }
    println!();

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "3 hours ago" for recent timestamps, a date otherwise.
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
