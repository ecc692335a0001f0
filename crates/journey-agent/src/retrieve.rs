//! Vector retrieval over the ingested documentation.
//!
//! Embeds the query with the configured provider, scores every stored
//! chunk vector by cosine similarity, and returns the top-k passages with
//! their source documents. The formatted context joins the passage texts
//! with `\n\n---\n\n`, ready to hand to a chat model.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::embedding;

/// One scored chunk returned from retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedPassage {
    pub document_id: String,
    /// Relative path of the source document.
    pub source: String,
    pub title: Option<String>,
    pub chunk_index: i64,
    pub text: String,
    /// Cosine similarity against the query, in `[-1.0, 1.0]`.
    pub score: f64,
}

/// Retrieval output: formatted context plus the passages behind it.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedContext {
    pub context: String,
    pub passages: Vec<RetrievedPassage>,
}

/// Retrieve the top-k most similar passages for a free-text query.
pub async fn retrieve_context(config: &Config, query: &str) -> Result<RetrievedContext> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    if !config.embedding.is_enabled() {
        bail!("retrieval requires an embedding provider; set [embedding] in config");
    }

    let query_vec = embedding::embed_query(&config.embedding, query).await?;

    let pool = db::connect(config).await?;
    let rows = sqlx::query(
        r#"
        SELECT e.vector, c.chunk_index, c.text, d.id AS document_id, d.source, d.title
        FROM embeddings e
        JOIN chunks c ON c.id = e.chunk_id
        JOIN documents d ON d.id = e.document_id
        "#,
    )
    .fetch_all(&pool)
    .await?;
    pool.close().await;

    let mut passages: Vec<RetrievedPassage> = rows
        .into_iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("vector");
            let vector = embedding::blob_to_vec(&blob);
            RetrievedPassage {
                document_id: row.get("document_id"),
                source: row.get("source"),
                title: row.get("title"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                score: f64::from(embedding::cosine_similarity(&query_vec, &vector)),
            }
        })
        .collect();

    passages.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    passages.truncate(config.retrieval.top_k);

    let context = passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    Ok(RetrievedContext { context, passages })
}

/// CLI entry point for `jag search`.
pub async fn run_search(config: &Config, query: &str) -> Result<()> {
    let retrieved = retrieve_context(config, query).await?;

    if retrieved.passages.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, p) in retrieved.passages.iter().enumerate() {
        let snippet: String = p.text.chars().take(160).collect();
        println!(
            "{}. [{:.4}] {} (chunk {})",
            i + 1,
            p.score,
            p.source,
            p.chunk_index
        );
        println!("   {}", snippet.replace('\n', " "));
    }

    Ok(())
}
