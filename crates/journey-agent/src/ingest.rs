//! Ingestion pipeline.
//!
//! Scans the configured data folder for `.txt`, `.md`, and `.pdf` files,
//! normalizes them into documents, chunks the body text, and stores
//! everything in SQLite. Unchanged documents (same content dedup hash) are
//! skipped; changed documents have their chunks and embeddings replaced.
//! When an embedding provider is configured, chunks are embedded inline;
//! embedding failure is non-fatal and leaves the chunks pending.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::Path;
use uuid::Uuid;
use walkdir::WalkDir;

use journey_agent_core::chunk::{chunk_text, Chunk};

use crate::config::Config;
use crate::db;
use crate::embedding;

/// A file from the data folder, normalized for storage.
#[derive(Debug, Clone)]
pub struct SourceDoc {
    /// Path relative to the data folder; the document's stable key.
    pub source: String,
    pub title: Option<String>,
    pub content_type: String,
    pub body: String,
    pub modified_at: DateTime<Utc>,
}

pub async fn run_ingest(config: &Config, reset: bool) -> Result<()> {
    let pool = db::connect(config).await?;

    if reset {
        println!("Clearing database");
        sqlx::query("DELETE FROM embeddings").execute(&pool).await?;
        sqlx::query("DELETE FROM chunks").execute(&pool).await?;
        sqlx::query("DELETE FROM documents").execute(&pool).await?;
    }

    let docs = load_documents(&config.data.path)?;

    let mut upserted = 0u64;
    let mut skipped = 0u64;
    let mut chunks_written = 0u64;
    let mut embeddings_written = 0u64;
    let mut embeddings_pending = 0u64;

    for doc in &docs {
        match upsert_document(&pool, doc).await? {
            Upsert::Unchanged => {
                skipped += 1;
                continue;
            }
            Upsert::Written(doc_id) => {
                let chunks = chunk_text(
                    &doc.body,
                    config.chunking.chunk_size,
                    config.chunking.overlap,
                );
                replace_chunks(&pool, &doc_id, &chunks).await?;
                chunks_written += chunks.len() as u64;
                upserted += 1;

                if config.embedding.is_enabled() {
                    match embed_chunks(config, &pool, &doc_id, &chunks).await {
                        Ok(n) => embeddings_written += n,
                        Err(e) => {
                            tracing::warn!(source = %doc.source, error = %e, "embedding failed; chunks left pending");
                            embeddings_pending += chunks.len() as u64;
                        }
                    }
                }
            }
        }
    }

    println!("ingest {}", config.data.path.display());
    println!("  files found: {}", docs.len());
    println!("  documents upserted: {}", upserted);
    println!("  unchanged (skipped): {}", skipped);
    println!("  chunks written: {}", chunks_written);
    if config.embedding.is_enabled() {
        println!("  embeddings written: {}", embeddings_written);
        println!("  embeddings pending: {}", embeddings_pending);
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Load all supported documents from the data folder.
///
/// Files that fail to read or extract are skipped with a warning rather
/// than aborting the whole run.
pub fn load_documents(data_path: &Path) -> Result<Vec<SourceDoc>> {
    if !data_path.exists() {
        anyhow::bail!("data folder does not exist: {}", data_path.display());
    }

    let mut docs = Vec::new();

    for entry in WalkDir::new(data_path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        let (content_type, body) = match ext.as_deref() {
            Some("txt") => ("text/plain", read_text(path)),
            Some("md") => ("text/markdown", read_text(path)),
            Some("pdf") => ("application/pdf", read_pdf(path)),
            _ => continue,
        };

        let body = match body {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        if body.trim().is_empty() {
            tracing::warn!(path = %path.display(), "skipping empty file");
            continue;
        }

        let source = path
            .strip_prefix(data_path)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string());
        let modified_at = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);

        docs.push(SourceDoc {
            source,
            title,
            content_type: content_type.to_string(),
            body,
            modified_at,
        });
    }

    Ok(docs)
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_pdf(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| anyhow::anyhow!("PDF extraction failed for {}: {}", path.display(), e))
}

enum Upsert {
    /// Document body unchanged since the last ingest; nothing written.
    Unchanged,
    /// Document inserted or updated; chunks need replacing.
    Written(String),
}

async fn upsert_document(pool: &SqlitePool, doc: &SourceDoc) -> Result<Upsert> {
    let mut hasher = Sha256::new();
    hasher.update(doc.source.as_bytes());
    hasher.update(doc.body.as_bytes());
    let dedup_hash = format!("{:x}", hasher.finalize());

    let existing: Option<(String, String)> =
        sqlx::query_as("SELECT id, dedup_hash FROM documents WHERE source = ?")
            .bind(&doc.source)
            .fetch_optional(pool)
            .await?;

    if let Some((_, ref hash)) = existing {
        if *hash == dedup_hash {
            return Ok(Upsert::Unchanged);
        }
    }

    let doc_id = existing
        .map(|(id, _)| id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO documents (id, source, title, content_type, body, created_at, updated_at, dedup_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source) DO UPDATE SET
            title = excluded.title,
            content_type = excluded.content_type,
            body = excluded.body,
            updated_at = excluded.updated_at,
            dedup_hash = excluded.dedup_hash
        "#,
    )
    .bind(&doc_id)
    .bind(&doc.source)
    .bind(&doc.title)
    .bind(&doc.content_type)
    .bind(&doc.body)
    .bind(doc.modified_at.timestamp())
    .bind(now)
    .bind(&dedup_hash)
    .execute(pool)
    .await?;

    Ok(Upsert::Written(doc_id))
}

async fn replace_chunks(pool: &SqlitePool, document_id: &str, chunks: &[Chunk]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    for chunk in chunks {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(chunk_id(document_id, chunk.index))
        .bind(document_id)
        .bind(chunk.index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Deterministic chunk key: `<document-id>:<index>`.
fn chunk_id(document_id: &str, index: i64) -> String {
    format!("{}:{}", document_id, index)
}

/// Embed all chunks of one document and store the vectors. Returns the
/// number of embeddings written.
async fn embed_chunks(
    config: &Config,
    pool: &SqlitePool,
    document_id: &str,
    chunks: &[Chunk],
) -> Result<u64> {
    if chunks.is_empty() {
        return Ok(0);
    }
    let provider = embedding::create_provider(&config.embedding)?;

    let mut written = 0u64;
    for batch in chunks.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedding::embed_texts(&config.embedding, &texts).await?;

        for (chunk, vector) in batch.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO embeddings (chunk_id, document_id, model, dims, vector, content_hash)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    model = excluded.model,
                    dims = excluded.dims,
                    vector = excluded.vector,
                    content_hash = excluded.content_hash
                "#,
            )
            .bind(chunk_id(document_id, chunk.index))
            .bind(document_id)
            .bind(provider.model_name())
            .bind(provider.dims() as i64)
            .bind(embedding::vec_to_blob(vector))
            .bind(&chunk.hash)
            .execute(pool)
            .await?;
            written += 1;
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_documents_filters_by_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "Journey notes.").unwrap();
        fs::write(dir.path().join("b.md"), "# Scoring\n\nDetails.").unwrap();
        fs::write(dir.path().join("c.bin"), [0u8, 1, 2]).unwrap();

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source, "a.txt");
        assert_eq!(docs[0].content_type, "text/plain");
        assert_eq!(docs[1].source, "b.md");
        assert_eq!(docs[1].title.as_deref(), Some("b"));
    }

    #[test]
    fn test_load_documents_skips_empty_files() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("empty.txt"), "   \n").unwrap();
        fs::write(dir.path().join("full.txt"), "content").unwrap();

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "full.txt");
    }

    #[test]
    fn test_load_documents_missing_folder_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(load_documents(&missing).is_err());
    }

    #[tokio::test]
    async fn test_ingest_skips_unchanged_documents() {
        let dir = tempfile::TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("doc.txt"), "Journey 123 scored well.").unwrap();

        let config = test_config(dir.path(), &data);
        crate::migrate::run_migrations(&config).await.unwrap();

        run_ingest(&config, false).await.unwrap();
        let pool = db::connect(&config).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
        let (first_id,): (String,) = sqlx::query_as("SELECT id FROM documents")
            .fetch_one(&pool)
            .await
            .unwrap();
        pool.close().await;

        // Re-ingest without changes: same row, same id.
        run_ingest(&config, false).await.unwrap();
        let pool = db::connect(&config).await.unwrap();
        let (count, id): (i64, String) =
            sqlx::query_as("SELECT COUNT(*), MIN(id) FROM documents")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
        assert_eq!(id, first_id);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_ingest_replaces_chunks_on_change() {
        let dir = tempfile::TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        let file = data.join("doc.txt");
        fs::write(&file, "Original body.").unwrap();

        let config = test_config(dir.path(), &data);
        crate::migrate::run_migrations(&config).await.unwrap();
        run_ingest(&config, false).await.unwrap();

        fs::write(&file, "Updated body with different text.").unwrap();
        run_ingest(&config, false).await.unwrap();

        let pool = db::connect(&config).await.unwrap();
        let texts: Vec<(String,)> = sqlx::query_as("SELECT text FROM chunks")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert!(texts.iter().all(|(t,)| t.contains("Updated")));
        pool.close().await;
    }

    fn test_config(root: &Path, data: &Path) -> Config {
        let mut config = Config::minimal();
        config.db.path = root.join("journey.sqlite");
        config.data.path = data.to_path_buf();
        config
    }
}
