//! Ingestion pipeline orchestration.
//!
//! Every source adapter (portal puller, website crawler, upload handler)
//! funnels through [`ingest_document`]: validate → generate a stored name →
//! place the file on the blob store → insert the catalog row → extract text
//! → chunk → embed → upsert vectors → invalidate caches. Extraction or
//! embedding failure rolls back the catalog row and the placed file so a
//! half-ingested document never lingers.

use serde_json::Value as Json;
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::blob_store::BlobStore;
use crate::cache::SearchCache;
use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, EmbeddingConfig, OcrConfig};
use crate::embedding::{embed_texts, EmbeddingProvider};
use crate::error::{CoreError, CoreResult};
use crate::extract::extract_text;
use crate::models::{SourceType, VectorChunk};
use crate::vector_store::VectorStore;

pub struct IngestRequest {
    pub source_type: SourceType,
    pub original_filename: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub uploaded_by: Option<String>,
    pub chat_id: Option<Uuid>,
    pub display_name: Option<String>,
    pub extra_metadata: Json,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document_id: Uuid,
    pub stored_filename: String,
    pub storage_path: String,
    pub chunks_written: usize,
}

pub struct IngestContext<'a> {
    pub pool: &'a PgPool,
    pub blob_store: &'a BlobStore,
    pub vector_store: &'a VectorStore,
    pub cache: &'a SearchCache,
    pub embedding_provider: &'a dyn EmbeddingProvider,
    pub embedding_config: &'a EmbeddingConfig,
    pub chunking_config: &'a ChunkingConfig,
    pub ocr_config: &'a OcrConfig,
}

/// Looks up an existing document by `(source_type, stored_filename)`-style
/// identity key so callers can decide to skip or reprocess. Adapters key on
/// whatever uniquely identifies the upstream item (e.g. the portal's
/// original filename recorded in `metadata->>'FileName'`).
pub async fn find_by_metadata_field(
    pool: &PgPool,
    source_type: SourceType,
    field: &str,
    value: &str,
) -> CoreResult<Option<(Uuid, String, String)>> {
    let row = sqlx::query(
        "SELECT id, original_filename, stored_filename FROM documents \
         WHERE source_type = $1 AND metadata->>$2 = $3",
    )
    .bind(source_type.as_str())
    .bind(field)
    .bind(value)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| (r.get("id"), r.get("original_filename"), r.get("stored_filename"))))
}

/// Deletes a document's catalog row, vectors, and blob — used when an
/// adapter detects a changed or stale upstream item before reprocessing.
pub async fn purge_document(ctx: &IngestContext<'_>, document_id: Uuid, storage_path: &str) -> CoreResult<()> {
    ctx.vector_store.delete_by_document(document_id).await?;
    sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(document_id)
        .execute(ctx.pool)
        .await?;
    ctx.blob_store.delete(storage_path).await?;
    ctx.cache.invalidate_document_metadata(Some(document_id));
    Ok(())
}

/// Runs the full ingestion pipeline for one file. Returns `Ok(None)` if no
/// text could be extracted (the caller should treat this as a skip, not a
/// hard failure, per the source pipeline's no-text-extracted handling).
pub async fn ingest_document(
    ctx: &IngestContext<'_>,
    request: IngestRequest,
) -> CoreResult<Option<IngestOutcome>> {
    if request.bytes.is_empty() {
        return Err(CoreError::BadInput("empty file content".to_string()));
    }

    let stored_filename = ctx.blob_store.generate_stored_name(&request.original_filename);
    let storage_path = ctx
        .blob_store
        .place(request.source_type, request.chat_id, &stored_filename, &request.bytes)
        .await?;

    let document_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO documents
            (source_type, original_filename, stored_filename, storage_path, mime_type, size_bytes, metadata, uploaded_by, chat_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(request.source_type.as_str())
    .bind(&request.original_filename)
    .bind(&stored_filename)
    .bind(&storage_path)
    .bind(&request.mime_type)
    .bind(request.bytes.len() as i64)
    .bind(&request.extra_metadata)
    .bind(&request.uploaded_by)
    .bind(request.chat_id)
    .fetch_one(ctx.pool)
    .await?;

    let text = extract_text(&request.bytes, &request.original_filename, ctx.ocr_config);

    if text.trim().is_empty() {
        log::warn!(
            "no text extracted from {}, rolling back ingestion",
            request.original_filename
        );
        rollback(ctx, document_id, &storage_path).await;
        return Ok(None);
    }

    let display_name = request
        .display_name
        .unwrap_or_else(|| request.original_filename.clone());

    let pending = chunk_text(
        &display_name,
        &text,
        ctx.chunking_config.chunk_size,
        ctx.chunking_config.chunk_overlap,
        &ctx.chunking_config.separators,
    );

    if pending.is_empty() {
        log::warn!(
            "text extracted but produced zero chunks for {}, rolling back",
            request.original_filename
        );
        rollback(ctx, document_id, &storage_path).await;
        return Ok(None);
    }

    let chunks_written = pending.len();

    if ctx.embedding_config.is_enabled() {
        let texts: Vec<String> = pending.iter().map(|c| c.content.clone()).collect();
        let embeddings = match embed_texts(ctx.embedding_provider, ctx.embedding_config, &texts).await {
            Ok(v) => v,
            Err(e) => {
                log::error!("embedding failed for {}: {e}", request.original_filename);
                rollback(ctx, document_id, &storage_path).await;
                return Err(CoreError::Embedding(e.to_string()));
            }
        };

        let vector_chunks: Vec<VectorChunk> = pending
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let mut metadata = chunk.metadata;
                merge_chunk_metadata(
                    &mut metadata,
                    &request.extra_metadata,
                    &request.source_type,
                    &document_id,
                    chunk.chunk_index,
                    &stored_filename,
                    &storage_path,
                    &request.mime_type,
                    &request.uploaded_by,
                    request.chat_id,
                    &request.original_filename,
                );
                VectorChunk {
                    document_id,
                    chunk_index: chunk.chunk_index,
                    content: chunk.content,
                    embedding,
                    metadata,
                }
            })
            .collect();

        if let Err(e) = ctx.vector_store.upsert(&vector_chunks).await {
            log::error!("vector upsert failed for {}: {e}", request.original_filename);
            rollback(ctx, document_id, &storage_path).await;
            return Err(e);
        }
    }

    ctx.cache.invalidate_all();

    Ok(Some(IngestOutcome {
        document_id,
        stored_filename,
        storage_path,
        chunks_written,
    }))
}

/// Fills the chunk-level system keys, merging `extra_metadata` (the
/// source-adapter-supplied metadata, e.g. a website's `title`/`url` or a
/// portal item's `Title`/`FileName`) in underneath them: source keys are
/// copied in first, then every system key is (re-)inserted so a source
/// document can never shadow one of them.
#[allow(clippy::too_many_arguments)]
fn merge_chunk_metadata(
    metadata: &mut Json,
    extra_metadata: &Json,
    source_type: &SourceType,
    document_id: &Uuid,
    chunk_index: i64,
    stored_filename: &str,
    storage_path: &str,
    mime_type: &str,
    uploaded_by: &Option<String>,
    chat_id: Option<Uuid>,
    original_filename: &str,
) {
    if let Json::Object(map) = metadata {
        if let Json::Object(source_map) = extra_metadata {
            for (key, value) in source_map {
                map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        map.insert("document_id".to_string(), Json::String(document_id.to_string()));
        map.insert("source_type".to_string(), Json::String(source_type.to_string()));
        map.insert("chunk_index".to_string(), Json::from(chunk_index));
        map.insert("stored_filename".to_string(), Json::String(stored_filename.to_string()));
        map.insert("storage_path".to_string(), Json::String(storage_path.to_string()));
        map.insert("mime_type".to_string(), Json::String(mime_type.to_string()));
        map.insert("original_filename".to_string(), Json::String(original_filename.to_string()));
        map.insert(
            "uploaded_by".to_string(),
            uploaded_by.clone().map(Json::String).unwrap_or(Json::Null),
        );
        map.insert(
            "chat_id".to_string(),
            chat_id.map(|id| Json::String(id.to_string())).unwrap_or(Json::Null),
        );
        map.insert("created_at".to_string(), Json::String(chrono::Utc::now().to_rfc3339()));
    }
}

async fn rollback(ctx: &IngestContext<'_>, document_id: Uuid, storage_path: &str) {
    if let Err(e) = ctx.vector_store.delete_by_document(document_id).await {
        log::error!("rollback: failed to delete vectors for {document_id}: {e}");
    }
    if let Err(e) = sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(document_id)
        .execute(ctx.pool)
        .await
    {
        log::error!("rollback: failed to delete document row {document_id}: {e}");
    }
    if let Err(e) = ctx.blob_store.delete(storage_path).await {
        log::error!("rollback: failed to delete blob {storage_path}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_chunk_metadata_fills_expected_keys() {
        let mut metadata = json!({ "chunk_total": 1 });
        let document_id = Uuid::new_v4();
        merge_chunk_metadata(
            &mut metadata,
            &json!({ "title": "Kebijakan Cuti 2024", "url": "https://example.com/leave" }),
            &SourceType::Portal,
            &document_id,
            2,
            "abc.pdf",
            "portal/abc.pdf",
            "application/pdf",
            &None,
            None,
            "Original Name.pdf",
        );
        assert_eq!(metadata["source_type"], "portal");
        assert_eq!(metadata["stored_filename"], "abc.pdf");
        assert_eq!(metadata["chunk_total"], 1);
        assert_eq!(metadata["chunk_index"], 2);
        assert_eq!(metadata["title"], "Kebijakan Cuti 2024");
        assert_eq!(metadata["url"], "https://example.com/leave");
        assert!(metadata["created_at"].is_string());
    }

    #[test]
    fn merge_chunk_metadata_system_keys_win_over_source_metadata() {
        let mut metadata = json!({});
        let document_id = Uuid::new_v4();
        merge_chunk_metadata(
            &mut metadata,
            &json!({ "source_type": "spoofed", "document_id": "spoofed" }),
            &SourceType::Website,
            &document_id,
            0,
            "page.txt",
            "website/page.txt",
            "text/plain",
            &None,
            None,
            "page.txt",
        );
        assert_eq!(metadata["source_type"], "website");
        assert_eq!(metadata["document_id"], document_id.to_string());
    }
}
