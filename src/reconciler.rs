//! Reconciliation: repairs drift between the document catalog, the blob
//! store, and the vector index.
//!
//! Two independent passes:
//! - [`cleanup_orphans`] deletes blob-store files with no catalog row.
//! - [`embed_repair`] re-ingests catalog rows whose file or vectors are
//!   missing, and creates catalog rows for filesystem entries with none.

use std::collections::HashSet;

use serde_json::Value as Json;
use sqlx::Row;

use crate::error::CoreResult;
use crate::ingest::{ingest_document, IngestContext, IngestRequest};
use crate::models::SourceType;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CleanupReport {
    pub checked: usize,
    pub kept: usize,
    pub deleted: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EmbedRepairReport {
    pub checked_db: usize,
    pub checked_fs: usize,
    pub reembedded_db_missing_file: usize,
    pub reembedded_fs_missing_db: usize,
    pub created_db_records: usize,
    pub errors: usize,
}

/// Enumerates the `portal` and `website` blob folders and deletes any file
/// with no catalog row referencing it (joined by `stored_filename` or
/// `storage_path`). A no-op in `dry_run` mode besides the report.
pub async fn cleanup_orphans(ctx: &IngestContext<'_>, dry_run: bool) -> CoreResult<CleanupReport> {
    let mut report = CleanupReport::default();

    let known: HashSet<String> = sqlx::query(
        "SELECT stored_filename, storage_path FROM documents WHERE source_type IN ('portal', 'website')",
    )
    .fetch_all(ctx.pool)
    .await?
    .into_iter()
    .flat_map(|row| {
        let stored: String = row.get("stored_filename");
        let path: String = row.get("storage_path");
        [stored, path]
    })
    .collect();

    for source_type in [SourceType::Portal, SourceType::Website] {
        let dir = ctx.blob_store.dir_for(source_type, None);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(_) => continue,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else { continue };
            if !file_type.is_file() {
                continue;
            }
            report.checked += 1;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let rel = ctx.blob_store.relative_path(source_type, None, &file_name);

            if known.contains(&file_name) || known.contains(&rel) {
                report.kept += 1;
                continue;
            }

            if dry_run {
                report.deleted += 1;
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    log::error!("failed to delete orphan {}: {e}", entry.path().display());
                    report.errors += 1;
                }
            }
        }
    }

    Ok(report)
}

struct CatalogRow {
    id: uuid::Uuid,
    source_type: String,
    original_filename: String,
    stored_filename: String,
    storage_path: String,
    mime_type: String,
    metadata: Json,
}

/// Re-ingests rows whose file or vectors are missing, and creates catalog
/// rows (then ingests) for filesystem entries with no matching row.
pub async fn embed_repair(ctx: &IngestContext<'_>, dry_run: bool) -> CoreResult<EmbedRepairReport> {
    let mut report = EmbedRepairReport::default();

    let rows = sqlx::query_as::<_, (uuid::Uuid, String, String, String, String, String, Json)>(
        "SELECT id, source_type, original_filename, stored_filename, storage_path, mime_type, metadata \
         FROM documents WHERE source_type IN ('portal', 'website')",
    )
    .fetch_all(ctx.pool)
    .await?
    .into_iter()
    .map(|(id, source_type, original_filename, stored_filename, storage_path, mime_type, metadata)| CatalogRow {
        id,
        source_type,
        original_filename,
        stored_filename,
        storage_path,
        mime_type,
        metadata,
    })
    .collect::<Vec<_>>();

    let mut known_stored = HashSet::new();

    for row in &rows {
        report.checked_db += 1;
        known_stored.insert(row.stored_filename.clone());

        let file_exists = ctx.blob_store.exists(&row.storage_path).await;
        let vector_count = ctx.vector_store.count_for_stored_filename(&row.stored_filename).await.unwrap_or(0);

        if file_exists && vector_count > 0 {
            continue;
        }

        if dry_run {
            report.reembedded_db_missing_file += 1;
            continue;
        }

        if !file_exists {
            log::warn!("catalog row {} missing its file at {}, cannot repair without source bytes", row.id, row.storage_path);
            report.errors += 1;
            continue;
        }

        let bytes = match ctx.blob_store.read(&row.storage_path).await {
            Ok(b) => b,
            Err(e) => {
                log::error!("failed to read {} for repair: {e}", row.storage_path);
                report.errors += 1;
                continue;
            }
        };

        let source_type: SourceType = row.source_type.parse().unwrap_or(SourceType::Website);
        ctx.vector_store.delete_by_document(row.id).await.ok();
        sqlx::query("DELETE FROM documents WHERE id = $1").bind(row.id).execute(ctx.pool).await.ok();

        let request = IngestRequest {
            source_type,
            original_filename: row.original_filename.clone(),
            bytes,
            mime_type: row.mime_type.clone(),
            uploaded_by: None,
            chat_id: None,
            display_name: None,
            extra_metadata: row.metadata.clone(),
        };

        match ingest_document(ctx, request).await {
            Ok(Some(_)) => report.reembedded_db_missing_file += 1,
            Ok(None) => report.errors += 1,
            Err(e) => {
                log::error!("repair ingestion failed for {}: {e}", row.stored_filename);
                report.errors += 1;
            }
        }
    }

    for source_type in [SourceType::Portal, SourceType::Website] {
        let dir = ctx.blob_store.dir_for(source_type, None);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(_) => continue,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else { continue };
            if !file_type.is_file() {
                continue;
            }
            report.checked_fs += 1;
            let file_name = entry.file_name().to_string_lossy().to_string();
            if known_stored.contains(&file_name) {
                continue;
            }

            if dry_run {
                report.created_db_records += 1;
                report.reembedded_fs_missing_db += 1;
                continue;
            }

            let bytes = match tokio::fs::read(entry.path()).await {
                Ok(b) => b,
                Err(e) => {
                    log::error!("failed to read orphaned file {}: {e}", entry.path().display());
                    report.errors += 1;
                    continue;
                }
            };

            let request = IngestRequest {
                source_type,
                original_filename: file_name.clone(),
                bytes,
                mime_type: mime_guess::from_path(&file_name).first_or_octet_stream().to_string(),
                uploaded_by: None,
                chat_id: None,
                display_name: None,
                extra_metadata: serde_json::json!({ "recovered_from_fs": true }),
            };

            match ingest_document(ctx, request).await {
                Ok(Some(_)) => {
                    report.created_db_records += 1;
                    report.reembedded_fs_missing_db += 1;
                }
                Ok(None) => report.errors += 1,
                Err(e) => {
                    log::error!("repair ingestion failed for recovered file {file_name}: {e}");
                    report.errors += 1;
                }
            }
        }
    }

    Ok(report)
}
