//! Per-run sync logging: one `sync_logs` header row plus one
//! `sync_log_details` row per item processed.
//!
//! The header's aggregate counters and overall `status` are derived from the
//! detail rows recorded against it, with status promoted/demoted as follows:
//! all-success → `success`, all-failure → `failed`, any mix → `partial`.

use chrono::Utc;
use serde_json::Value as Json;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::models::{ItemType, SyncItemResult};

pub struct SyncLogger {
    pool: PgPool,
    sync_log_id: Uuid,
}

impl SyncLogger {
    /// Opens a new header row for a sync run and returns a logger bound to it.
    pub async fn start(pool: PgPool, sync_type: &str, trigger_source: &str, triggered_by: Option<&str>) -> CoreResult<Self> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO sync_logs (sync_type, status, trigger_source, triggered_by, started_at) \
             VALUES ($1, 'running', $2, $3, now()) RETURNING id",
        )
        .bind(sync_type)
        .bind(trigger_source)
        .bind(triggered_by)
        .fetch_one(&pool)
        .await?;

        Ok(SyncLogger { pool, sync_log_id: id })
    }

    pub fn sync_log_id(&self) -> Uuid {
        self.sync_log_id
    }

    /// Records one processed item as a detail row.
    pub async fn record_item(&self, item: &SyncItemResult) -> CoreResult<()> {
        let status = if item.success { "success" } else { "failed" };
        sqlx::query(
            r#"
            INSERT INTO sync_log_details
                (sync_log_id, item_type, item_url, item_source, document_title,
                 document_filename, document_id, status, error_message, file_size, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(self.sync_log_id)
        .bind(item.item_type.as_str())
        .bind(&item.item_url)
        .bind(&item.item_source)
        .bind(&item.document_title)
        .bind(&item.document_filename)
        .bind(item.document_id)
        .bind(status)
        .bind(&item.error_message)
        .bind(item.file_size)
        .bind(&item.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rolls up detail-row counts per item type and closes the header row.
    pub async fn finish(&self, error_message: Option<&str>) -> CoreResult<Json> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT item_type, status FROM sync_log_details WHERE sync_log_id = $1",
        )
        .bind(self.sync_log_id)
        .fetch_all(&self.pool)
        .await?;

        let mut documents_total = 0i32;
        let mut documents_successful = 0i32;
        let mut documents_failed = 0i32;
        let mut websites_total = 0i32;
        let mut websites_successful = 0i32;
        let mut websites_failed = 0i32;

        for (item_type, status) in &rows {
            let success = status == "success";
            match item_type.as_str() {
                t if t == ItemType::Document.as_str() => {
                    documents_total += 1;
                    if success {
                        documents_successful += 1;
                    } else {
                        documents_failed += 1;
                    }
                }
                t if t == ItemType::Website.as_str() => {
                    websites_total += 1;
                    if success {
                        websites_successful += 1;
                    } else {
                        websites_failed += 1;
                    }
                }
                _ => {}
            }
        }

        let total = documents_total + websites_total;
        let failed = documents_failed + websites_failed;
        let status = if error_message.is_some() {
            "failed"
        } else if total == 0 {
            "success"
        } else if failed == 0 {
            "success"
        } else if failed == total {
            "failed"
        } else {
            "partial"
        };

        let runtime_seconds: f64 = sqlx::query_scalar(
            "SELECT EXTRACT(EPOCH FROM (now() - started_at)) FROM sync_logs WHERE id = $1",
        )
        .bind(self.sync_log_id)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            r#"
            UPDATE sync_logs SET
                status = $2,
                documents_total = $3,
                documents_successful = $4,
                documents_failed = $5,
                websites_total = $6,
                websites_successful = $7,
                websites_failed = $8,
                finished_at = now(),
                runtime_seconds = $9,
                error_message = $10
            WHERE id = $1
            "#,
        )
        .bind(self.sync_log_id)
        .bind(status)
        .bind(documents_total)
        .bind(documents_successful)
        .bind(documents_failed)
        .bind(websites_total)
        .bind(websites_successful)
        .bind(websites_failed)
        .bind(runtime_seconds)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(serde_json::json!({
            "status": status,
            "documents_total": documents_total,
            "documents_successful": documents_successful,
            "documents_failed": documents_failed,
            "websites_total": websites_total,
            "websites_successful": websites_successful,
            "websites_failed": websites_failed,
            "runtime_seconds": runtime_seconds,
        }))
    }
}

pub fn item_result(
    item_type: ItemType,
    success: bool,
    document_id: Option<Uuid>,
) -> SyncItemResult {
    SyncItemResult {
        item_type,
        item_url: None,
        item_source: None,
        document_title: None,
        document_filename: None,
        document_id,
        success,
        error_message: None,
        file_size: None,
        metadata: serde_json::json!({}),
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}
