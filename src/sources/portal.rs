//! Portal puller: downloads published documents from the Combiphar document
//! portal and ingests any that are new or changed.
//!
//! Token acquisition is abstracted behind [`PortalTokenProvider`] — the
//! portal's real token algorithm lives outside what this crate can observe,
//! so callers supply one (see [`EnvTokenProvider`] for the default: reading
//! `PORTAL_AUTH_TOKEN`).

use serde_json::Value as Json;

use crate::config::PortalConfig;
use crate::error::{CoreError, CoreResult};
use crate::ingest::{find_by_metadata_field, ingest_document, purge_document, IngestContext, IngestRequest};
use crate::models::{ItemType, SourceType, SyncItemResult};
use crate::sync_logger::SyncLogger;

pub trait PortalTokenProvider: Send + Sync {
    fn token(&self) -> CoreResult<String>;
}

/// Reads the token from `PORTAL_AUTH_TOKEN`. This is the documented
/// fallback when no richer token-issuing integration is configured.
pub struct EnvTokenProvider;

impl PortalTokenProvider for EnvTokenProvider {
    fn token(&self) -> CoreResult<String> {
        std::env::var("PORTAL_AUTH_TOKEN")
            .map_err(|_| CoreError::Upstream("PORTAL_AUTH_TOKEN not set".to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortalPullSummary {
    pub downloaded_files: Vec<String>,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct PortalListItem {
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "FileName")]
    file_name: Option<String>,
    #[serde(rename = "Id", alias = "ID")]
    id: Option<Json>,
    #[serde(rename = "IsPublished", default)]
    is_published: bool,
    #[serde(rename = "DownloadUrl")]
    download_url: Option<String>,
    #[serde(rename = "downloadUrl")]
    download_url_lc: Option<String>,
    #[serde(rename = "FileUrl")]
    file_url: Option<String>,
    #[serde(rename = "fileUrl")]
    file_url_lc: Option<String>,
}

impl PortalListItem {
    fn resolved_download_url(&self, fallback_base: &str) -> String {
        self.download_url
            .clone()
            .or_else(|| self.download_url_lc.clone())
            .or_else(|| self.file_url.clone())
            .or_else(|| self.file_url_lc.clone())
            .unwrap_or_else(|| format!("{fallback_base}/{}", self.file_name.clone().unwrap_or_default()))
    }
}

fn normalize_document_source(file_name: &str) -> String {
    let cleaned = file_name.trim().replace(' ', "_").replace(['/', '\\'], "_");
    if cleaned.is_empty() {
        format!("{}", uuid::Uuid::new_v4())
    } else {
        cleaned
    }
}

async fn fetch_document_list(client: &reqwest::Client, token: &str) -> CoreResult<Vec<PortalListItem>> {
    let url = format!("https://portal.combiphar.com/Documents/GetDocumentList?q={token}");
    let resp = client
        .get(&url)
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| CoreError::Upstream(format!("fetching document list: {e}")))?;

    if !resp.status().is_success() {
        return Err(CoreError::Upstream(format!(
            "portal document list returned {}",
            resp.status()
        )));
    }

    let body: Json = resp
        .json()
        .await
        .map_err(|e| CoreError::Upstream(format!("parsing document list: {e}")))?;

    let items = match &body {
        Json::Object(map) => map
            .get("data")
            .or_else(|| map.get("items"))
            .and_then(Json::as_array)
            .cloned()
            .unwrap_or_default(),
        Json::Array(arr) => arr.clone(),
        _ => Vec::new(),
    };

    Ok(items
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

async fn download_with_retry(
    client: &reqwest::Client,
    url: &str,
    timeout_secs: u64,
    max_retries: u32,
) -> CoreResult<Vec<u8>> {
    let mut last_err = None;
    for attempt in 1..=max_retries.max(1) {
        let result = client
            .get(url)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                return resp
                    .bytes()
                    .await
                    .map(|b| b.to_vec())
                    .map_err(|e| CoreError::Upstream(format!("reading body: {e}")));
            }
            Ok(resp) => {
                last_err = Some(CoreError::Upstream(format!("download returned {}", resp.status())));
            }
            Err(e) => {
                log::warn!("timeout/error downloading {url} (attempt {attempt}/{max_retries}): {e}");
                last_err = Some(CoreError::Upstream(e.to_string()));
            }
        }
    }
    Err(last_err.unwrap_or_else(|| CoreError::Upstream("download failed".to_string())))
}

/// Pulls the published document list and ingests anything new or changed.
/// Mirrors the idempotency rule: skip when the existing row's stored file
/// is present, has vectors, and its recorded filename is unchanged.
pub async fn pull_portal_documents(
    ctx: &IngestContext<'_>,
    config: &PortalConfig,
    token_provider: &dyn PortalTokenProvider,
    logger: Option<&SyncLogger>,
) -> CoreResult<PortalPullSummary> {
    let client = reqwest::Client::new();
    let token = token_provider.token()?;

    let items = match fetch_document_list(&client, &token).await {
        Ok(items) => items,
        Err(e) => {
            if let Some(logger) = logger {
                let _ = logger
                    .record_item(&SyncItemResult {
                        item_type: ItemType::Document,
                        item_url: None,
                        item_source: None,
                        document_title: Some("Portal API Request".to_string()),
                        document_filename: None,
                        document_id: None,
                        success: false,
                        error_message: Some(e.to_string()),
                        file_size: None,
                        metadata: serde_json::json!({}),
                    })
                    .await;
            }
            return Err(e);
        }
    };

    let mut summary = PortalPullSummary::default();

    for item in items {
        let Some(file_name) = item.file_name.clone() else { continue };

        if !item.is_published {
            summary.skipped += 1;
            continue;
        }

        let document_source = normalize_document_source(&file_name);

        let existing = find_by_metadata_field(ctx.pool, SourceType::Portal, "FileName", &file_name).await?;

        if let Some((existing_id, existing_original, existing_stored)) = &existing {
            let vector_count = ctx.vector_store.count_for_stored_filename(existing_stored).await.unwrap_or(0);
            let file_present = ctx.blob_store.exists(&ctx.blob_store.relative_path(SourceType::Portal, None, existing_stored)).await;

            if file_present && vector_count > 0 && existing_original == &document_source {
                summary.skipped += 1;
                continue;
            }

            let storage_path = ctx.blob_store.relative_path(SourceType::Portal, None, existing_stored);
            purge_document(ctx, *existing_id, &storage_path).await.ok();
        }

        let download_url = item.resolved_download_url("https://portal.combiphar.com/DocAnnouncements");

        let bytes = match download_with_retry(&client, &download_url, config.download_timeout_secs, config.download_retries).await {
            Ok(b) => b,
            Err(e) => {
                summary.failed += 1;
                if let Some(logger) = logger {
                    logger
                        .record_item(&SyncItemResult {
                            item_type: ItemType::Document,
                            item_url: Some(download_url.clone()),
                            item_source: Some("portal".to_string()),
                            document_title: item.title.clone(),
                            document_filename: Some(file_name.clone()),
                            document_id: None,
                            success: false,
                            error_message: Some(e.to_string()),
                            file_size: None,
                            metadata: serde_json::json!({}),
                        })
                        .await
                        .ok();
                }
                continue;
            }
        };

        let file_size = bytes.len() as i64;
        let metadata = serde_json::json!({
            "Title": item.title,
            "FileName": file_name,
            "Id": item.id,
            "IsPublished": item.is_published,
        });

        let request = IngestRequest {
            source_type: SourceType::Portal,
            original_filename: document_source.clone(),
            bytes,
            mime_type: mime_guess::from_path(&document_source).first_or_octet_stream().to_string(),
            uploaded_by: None,
            chat_id: None,
            display_name: item.title.clone(),
            extra_metadata: metadata,
        };

        match ingest_document(ctx, request).await {
            Ok(Some(outcome)) => {
                summary.downloaded_files.push(outcome.stored_filename.clone());
                if let Some(logger) = logger {
                    logger
                        .record_item(&SyncItemResult {
                            item_type: ItemType::Document,
                            item_url: Some(download_url),
                            item_source: Some("portal".to_string()),
                            document_title: item.title.clone(),
                            document_filename: Some(file_name.clone()),
                            document_id: Some(outcome.document_id),
                            success: true,
                            error_message: None,
                            file_size: Some(file_size),
                            metadata: serde_json::json!({ "chunks_written": outcome.chunks_written }),
                        })
                        .await
                        .ok();
                }
            }
            Ok(None) => {
                summary.failed += 1;
                if let Some(logger) = logger {
                    logger
                        .record_item(&SyncItemResult {
                            item_type: ItemType::Document,
                            item_url: Some(download_url),
                            item_source: Some("portal".to_string()),
                            document_title: item.title.clone(),
                            document_filename: Some(file_name.clone()),
                            document_id: None,
                            success: false,
                            error_message: Some("no text extracted from document".to_string()),
                            file_size: Some(file_size),
                            metadata: serde_json::json!({}),
                        })
                        .await
                        .ok();
                }
            }
            Err(e) => {
                summary.failed += 1;
                if let Some(logger) = logger {
                    logger
                        .record_item(&SyncItemResult {
                            item_type: ItemType::Document,
                            item_url: Some(download_url),
                            item_source: Some("portal".to_string()),
                            document_title: item.title.clone(),
                            document_filename: Some(file_name.clone()),
                            document_id: None,
                            success: false,
                            error_message: Some(e.to_string()),
                            file_size: Some(file_size),
                            metadata: serde_json::json!({}),
                        })
                        .await
                        .ok();
                }
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_document_source_replaces_spaces_and_slashes() {
        assert_eq!(normalize_document_source("Annual Report/2024.pdf"), "Annual_Report_2024.pdf");
    }

    #[test]
    fn resolved_download_url_falls_back_to_static_path() {
        let item = PortalListItem {
            title: None,
            file_name: Some("report.pdf".to_string()),
            id: None,
            is_published: true,
            download_url: None,
            download_url_lc: None,
            file_url: None,
            file_url_lc: None,
        };
        assert_eq!(
            item.resolved_download_url("https://portal.combiphar.com/DocAnnouncements"),
            "https://portal.combiphar.com/DocAnnouncements/report.pdf"
        );
    }
}
