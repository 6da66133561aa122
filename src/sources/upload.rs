//! Upload handler: the operator-facing ingestion path (CLI/API callers
//! handing the crate raw bytes directly, as opposed to a pull/crawl source).
//!
//! Validates the attachment-permission toggle, the per-extension allow-list,
//! and the size cap — all before any file write — then defers to the shared
//! ingestion pipeline.

use uuid::Uuid;

use crate::config::{RuntimeSettings, UploadConfig};
use crate::error::{CoreError, CoreResult};
use crate::ingest::{ingest_document, IngestContext, IngestOutcome, IngestRequest};
use crate::models::SourceType;

pub struct UploadRequest {
    pub source_type: SourceType,
    pub original_filename: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub uploaded_by: Option<String>,
    pub chat_id_str: Option<String>,
    pub extra_metadata: serde_json::Value,
}

fn extension_of(file_name: &str) -> Option<String> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn validate(request: &UploadRequest, config: &UploadConfig, settings: &RuntimeSettings) -> CoreResult<Option<Uuid>> {
    if request.source_type == SourceType::User && !settings.attachment_enabled {
        return Err(CoreError::Forbidden("attachment uploads are disabled".to_string()));
    }

    let chat_id = match (&request.source_type, &request.chat_id_str) {
        (SourceType::User, Some(raw)) => Some(
            Uuid::parse_str(raw).map_err(|_| CoreError::BadInput(format!("invalid chat_id: {raw}")))?,
        ),
        (SourceType::User, None) => None,
        _ => None,
    };

    let ext = extension_of(&request.original_filename)
        .ok_or_else(|| CoreError::BadInput("file has no extension".to_string()))?;

    let allowed_extensions = if request.source_type == SourceType::User && !settings.attachment_file_types.is_empty() {
        &settings.attachment_file_types
    } else {
        &config.allowed_extensions
    };

    if !allowed_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
        return Err(CoreError::BadInput(format!("file extension '{ext}' is not allowed")));
    }

    let max_size_mb = if request.source_type == SourceType::User {
        settings.attachment_file_size_mb.unwrap_or(config.max_size_mb)
    } else {
        config.max_size_mb
    };
    let max_bytes = max_size_mb.saturating_mul(1024 * 1024);

    if request.bytes.len() as u64 > max_bytes {
        return Err(CoreError::BadInput(format!(
            "file exceeds the {max_size_mb}MB size limit"
        )));
    }

    Ok(chat_id)
}

pub async fn handle_upload(
    ctx: &IngestContext<'_>,
    config: &UploadConfig,
    settings: &RuntimeSettings,
    request: UploadRequest,
) -> CoreResult<Option<IngestOutcome>> {
    let chat_id = validate(&request, config, settings)?;

    let ingest_request = IngestRequest {
        source_type: request.source_type,
        original_filename: request.original_filename,
        bytes: request.bytes,
        mime_type: request.mime_type,
        uploaded_by: request.uploaded_by,
        chat_id,
        display_name: None,
        extra_metadata: request.extra_metadata,
    };

    ingest_document(ctx, ingest_request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(ext: &str, size: usize) -> UploadRequest {
        UploadRequest {
            source_type: SourceType::Admin,
            original_filename: format!("doc.{ext}"),
            bytes: vec![0u8; size],
            mime_type: "application/octet-stream".to_string(),
            uploaded_by: Some("admin1".to_string()),
            chat_id_str: None,
            extra_metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn rejects_disallowed_extension() {
        let config = UploadConfig::default();
        let settings = RuntimeSettings::default();
        let request = sample_request("exe", 10);
        assert!(validate(&request, &config, &settings).is_err());
    }

    #[test]
    fn rejects_oversized_file() {
        let config = UploadConfig { allowed_extensions: vec!["pdf".to_string()], max_size_mb: 1 };
        let settings = RuntimeSettings::default();
        let request = sample_request("pdf", 2 * 1024 * 1024);
        assert!(validate(&request, &config, &settings).is_err());
    }

    #[test]
    fn accepts_valid_admin_upload() {
        let config = UploadConfig { allowed_extensions: vec!["pdf".to_string()], max_size_mb: 50 };
        let settings = RuntimeSettings::default();
        let request = sample_request("pdf", 100);
        assert!(validate(&request, &config, &settings).is_ok());
    }

    #[test]
    fn rejects_user_upload_when_attachments_disabled() {
        let config = UploadConfig::default();
        let settings = RuntimeSettings { attachment_enabled: false, ..Default::default() };
        let mut request = sample_request("pdf", 100);
        request.source_type = SourceType::User;
        request.chat_id_str = Some(Uuid::new_v4().to_string());
        assert!(validate(&request, &config, &settings).is_err());
    }

    #[test]
    fn rejects_invalid_chat_id() {
        let config = UploadConfig::default();
        let settings = RuntimeSettings { attachment_enabled: true, ..Default::default() };
        let mut request = sample_request("pdf", 100);
        request.source_type = SourceType::User;
        request.chat_id_str = Some("not-a-uuid".to_string());
        assert!(validate(&request, &config, &settings).is_err());
    }
}
