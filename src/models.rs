//! Core data models for the document catalog and vector index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// Provenance of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Portal,
    Admin,
    User,
    Website,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Portal => "portal",
            SourceType::Admin => "admin",
            SourceType::User => "user",
            SourceType::Website => "website",
        }
    }

    /// Fixed preference ordering used when breaking ties between
    /// equally-scored candidates from different sources.
    pub fn rank(&self) -> u8 {
        match self {
            SourceType::Portal => 0,
            SourceType::Website => 1,
            SourceType::Admin => 2,
            SourceType::User => 3,
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "portal" => Ok(SourceType::Portal),
            "admin" => Ok(SourceType::Admin),
            "user" => Ok(SourceType::User),
            "website" => Ok(SourceType::Website),
            other => Err(crate::error::CoreError::BadInput(format!(
                "unknown source_type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row in the document catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub source_type: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub metadata: Json,
    pub uploaded_by: Option<String>,
    pub chat_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chunk of text about to be embedded, prior to having an id or vector.
#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub chunk_index: i64,
    pub content: String,
    pub metadata: Json,
}

/// A fully embedded chunk ready to be upserted into the vector index.
#[derive(Debug, Clone)]
pub struct VectorChunk {
    pub document_id: Uuid,
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Json,
}

/// A chunk returned from a similarity search, carrying retrieval scores.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub document_id: Uuid,
    pub chunk_index: i64,
    pub content: String,
    pub metadata: Json,
    pub score: f32,
    pub vector_similarity: f32,
    pub lexical_score: f32,
    pub combined_score: f32,
    /// The chunk's own embedding, used for MMR diversification against
    /// already-selected chunks. Empty when the source query (e.g. the
    /// hybrid SQL fallback) doesn't return it back.
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Running,
    Succeeded,
    Failed,
    PartialSuccess,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Running => "running",
            SyncState::Succeeded => "succeeded",
            SyncState::Failed => "failed",
            SyncState::PartialSuccess => "partial_success",
        }
    }
}

impl std::str::FromStr for SyncState {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SyncState::Idle),
            "running" => Ok(SyncState::Running),
            "succeeded" | "success" => Ok(SyncState::Succeeded),
            "failed" => Ok(SyncState::Failed),
            "partial_success" => Ok(SyncState::PartialSuccess),
            other => Err(crate::error::CoreError::Internal(format!(
                "unknown sync state: {other}"
            ))),
        }
    }
}

/// Snapshot of the singleton sync job row.
#[derive(Debug, Clone, Serialize)]
pub struct SyncJobStatus {
    pub job_name: String,
    pub state: String,
    pub trigger_source: Option<String>,
    pub triggered_by: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub runtime_seconds: Option<f64>,
    pub result: Option<Json>,
    pub error: Option<String>,
}

/// An item processed within a single sync run, fed to the logger.
#[derive(Debug, Clone)]
pub struct SyncItemResult {
    pub item_type: ItemType,
    pub item_url: Option<String>,
    pub item_source: Option<String>,
    pub document_title: Option<String>,
    pub document_filename: Option<String>,
    pub document_id: Option<Uuid>,
    pub success: bool,
    pub error_message: Option<String>,
    pub file_size: Option<i64>,
    pub metadata: Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Document,
    Website,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Document => "document",
            ItemType::Website => "website",
        }
    }
}
