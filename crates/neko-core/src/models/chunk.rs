use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// One contiguous segment of a file, stored as a single attachment message
/// in the external store.
///
/// `(file_id, idx)` is unique; chunks are never reindexed once persisted.
/// `url` is the last-known CDN URL and may be expired at any time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub file_id: String,
    pub idx: i64,
    pub message_id: String,
    pub channel_id: String,
    pub size: i64,
    pub url: String,
}

/// Aggregate counters for `/system/stats`.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub active_files: i64,
    pub trashed_files: i64,
    pub pending_files: i64,
    pub total_chunks: i64,
    pub active_bytes: i64,
    pub trashed_bytes: i64,
}
