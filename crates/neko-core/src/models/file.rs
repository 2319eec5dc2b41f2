use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::chunk::ChunkRecord;

/// Lifecycle state of a file.
///
/// `Pending` rows belong to in-progress uploads and are invisible to
/// listing/search; `Trashed` rows are soft-deleted and restorable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Active,
    Trashed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Active => "active",
            FileStatus::Trashed => "trashed",
        }
    }

    /// Parse a user-supplied status filter. Only the visible states are
    /// accepted; `pending` rows are upload bookkeeping, not user files.
    pub fn parse_visible(s: &str) -> Option<Self> {
        match s {
            "active" => Some(FileStatus::Active),
            "trashed" => Some(FileStatus::Trashed),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logical user object composed of an ordered sequence of chunks.
///
/// The server is content-blind: `iv` and `salt` are opaque strings chosen by
/// the client and stored verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    /// Stored byte count: the sum of the sizes of the file's chunks.
    pub size: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub mime_type: Option<String>,
    pub iv: Option<String>,
    pub salt: Option<String>,
    pub status: FileStatus,
    /// Creation instant, unix seconds.
    pub created_at: i64,
}

/// Metadata for a new file, as supplied by Upload-Init.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewFile {
    pub id: String,
    pub name: String,
    pub size: i64,
    #[serde(rename = "type", default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub iv: Option<String>,
    #[serde(default)]
    pub salt: Option<String>,
}

/// File metadata together with its full chunk list.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileWithChunks {
    #[serde(flatten)]
    pub file: FileRecord,
    pub chunks: Vec<ChunkRecord>,
}

/// A page of files plus the total count for the filter.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilePage {
    pub files: Vec<FileRecord>,
    pub total: i64,
}
