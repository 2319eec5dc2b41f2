//! File listing, search, inspection, soft-delete and restore.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use neko_core::models::{FileStatus, FileWithChunks};
use neko_core::AppError;
use serde::Deserialize;

use crate::error::{ok, ErrorResponse, HttpAppError};
use crate::services::cleanup;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub status: Option<String>,
}

fn parse_status(value: Option<&str>) -> Result<FileStatus, AppError> {
    match value {
        None => Ok(FileStatus::Active),
        Some(s) => FileStatus::parse_visible(s).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Invalid status: {s}. Must be 'active' or 'trashed'"
            ))
        }),
    }
}

/// Page of files, newest first.
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    params(
        ("status" = Option<String>, Query, description = "active (default) or trashed"),
        ("limit" = Option<i64>, Query, description = "Page size, max 200"),
        ("offset" = Option<i64>, Query, description = "Page offset")
    ),
    responses(
        (status = 200, description = "Files plus total count"),
        (status = 400, description = "Invalid status", body = ErrorResponse)
    )
)]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let status = parse_status(query.status.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let page = state.files.list_files(status, limit, offset).await?;
    Ok(ok(page))
}

/// Prefix search over file names.
#[utoipa::path(
    get,
    path = "/api/files/search",
    tag = "files",
    params(
        ("q" = String, Query, description = "Name prefix to search for"),
        ("status" = Option<String>, Query, description = "active (default) or trashed")
    ),
    responses(
        (status = 200, description = "Matching files"),
        (status = 400, description = "Missing query", body = ErrorResponse)
    )
)]
pub async fn search_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let q = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Search query is required".to_string()))?;
    let status = parse_status(query.status.as_deref())?;

    let files = state.files.search_files(q, status).await?;
    Ok(ok(files))
}

/// File metadata plus its full chunk list.
#[utoipa::path(
    get,
    path = "/api/files/{id}",
    tag = "files",
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "File with chunks", body = FileWithChunks),
        (status = 404, description = "Unknown file", body = ErrorResponse)
    )
)]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let file = state
        .files
        .get_file(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
    let chunks = state.chunks.get_chunks(&id).await?;
    Ok(ok(FileWithChunks { file, chunks }))
}

/// Bring a trashed file back to active. Idempotent.
#[utoipa::path(
    post,
    path = "/api/files/{id}/restore",
    tag = "files",
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "File restored"),
        (status = 404, description = "Unknown file", body = ErrorResponse)
    )
)]
pub async fn restore_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    if !state.files.set_status(&id, FileStatus::Active).await? {
        return Err(AppError::NotFound("File not found".to_string()).into());
    }
    tracing::info!(file_id = %id, "file restored");
    Ok(ok(serde_json::json!({ "id": id, "status": "active" })))
}

/// Two-stage delete: active files are trashed; trashed files are removed
/// for good and their external records scheduled for bulk deletion.
#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    tag = "files",
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "File trashed or permanently deleted"),
        (status = 404, description = "Unknown file", body = ErrorResponse)
    )
)]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let file = state
        .files
        .get_file(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    match file.status {
        FileStatus::Active => {
            state.files.set_status(&id, FileStatus::Trashed).await?;
            tracing::info!(file_id = %id, "file trashed");
            Ok(ok(serde_json::json!({ "id": id, "status": "trashed" })))
        }
        FileStatus::Trashed => {
            let message_ids = state.chunks.message_ids_for(&id).await?;
            state.files.delete_file(&id).await?;
            let count = message_ids.len();
            cleanup::schedule_bulk_delete(
                state.store.clone(),
                state.store.primary_channel().to_string(),
                message_ids,
            );
            tracing::info!(file_id = %id, chunks = count, "file permanently deleted");
            Ok(ok(serde_json::json!({ "id": id, "deleted": true })))
        }
        // pending rows belong to the upload engine, not the files API
        FileStatus::Pending => {
            Err(AppError::NotFound("File not found".to_string()).into())
        }
    }
}

/// Permanently delete everything in the trash.
#[utoipa::path(
    delete,
    path = "/api/files/trash",
    tag = "files",
    responses((status = 200, description = "Trash emptied"))
)]
pub async fn empty_trash(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let (purged, message_ids) = state.files.purge_status(FileStatus::Trashed).await?;

    cleanup::schedule_bulk_delete(
        state.store.clone(),
        state.store.primary_channel().to_string(),
        message_ids,
    );

    tracing::info!(purged = purged, "trash emptied");
    Ok(ok(serde_json::json!({ "purged": purged })))
}
