//! Resumable upload endpoints: init, chunk write, discovery, finalize,
//! abort, and pending purge.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use neko_core::models::{FileStatus, NewFile};
use neko_core::AppError;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{ok, upstream_error, ErrorResponse, HttpAppError};
use crate::services::{backup, cleanup};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct FinalizeQuery {
    #[serde(default)]
    pub skip_backup: Option<bool>,
}

/// Start (or restart) an upload session for a file id.
#[utoipa::path(
    post,
    path = "/api/upload/file/init",
    tag = "upload",
    request_body = NewFile,
    responses(
        (status = 200, description = "Pending file created"),
        (status = 400, description = "Invalid metadata", body = ErrorResponse),
        (status = 409, description = "File id already active", body = ErrorResponse)
    )
)]
pub async fn init_upload(
    State(state): State<Arc<AppState>>,
    Json(meta): Json<NewFile>,
) -> Result<impl IntoResponse, HttpAppError> {
    if meta.id.trim().is_empty() {
        return Err(AppError::InvalidInput("File id is required".to_string()).into());
    }
    if meta.name.trim().is_empty() {
        return Err(AppError::InvalidInput("File name is required".to_string()).into());
    }
    if meta.size < 0 {
        return Err(AppError::InvalidInput("File size must be >= 0".to_string()).into());
    }

    state.files.create_file(&meta).await?;

    tracing::info!(file_id = %meta.id, name = %meta.name, size = meta.size, "upload session started");
    Ok(ok(serde_json::json!({ "id": meta.id })))
}

/// Header parse: `Content-Range: bytes start-end/total` -> start.
fn content_range_start(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = rest.split_once('-')?;
    start.trim().parse().ok()
}

/// Resolve the 0-based chunk index for a write.
///
/// Preference order: explicit `X-Chunk-Number` (1-based), then a byte
/// `Content-Range` divided by the stored size of chunk 0, else 0. Deriving
/// an index from `Content-Range` without chunk 0 present would be a guess,
/// so it is rejected.
async fn resolve_chunk_index(
    state: &AppState,
    file_id: &str,
    headers: &HeaderMap,
) -> Result<i64, HttpAppError> {
    if let Some(value) = headers.get("X-Chunk-Number").and_then(|v| v.to_str().ok()) {
        let number: i64 = value.trim().parse().map_err(|_| {
            AppError::InvalidInput(format!("Invalid X-Chunk-Number: {value}"))
        })?;
        if number < 1 {
            return Err(
                AppError::InvalidInput("X-Chunk-Number is 1-based".to_string()).into(),
            );
        }
        return Ok(number - 1);
    }

    if let Some(value) = headers.get("Content-Range").and_then(|v| v.to_str().ok()) {
        let start = content_range_start(value).ok_or_else(|| {
            AppError::InvalidInput(format!("Invalid Content-Range: {value}"))
        })?;
        if start == 0 {
            return Ok(0);
        }
        let chunk0 = state.chunks.get_chunk(file_id, 0).await?.ok_or_else(|| {
            AppError::InvalidInput(
                "Cannot derive chunk index from Content-Range before chunk 0 is uploaded"
                    .to_string(),
            )
        })?;
        return Ok((start / chunk0.size as u64) as i64);
    }

    Ok(0)
}

/// Store one chunk. The external upload happens first; the index row is
/// written only afterwards, and only if the upload session still exists.
#[utoipa::path(
    post,
    path = "/api/upload/file/{id}/chunk",
    tag = "upload",
    params(
        ("id" = String, Path, description = "File id"),
        ("X-Chunk-Number" = Option<i64>, Header, description = "1-based chunk number")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Chunk stored"),
        (status = 400, description = "Empty body or unresolvable index", body = ErrorResponse),
        (status = 404, description = "No pending upload for this id", body = ErrorResponse),
        (status = 502, description = "External store rejected the upload", body = ErrorResponse)
    )
)]
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    if body.is_empty() {
        return Err(AppError::InvalidInput("Empty chunk body".to_string()).into());
    }

    match state.files.get_file(&id).await? {
        Some(file) if file.status == FileStatus::Pending => {}
        _ => {
            return Err(
                AppError::NotFound("No pending upload for this file".to_string()).into(),
            )
        }
    }

    let idx = resolve_chunk_index(&state, &id, &headers).await?;

    // Idempotent overwrite: drop the displaced row first and queue its
    // external record for deletion.
    if let Some(old) = state.chunks.take_chunk(&id, idx).await? {
        tracing::debug!(file_id = %id, idx = idx, message_id = %old.message_id, "replacing existing chunk");
        cleanup::schedule_delete(state.store.clone(), old.channel_id, old.message_id);
    }

    let channel = state.store.primary_channel().to_string();
    let filename = format!("{id}.{idx}");
    let uploaded = state
        .store
        .upload(&channel, &filename, body)
        .await
        .map_err(upstream_error)?;

    // The session may have been aborted while the upload was in flight; in
    // that case the fresh external record must not leak.
    let stored = state
        .chunks
        .put_chunk_if_pending(
            &id,
            idx,
            &uploaded.message_id,
            &channel,
            uploaded.size as i64,
            &uploaded.url,
        )
        .await?;

    if !stored {
        tracing::info!(file_id = %id, idx = idx, "upload aborted mid-chunk, scheduling orphan cleanup");
        cleanup::schedule_delete(state.store.clone(), channel, uploaded.message_id);
        return Err(AppError::NotFound("Upload aborted".to_string()).into());
    }

    tracing::debug!(file_id = %id, idx = idx, message_id = %uploaded.message_id, size = uploaded.size, "chunk stored");
    Ok(ok(serde_json::json!({ "messageId": uploaded.message_id })))
}

/// Sorted list of chunk indices already stored, for resume.
#[utoipa::path(
    get,
    path = "/api/upload/file/{id}/chunks",
    tag = "upload",
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "Stored chunk indices"),
        (status = 404, description = "Unknown file", body = ErrorResponse)
    )
)]
pub async fn list_uploaded_chunks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    if state.files.get_file(&id).await?.is_none() {
        return Err(AppError::NotFound("File not found".to_string()).into());
    }
    let indices = state.chunks.chunk_indices(&id).await?;
    Ok(ok(serde_json::json!({ "chunks": indices })))
}

/// Promote a pending upload to an active file.
#[utoipa::path(
    post,
    path = "/api/upload/file/{id}/finalize",
    tag = "upload",
    params(
        ("id" = String, Path, description = "File id"),
        ("skip_backup" = Option<bool>, Query, description = "Skip the post-finalize snapshot")
    ),
    responses(
        (status = 200, description = "File is now active"),
        (status = 404, description = "Unknown file", body = ErrorResponse)
    )
)]
pub async fn finalize_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<FinalizeQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    if !state.files.set_status(&id, FileStatus::Active).await? {
        return Err(AppError::NotFound("File not found".to_string()).into());
    }

    if let Err(e) = state.files.vacuum().await {
        tracing::warn!(error = %e, "post-finalize vacuum failed");
    }

    if !query.skip_backup.unwrap_or(false) {
        backup::schedule_snapshot(state.clone());
    }

    tracing::info!(file_id = %id, "upload finalized");
    Ok(ok(serde_json::json!({ "id": id, "status": "active" })))
}

/// Drop a pending upload and schedule cleanup of its external records.
/// Safe to call repeatedly.
#[utoipa::path(
    post,
    path = "/api/upload/file/{id}/abort",
    tag = "upload",
    params(("id" = String, Path, description = "File id")),
    responses((status = 200, description = "Upload aborted"))
)]
pub async fn abort_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Some(file) = state.files.get_file(&id).await? else {
        return Ok(ok(serde_json::json!({ "aborted": true })));
    };
    if file.status != FileStatus::Pending {
        return Err(AppError::Conflict("File is not pending".to_string()).into());
    }

    let message_ids = state.chunks.message_ids_for(&id).await?;
    state.files.delete_file(&id).await?;

    let count = message_ids.len();
    cleanup::schedule_bulk_delete(
        state.store.clone(),
        state.store.primary_channel().to_string(),
        message_ids,
    );

    tracing::info!(file_id = %id, chunks = count, "upload aborted");
    Ok(ok(serde_json::json!({ "aborted": true })))
}

/// Purge every pending upload session.
#[utoipa::path(
    delete,
    path = "/api/upload/file/pending/all",
    tag = "upload",
    responses((status = 200, description = "Pending uploads purged"))
)]
pub async fn purge_pending(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let (purged, message_ids) = state.files.purge_status(FileStatus::Pending).await?;

    cleanup::schedule_bulk_delete(
        state.store.clone(),
        state.store.primary_channel().to_string(),
        message_ids,
    );

    tracing::info!(purged = purged, "pending uploads purged");
    Ok(ok(serde_json::json!({ "purged": purged })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_start() {
        assert_eq!(content_range_start("bytes 0-8388607/20971520"), Some(0));
        assert_eq!(
            content_range_start("bytes 8388608-16777215/20971520"),
            Some(8388608)
        );
        assert_eq!(content_range_start("bytes */20971520"), None);
        assert_eq!(content_range_start("garbage"), None);
    }
}
