//! Download endpoints: per-chunk proxy and full-file streaming.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use neko_core::AppError;
use serde::Deserialize;

use crate::error::{ErrorResponse, HttpAppError};
use crate::services::download;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub index: Option<i64>,
    pub start_chunk: Option<i64>,
    pub inline: Option<bool>,
}

/// Proxy one chunk (`?index=N`) or stream the whole file, optionally
/// resuming at `?start_chunk=K`.
#[utoipa::path(
    get,
    path = "/api/download/{id}",
    tag = "download",
    params(
        ("id" = String, Path, description = "File id"),
        ("index" = Option<i64>, Query, description = "Proxy a single chunk"),
        ("start_chunk" = Option<i64>, Query, description = "Start the stream at this chunk"),
        ("inline" = Option<bool>, Query, description = "Serve inline instead of as attachment")
    ),
    responses(
        (status = 200, description = "File or chunk body", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown file or chunk", body = ErrorResponse),
        (status = 502, description = "Upstream fetch failed after retries", body = ErrorResponse)
    )
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, HttpAppError> {
    let file = state
        .files
        .get_file(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
    let chunk_list = state.chunks.get_chunks(&id).await?;

    if let Some(index) = query.index {
        let chunk = chunk_list
            .iter()
            .find(|c| c.idx == index)
            .ok_or_else(|| AppError::NotFound(format!("Chunk {index} not found")))?;

        let bytes = download::fetch_chunk(&state.store, &state.chunks, chunk).await?;

        tracing::debug!(file_id = %id, idx = index, size = bytes.len(), "proxying single chunk");
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, chunk.size)
            .header(header::CACHE_CONTROL, "no-store")
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.{}\"", id, index),
            )
            .body(Body::from(bytes))
            .map_err(|e| AppError::Internal(format!("failed to build response: {e}")))?;
        return Ok(response);
    }

    let start_chunk = query.start_chunk.unwrap_or(0);
    if start_chunk < 0 || (start_chunk > 0 && start_chunk as usize >= chunk_list.len()) {
        return Err(AppError::InvalidInput(format!(
            "start_chunk {start_chunk} out of range"
        ))
        .into());
    }

    let rest: Vec<_> = chunk_list
        .into_iter()
        .filter(|c| c.idx >= start_chunk)
        .collect();
    let content_length: i64 = rest.iter().map(|c| c.size).sum();

    let kind = if query.inline.unwrap_or(false) {
        "inline"
    } else {
        "attachment"
    };
    let disposition = format!(
        "{}; filename*=UTF-8''{}",
        kind,
        urlencoding::encode(&file.name)
    );

    tracing::debug!(
        file_id = %id,
        start_chunk = start_chunk,
        chunks = rest.len(),
        content_length = content_length,
        "starting full-file stream"
    );

    let body = if rest.is_empty() {
        Body::empty()
    } else {
        Body::from_stream(download::chunk_stream(state.clone(), rest))
    };

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            file.mime_type
                .as_deref()
                .unwrap_or("application/octet-stream"),
        )
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(body)
        .map_err(|e| AppError::Internal(format!("failed to build response: {e}")))?;

    Ok(response)
}
