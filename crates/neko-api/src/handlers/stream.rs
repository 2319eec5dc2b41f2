//! Range-aware streaming for media playback.
//!
//! Each request is answered from the single chunk containing the range
//! start. Media clients re-request successive ranges, so every server
//! operation stays O(1) in chunks and the upstream fetch is one pass-through
//! single-range request.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use neko_core::constants::STREAM_REFRESH_MARGIN;
use neko_core::AppError;

use crate::error::{ErrorResponse, HttpAppError};
use crate::services::refresh;
use crate::state::AppState;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Parsed `Range: bytes=start-end` (end absent for open-ended ranges).
/// Suffix ranges (`bytes=-N`) are not produced by the targeted media
/// clients and parse as `None`.
fn parse_range_header(value: &str) -> Option<(u64, Option<u64>)> {
    let range = value.trim().strip_prefix("bytes=")?;
    let (start, end) = range.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end = end.trim();
    if end.is_empty() {
        Some((start, None))
    } else {
        Some((start, end.parse().ok()))
    }
}

#[derive(Debug, PartialEq, Eq)]
struct RangeTarget {
    chunk_index: usize,
    local_start: u64,
    local_end: u64,
    actual_len: u64,
    global_end: u64,
}

/// Walk cumulative chunk sizes to find the chunk containing `start` and
/// clamp the response to it.
fn locate_range(sizes: &[i64], start: u64, end: u64) -> Option<RangeTarget> {
    let mut cumulative = 0u64;
    for (chunk_index, size) in sizes.iter().enumerate() {
        let size = *size as u64;
        if start < cumulative + size {
            let local_start = start - cumulative;
            let request_size = end - start + 1;
            let actual_len = request_size.min(size - local_start);
            return Some(RangeTarget {
                chunk_index,
                local_start,
                local_end: local_start + actual_len - 1,
                actual_len,
                global_end: start + actual_len - 1,
            });
        }
        cumulative += size;
    }
    None
}

/// Serve one byte range out of the chunk that contains its start.
#[utoipa::path(
    get,
    path = "/api/stream/file/{id}",
    tag = "download",
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 206, description = "Partial content clamped to one chunk"),
        (status = 404, description = "Unknown file", body = ErrorResponse),
        (status = 416, description = "Range start beyond file", body = ErrorResponse),
        (status = 502, description = "Upstream fetch failed", body = ErrorResponse)
    )
)]
pub async fn stream_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, HttpAppError> {
    let file = state
        .files
        .get_file(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    if file.size <= 0 {
        return Err(
            AppError::RangeNotSatisfiable("File has no streamable bytes".to_string()).into(),
        );
    }
    let size = file.size as u64;

    let (start, end) = match headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range_header)
    {
        Some((start, end)) => (start, end.unwrap_or(size - 1).min(size - 1)),
        None => (0, size - 1),
    };
    if start >= size || end < start {
        return Err(AppError::RangeNotSatisfiable(format!(
            "Requested range {start}-{end} outside file of size {size}"
        ))
        .into());
    }

    let chunks = state.chunks.get_chunks(&id).await?;
    let sizes: Vec<i64> = chunks.iter().map(|c| c.size).collect();
    let target = locate_range(&sizes, start, end).ok_or_else(|| {
        AppError::RangeNotSatisfiable(format!("No chunk contains byte {start}"))
    })?;
    let chunk = &chunks[target.chunk_index];

    let url =
        refresh::ensure_fresh_url(&state.store, &state.chunks, chunk, STREAM_REFRESH_MARGIN)
            .await;

    let upstream = state
        .store
        .fetch(
            &url,
            Some((target.local_start, target.local_end)),
            UPSTREAM_TIMEOUT,
        )
        .await?;
    if !upstream.status().is_success() {
        return Err(AppError::Upstream {
            status: upstream.status().as_u16(),
            message: "upstream range fetch failed".to_string(),
        }
        .into());
    }

    tracing::debug!(
        file_id = %id,
        chunk = target.chunk_index,
        start = start,
        global_end = target.global_end,
        len = target.actual_len,
        "serving range from single chunk"
    );

    let body = Body::from_stream(upstream.bytes_stream().map_err(std::io::Error::other));

    let response = Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(
            header::CONTENT_TYPE,
            file.mime_type
                .as_deref()
                .unwrap_or("application/octet-stream"),
        )
        .header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", start, target.global_end, file.size),
        )
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, target.actual_len)
        .body(body)
        .map_err(|e| AppError::Internal(format!("failed to build response: {e}")))?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: i64 = 1024 * 1024;

    #[test]
    fn test_parse_range_header() {
        assert_eq!(parse_range_header("bytes=0-499"), Some((0, Some(499))));
        assert_eq!(parse_range_header("bytes=9000000-"), Some((9000000, None)));
        assert_eq!(parse_range_header("bytes=abc-1"), None);
        assert_eq!(parse_range_header("items=0-1"), None);
        assert_eq!(parse_range_header("bytes=-500"), None);
    }

    #[test]
    fn test_locate_range_within_first_chunk() {
        let sizes = [8 * MIB, 8 * MIB, 4 * MIB];
        let target = locate_range(&sizes, 0, 499).unwrap();
        assert_eq!(target.chunk_index, 0);
        assert_eq!(target.local_start, 0);
        assert_eq!(target.actual_len, 500);
        assert_eq!(target.global_end, 499);
    }

    #[test]
    fn test_locate_range_open_ended_clamps_to_chunk() {
        // 20 MiB file, open-ended range from inside chunk 1 clamps to the
        // remainder of chunk 1
        let sizes = [8 * MIB, 8 * MIB, 4 * MIB];
        let target = locate_range(&sizes, 9_000_000, 20_971_519).unwrap();
        assert_eq!(target.chunk_index, 1);
        assert_eq!(target.local_start, 9_000_000 - 8_388_608);
        assert_eq!(target.actual_len, 7_777_216);
        assert_eq!(target.global_end, 16_777_215);
    }

    #[test]
    fn test_locate_range_bounded_request_not_widened() {
        let sizes = [8 * MIB, 8 * MIB, 4 * MIB];
        let target = locate_range(&sizes, 9_000_000, 11_000_000).unwrap();
        assert_eq!(target.chunk_index, 1);
        assert_eq!(target.actual_len, 2_000_001);
        assert_eq!(target.global_end, 11_000_000);
    }

    #[test]
    fn test_locate_range_chunk_boundary() {
        let sizes = [8 * MIB, 8 * MIB, 4 * MIB];
        let target = locate_range(&sizes, 8_388_608, 20_971_519).unwrap();
        assert_eq!(target.chunk_index, 1);
        assert_eq!(target.local_start, 0);
        assert_eq!(target.actual_len, 8_388_608);
    }

    #[test]
    fn test_locate_range_beyond_chunks() {
        let sizes = [8 * MIB];
        assert!(locate_range(&sizes, 9 * MIB as u64, 10 * MIB as u64).is_none());
    }
}
