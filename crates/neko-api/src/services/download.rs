//! Chunk fetching and the sliding-window download pipeline.
//!
//! Chunks are written to the client in ascending index order while up to
//! `DOWNLOAD_WINDOW` fetches run ahead of the write cursor. A dropped client
//! connection closes the channel, which aborts every outstanding prefetch.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use neko_core::constants::{
    DOWNLOAD_FETCH_TIMEOUT, DOWNLOAD_MAX_ATTEMPTS, DOWNLOAD_RETRY_DELAY, DOWNLOAD_WINDOW,
};
use neko_core::models::ChunkRecord;
use neko_core::AppError;
use neko_db::ChunkRepository;
use neko_store::{expiry, DiscordStore};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use super::refresh;
use crate::error::upstream_error;
use crate::state::AppState;

/// Fetch one chunk's full body with the per-chunk retry policy:
/// up to two attempts, a forced URL refresh before any retry, an immediate
/// retry on 403/410 (expired CDN signature), and a short backoff on other
/// failures.
pub async fn fetch_chunk(
    store: &DiscordStore,
    chunks: &ChunkRepository,
    chunk: &ChunkRecord,
) -> Result<Bytes, AppError> {
    let mut url = chunk.url.clone();
    let mut last_err = AppError::Upstream {
        status: 502,
        message: "chunk fetch not attempted".to_string(),
    };

    for attempt in 1..=DOWNLOAD_MAX_ATTEMPTS {
        if attempt > 1 {
            if let Some(fresh) = refresh::force_refresh(store, chunks, chunk).await {
                url = fresh;
            }
        } else if expiry::is_expired(&url) {
            url = refresh::ensure_fresh_url(store, chunks, chunk, Duration::ZERO).await;
        }

        match store.fetch(&url, None, DOWNLOAD_FETCH_TIMEOUT).await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    match response.bytes().await {
                        Ok(bytes) => return Ok(bytes),
                        Err(e) => {
                            last_err = AppError::Upstream {
                                status: 502,
                                message: format!("body read failed: {e}"),
                            };
                        }
                    }
                } else if status == StatusCode::FORBIDDEN || status == StatusCode::GONE {
                    // expired signature; the next attempt refreshes first
                    last_err = AppError::Upstream {
                        status: status.as_u16(),
                        message: "CDN rejected the attachment URL".to_string(),
                    };
                    continue;
                } else {
                    last_err = AppError::Upstream {
                        status: status.as_u16(),
                        message: "upstream fetch failed".to_string(),
                    };
                }
            }
            Err(e) => last_err = upstream_error(e),
        }

        if attempt < DOWNLOAD_MAX_ATTEMPTS {
            tokio::time::sleep(DOWNLOAD_RETRY_DELAY).await;
        }
    }

    tracing::warn!(
        file_id = %chunk.file_id,
        idx = chunk.idx,
        error = %last_err,
        "chunk fetch exhausted retries"
    );
    Err(last_err)
}

/// Stream the bodies of `chunks` in order with sliding-window prefetch.
pub fn chunk_stream(
    state: Arc<AppState>,
    chunks: Vec<ChunkRecord>,
) -> ReceiverStream<Result<Bytes, io::Error>> {
    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(DOWNLOAD_WINDOW);
    tokio::spawn(drive_pipeline(state, chunks, tx));
    ReceiverStream::new(rx)
}

fn spawn_fetch(state: &Arc<AppState>, chunk: ChunkRecord) -> JoinHandle<Result<Bytes, AppError>> {
    let state = state.clone();
    tokio::spawn(async move { fetch_chunk(&state.store, &state.chunks, &chunk).await })
}

async fn drive_pipeline(
    state: Arc<AppState>,
    chunks: Vec<ChunkRecord>,
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
) {
    let mut inflight: VecDeque<JoinHandle<Result<Bytes, AppError>>> = VecDeque::new();
    let mut next = 0usize;

    while next < chunks.len().min(DOWNLOAD_WINDOW) {
        inflight.push_back(spawn_fetch(&state, chunks[next].clone()));
        next += 1;
    }

    while let Some(mut handle) = inflight.pop_front() {
        // keep the window full before awaiting the next chunk body
        if next < chunks.len() {
            inflight.push_back(spawn_fetch(&state, chunks[next].clone()));
            next += 1;
        }

        let joined = tokio::select! {
            // client disconnected: abandon everything
            _ = tx.closed() => {
                handle.abort();
                break;
            }
            joined = &mut handle => joined,
        };

        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(AppError::Internal(format!("fetch task failed: {e}"))),
        };

        match result {
            Ok(bytes) => {
                if tx.send(Ok(bytes)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
                break;
            }
        }
    }

    for handle in inflight {
        handle.abort();
    }
}
