//! Just-in-time CDN URL refresh.
//!
//! A refreshed URL is persisted back to the chunk row so concurrent readers
//! pick it up; a reader racing the update sees either URL and both are valid
//! refresh starting points. Refresh failures are logged and non-fatal here;
//! the fetch below decides whether to retry or escalate.

use std::time::Duration;

use neko_core::models::ChunkRecord;
use neko_db::ChunkRepository;
use neko_store::{expiry, DiscordStore};

/// Return a URL for the chunk that is fresh for at least `margin`,
/// refreshing and persisting if needed. Falls back to the stored URL when
/// every refresh path fails.
pub async fn ensure_fresh_url(
    store: &DiscordStore,
    chunks: &ChunkRepository,
    chunk: &ChunkRecord,
    margin: Duration,
) -> String {
    if !expiry::expires_within(&chunk.url, margin) {
        return chunk.url.clone();
    }
    force_refresh(store, chunks, chunk)
        .await
        .unwrap_or_else(|| chunk.url.clone())
}

/// Refresh the chunk's URL unconditionally: bulk refresh first, then a JIT
/// message lookup on the chunk's own channel, then on the backup channel.
pub async fn force_refresh(
    store: &DiscordStore,
    chunks: &ChunkRepository,
    chunk: &ChunkRecord,
) -> Option<String> {
    let mut refreshed = bulk_refresh(store, chunk).await;
    if refreshed.is_none() {
        refreshed = jit_refresh(store, chunk, &chunk.channel_id).await;
    }
    if refreshed.is_none() {
        if let Some(backup) = store.backup_channel() {
            if backup != chunk.channel_id {
                refreshed = jit_refresh(store, chunk, backup).await;
            }
        }
    }

    let url = refreshed?;
    if let Err(e) = chunks.update_url(&chunk.file_id, chunk.idx, &url).await {
        tracing::warn!(
            error = %e,
            file_id = %chunk.file_id,
            idx = chunk.idx,
            "failed to persist refreshed url"
        );
    }
    Some(url)
}

async fn bulk_refresh(store: &DiscordStore, chunk: &ChunkRecord) -> Option<String> {
    match store.refresh_urls(std::slice::from_ref(&chunk.url)).await {
        Ok(mut urls) => urls.pop().flatten(),
        Err(e) => {
            tracing::warn!(error = %e, file_id = %chunk.file_id, idx = chunk.idx, "bulk url refresh failed");
            None
        }
    }
}

async fn jit_refresh(store: &DiscordStore, chunk: &ChunkRecord, channel_id: &str) -> Option<String> {
    match store.attachment_url(channel_id, &chunk.message_id).await {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(
                error = %e,
                channel_id = %channel_id,
                message_id = %chunk.message_id,
                "jit url refresh failed"
            );
            None
        }
    }
}
