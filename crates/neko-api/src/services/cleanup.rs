//! Fire-and-forget cleanup of external records.
//!
//! Failures are logged and never surfaced; anything missed here is swept by
//! the next Abort or pending purge.

use neko_store::DiscordStore;

/// Delete one message in the background (displaced chunk overwrites, the
/// post-upload abort race).
pub fn schedule_delete(store: DiscordStore, channel_id: String, message_id: String) {
    tokio::spawn(async move {
        if let Err(e) = store.delete_message(&channel_id, &message_id).await {
            tracing::warn!(
                error = %e,
                channel_id = %channel_id,
                message_id = %message_id,
                "background delete failed"
            );
        }
    });
}

/// Bulk-delete many messages in the background (abort, purge, trash empty).
pub fn schedule_bulk_delete(store: DiscordStore, channel_id: String, message_ids: Vec<String>) {
    if message_ids.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let count = message_ids.len();
        if let Err(e) = store.bulk_delete(&channel_id, &message_ids).await {
            tracing::warn!(
                error = %e,
                channel_id = %channel_id,
                count = count,
                "background bulk delete failed"
            );
        } else {
            tracing::debug!(channel_id = %channel_id, count = count, "bulk delete scheduled work done");
        }
    });
}
