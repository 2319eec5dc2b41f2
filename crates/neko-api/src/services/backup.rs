//! Circular index snapshots.
//!
//! The newest snapshot is the only one meant to survive: before uploading,
//! marker-prefixed messages among the recent backup-channel history are
//! deleted best-effort.

use std::sync::Arc;

use neko_core::constants::{BACKUP_MARKER, BACKUP_SCAN_LIMIT};
use neko_core::AppError;

use crate::error::upstream_error;
use crate::state::AppState;

/// Snapshot the index file to the backup channel, pruning prior snapshots.
pub async fn snapshot_index(state: &AppState) -> Result<(), AppError> {
    let Some(channel) = state.config.backup_channel_id.clone() else {
        return Err(AppError::InvalidInput(
            "No backup channel configured".to_string(),
        ));
    };

    // Fold the WAL into the main file so the snapshot is self-contained.
    sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
        .execute(&state.pool)
        .await?;

    let data = tokio::fs::read(&state.config.database_path).await?;

    match state.store.recent_messages(&channel, BACKUP_SCAN_LIMIT).await {
        Ok(messages) => {
            for message in messages {
                if message.content.starts_with(BACKUP_MARKER) {
                    if let Err(e) = state.store.delete_message(&channel, &message.id).await {
                        tracing::warn!(error = %e, message_id = %message.id, "failed to prune old snapshot");
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to list backup channel, skipping prune");
        }
    }

    let content = format!(
        "{} {}",
        BACKUP_MARKER,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    let uploaded = state
        .store
        .upload_with_content(&channel, &content, "neko.db", data.into())
        .await
        .map_err(upstream_error)?;

    tracing::info!(
        message_id = %uploaded.message_id,
        size = uploaded.size,
        "index snapshot uploaded"
    );
    Ok(())
}

/// Post-finalize snapshot: runs in the background, failures are logged and
/// swallowed. A missing backup channel just skips the snapshot.
pub fn schedule_snapshot(state: Arc<AppState>) {
    if state.config.backup_channel_id.is_none() {
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = snapshot_index(&state).await {
            tracing::warn!(error = %e, "background index snapshot failed");
        }
    });
}
