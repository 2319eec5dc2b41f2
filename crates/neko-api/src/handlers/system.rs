//! Health, stats and manual snapshot endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, response::IntoResponse};
use neko_core::constants::DISCORD_HEALTH_TTL;

use crate::error::{ok, ErrorResponse, HttpAppError};
use crate::services::backup;
use crate::state::{AppState, UpstreamHealth};

/// Probe the upstream store, reusing a cached result within the TTL so the
/// health endpoint cannot be used to hammer the external API.
async fn upstream_health(state: &AppState) -> UpstreamHealth {
    {
        let cached = state.upstream_health.read().await;
        if let Some(health) = cached.as_ref() {
            if health.checked_at.elapsed() < DISCORD_HEALTH_TTL {
                return health.clone();
            }
        }
    }

    let health = match state.store.ping().await {
        Ok(latency) => UpstreamHealth {
            checked_at: Instant::now(),
            reachable: true,
            latency_ms: latency.as_millis() as u64,
        },
        Err(e) => {
            tracing::warn!(error = %e, "upstream health probe failed");
            UpstreamHealth {
                checked_at: Instant::now(),
                reachable: false,
                latency_ms: 0,
            }
        }
    };

    *state.upstream_health.write().await = Some(health.clone());
    health
}

fn process_memory_bytes() -> u64 {
    let mut system = sysinfo::System::new();
    match sysinfo::get_current_pid() {
        Ok(pid) => {
            system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
            system.process(pid).map(|p| p.memory()).unwrap_or(0)
        }
        Err(_) => 0,
    }
}

#[utoipa::path(
    get,
    path = "/api/system/health",
    tag = "system",
    responses((status = 200, description = "Service health"))
)]
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let database = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => "ok",
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            "error"
        }
    };

    let discord = upstream_health(&state).await;

    Ok(ok(serde_json::json!({
        "database": database,
        "discord": {
            "reachable": discord.reachable,
            "latencyMs": discord.latency_ms,
        },
        "uptime": state.started_at.elapsed().as_secs(),
        "memory": { "rssBytes": process_memory_bytes() },
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

#[utoipa::path(
    get,
    path = "/api/system/stats",
    tag = "system",
    responses((status = 200, description = "Index totals and on-disk size"))
)]
pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let stats = state.files.stats().await?;
    let db_size = tokio::fs::metadata(&state.config.database_path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(ok(serde_json::json!({
        "files": stats,
        "dbSizeBytes": db_size,
    })))
}

/// Trigger an index snapshot right now.
#[utoipa::path(
    post,
    path = "/api/system/backup",
    tag = "system",
    responses(
        (status = 200, description = "Snapshot uploaded"),
        (status = 400, description = "No backup channel configured", body = ErrorResponse),
        (status = 502, description = "Snapshot upload failed", body = ErrorResponse)
    )
)]
pub async fn trigger_backup(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    backup::snapshot_index(&state).await?;
    Ok(ok(serde_json::json!({ "backedUp": true })))
}
