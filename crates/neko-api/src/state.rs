//! Application state shared by every handler.

use std::time::Instant;

use neko_core::Config;
use neko_db::{ChunkRepository, FileRepository};
use neko_store::DiscordStore;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

/// Cached result of the upstream health probe. Refreshed lazily by the
/// health endpoint once the TTL lapses.
#[derive(Debug, Clone)]
pub struct UpstreamHealth {
    pub checked_at: Instant,
    pub reachable: bool,
    pub latency_ms: u64,
}

pub struct AppState {
    pub config: Config,
    pub pool: SqlitePool,
    pub files: FileRepository,
    pub chunks: ChunkRepository,
    pub store: DiscordStore,
    pub started_at: Instant,
    pub upstream_health: RwLock<Option<UpstreamHealth>>,
}

impl AppState {
    pub fn new(config: Config, pool: SqlitePool, store: DiscordStore) -> Self {
        Self {
            files: FileRepository::new(pool.clone()),
            chunks: ChunkRepository::new(pool.clone()),
            pool,
            store,
            config,
            started_at: Instant::now(),
            upstream_health: RwLock::new(None),
        }
    }
}

fn _assert_app_state_send_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<AppState>();
    assert_sync::<AppState>();
}
