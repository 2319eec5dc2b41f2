//! Application assembly: database, adapter, routes, server.

pub mod database;
pub mod routes;
pub mod server;

use std::sync::Arc;

use axum::Router;
use neko_core::Config;
use neko_store::DiscordStore;

use crate::state::AppState;

/// Wire up the database, the store adapter and the router.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, Router), anyhow::Error> {
    let pool = database::setup_database(&config).await?;

    let store = DiscordStore::new(
        &config.discord_api_base,
        &config.bot_token,
        &config.channel_id,
        config.backup_channel_id.clone(),
    );

    let state = Arc::new(AppState::new(config, pool, store));
    let router = routes::build_router(state.clone());
    Ok((state, router))
}
