//! Route configuration and setup

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{delete, get, post},
    Json, Router,
};
use neko_core::constants::CHUNK_SIZE;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::auth::{auth_middleware, AuthState};
use crate::handlers::{download, files, stream, system, upload};
use crate::state::AppState;

/// One chunk plus headroom for request overhead.
const MAX_BODY_BYTES: usize = (CHUNK_SIZE as usize) + 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    let auth_state = Arc::new(AuthState {
        secret: state.config.api_secret.clone(),
    });
    let cors = setup_cors(&state.config.cors_origins);

    let public_routes = Router::new()
        .route("/api/system/health", get(system::health))
        .route(
            "/api/openapi.json",
            get(|| async { Json(crate::api_doc::ApiDoc::openapi()) }),
        );

    let protected_routes = Router::new()
        .route("/api/upload/file/init", post(upload::init_upload))
        .route(
            "/api/upload/file/pending/all",
            delete(upload::purge_pending),
        )
        .route("/api/upload/file/:id/chunk", post(upload::upload_chunk))
        .route(
            "/api/upload/file/:id/chunks",
            get(upload::list_uploaded_chunks),
        )
        .route(
            "/api/upload/file/:id/finalize",
            post(upload::finalize_upload),
        )
        .route("/api/upload/file/:id/abort", post(upload::abort_upload))
        .route("/api/files", get(files::list_files))
        .route("/api/files/search", get(files::search_files))
        .route("/api/files/trash", delete(files::empty_trash))
        .route(
            "/api/files/:id",
            get(files::get_file).delete(files::delete_file),
        )
        .route("/api/files/:id/restore", post(files::restore_file))
        .route("/api/download/:id", get(download::download_file))
        .route("/api/stream/file/:id", get(stream::stream_file))
        .route("/api/system/stats", get(system::stats))
        .route("/api/system/backup", post(system::trigger_backup))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ));

    public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn setup_cors(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any)
    }
}
