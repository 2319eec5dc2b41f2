//! OpenAPI documentation, served at `/api/openapi.json`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use neko_core::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "neko API",
        description = "Content-addressable object storage over a chat-service attachment store: chunked resumable uploads, range-aware streaming, soft delete and index snapshots."
    ),
    paths(
        // Upload
        handlers::upload::init_upload,
        handlers::upload::upload_chunk,
        handlers::upload::list_uploaded_chunks,
        handlers::upload::finalize_upload,
        handlers::upload::abort_upload,
        handlers::upload::purge_pending,
        // Files
        handlers::files::list_files,
        handlers::files::search_files,
        handlers::files::get_file,
        handlers::files::restore_file,
        handlers::files::delete_file,
        handlers::files::empty_trash,
        // Download & stream
        handlers::download::download_file,
        handlers::stream::stream_file,
        // System
        handlers::system::health,
        handlers::system::stats,
        handlers::system::trigger_backup,
    ),
    components(schemas(
        models::NewFile,
        models::FileRecord,
        models::FileStatus,
        models::ChunkRecord,
        models::FileWithChunks,
        models::FilePage,
        models::IndexStats,
        error::ErrorResponse,
    )),
    tags(
        (name = "upload", description = "Resumable chunked uploads"),
        (name = "files", description = "File lifecycle and search"),
        (name = "download", description = "Download and range streaming"),
        (name = "system", description = "Health, stats and snapshots")
    )
)]
pub struct ApiDoc;
