pub mod discord;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use neko_core::Config;
use tempfile::TempDir;

pub use discord::MockStore;

pub const PRIMARY_CHANNEL: &str = "chan-primary";
pub const BACKUP_CHANNEL: &str = "chan-backup";

/// Test application state
pub struct TestApp {
    pub server: TestServer,
    pub discord: Arc<MockStore>,
    pub db_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

/// Setup a test application with a scratch index and a mock upstream.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with_secret(None).await
}

pub async fn setup_test_app_with_secret(api_secret: Option<String>) -> TestApp {
    let (base_url, discord) = discord::spawn_mock_discord().await;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("neko.db");

    let config = Config {
        server_port: 0,
        api_secret,
        bot_token: "test-token".to_string(),
        channel_id: PRIMARY_CHANNEL.to_string(),
        backup_channel_id: Some(BACKUP_CHANNEL.to_string()),
        database_path: db_path.clone(),
        discord_api_base: base_url,
        cors_origins: vec!["*".to_string()],
        debug: false,
    };

    let (_state, router) = neko_api::setup::initialize_app(config)
        .await
        .expect("Failed to initialize app");
    let server = TestServer::new(router).expect("Failed to start test server");

    TestApp {
        server,
        discord,
        db_path,
        _temp_dir: temp_dir,
    }
}

/// Poll until `predicate` holds, for assertions on fire-and-forget
/// background work (cleanup, snapshots).
pub async fn wait_until<F>(mut predicate: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 2s");
}

/// Init a pending upload with sane defaults.
pub async fn init_file(app: &TestApp, id: &str, name: &str, size: i64) {
    let response = app
        .client()
        .post("/api/upload/file/init")
        .json(&serde_json::json!({ "id": id, "name": name, "size": size }))
        .await;
    response.assert_status_ok();
}

/// Upload one chunk via the 1-based header.
pub async fn upload_chunk(app: &TestApp, id: &str, number_1based: u64, data: &[u8]) {
    let response = app
        .client()
        .post(&format!("/api/upload/file/{id}/chunk"))
        .add_header(
            axum::http::HeaderName::from_static("x-chunk-number"),
            axum::http::HeaderValue::from_str(&number_1based.to_string()).unwrap(),
        )
        .bytes(data.to_vec().into())
        .await;
    response.assert_status_ok();
}

pub async fn finalize(app: &TestApp, id: &str) {
    let response = app
        .client()
        .post(&format!("/api/upload/file/{id}/finalize"))
        .add_query_param("skip_backup", "true")
        .await;
    response.assert_status_ok();
}
