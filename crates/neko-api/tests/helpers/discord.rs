//! In-process mock of the Discord REST API and CDN.
//!
//! Backs the integration tests with real HTTP: multipart uploads, message
//! lookup and deletion, bulk delete, URL refresh, and a CDN route that
//! honors Range requests and rejects expired `ex` signatures with 403.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bytes::Bytes;

#[derive(Clone)]
pub struct StoredMessage {
    pub channel_id: String,
    pub content: String,
    pub filename: String,
    pub data: Bytes,
}

pub struct MockStore {
    base_url: Mutex<String>,
    next_id: AtomicU64,
    pub messages: Mutex<HashMap<String, StoredMessage>>,
    pub refresh_calls: AtomicUsize,
    pub single_delete_calls: AtomicUsize,
    pub bulk_delete_calls: AtomicUsize,
    /// When set, freshly uploaded attachments get an already-expired `ex`
    /// so the first CDN fetch fails with 403 until refreshed.
    pub expire_new_urls: AtomicBool,
}

impl MockStore {
    fn new() -> Self {
        Self {
            base_url: Mutex::new(String::new()),
            next_id: AtomicU64::new(10_000),
            messages: Mutex::new(HashMap::new()),
            refresh_calls: AtomicUsize::new(0),
            single_delete_calls: AtomicUsize::new(0),
            bulk_delete_calls: AtomicUsize::new(0),
            expire_new_urls: AtomicBool::new(false),
        }
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn cdn_url(&self, message_id: &str, expired: bool) -> String {
        let ex = if expired {
            Self::now().saturating_sub(1000)
        } else {
            Self::now() + 86_400
        };
        format!(
            "{}/cdn/{}?ex={:x}",
            self.base_url.lock().unwrap(),
            message_id,
            ex
        )
    }

    fn message_json(&self, id: &str, message: &StoredMessage, expired: bool) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "channel_id": message.channel_id,
            "content": message.content,
            "attachments": [{
                "id": id,
                "filename": message.filename,
                "size": message.data.len(),
                "url": self.cdn_url(id, expired),
            }],
        })
    }

    /// Messages currently stored in a channel.
    pub fn channel_messages(&self, channel_id: &str) -> Vec<(String, StoredMessage)> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| m.channel_id == channel_id)
            .map(|(id, m)| (id.clone(), m.clone()))
            .collect()
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

async fn create_message(
    State(store): State<Arc<MockStore>>,
    Path(channel_id): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let mut content = String::new();
    let mut filename = String::new();
    let mut data = Bytes::new();

    while let Some(field) = multipart.next_field().await.unwrap() {
        match field.name() {
            Some("payload_json") => {
                let payload: serde_json::Value =
                    serde_json::from_slice(&field.bytes().await.unwrap()).unwrap_or_default();
                if let Some(text) = payload.get("content").and_then(|c| c.as_str()) {
                    content = text.to_string();
                }
            }
            Some(name) if name.starts_with("files[") => {
                filename = field.file_name().unwrap_or("blob").to_string();
                data = field.bytes().await.unwrap();
            }
            _ => {}
        }
    }

    let id = store.next_id.fetch_add(1, Ordering::SeqCst).to_string();
    let message = StoredMessage {
        channel_id,
        content,
        filename,
        data,
    };
    let expired = store.expire_new_urls.load(Ordering::SeqCst);
    let body = store.message_json(&id, &message, expired);
    store.messages.lock().unwrap().insert(id, message);

    Json(body).into_response()
}

async fn get_message(
    State(store): State<Arc<MockStore>>,
    Path((_channel_id, message_id)): Path<(String, String)>,
) -> Response {
    let messages = store.messages.lock().unwrap();
    match messages.get(&message_id) {
        Some(message) => Json(store.message_json(&message_id, message, false)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn list_messages(
    State(store): State<Arc<MockStore>>,
    Path(channel_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let limit: usize = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(50);
    let messages = store.messages.lock().unwrap();
    let mut items: Vec<(&String, &StoredMessage)> = messages
        .iter()
        .filter(|(_, m)| m.channel_id == channel_id)
        .collect();
    // newest first, like the real API
    items.sort_by(|a, b| b.0.cmp(a.0));
    let body: Vec<serde_json::Value> = items
        .into_iter()
        .take(limit)
        .map(|(id, m)| store.message_json(id, m, false))
        .collect();
    Json(body).into_response()
}

async fn delete_message(
    State(store): State<Arc<MockStore>>,
    Path((_channel_id, message_id)): Path<(String, String)>,
) -> StatusCode {
    store.single_delete_calls.fetch_add(1, Ordering::SeqCst);
    if store.messages.lock().unwrap().remove(&message_id).is_some() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn bulk_delete(
    State(store): State<Arc<MockStore>>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    store.bulk_delete_calls.fetch_add(1, Ordering::SeqCst);
    let ids: Vec<String> = serde_json::from_value(body["messages"].clone()).unwrap_or_default();
    let mut messages = store.messages.lock().unwrap();
    for id in ids {
        messages.remove(&id);
    }
    StatusCode::NO_CONTENT
}

async fn refresh_urls(
    State(store): State<Arc<MockStore>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    store.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let urls: Vec<String> =
        serde_json::from_value(body["attachment_urls"].clone()).unwrap_or_default();
    let messages = store.messages.lock().unwrap();

    let refreshed: Vec<serde_json::Value> = urls
        .iter()
        .filter_map(|original| {
            let id = original.split("/cdn/").nth(1)?.split('?').next()?;
            if !messages.contains_key(id) {
                return None;
            }
            Some(serde_json::json!({
                "original": original,
                "refreshed": store.cdn_url(id, false),
            }))
        })
        .collect();

    Json(serde_json::json!({ "refreshed_urls": refreshed })).into_response()
}

async fn cdn(
    State(store): State<Arc<MockStore>>,
    Path(message_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let fresh = params
        .get("ex")
        .and_then(|v| u64::from_str_radix(v, 16).ok())
        .map(|ex| ex > MockStore::now())
        .unwrap_or(false);
    if !fresh {
        return StatusCode::FORBIDDEN.into_response();
    }

    let data = match store.messages.lock().unwrap().get(&message_id) {
        Some(m) => m.data.clone(),
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    if let Some(range) = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.split_once('-'))
    {
        let start: usize = range.0.parse().unwrap_or(0);
        let end: usize = range
            .1
            .parse::<usize>()
            .unwrap_or(data.len().saturating_sub(1))
            .min(data.len().saturating_sub(1));
        let slice = data.slice(start..=end);
        return (
            StatusCode::PARTIAL_CONTENT,
            [(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, data.len()),
            )],
            slice,
        )
            .into_response();
    }

    data.into_response()
}

async fn get_channel(Path(channel_id): Path<String>) -> Response {
    Json(serde_json::json!({ "id": channel_id })).into_response()
}

/// Spin up the mock on an ephemeral port. Returns the base URL to hand to
/// the adapter and the shared state for assertions.
pub async fn spawn_mock_discord() -> (String, Arc<MockStore>) {
    let store = Arc::new(MockStore::new());

    let app = Router::new()
        .route("/channels/:chan/messages", post(create_message).get(list_messages))
        .route("/channels/:chan/messages/bulk-delete", post(bulk_delete))
        .route(
            "/channels/:chan/messages/:mid",
            get(get_message).delete(delete_message),
        )
        .route("/attachments/refresh-urls", post(refresh_urls))
        .route("/channels/:chan", get(get_channel))
        .route("/cdn/:mid", get(cdn))
        .with_state(store.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");
    *store.base_url.lock().unwrap() = base_url.clone();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (base_url, store)
}
