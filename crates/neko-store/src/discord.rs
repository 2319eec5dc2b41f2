use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use neko_core::constants::{
    BULK_DELETE_BATCH, SINGLE_DELETE_CONCURRENCY, SINGLE_DELETE_WAVE_PAUSE, URL_REFRESH_BATCH,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{StoreError, StoreResult};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// One attachment message as stored externally.
#[derive(Debug, Clone)]
pub struct StoredAttachment {
    pub message_id: String,
    pub url: String,
    pub size: u64,
}

/// Id + content of a channel message, enough for snapshot pruning.
#[derive(Debug, Clone)]
pub struct MessageSummary {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    url: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct RefreshedUrl {
    original: String,
    refreshed: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    refreshed_urls: Vec<RefreshedUrl>,
}

/// Client for the Discord REST API and CDN.
///
/// Channel ids are explicit parameters on every call; the struct only
/// remembers which channel is the primary write target and which (if any)
/// serves as the backup/refresh fallback.
#[derive(Clone)]
pub struct DiscordStore {
    http: Client,
    api_base: String,
    token: String,
    primary_channel: String,
    backup_channel: Option<String>,
}

impl DiscordStore {
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        primary_channel: impl Into<String>,
        backup_channel: Option<String>,
    ) -> Self {
        let http = Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            api_base: api_base.into(),
            token: token.into(),
            primary_channel: primary_channel.into(),
            backup_channel,
        }
    }

    pub fn primary_channel(&self) -> &str {
        &self.primary_channel
    }

    pub fn backup_channel(&self) -> Option<&str> {
        self.backup_channel.as_deref()
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/messages", self.api_base, channel_id)
    }

    /// Non-2xx responses become `Upstream` with the (truncated) body.
    async fn check(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        body.truncate(512);
        Err(StoreError::Upstream {
            status: status.as_u16(),
            body,
        })
    }

    /// Upload a blob as an attachment message. Returns the created message
    /// id, the CDN URL, and the stored size.
    pub async fn upload(
        &self,
        channel_id: &str,
        filename: &str,
        data: Bytes,
    ) -> StoreResult<StoredAttachment> {
        self.post_attachment(channel_id, None, filename, data).await
    }

    /// Upload a blob with message text, used for index snapshots whose
    /// content carries the marker + timestamp.
    pub async fn upload_with_content(
        &self,
        channel_id: &str,
        content: &str,
        filename: &str,
        data: Bytes,
    ) -> StoreResult<StoredAttachment> {
        self.post_attachment(channel_id, Some(content), filename, data)
            .await
    }

    async fn post_attachment(
        &self,
        channel_id: &str,
        content: Option<&str>,
        filename: &str,
        data: Bytes,
    ) -> StoreResult<StoredAttachment> {
        let size = data.len() as u64;
        let payload = match content {
            Some(text) => serde_json::json!({ "content": text }).to_string(),
            None => "{}".to_string(),
        };

        let part = Part::stream_with_length(reqwest::Body::from(data), size)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| StoreError::InvalidResponse(format!("invalid mime: {e}")))?;
        let form = Form::new().text("payload_json", payload).part("files[0]", part);

        let response = self
            .http
            .post(self.messages_url(channel_id))
            .header("Authorization", self.auth())
            .multipart(form)
            .send()
            .await?;
        let message: Message = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(format!("malformed message: {e}")))?;

        let attachment = message.attachments.into_iter().next().ok_or_else(|| {
            StoreError::InvalidResponse("message created without attachment".to_string())
        })?;

        tracing::debug!(
            channel_id = %channel_id,
            message_id = %message.id,
            size = size,
            "uploaded attachment"
        );

        Ok(StoredAttachment {
            message_id: message.id,
            url: attachment.url,
            size: attachment.size,
        })
    }

    /// Delete one message. A 404 means the message is already gone and is
    /// treated as success.
    pub async fn delete_message(&self, channel_id: &str, message_id: &str) -> StoreResult<()> {
        let url = format!("{}/{}", self.messages_url(channel_id), message_id);
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    /// Delete many messages, batching through the bulk endpoint.
    ///
    /// A rejected batch (typically: some messages are past the 14-day bulk
    /// cutoff) falls back to single deletes with bounded concurrency and a
    /// pause between waves. Individual failures are logged and swallowed;
    /// the operation is best-effort by contract.
    pub async fn bulk_delete(&self, channel_id: &str, message_ids: &[String]) -> StoreResult<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        if message_ids.len() == 1 {
            return self.delete_message(channel_id, &message_ids[0]).await;
        }

        for batch in message_ids.chunks(BULK_DELETE_BATCH) {
            if batch.len() == 1 {
                if let Err(e) = self.delete_message(channel_id, &batch[0]).await {
                    tracing::warn!(error = %e, "single delete failed");
                }
                continue;
            }

            let response = self
                .http
                .post(format!("{}/bulk-delete", self.messages_url(channel_id)))
                .header("Authorization", self.auth())
                .json(&serde_json::json!({ "messages": batch }))
                .send()
                .await?;

            if response.status().is_success() {
                continue;
            }

            let status = response.status();
            tracing::warn!(
                status = %status,
                batch_len = batch.len(),
                "bulk delete rejected, falling back to single deletes"
            );

            for wave in batch.chunks(SINGLE_DELETE_CONCURRENCY) {
                stream::iter(wave)
                    .for_each_concurrent(SINGLE_DELETE_CONCURRENCY, |id| async move {
                        if let Err(e) = self.delete_message(channel_id, id).await {
                            tracing::warn!(error = %e, message_id = %id, "single delete failed");
                        }
                    })
                    .await;
                tokio::time::sleep(SINGLE_DELETE_WAVE_PAUSE).await;
            }
        }

        Ok(())
    }

    /// Refresh expired attachment URLs. The result is parallel to the
    /// input; entries the store did not refresh come back as `None`.
    pub async fn refresh_urls(&self, urls: &[String]) -> StoreResult<Vec<Option<String>>> {
        let mut refreshed: HashMap<String, String> = HashMap::with_capacity(urls.len());

        for batch in urls.chunks(URL_REFRESH_BATCH) {
            let response = self
                .http
                .post(format!("{}/attachments/refresh-urls", self.api_base))
                .header("Authorization", self.auth())
                .json(&serde_json::json!({ "attachment_urls": batch }))
                .send()
                .await?;
            let parsed: RefreshResponse = Self::check(response)
                .await?
                .json()
                .await
                .map_err(|e| StoreError::InvalidResponse(format!("malformed refresh: {e}")))?;
            for entry in parsed.refreshed_urls {
                refreshed.insert(entry.original, entry.refreshed);
            }
        }

        Ok(urls.iter().map(|u| refreshed.get(u).cloned()).collect())
    }

    /// Just-in-time lookup of a message's current attachment URL.
    pub async fn attachment_url(&self, channel_id: &str, message_id: &str) -> StoreResult<String> {
        let url = format!("{}/{}", self.messages_url(channel_id), message_id);
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth())
            .send()
            .await?;
        let message: Message = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(format!("malformed message: {e}")))?;
        message
            .attachments
            .into_iter()
            .next()
            .map(|a| a.url)
            .ok_or_else(|| StoreError::InvalidResponse("message has no attachment".to_string()))
    }

    /// Most recent messages in a channel (id + content), newest first.
    pub async fn recent_messages(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> StoreResult<Vec<MessageSummary>> {
        let response = self
            .http
            .get(format!("{}?limit={}", self.messages_url(channel_id), limit))
            .header("Authorization", self.auth())
            .send()
            .await?;
        let messages: Vec<Message> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(format!("malformed list: {e}")))?;
        Ok(messages
            .into_iter()
            .map(|m| MessageSummary {
                id: m.id,
                content: m.content,
            })
            .collect())
    }

    /// Fetch a CDN URL, optionally with a single byte range. The response is
    /// returned unchecked so callers can apply their own retry policy to the
    /// status code.
    pub async fn fetch(
        &self,
        url: &str,
        range: Option<(u64, u64)>,
        timeout: Duration,
    ) -> StoreResult<reqwest::Response> {
        let mut request = self.http.get(url).timeout(timeout);
        if let Some((start, end)) = range {
            request = request.header("Range", format!("bytes={}-{}", start, end));
        }
        Ok(request.send().await?)
    }

    /// Round-trip latency to the primary channel endpoint.
    pub async fn ping(&self) -> StoreResult<Duration> {
        let started = Instant::now();
        let response = self
            .http
            .get(format!(
                "{}/channels/{}",
                self.api_base, self.primary_channel
            ))
            .header("Authorization", self.auth())
            .send()
            .await?;
        Self::check(response).await?;
        Ok(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Multipart, Path, State};
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct MockState {
        bulk_calls: AtomicUsize,
        bulk_deleted: AtomicUsize,
        single_deletes: AtomicUsize,
    }

    async fn create_message(mut multipart: Multipart) -> Json<serde_json::Value> {
        let mut size = 0usize;
        let mut filename = String::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            if field.name() == Some("files[0]") {
                filename = field.file_name().unwrap_or("blob").to_string();
                size = field.bytes().await.unwrap().len();
            }
        }
        Json(serde_json::json!({
            "id": "9001",
            "channel_id": "123",
            "content": "",
            "attachments": [{
                "id": "1",
                "filename": filename,
                "size": size,
                "url": "https://cdn.test/attachments/9001/blob?ex=ffffffff",
            }],
        }))
    }

    async fn bulk(
        State(state): State<Arc<MockState>>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        state.bulk_calls.fetch_add(1, Ordering::SeqCst);
        let ids: Vec<String> =
            serde_json::from_value(body["messages"].clone()).unwrap_or_default();
        // ids prefixed "old" are past the 14-day bulk cutoff
        if ids.iter().any(|id| id.starts_with("old")) {
            return StatusCode::BAD_REQUEST;
        }
        state.bulk_deleted.fetch_add(ids.len(), Ordering::SeqCst);
        StatusCode::NO_CONTENT
    }

    async fn single(
        State(state): State<Arc<MockState>>,
        Path((_chan, _mid)): Path<(String, String)>,
    ) -> StatusCode {
        state.single_deletes.fetch_add(1, Ordering::SeqCst);
        StatusCode::NO_CONTENT
    }

    async fn spawn_mock(state: Arc<MockState>) -> String {
        let app = Router::new()
            .route("/channels/:chan/messages", post(create_message))
            .route("/channels/:chan/messages/bulk-delete", post(bulk))
            .route("/channels/:chan/messages/:mid", delete(single))
            .route(
                "/attachments/refresh-urls",
                post(|Json(body): Json<serde_json::Value>| async move {
                    let urls: Vec<String> =
                        serde_json::from_value(body["attachment_urls"].clone()).unwrap();
                    let refreshed: Vec<serde_json::Value> = urls
                        .iter()
                        .map(|u| {
                            serde_json::json!({
                                "original": u,
                                "refreshed": format!("{u}&refreshed=1"),
                            })
                        })
                        .collect();
                    Json(serde_json::json!({ "refreshed_urls": refreshed }))
                }),
            )
            .route(
                "/channels/:chan",
                get(|| async { Json(serde_json::json!({ "id": "123" })) }),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn store(base: &str) -> DiscordStore {
        DiscordStore::new(base, "test-token", "123", None)
    }

    #[tokio::test]
    async fn test_upload_returns_attachment() {
        let base = spawn_mock(Arc::new(MockState::default())).await;
        let uploaded = store(&base)
            .upload("123", "a.chunk0", Bytes::from_static(b"hello world"))
            .await
            .unwrap();
        assert_eq!(uploaded.message_id, "9001");
        assert_eq!(uploaded.size, 11);
        assert!(uploaded.url.contains("ex="));
    }

    #[tokio::test]
    async fn test_bulk_delete_falls_back_to_singles() {
        let state = Arc::new(MockState::default());
        let base = spawn_mock(state.clone()).await;

        // 150 messages; 20 in the second batch are too old for bulk delete
        let mut ids: Vec<String> = (0..130).map(|i| format!("m{i}")).collect();
        ids.extend((0..20).map(|i| format!("old{i}")));

        store(&base).bulk_delete("123", &ids).await.unwrap();

        assert_eq!(state.bulk_calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.bulk_deleted.load(Ordering::SeqCst), 100);
        assert_eq!(state.single_deletes.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn test_refresh_urls_parallel_to_input() {
        let base = spawn_mock(Arc::new(MockState::default())).await;
        let urls = vec![
            "https://cdn.test/a?ex=1".to_string(),
            "https://cdn.test/b?ex=2".to_string(),
        ];
        let refreshed = store(&base).refresh_urls(&urls).await.unwrap();
        assert_eq!(refreshed.len(), 2);
        assert_eq!(
            refreshed[0].as_deref(),
            Some("https://cdn.test/a?ex=1&refreshed=1")
        );
    }

    #[tokio::test]
    async fn test_ping_measures_latency() {
        let base = spawn_mock(Arc::new(MockState::default())).await;
        let latency = store(&base).ping().await.unwrap();
        assert!(latency < Duration::from_secs(5));
    }
}
