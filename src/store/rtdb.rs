use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    DocumentStore, SnapshotEvent, SnapshotHandler, StoreError, Subscription, merge_at, segments,
    set_at,
};

/// Realtime-database client over its REST interface.
///
/// Reads and writes map to `GET`/`PUT`/`PATCH` on `{base}/{path}.json`;
/// subscriptions hold an `text/event-stream` response open and fold its
/// `put`/`patch` events into a locally kept copy of the subtree.
#[derive(Clone)]
pub struct RtdbDocumentStore {
    client: reqwest::Client,
    base_url: Arc<Url>,
    auth: Option<String>,
}

impl RtdbDocumentStore {
    pub fn new(mut base_url: Url, auth: Option<String>) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            client: reqwest::Client::new(),
            base_url: Arc::new(base_url),
            auth,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        let mut url = self
            .base_url
            .join(&format!("{}.json", segments(path).join("/")))?;
        if let Some(auth) = &self.auth {
            url.query_pairs_mut().append_pair("auth", auth);
        }
        Ok(url)
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        #[derive(Deserialize)]
        struct ErrorBody {
            error: String,
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl DocumentStore for RtdbDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let response = self.client.get(self.endpoint(path)?).send().await?;
        let value: Value = Self::checked(response).await?.json().await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        debug!(path, "rtdb set");
        let response = self
            .client
            .put(self.endpoint(path)?)
            .json(&value)
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        debug!(path, fields = fields.len(), "rtdb update");
        let response = self
            .client
            .patch(self.endpoint(path)?)
            .json(&fields)
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }

    fn subscribe(&self, path: &str, handler: SnapshotHandler) -> Result<Subscription, StoreError> {
        let request = self
            .client
            .get(self.endpoint(path)?)
            .header(ACCEPT, "text/event-stream");
        let runtime = Handle::try_current().map_err(|err| StoreError::Unavailable(err.to_string()))?;
        info!(path, "opening rtdb event stream");
        let task = runtime.spawn(stream_snapshots(request, handler));
        let abort = task.abort_handle();
        Ok(Subscription::new(move || abort.abort()))
    }
}

async fn stream_snapshots(request: reqwest::RequestBuilder, handler: SnapshotHandler) {
    let response = match request.send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "rtdb event stream failed to open");
            handler(SnapshotEvent::Error(err.to_string()));
            return;
        }
    };

    let mut decoder = SseDecoder::default();
    let mut tree = Value::Null;
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(error = %err, "rtdb event stream interrupted");
                handler(SnapshotEvent::Error(err.to_string()));
                return;
            }
        };
        for message in decoder.push(&chunk) {
            match apply_message(&mut tree, &message) {
                StreamStep::Changed => {
                    handler(SnapshotEvent::Value((!tree.is_null()).then(|| tree.clone())));
                }
                StreamStep::Unchanged => {}
                StreamStep::Closed(reason) => {
                    warn!(%reason, "rtdb event stream closed by server");
                    handler(SnapshotEvent::Error(reason));
                    return;
                }
            }
        }
    }

    handler(SnapshotEvent::Error("event stream closed".into()));
}

#[derive(Debug, PartialEq)]
enum StreamStep {
    Changed,
    Unchanged,
    Closed(String),
}

#[derive(Deserialize)]
struct StreamPayload {
    path: String,
    data: Value,
}

fn apply_message(tree: &mut Value, message: &SseMessage) -> StreamStep {
    match message.event.as_str() {
        "put" | "patch" => {
            let payload: StreamPayload = match serde_json::from_str(&message.data) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, event = %message.event, "malformed rtdb stream payload");
                    return StreamStep::Unchanged;
                }
            };
            if message.event == "put" {
                set_at(tree, &payload.path, payload.data);
            } else if let Value::Object(fields) = payload.data {
                merge_at(tree, &payload.path, fields);
            }
            StreamStep::Changed
        }
        "keep-alive" => StreamStep::Unchanged,
        "cancel" => StreamStep::Closed("subscription cancelled: permission denied".into()),
        "auth_revoked" => StreamStep::Closed("subscription cancelled: credential expired".into()),
        other => {
            debug!(event = other, "ignoring rtdb stream event");
            StreamStep::Unchanged
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SseMessage {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` decoder; chunks may split lines anywhere.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);
        let mut messages = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                messages.extend(self.dispatch());
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        messages
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        if event.is_none() && self.data.is_empty() {
            return None;
        }
        Some(SseMessage {
            event: event.unwrap_or_else(|| "message".into()),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}
