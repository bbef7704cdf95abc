//! Firebase Realtime Database over its REST API.
//!
//! Transactions use ETag conditional writes: the current value is fetched
//! with `X-Firebase-ETag: true` and written back with `if-match`. A 412
//! response carries the newer value and ETag, which feed the next attempt.
//! Change notification comes from the server-sent-event stream of the
//! watched path, mirrored locally so every event yields the whole document.

use super::*;
use futures::StreamExt;
use reqwest::{header, Method, StatusCode};
use serde::Deserialize;
use serde_json::Map;
use std::collections::HashSet;
use std::sync::Mutex;

/// ETag Firebase reports for a path that holds no data
const NULL_ETAG: &str = "null_etag";

/// Pause before reopening a dropped event stream
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// e.g. https://my-project-default-rtdb.firebaseio.com
    pub database_url: String,
    /// Database secret or ID token, sent as the `auth` query parameter
    pub auth: Option<String>,
}

impl FirebaseConfig {
    /// Load from FIREBASE_DATABASE_URL / FIREBASE_AUTH.
    /// Returns None when no database URL is configured.
    pub fn from_env() -> Option<Self> {
        let database_url = std::env::var("FIREBASE_DATABASE_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())?;
        let auth = std::env::var("FIREBASE_AUTH")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Some(Self { database_url, auth })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.database_url, normalize_path(path))
    }
}

pub struct FirebaseStore {
    client: reqwest::Client,
    config: FirebaseConfig,
    changes: broadcast::Sender<DocumentChange>,
    max_retries: u32,
    listening: Mutex<HashSet<String>>,
}

enum PutOutcome {
    Committed,
    Conflict { value: Option<Value>, etag: String },
}

impl FirebaseStore {
    pub fn new(config: FirebaseConfig, max_retries: u32) -> StoreResult<Self> {
        // No overall timeout: event streams stay open indefinitely
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            config,
            changes: change_channel(),
            max_retries,
            listening: Mutex::new(HashSet::new()),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.config.url(path));
        match &self.config.auth {
            Some(auth) => builder.query(&[("auth", auth)]),
            None => builder,
        }
    }

    async fn get_with_etag(&self, path: &str) -> StoreResult<(Option<Value>, String)> {
        let response = self
            .request(Method::GET, path)
            .header("X-Firebase-ETag", "true")
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(StoreError::Unavailable(format!(
                "Firebase GET returned status: {}",
                response.status()
            )));
        }

        let etag = etag_of(&response);
        let value: Value = response.json().await.map_err(unavailable)?;
        Ok((non_null(value), etag))
    }

    async fn put_if_match(&self, path: &str, value: &Value, etag: &str) -> StoreResult<PutOutcome> {
        let response = self
            .request(Method::PUT, path)
            .header(header::IF_MATCH, etag)
            .header("X-Firebase-ETag", "true")
            .json(value)
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            status if status.is_success() => Ok(PutOutcome::Committed),
            StatusCode::PRECONDITION_FAILED => {
                let etag = etag_of(&response);
                let value: Value = response.json().await.map_err(unavailable)?;
                Ok(PutOutcome::Conflict {
                    value: non_null(value),
                    etag,
                })
            }
            status => Err(StoreError::Unavailable(format!(
                "Firebase PUT returned status: {}",
                status
            ))),
        }
    }

    /// Start the event stream for `path` unless one is already running
    fn ensure_listener(&self, path: &str) {
        let path = normalize_path(path);
        {
            let Ok(mut listening) = self.listening.lock() else {
                tracing::error!("Listener registry poisoned, not watching {}", path);
                return;
            };
            if !listening.insert(path.clone()) {
                return;
            }
        }

        let listener = EventListener {
            client: self.client.clone(),
            config: self.config.clone(),
            path,
            changes: self.changes.clone(),
        };
        tokio::spawn(listener.run());
    }
}

#[async_trait]
impl DocumentStore for FirebaseStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(StoreError::Unavailable(format!(
                "Firebase GET returned status: {}",
                response.status()
            )));
        }

        let value: Value = response.json().await.map_err(unavailable)?;
        Ok(non_null(value))
    }

    async fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        let response = self
            .request(Method::PUT, path)
            .json(&value)
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(StoreError::Unavailable(format!(
                "Firebase PUT returned status: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn transaction(
        &self,
        path: &str,
        update: UpdateFn<'_>,
    ) -> StoreResult<TransactionResult> {
        let (mut current, mut etag) = self.get_with_etag(path).await?;

        // One first attempt plus `max_retries` retries
        for attempt in 0..=self.max_retries {
            let next = match update(current.as_ref()) {
                Update::Abort => {
                    return Ok(TransactionResult {
                        committed: false,
                        snapshot: current,
                    });
                }
                Update::Commit(next) => next,
            };

            match self.put_if_match(path, &next, &etag).await? {
                PutOutcome::Committed => {
                    return Ok(TransactionResult {
                        committed: true,
                        snapshot: Some(next),
                    });
                }
                PutOutcome::Conflict {
                    value,
                    etag: fresh,
                } => {
                    tracing::debug!(
                        "Firebase transaction on {} conflicted (attempt {}), retrying",
                        path,
                        attempt + 1
                    );
                    current = value;
                    etag = fresh;
                    conflict_backoff(attempt).await;
                }
            }
        }

        tracing::warn!(
            "Firebase transaction on {} abandoned after {} retries",
            path,
            self.max_retries
        );
        Err(StoreError::TooManyRetries(self.max_retries))
    }

    fn watch(&self, path: &str) -> broadcast::Receiver<DocumentChange> {
        let rx = self.changes.subscribe();
        self.ensure_listener(path);
        rx
    }

    fn name(&self) -> &str {
        "firebase"
    }
}

fn unavailable(e: reqwest::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn etag_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(header::ETAG)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(NULL_ETAG)
        .to_string()
}

fn non_null(value: Value) -> Option<Value> {
    (!value.is_null()).then_some(value)
}

/// Payload of `put` and `patch` events
#[derive(Debug, Deserialize)]
struct EventPayload {
    path: String,
    data: Value,
}

/// How an event stream ended
enum StreamEnd {
    /// Connection dropped; worth reopening
    Closed,
    /// Server revoked the stream; reopening would fail the same way
    Revoked(String),
}

struct EventListener {
    client: reqwest::Client,
    config: FirebaseConfig,
    path: String,
    changes: broadcast::Sender<DocumentChange>,
}

impl EventListener {
    async fn run(self) {
        tracing::info!("Listening for Firebase changes on {}", self.path);

        loop {
            match self.stream_once().await {
                Ok(StreamEnd::Closed) => {
                    tracing::info!("Firebase event stream for {} closed, reopening", self.path);
                }
                Ok(StreamEnd::Revoked(reason)) => {
                    tracing::error!(
                        "Firebase event stream for {} revoked: {}",
                        self.path,
                        reason
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!("Firebase event stream for {} failed: {}", self.path, e);
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn stream_once(&self) -> StoreResult<StreamEnd> {
        let mut request = self
            .client
            .get(self.config.url(&self.path))
            .header(header::ACCEPT, "text/event-stream");
        if let Some(auth) = &self.config.auth {
            request = request.query(&[("auth", auth)]);
        }

        let response = request.send().await.map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(StoreError::Unavailable(format!(
                "Firebase stream returned status: {}",
                response.status()
            )));
        }

        let mut mirror: Option<Value> = None;
        let mut buffer = EventBuffer::default();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(unavailable)?;
            buffer.push(&chunk);

            while let Some(block) = buffer.next_block() {
                let block = match block {
                    Ok(block) => block,
                    Err(e) => {
                        tracing::warn!("Skipping Firebase event that is not UTF-8: {}", e);
                        continue;
                    }
                };
                let Some((event, data)) = parse_event_block(&block) else {
                    continue;
                };

                match event.as_str() {
                    "put" | "patch" => {
                        let payload: EventPayload = serde_json::from_str(&data)?;
                        if event == "put" {
                            apply_put(&mut mirror, &payload.path, payload.data);
                        } else {
                            apply_patch(&mut mirror, &payload.path, payload.data);
                        }
                        let _ = self.changes.send(DocumentChange {
                            path: self.path.clone(),
                            value: mirror.clone(),
                        });
                    }
                    "keep-alive" => {}
                    "cancel" | "auth_revoked" => return Ok(StreamEnd::Revoked(event.clone())),
                    other => tracing::debug!("Ignoring Firebase event {}", other),
                }
            }
        }

        Ok(StreamEnd::Closed)
    }
}

/// Raw event-stream bytes. Chunks may end mid-character, so text is only
/// decoded once a whole block has arrived.
#[derive(Debug, Default)]
struct EventBuffer {
    bytes: Vec<u8>,
}

impl EventBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Next complete block, terminated by a blank line
    fn next_block(&mut self) -> Option<Result<String, std::string::FromUtf8Error>> {
        let end = self.bytes.windows(2).position(|w| w == b"\n\n")?;
        let block: Vec<u8> = self.bytes.drain(..end + 2).collect();
        Some(String::from_utf8(block))
    }
}

/// Split one server-sent-event block into its event name and data
fn parse_event_block(block: &str) -> Option<(String, String)> {
    let mut event = None;
    let mut data = Vec::new();

    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.trim_start());
        }
    }

    event.map(|e| (e, data.join("\n")))
}

/// Replace the value at `pointer` (slash-separated) inside the mirrored document
fn apply_put(root: &mut Option<Value>, pointer: &str, data: Value) {
    let segments: Vec<&str> = pointer.split('/').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        *root = non_null(data);
        return;
    };

    let mut node = root.get_or_insert_with(|| Value::Object(Map::new()));
    for segment in parents {
        node = child_mut(node, segment);
    }

    if data.is_null() {
        match node {
            Value::Object(map) => {
                map.remove(*last);
            }
            Value::Array(items) => {
                if let Some(item) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                    *item = Value::Null;
                }
            }
            _ => {}
        }
    } else {
        *child_mut(node, last) = data;
    }
}

/// Merge each child of `data` into the object at `pointer`
fn apply_patch(root: &mut Option<Value>, pointer: &str, data: Value) {
    let Value::Object(children) = data else {
        apply_put(root, pointer, data);
        return;
    };

    let base = pointer.trim_end_matches('/');
    for (key, value) in children {
        apply_put(root, &format!("{}/{}", base, key), value);
    }
}

fn child_mut<'a>(node: &'a mut Value, key: &str) -> &'a mut Value {
    let index = key.parse::<usize>().ok().filter(|_| node.is_array());
    if index.is_none() && !node.is_object() {
        *node = Value::Object(Map::new());
    }

    match (node, index) {
        (Value::Array(items), Some(i)) => {
            if items.len() <= i {
                items.resize(i + 1, Value::Null);
            }
            &mut items[i]
        }
        (Value::Object(map), _) => map.entry(key.to_string()).or_insert(Value::Null),
        (other, _) => other,
    }
}
