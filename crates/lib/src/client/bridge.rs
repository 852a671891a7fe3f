//! Bridge client: talks to the browser-automation sidecar over local HTTP.
//! Long-polls `/events` for lifecycle and message events; sends, fetches and deletes through
//! the message endpoints.

use crate::client::{ClientError, ClientEvent, IncomingMessage, MessagingClient};
use crate::config::{self, Config};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const LONG_POLL_TIMEOUT: u64 = 30;
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct EventsResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<BridgeEvent>,
}

/// One event from `/events`: a sequence number plus a `type`-tagged payload.
#[derive(Debug, Deserialize)]
struct BridgeEvent {
    seq: i64,
    #[serde(flatten)]
    kind: BridgeEventKind,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeEventKind {
    Qr {
        qr: String,
    },
    LoadingScreen {
        #[serde(default)]
        percent: u32,
        #[serde(default)]
        message: String,
    },
    Authenticated,
    AuthFailure {
        #[serde(default)]
        message: String,
    },
    Ready,
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    Message {
        message: IncomingMessage,
    },
}

impl From<BridgeEventKind> for ClientEvent {
    fn from(kind: BridgeEventKind) -> Self {
        match kind {
            BridgeEventKind::Qr { qr } => ClientEvent::Qr(qr),
            BridgeEventKind::LoadingScreen { percent, message } => {
                ClientEvent::Loading { percent, message }
            }
            BridgeEventKind::Authenticated => ClientEvent::Authenticated,
            BridgeEventKind::AuthFailure { message } => ClientEvent::AuthFailure(message),
            BridgeEventKind::Ready => ClientEvent::Ready,
            BridgeEventKind::Disconnected { reason } => ClientEvent::Disconnected(reason),
            BridgeEventKind::Error { message } => ClientEvent::Error(message),
            BridgeEventKind::Message { message } => ClientEvent::Message(message),
        }
    }
}

/// HTTP client for the bridge sidecar.
pub struct BridgeClient {
    base_url: String,
    session_dir: PathBuf,
    headless: bool,
    init_timeout: Duration,
    running: AtomicBool,
    client: reqwest::Client,
}

impl BridgeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_dir: PathBuf::from("session"),
            headless: true,
            init_timeout: Duration::from_secs(60),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    /// Build from config; the bridge URL honours WABOT_BRIDGE_URL.
    pub fn from_config(config: &Config) -> Self {
        let mut c = Self::new(config::resolve_bridge_url(config));
        c.session_dir = config.client.session_dir.clone();
        c.headless = config.client.headless;
        c.init_timeout = Duration::from_millis(config.client.init_timeout_ms);
        c
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the event loop after the current poll returns.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Start the `/events` long-poll loop and forward events to the dispatcher.
    pub fn start_events(self: Arc<Self>, event_tx: mpsc::Sender<ClientEvent>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("bridge client: starting event loop against {}", self.base_url);
        tokio::spawn(async move {
            run_events_loop(self, event_tx).await;
        })
    }

    /// `base_url` joined with escaped path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, ClientError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ClientError::Api(format!("invalid bridge url {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Api(format!("bridge url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Call `/events` (long poll). Returns (events, next cursor).
    async fn poll_events(
        &self,
        after: Option<i64>,
    ) -> Result<(Vec<BridgeEvent>, Option<i64>), ClientError> {
        let mut url = self.endpoint(&["events"])?;
        url.query_pairs_mut()
            .append_pair("timeout", &LONG_POLL_TIMEOUT.to_string());
        if let Some(seq) = after {
            url.query_pairs_mut().append_pair("after", &seq.to_string());
        }
        let res = self
            .client
            .get(url)
            .timeout(Duration::from_secs(LONG_POLL_TIMEOUT + 10))
            .send()
            .await?;
        let res = check_status(res, "events").await?;
        let data: EventsResponse = res.json().await?;
        if !data.ok {
            return Err(ClientError::Api("events returned ok: false".to_string()));
        }
        let next = data.result.iter().map(|e| e.seq).max().or(after);
        Ok((data.result, next))
    }

    async fn post_message(
        &self,
        chat_id: &str,
        text: &str,
        quoted: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut body = serde_json::json!({ "chatId": chat_id, "text": text });
        if let Some(id) = quoted {
            body["quotedMessageId"] = serde_json::Value::String(id.to_string());
        }
        let res = self
            .client
            .post(self.endpoint(&["messages"])?)
            .json(&body)
            .send()
            .await?;
        check_status(res, "send message").await?;
        Ok(())
    }
}

/// Turn a non-2xx response into `ClientError::Api` carrying status and body.
async fn check_status(
    res: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, ClientError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(ClientError::Api(format!("{} failed: {} {}", what, status, body)))
}

async fn run_events_loop(client: Arc<BridgeClient>, event_tx: mpsc::Sender<ClientEvent>) {
    let mut cursor: Option<i64> = None;
    while client.running() {
        match client.poll_events(cursor).await {
            Ok((events, next)) => {
                cursor = next;
                for e in events {
                    if event_tx.send(e.kind.into()).await.is_err() {
                        log::debug!("bridge client: event receiver closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::debug!("bridge events error: {}", e);
                tokio::time::sleep(POLL_ERROR_PAUSE).await;
            }
        }
    }
    log::info!("bridge client: event loop stopped");
}

#[async_trait]
impl MessagingClient for BridgeClient {
    async fn initialize(&self) -> Result<(), ClientError> {
        let body = serde_json::json!({
            "dataPath": self.session_dir.display().to_string(),
            "headless": self.headless,
        });
        let res = self
            .client
            .post(self.endpoint(&["session", "initialize"])?)
            .timeout(self.init_timeout)
            .json(&body)
            .send()
            .await?;
        check_status(res, "initialize").await?;
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ClientError> {
        self.post_message(chat_id, text, None).await
    }

    async fn reply(&self, message: &IncomingMessage, text: &str) -> Result<(), ClientError> {
        self.post_message(&message.from, text, Some(&message.id)).await
    }

    async fn get_message_by_id(&self, id: &str) -> Result<IncomingMessage, ClientError> {
        let res = self
            .client
            .get(self.endpoint(&["messages", id])?)
            .send()
            .await?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(id.to_string()));
        }
        let res = check_status(res, "get message").await?;
        Ok(res.json().await?)
    }

    async fn delete_message(&self, id: &str, for_everyone: bool) -> Result<(), ClientError> {
        let mut url = self.endpoint(&["messages", id])?;
        url.query_pairs_mut()
            .append_pair("everyone", if for_everyone { "true" } else { "false" });
        let res = self.client.delete(url).send().await?;
        check_status(res, "delete message").await?;
        Ok(())
    }
}
