//! Session adapter backed by a messaging-bridge daemon.
//!
//! The bridge owns the actual WhatsApp Web session (browser, auth data). This
//! adapter drives it over plain HTTP and listens for session events on an SSE
//! stream:
//!
//! ```text
//!   POST /session/start             launch (or relaunch) the session
//!   GET  /session/events            SSE: qr | ready | message | disconnected | error
//!   GET  /chats                     chat list
//!   GET  /messages/{id}/metadata    chat/contact names for one message
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SessionError;
use crate::session::{
    ChatSummary, IncomingMessage, MessageMetadata, SessionClient, SessionEvent,
    SessionEventSender,
};

const MAX_SSE_BUFFER_SIZE: usize = 1024 * 1024;
const MAX_SSE_EVENT_SIZE: usize = 256 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Launching a browser session can take a while.
const START_TIMEOUT: Duration = Duration::from_secs(120);
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// How the bridge should launch the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
    pub headless: bool,
    /// Directory holding the persisted authentication data.
    pub session_data_path: String,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            session_data_path: ".wwebjs_auth".to_string(),
        }
    }
}

/// Event record carried in one SSE `data:` payload.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum BridgeEvent {
    Qr {
        qr: String,
    },
    Ready,
    Message {
        message: IncomingMessage,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Error {
        #[serde(default)]
        error: String,
    },
}

impl From<BridgeEvent> for SessionEvent {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Qr { qr } => SessionEvent::QrChallenge(qr),
            BridgeEvent::Ready => SessionEvent::Ready,
            BridgeEvent::Message { message } => SessionEvent::Message(message),
            BridgeEvent::Disconnected { reason } => SessionEvent::Disconnected(reason),
            BridgeEvent::Error { error } => SessionEvent::Fault(error),
        }
    }
}

/// HTTP + SSE client for the bridge daemon.
pub struct BridgeSessionClient {
    base: Url,
    launch: LaunchOptions,
    client: reqwest::Client,
    tx: SessionEventSender,
    listening: AtomicBool,
}

impl BridgeSessionClient {
    /// Create a client for the bridge at `base_url`. Events are pushed into `tx`.
    pub fn new(
        base_url: &str,
        launch: LaunchOptions,
        tx: SessionEventSender,
    ) -> Result<Self, SessionError> {
        let base = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            SessionError::StartupFailed {
                reason: format!("Invalid bridge URL '{}': {}", base_url, e),
            }
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(SessionError::StartupFailed {
                reason: format!("Bridge URL must be http(s): {}", base_url),
            });
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base,
            launch,
            client,
            tx,
            listening: AtomicBool::new(false),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<T, SessionError> {
        let url = self.endpoint(segments);
        let response = self
            .client
            .get(url.clone())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| bridge_error(&url, e))?;
        let response = check_status(&url, response)?;
        response
            .json::<T>()
            .await
            .map_err(|e| SessionError::InvalidResponse {
                endpoint: url.path().to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl SessionClient for BridgeSessionClient {
    async fn start(&self) -> Result<(), SessionError> {
        let url = self.endpoint(&["session", "start"]);
        tracing::info!(
            bridge = %self.base,
            headless = self.launch.headless,
            session_data_path = %self.launch.session_data_path,
            "Starting WhatsApp session"
        );

        let response = self
            .client
            .post(url.clone())
            .timeout(START_TIMEOUT)
            .json(&self.launch)
            .send()
            .await
            .map_err(|e| SessionError::StartupFailed {
                reason: format!("{}: {}", url.path(), e),
            })?;
        if !response.status().is_success() {
            return Err(SessionError::StartupFailed {
                reason: format!("{} returned HTTP {}", url.path(), response.status()),
            });
        }

        if !self.listening.swap(true, Ordering::SeqCst) {
            let client = self.client.clone();
            let events_url = self.endpoint(&["session", "events"]);
            let tx = self.tx.clone();
            tokio::spawn(async move {
                sse_listener(client, events_url, tx).await;
            });
        }
        Ok(())
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, SessionError> {
        let chats: Vec<ChatSummary> = self.get_json(&["chats"]).await?;
        Ok(chats.into_iter().map(ChatSummary::normalized).collect())
    }

    async fn fetch_message_metadata(
        &self,
        msg: &IncomingMessage,
    ) -> Result<MessageMetadata, SessionError> {
        if msg.id.is_empty() {
            return Err(SessionError::InvalidResponse {
                endpoint: "messages".to_string(),
                reason: "message has no id".to_string(),
            });
        }
        self.get_json(&["messages", &msg.id, "metadata"]).await
    }
}

fn bridge_error(url: &Url, e: reqwest::Error) -> SessionError {
    SessionError::Bridge {
        endpoint: url.path().to_string(),
        reason: e.to_string(),
    }
}

fn check_status(url: &Url, response: reqwest::Response) -> Result<reqwest::Response, SessionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        return Err(SessionError::NotReady);
    }
    Err(SessionError::Bridge {
        endpoint: url.path().to_string(),
        reason: format!("HTTP {}", status),
    })
}

/// Incremental decoder for a `text/event-stream` body.
///
/// Yields the joined `data:` payload of each complete event. Comment lines
/// and other fields are ignored. Oversized buffers and events are dropped.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: String,
    current: String,
    /// Trailing bytes of an incomplete UTF-8 sequence from the last chunk.
    carry: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return every event it completes.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        let text = match std::str::from_utf8(&bytes) {
            Ok(s) => s.to_string(),
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                self.carry = bytes[valid..].to_vec();
                String::from_utf8_lossy(&bytes[..valid]).into_owned()
            }
            Err(_) => {
                tracing::debug!("SSE stream contained invalid UTF-8, replacing");
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };

        if self.buffer.len() + text.len() > MAX_SSE_BUFFER_SIZE {
            tracing::warn!(
                buffer_len = self.buffer.len(),
                chunk_len = text.len(),
                "SSE buffer overflow, resetting"
            );
            self.buffer.clear();
            self.current.clear();
            self.carry.clear();
            return Vec::new();
        }
        self.buffer.push_str(&text);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=pos);

            if line.starts_with(':') {
                continue;
            }
            if line.is_empty() {
                if !self.current.is_empty() {
                    events.push(std::mem::take(&mut self.current));
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                if self.current.len() + data.len() > MAX_SSE_EVENT_SIZE {
                    tracing::warn!("SSE event too large, dropping");
                    self.current.clear();
                    continue;
                }
                if !self.current.is_empty() {
                    self.current.push('\n');
                }
                self.current.push_str(data.strip_prefix(' ').unwrap_or(data));
            }
        }
        events
    }

    /// Flush a trailing event the stream ended without terminating.
    pub(crate) fn finish(&mut self) -> Option<String> {
        self.buffer.clear();
        self.carry.clear();
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

/// Map one SSE payload to a session event; unknown records are skipped.
fn parse_event(data: &str) -> Option<SessionEvent> {
    match serde_json::from_str::<BridgeEvent>(data) {
        Ok(event) => Some(event.into()),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unrecognised bridge event");
            None
        }
    }
}

/// Read the bridge event stream until the receiving side goes away,
/// reconnecting with exponential backoff whenever the stream drops.
async fn sse_listener(client: reqwest::Client, url: Url, tx: SessionEventSender) {
    let mut retry_delay = INITIAL_BACKOFF;

    loop {
        if tx.is_closed() {
            return;
        }

        let response = client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(status = %r.status(), "Bridge event stream rejected, retrying");
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(MAX_BACKOFF);
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Bridge event stream connect failed, retrying");
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        retry_delay = INITIAL_BACKOFF;
        tracing::info!("Bridge event stream connected");

        let mut decoder = SseDecoder::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!(error = %e, "Bridge event stream error, reconnecting");
                    break;
                }
            };
            for data in decoder.feed(&chunk) {
                if let Some(event) = parse_event(&data)
                    && tx.send(event).await.is_err()
                {
                    tracing::debug!("Session event receiver dropped, stopping listener");
                    return;
                }
            }
        }

        if let Some(data) = decoder.finish()
            && let Some(event) = parse_event(&data)
            && tx.send(event).await.is_err()
        {
            return;
        }

        tracing::debug!("Bridge event stream ended, reconnecting with backoff");
        tokio::time::sleep(retry_delay).await;
        retry_delay = (retry_delay * 2).min(MAX_BACKOFF);
    }
}
