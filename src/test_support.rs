//! In-crate fakes for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::DateTime;
use tokio::sync::mpsc;

use crate::error::{DeliveryError, SessionError, StoreError};
use crate::delivery::WebhookTransport;
use crate::selection::{ConfigStore, PersistedConfig};
use crate::session::{
    ChatSummary, IncomingMessage, MessageDetails, MessageMetadata, SessionClient, SessionEvent,
    SessionEventSender, event_channel,
};

pub fn chat(id: &str, name: &str) -> ChatSummary {
    ChatSummary {
        id: id.to_string(),
        name: name.to_string(),
        is_group: false,
        unread_count: 0,
        last_message: None,
    }
}

pub fn incoming(from: &str, body: &str) -> IncomingMessage {
    IncomingMessage {
        id: format!("msg-{}", body),
        from: from.to_string(),
        author: None,
        body: body.to_string(),
        timestamp: Some(1_700_000_000),
    }
}

pub fn sample_details() -> MessageDetails {
    MessageDetails {
        sender_name: "Alice".to_string(),
        sender_number: "111".to_string(),
        message: "hello".to_string(),
        timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        is_group: false,
        chat_name: "Alice".to_string(),
    }
}

/// Scriptable session adapter.
pub struct FakeSession {
    tx: SessionEventSender,
    start_results: Mutex<VecDeque<Result<(), String>>>,
    start_calls: AtomicU32,
    chats: Mutex<Vec<ChatSummary>>,
    list_calls: AtomicU32,
    fail_list: AtomicBool,
    metadata: Mutex<MessageMetadata>,
    fail_metadata: AtomicBool,
}

impl FakeSession {
    pub fn new() -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = event_channel();
        let session = Self {
            tx,
            start_results: Mutex::new(VecDeque::new()),
            start_calls: AtomicU32::new(0),
            chats: Mutex::new(Vec::new()),
            list_calls: AtomicU32::new(0),
            fail_list: AtomicBool::new(false),
            metadata: Mutex::new(MessageMetadata {
                chat_name: Some("Alice".to_string()),
                is_group: false,
                contact_name: Some("Alice".to_string()),
                author_name: None,
            }),
            fail_metadata: AtomicBool::new(false),
        };
        (session, rx)
    }

    /// Queue the result of the next `start()`; an empty queue succeeds.
    pub fn push_start_result(&self, result: Result<(), String>) {
        self.start_results.lock().unwrap().push_back(result);
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn set_chats(&self, chats: Vec<ChatSummary>) {
        *self.chats.lock().unwrap() = chats;
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_metadata(&self, metadata: MessageMetadata) {
        *self.metadata.lock().unwrap() = metadata;
    }

    pub fn fail_metadata(&self, fail: bool) {
        self.fail_metadata.store(fail, Ordering::SeqCst);
    }

    pub async fn emit(&self, event: SessionEvent) {
        self.tx.send(event).await.unwrap();
    }
}

#[async_trait]
impl SessionClient for FakeSession {
    async fn start(&self) -> Result<(), SessionError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        match self.start_results.lock().unwrap().pop_front() {
            Some(Err(reason)) => Err(SessionError::StartupFailed { reason }),
            _ => Ok(()),
        }
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, SessionError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(SessionError::Bridge {
                endpoint: "/chats".to_string(),
                reason: "HTTP 500".to_string(),
            });
        }
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn fetch_message_metadata(
        &self,
        _msg: &IncomingMessage,
    ) -> Result<MessageMetadata, SessionError> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(SessionError::Bridge {
                endpoint: "metadata".to_string(),
                reason: "unavailable".to_string(),
            });
        }
        Ok(self.metadata.lock().unwrap().clone())
    }
}

/// Records posts; results are scripted, defaulting to success.
pub struct FakeTransport {
    calls: Mutex<Vec<(String, serde_json::Value)>>,
    results: Mutex<VecDeque<Result<(), DeliveryError>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            results: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_result(&self, result: Result<(), DeliveryError>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookTransport for FakeTransport {
    async fn post(&self, url: &str, payload: &serde_json::Value) -> Result<(), DeliveryError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        self.results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// In-memory config store.
pub struct MemoryStore {
    record: Mutex<Option<PersistedConfig>>,
    saves: AtomicUsize,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            record: Mutex::new(None),
            saves: AtomicUsize::new(0),
            fail_loads: AtomicBool::new(false),
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn with_record(record: PersistedConfig) -> Self {
        let store = Self::new();
        *store.record.lock().unwrap() = Some(record);
        store
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn record(&self) -> Option<PersistedConfig> {
        self.record.lock().unwrap().clone()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedConfig>, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt {
                path: "memory".to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(self.record())
    }

    fn save(&self, record: &PersistedConfig) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                path: "memory".to_string(),
                source: std::io::Error::other("scripted failure"),
            });
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.record.lock().unwrap() = Some(record.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
