//! Selection store: the allow-list of relayed conversations and the
//! outbound webhook endpoint.
//!
//! Every mutation is written through to a [`ConfigStore`] before the call
//! returns. Persistence failures are logged and absorbed; the in-memory state
//! stays authoritative until the next successful write.
//!
//! ```text
//! observer / HTTP ──► add(id) / remove(id) / set_endpoint(url)
//!                          │
//!                          ├─► in-memory SelectionState (write lock held)
//!                          └─► ConfigStore::save(full record)
//! RelayEngine     ──► contains(id)
//! DeliveryService ──► endpoint()
//! ```

mod store;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::session::ConversationId;

pub use store::{ConfigStore, JsonFileStore, PersistedConfig};

/// Port used when neither the persisted record nor the environment set one.
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// Values sourced from the environment, used when the persisted record is
/// absent, corrupt, or leaves a field empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvDefaults {
    pub slack_webhook_url: String,
    pub server_port: u16,
}

impl Default for EnvDefaults {
    fn default() -> Self {
        Self {
            slack_webhook_url: String::new(),
            server_port: DEFAULT_SERVER_PORT,
        }
    }
}

#[derive(Debug, Clone)]
struct SelectionState {
    selected: BTreeSet<ConversationId>,
    webhook_url: String,
    server_port: u16,
    last_updated: Option<DateTime<Utc>>,
}

impl SelectionState {
    fn from_record(record: PersistedConfig, defaults: &EnvDefaults) -> Self {
        let webhook_url = if record.slack_webhook_url.trim().is_empty() {
            defaults.slack_webhook_url.clone()
        } else {
            record.slack_webhook_url
        };
        Self {
            selected: record.selected_chats.into_iter().collect(),
            webhook_url,
            server_port: record.server_port.unwrap_or(defaults.server_port),
            last_updated: record.last_updated,
        }
    }

    fn from_defaults(defaults: &EnvDefaults) -> Self {
        Self {
            selected: BTreeSet::new(),
            webhook_url: defaults.slack_webhook_url.clone(),
            server_port: defaults.server_port,
            last_updated: None,
        }
    }

    fn to_record(&self) -> PersistedConfig {
        PersistedConfig {
            selected_chats: self.selected.iter().cloned().collect(),
            slack_webhook_url: self.webhook_url.clone(),
            server_port: Some(self.server_port),
            last_updated: self.last_updated,
        }
    }
}

/// Allow-list and webhook endpoint with write-through persistence.
pub struct SelectionStore {
    state: RwLock<SelectionState>,
    store: Arc<dyn ConfigStore>,
}

impl SelectionStore {
    /// Load the store. Never fails: a missing or unreadable record falls
    /// back to an empty allow-list and the environment defaults.
    pub fn open(store: Arc<dyn ConfigStore>, defaults: &EnvDefaults) -> Self {
        let state = match store.load() {
            Ok(Some(record)) => {
                tracing::info!(location = %store.location(), "Loaded relay configuration");
                SelectionState::from_record(record, defaults)
            }
            Ok(None) => {
                tracing::info!(
                    location = %store.location(),
                    "No configuration file found, using defaults"
                );
                SelectionState::from_defaults(defaults)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration, using defaults");
                SelectionState::from_defaults(defaults)
            }
        };

        Self {
            state: RwLock::new(state),
            store,
        }
    }

    /// Add a conversation to the allow-list.
    ///
    /// Returns `true` if the conversation was not selected before.
    pub async fn add(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let inserted = state.selected.insert(id.to_string());
        self.persist(&mut state);
        inserted
    }

    /// Remove a conversation from the allow-list.
    ///
    /// Returns `true` if the conversation was selected before.
    pub async fn remove(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let removed = state.selected.remove(id);
        self.persist(&mut state);
        removed
    }

    /// Check whether a conversation is on the allow-list.
    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.selected.contains(id)
    }

    /// Snapshot of the allow-list, sorted.
    pub async fn all(&self) -> Vec<ConversationId> {
        self.state.read().await.selected.iter().cloned().collect()
    }

    /// Number of selected conversations.
    pub async fn len(&self) -> usize {
        self.state.read().await.selected.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.selected.is_empty()
    }

    /// Current webhook endpoint (empty when unconfigured).
    pub async fn endpoint(&self) -> String {
        self.state.read().await.webhook_url.clone()
    }

    /// Replace the webhook endpoint.
    pub async fn set_endpoint(&self, url: &str) {
        let mut state = self.state.write().await;
        state.webhook_url = url.to_string();
        self.persist(&mut state);
    }

    /// Whether a webhook endpoint is configured.
    pub async fn has_endpoint(&self) -> bool {
        !self.state.read().await.webhook_url.trim().is_empty()
    }

    pub async fn server_port(&self) -> u16 {
        self.state.read().await.server_port
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_updated
    }

    /// Stamp and save the full record. Called with the write lock held so no
    /// reader observes a mutation before its write has been attempted.
    fn persist(&self, state: &mut SelectionState) {
        state.last_updated = Some(Utc::now());
        match self.store.save(&state.to_record()) {
            Ok(()) => tracing::debug!(
                selected = state.selected.len(),
                "Configuration saved"
            ),
            Err(e) => tracing::error!(error = %e, "Failed to save configuration"),
        }
    }
}
