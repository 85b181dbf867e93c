//! Component wiring.
//!
//! Every component is constructed exactly once here and handed its
//! collaborators explicitly. The three external edges (session adapter,
//! webhook transport, config store) are injected so tests can replace them.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tokio::sync::mpsc;

use crate::config::RelayConfig;
use crate::delivery::{DeliveryService, HttpTransport, WebhookTransport};
use crate::fanout::EventHub;
use crate::relay::{Dispatcher, RelayEngine};
use crate::selection::{ConfigStore, EnvDefaults, JsonFileStore, SelectionStore};
use crate::server::{AppState, router};
use crate::session::{
    BridgeSessionClient, ReconnectionController, RetryPolicy, SessionClient, SessionEvent,
    SessionHandle, event_channel,
};

/// The assembled relay.
pub struct RelayApp {
    pub selection: Arc<SelectionStore>,
    pub session: SessionHandle,
    pub hub: Arc<EventHub>,
    pub delivery: Arc<DeliveryService>,
    pub controller: Arc<ReconnectionController>,
    pub engine: Arc<RelayEngine>,
}

impl RelayApp {
    pub fn new(
        client: Arc<dyn SessionClient>,
        transport: Arc<dyn WebhookTransport>,
        store: Arc<dyn ConfigStore>,
        defaults: &EnvDefaults,
        retry: RetryPolicy,
    ) -> Self {
        let selection = Arc::new(SelectionStore::open(store, defaults));
        let session = SessionHandle::new();
        let hub = Arc::new(EventHub::new(session.clone(), Arc::clone(&selection)));
        let delivery = Arc::new(DeliveryService::new(transport, Arc::clone(&selection)));
        let controller = Arc::new(ReconnectionController::new(
            Arc::clone(&client),
            session.clone(),
            Arc::clone(&hub),
            retry,
        ));
        let engine = Arc::new(RelayEngine::new(
            client,
            Arc::clone(&selection),
            Arc::clone(&delivery),
            Arc::clone(&hub),
        ));

        Self {
            selection,
            session,
            hub,
            delivery,
            controller,
            engine,
        }
    }

    /// Build the production relay: bridge adapter, HTTP webhook transport,
    /// and JSON file store. Returns the adapter's event receiver, which must
    /// be handed to [`RelayApp::spawn_dispatcher`].
    pub fn from_config(
        config: &RelayConfig,
    ) -> crate::Result<(Self, mpsc::Receiver<SessionEvent>)> {
        let (tx, rx) = event_channel();
        let client = BridgeSessionClient::new(&config.bridge_url, config.launch.clone(), tx)?;
        let app = Self::new(
            Arc::new(client),
            Arc::new(HttpTransport::new()),
            Arc::new(JsonFileStore::new(&config.config_path)),
            &config.env_defaults(),
            config.retry.clone(),
        );
        Ok((app, rx))
    }

    /// Handler state for the HTTP/websocket surface.
    pub fn state(&self) -> AppState {
        AppState {
            controller: Arc::clone(&self.controller),
            session: self.session.clone(),
            selection: Arc::clone(&self.selection),
            hub: Arc::clone(&self.hub),
            metrics: self.delivery.metrics(),
        }
    }

    pub fn router(&self, static_dir: Option<&Path>) -> Router {
        router(self.state(), static_dir)
    }

    /// Start consuming the adapter's event stream.
    pub fn spawn_dispatcher(&self, events: mpsc::Receiver<SessionEvent>) -> Dispatcher {
        Dispatcher::spawn(
            events,
            Arc::clone(&self.controller),
            Arc::clone(&self.engine),
        )
    }
}
