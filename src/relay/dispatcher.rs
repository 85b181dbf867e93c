//! Event dispatch loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::relay::RelayEngine;
use crate::session::{IncomingMessage, ReconnectionController, SessionEvent};

/// Capacity of the queue between the dispatcher and the relay worker.
pub const RELAY_QUEUE_CAPACITY: usize = 256;

/// Running dispatcher and relay worker tasks.
///
/// Both tasks stop once the adapter's event sender is dropped and queued
/// messages have been relayed.
pub struct Dispatcher {
    dispatch: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawn the dispatcher over the adapter's event receiver.
    pub fn spawn(
        events: mpsc::Receiver<SessionEvent>,
        controller: Arc<ReconnectionController>,
        engine: Arc<RelayEngine>,
    ) -> Self {
        let (relay_tx, relay_rx) = mpsc::channel(RELAY_QUEUE_CAPACITY);
        let worker = tokio::spawn(relay_worker(relay_rx, engine));
        let dispatch = tokio::spawn(dispatch_loop(events, controller, relay_tx));
        Self { dispatch, worker }
    }

    /// Wait for both tasks to finish.
    pub async fn join(self) {
        if let Err(e) = self.dispatch.await {
            tracing::error!(error = %e, "Dispatcher task failed");
        }
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "Relay worker task failed");
        }
    }

    /// Stop both tasks without draining.
    pub fn abort(&self) {
        self.dispatch.abort();
        self.worker.abort();
    }
}

async fn dispatch_loop(
    mut events: mpsc::Receiver<SessionEvent>,
    controller: Arc<ReconnectionController>,
    relay_tx: mpsc::Sender<IncomingMessage>,
) {
    tracing::info!("Event dispatcher started");

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Message(msg) => {
                if relay_tx.send(msg).await.is_err() {
                    tracing::warn!("Relay worker stopped, dropping further messages");
                    break;
                }
            }
            other => controller.handle_event(other).await,
        }
    }

    tracing::info!("Session event channel closed, stopping dispatcher");
}

async fn relay_worker(mut messages: mpsc::Receiver<IncomingMessage>, engine: Arc<RelayEngine>) {
    while let Some(msg) = messages.recv().await {
        engine.handle(msg).await;
    }
    tracing::debug!("Relay worker stopped");
}
