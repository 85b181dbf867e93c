//! Real-time fan-out of relay state to dashboard observers.
//!
//! Events are broadcast to every connected observer; there is no replay.
//! A newly connected observer instead receives a snapshot derived from the
//! current session state and allow-list, so late joiners converge without
//! history.
//!
//! ```text
//! Controller / RelayEngine ──► broadcast(event) ──► every ObserverConnection
//! observer connects         ──► connect() ──► snapshot + live receiver
//! observer command          ──► handle_command() ──► SelectionStore ──► broadcast(selectedChats)
//! ```

mod types;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::selection::SelectionStore;
use crate::session::{SessionHandle, SessionState};

pub use types::{ForwardedMessage, ObserverCommand, RelayEvent};

/// Size of the broadcast channel for events.
const EVENT_BUFFER_SIZE: usize = 256;

/// A connected observer's view of the event stream.
pub struct ObserverConnection {
    pub id: Uuid,
    /// Events to send before anything from `events`.
    pub snapshot: Vec<RelayEvent>,
    pub events: broadcast::Receiver<RelayEvent>,
}

/// Broadcast hub shared by the controller, relay engine, and server.
pub struct EventHub {
    tx: broadcast::Sender<RelayEvent>,
    session: SessionHandle,
    selection: Arc<SelectionStore>,
    observers: AtomicUsize,
}

impl EventHub {
    pub fn new(session: SessionHandle, selection: Arc<SelectionStore>) -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            tx,
            session,
            selection,
            observers: AtomicUsize::new(0),
        }
    }

    /// Deliver an event to every currently connected observer.
    ///
    /// Returns the number of receivers the event reached.
    pub fn broadcast(&self, event: RelayEvent) -> usize {
        tracing::debug!(event = event.name(), "Broadcasting event");
        // No receivers is fine: the event is simply not observed.
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to live events without registering as an observer.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    /// Register a new observer.
    ///
    /// The live receiver is created before the snapshot is taken so nothing
    /// that happens in between is lost.
    pub async fn connect(&self) -> ObserverConnection {
        let events = self.tx.subscribe();
        let snapshot = self.snapshot().await;
        let id = Uuid::new_v4();
        let count = self.observers.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(observer = %id, observers = count, "Observer connected");

        ObserverConnection {
            id,
            snapshot,
            events,
        }
    }

    /// Unregister an observer.
    pub fn disconnect(&self, id: Uuid) {
        let count = self
            .observers
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        tracing::info!(observer = %id, observers = count, "Observer disconnected");
    }

    /// Number of connected observers.
    pub fn observer_count(&self) -> usize {
        self.observers.load(Ordering::Relaxed)
    }

    /// State a late joiner needs: `ready` with the chat list when the session
    /// is ready, then the current allow-list.
    pub async fn snapshot(&self) -> Vec<RelayEvent> {
        let mut events = Vec::with_capacity(2);
        let session = self.session.snapshot().await;
        if session.state == SessionState::Ready {
            events.push(RelayEvent::Ready {
                chats: session.chats,
            });
        }
        events.push(RelayEvent::SelectedChats(self.selection.all().await));
        events
    }

    /// Apply an observer command, then broadcast the updated allow-list to
    /// every observer, including the one that issued the command.
    pub async fn handle_command(&self, command: ObserverCommand) {
        match &command {
            ObserverCommand::SelectChat(id) => {
                self.selection.add(id).await;
                tracing::info!(chat_id = %id, "Chat selected");
            }
            ObserverCommand::DeselectChat(id) => {
                self.selection.remove(id).await;
                tracing::info!(chat_id = %id, "Chat deselected");
            }
        }
        self.broadcast_selection().await;
    }

    /// Broadcast the current allow-list.
    pub async fn broadcast_selection(&self) {
        self.broadcast(RelayEvent::SelectedChats(self.selection.all().await));
    }
}
