//! Per-message forwarding decision.

use std::sync::Arc;

use crate::delivery::DeliveryService;
use crate::fanout::{EventHub, ForwardedMessage, RelayEvent};
use crate::selection::SelectionStore;
use crate::session::{IncomingMessage, SessionClient, resolve_message_details};

/// Decides whether a message is relayed and reports the result.
pub struct RelayEngine {
    client: Arc<dyn SessionClient>,
    selection: Arc<SelectionStore>,
    delivery: Arc<DeliveryService>,
    hub: Arc<EventHub>,
}

impl RelayEngine {
    pub fn new(
        client: Arc<dyn SessionClient>,
        selection: Arc<SelectionStore>,
        delivery: Arc<DeliveryService>,
        hub: Arc<EventHub>,
    ) -> Self {
        Self {
            client,
            selection,
            delivery,
            hub,
        }
    }

    /// Handle one incoming message.
    ///
    /// Messages from conversations outside the allow-list are dropped
    /// without any event. Otherwise the message is resolved, delivered, and
    /// exactly one `messageForwarded` event is broadcast; the same record is
    /// returned.
    pub async fn handle(&self, msg: IncomingMessage) -> Option<ForwardedMessage> {
        if !self.selection.contains(&msg.from).await {
            return None;
        }

        tracing::info!(chat_id = %msg.from, len = msg.body.len(), "Processing message");

        let details = resolve_message_details(self.client.as_ref(), &msg).await;
        let outcome = self.delivery.send(&details).await;

        let forwarded = ForwardedMessage {
            from: msg.from,
            body: msg.body,
            sender_name: details.sender_name,
            timestamp: details.timestamp,
            success: outcome.is_success(),
            error: outcome.error_reason(),
        };
        self.hub
            .broadcast(RelayEvent::MessageForwarded(forwarded.clone()));
        Some(forwarded)
    }
}
