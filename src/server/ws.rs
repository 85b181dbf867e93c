//! Websocket observer channel.
//!
//! On connect the observer receives the hub snapshot, then every broadcast
//! event. Text frames from the observer are parsed as [`ObserverCommand`]s.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::fanout::{EventHub, ObserverCommand, ObserverConnection, RelayEvent};
use crate::server::AppState;

/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<EventHub>) {
    let ObserverConnection {
        id,
        snapshot,
        mut events,
    } = hub.connect().await;
    let (mut sender, mut receiver) = socket.split();

    if send_all(&mut sender, &snapshot).await.is_err() {
        hub.disconnect(id);
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(observer = %id, skipped, "Observer lagged, resending snapshot");
                    if send_all(&mut sender, &hub.snapshot().await).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ObserverCommand>(text.as_str()) {
                        Ok(command) => hub.handle_command(command).await,
                        Err(e) => {
                            tracing::warn!(observer = %id, error = %e, "Ignoring malformed observer command");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(observer = %id, error = %e, "Observer socket error");
                    break;
                }
            },
        }
    }

    hub.disconnect(id);
}

async fn send_all<S>(sender: &mut S, events: &[RelayEvent]) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    for event in events {
        send_event(sender, event).await?;
    }
    Ok(())
}

async fn send_event<S>(sender: &mut S, event: &RelayEvent) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(event = event.name(), error = %e, "Failed to serialize event");
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}
