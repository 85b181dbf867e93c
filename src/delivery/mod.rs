//! Outbound delivery of relayed messages to the Slack webhook.
//!
//! Each message gets one attempt with the rich block layout and, if that
//! fails, one attempt with a plain-text fallback. There are no further
//! retries; the outcome is reported, never raised.
//!
//! ```text
//! send(details) ──► POST blocks ──ok──► Delivered
//!                        │
//!                       err
//!                        ▼
//!                  POST "num: msg" ──ok──► DeliveredViaFallback
//!                        │
//!                       err ──► Failed
//! ```

mod metrics;
pub mod slack;
mod transport;

use std::sync::Arc;

use crate::error::DeliveryError;
use crate::selection::SelectionStore;
use crate::session::MessageDetails;

pub use metrics::{DeliveryMetrics, DeliverySnapshot};
pub use transport::{HttpTransport, WebhookTransport};

/// Outcome of delivering one message.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    /// The block-formatted message was accepted.
    Delivered,
    /// The block message failed but the plain-text fallback was accepted.
    DeliveredViaFallback { primary_error: DeliveryError },
    /// Both attempts failed.
    Failed {
        primary_error: DeliveryError,
        fallback_error: DeliveryError,
    },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, DeliveryOutcome::Failed { .. })
    }

    /// Reason reported to observers when delivery failed.
    pub fn error_reason(&self) -> Option<String> {
        match self {
            DeliveryOutcome::Failed { fallback_error, .. } => {
                Some(format!("Failed to send to Slack: {}", fallback_error))
            }
            _ => None,
        }
    }
}

/// Formats messages and posts them to the current webhook endpoint.
pub struct DeliveryService {
    transport: Arc<dyn WebhookTransport>,
    selection: Arc<SelectionStore>,
    metrics: Arc<DeliveryMetrics>,
}

impl DeliveryService {
    pub fn new(transport: Arc<dyn WebhookTransport>, selection: Arc<SelectionStore>) -> Self {
        Self {
            transport,
            selection,
            metrics: Arc::new(DeliveryMetrics::new()),
        }
    }

    /// Shared handle to the delivery counters.
    pub fn metrics(&self) -> Arc<DeliveryMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Deliver one message. The endpoint is read fresh on every call.
    pub async fn send(&self, details: &MessageDetails) -> DeliveryOutcome {
        let outcome = self.attempt(details).await;
        self.metrics.record(&outcome);
        outcome
    }

    async fn attempt(&self, details: &MessageDetails) -> DeliveryOutcome {
        let url = self.selection.endpoint().await;
        if url.trim().is_empty() {
            tracing::warn!("Slack webhook URL is not configured, dropping message");
            return DeliveryOutcome::Failed {
                primary_error: DeliveryError::NotConfigured,
                fallback_error: DeliveryError::NotConfigured,
            };
        }

        let primary_error = match self.transport.post(&url, &slack::format_blocks(details)).await {
            Ok(()) => {
                tracing::info!(sender = %details.sender_number, "Message sent to Slack");
                return DeliveryOutcome::Delivered;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Slack block message failed, trying fallback");
                e
            }
        };

        match self.transport.post(&url, &slack::format_fallback(details)).await {
            Ok(()) => {
                tracing::info!(sender = %details.sender_number, "Fallback message sent to Slack");
                DeliveryOutcome::DeliveredViaFallback { primary_error }
            }
            Err(fallback_error) => {
                tracing::error!(
                    primary = %primary_error,
                    fallback = %fallback_error,
                    "Fallback message also failed"
                );
                DeliveryOutcome::Failed {
                    primary_error,
                    fallback_error,
                }
            }
        }
    }
}
