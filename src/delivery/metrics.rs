//! Delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::DeliveryOutcome;

/// Process-wide delivery counters.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    total_messages: AtomicU64,
    delivered: AtomicU64,
    delivered_via_fallback: AtomicU64,
    failed: AtomicU64,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &DeliveryOutcome) {
        self.total_messages.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            DeliveryOutcome::Delivered => &self.delivered,
            DeliveryOutcome::DeliveredViaFallback { .. } => &self.delivered_via_fallback,
            DeliveryOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of the metrics for serialization.
    pub fn snapshot(&self) -> DeliverySnapshot {
        let total_messages = self.total_messages.load(Ordering::Relaxed);
        let delivered = self.delivered.load(Ordering::Relaxed);
        let delivered_via_fallback = self.delivered_via_fallback.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);

        let success_rate = if total_messages > 0 {
            (delivered + delivered_via_fallback) as f64 / total_messages as f64
        } else {
            0.0
        };

        DeliverySnapshot {
            total_messages,
            delivered,
            delivered_via_fallback,
            failed,
            success_rate,
        }
    }
}

/// Snapshot of delivery metrics, served by `GET /api/stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySnapshot {
    pub total_messages: u64,
    pub delivered: u64,
    pub delivered_via_fallback: u64,
    pub failed: u64,
    /// Fraction of messages accepted by either format (0.0 to 1.0).
    pub success_rate: f64,
}
