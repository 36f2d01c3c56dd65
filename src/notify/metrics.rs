//! Delivery metrics — an injected sink with atomic counters, not shared
//! mutable globals.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters and the queue-depth gauge for the delivery pipeline.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    sent: AtomicU64,
    failed_attempts: AtomicU64,
    dead_lettered: AtomicU64,
    queue_depth: AtomicU64,
}

/// Point-in-time view of the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub sent: u64,
    pub failed_attempts: u64,
    pub dead_lettered: u64,
    pub queue_depth: u64,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_attempt(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
        }
    }
}
