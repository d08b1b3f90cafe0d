//! Runtime counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Invocation counters, updated by the runtime
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    pub invocations: AtomicU64,
    pub failures: AtomicU64,
    pub messages_emitted: AtomicU64,
}

/// Delivery counters, updated by the bus
#[derive(Debug, Default)]
pub struct BusMetrics {
    pub messages_published: AtomicU64,
    pub deliveries_sent: AtomicU64,
    pub deliveries_deduplicated: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub invocations: u64,
    pub failures: u64,
    pub messages_emitted: u64,
    pub messages_published: u64,
    pub deliveries_sent: u64,
    pub deliveries_deduplicated: u64,
}

impl MetricsSnapshot {
    pub fn capture(runtime: &RuntimeMetrics, bus: &BusMetrics) -> Self {
        Self {
            invocations: runtime.invocations.load(Ordering::Relaxed),
            failures: runtime.failures.load(Ordering::Relaxed),
            messages_emitted: runtime.messages_emitted.load(Ordering::Relaxed),
            messages_published: bus.messages_published.load(Ordering::Relaxed),
            deliveries_sent: bus.deliveries_sent.load(Ordering::Relaxed),
            deliveries_deduplicated: bus.deliveries_deduplicated.load(Ordering::Relaxed),
        }
    }
}

pub(crate) fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}
