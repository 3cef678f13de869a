//! Counters describing what the bridge did with the events it saw.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter metric for incrementing values
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// A counter starting at zero.
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Adds one.
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters shared by the publisher and the coordinator.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    /// Events appended to the event log
    pub events_published: Counter,
    /// Publish calls that failed at the transport
    pub publish_failures: Counter,
    /// Inbound events handed to the outbound channel
    pub events_dispatched: Counter,
    /// Inbound events that could not be decoded or delivered
    pub events_dropped: Counter,
    /// Subscribe calls the transport rejected
    pub establish_failures: Counter,
    /// Subscriptions the transport dropped after establishment
    pub subscriptions_dropped: Counter,
}

impl BridgeMetrics {
    /// Creates a zeroed set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_published: self.events_published.get(),
            publish_failures: self.publish_failures.get(),
            events_dispatched: self.events_dispatched.get(),
            events_dropped: self.events_dropped.get(),
            establish_failures: self.establish_failures.get(),
            subscriptions_dropped: self.subscriptions_dropped.get(),
        }
    }
}

/// Plain values of [`BridgeMetrics`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Events appended to the event log
    pub events_published: u64,
    /// Publish calls that failed at the transport
    pub publish_failures: u64,
    /// Inbound events handed to the outbound channel
    pub events_dispatched: u64,
    /// Inbound events that could not be decoded or delivered
    pub events_dropped: u64,
    /// Subscribe calls the transport rejected
    pub establish_failures: u64,
    /// Subscriptions the transport dropped after establishment
    pub subscriptions_dropped: u64,
}
