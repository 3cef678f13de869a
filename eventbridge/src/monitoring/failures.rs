//! Failure reports for errors that are swallowed instead of returned.

use super::metrics::BridgeMetrics;
use crate::errors::{DecodeError, DispatchError};
use crate::subscription::{DropReason, SubscriptionKey};
use crate::types::StreamId;
use std::sync::Arc;
use tokio::sync::broadcast;

const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// Something went wrong that the bridge logged and carried on from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeFailure {
    /// An append was rejected by the transport.
    Publish {
        /// Target stream
        stream: StreamId,
        /// Transport error text
        reason: String,
    },
    /// A subscribe call failed; its slot stays empty.
    EstablishFailed {
        /// The slot that failed
        key: SubscriptionKey,
        /// Its stream
        stream: StreamId,
        /// Transport error text
        reason: String,
    },
    /// The transport dropped an established subscription.
    SubscriptionDropped {
        /// The slot that was dropped
        key: SubscriptionKey,
        /// Its stream, if the slot is known
        stream: Option<StreamId>,
        /// Drop reason reported by the transport
        reason: DropReason,
        /// Error text reported by the transport
        error: Option<String>,
    },
    /// An inbound event could not be turned into a domain event.
    Undecodable {
        /// The slot the event arrived on
        key: SubscriptionKey,
        /// Why decoding failed
        error: DecodeError,
    },
    /// A decoded event could not be handed to the outbound channel.
    Dispatch {
        /// The slot the event arrived on
        key: SubscriptionKey,
        /// Why delivery failed
        error: DispatchError,
    },
}

/// Counters plus the broadcast channel failures are reported on.
///
/// Reports are dropped when nobody subscribed, and slow receivers lag rather
/// than block the bridge.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    metrics: Arc<BridgeMetrics>,
    failures: broadcast::Sender<BridgeFailure>,
}

impl Diagnostics {
    /// Fresh counters and an empty failure channel.
    pub fn new() -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            metrics: Arc::new(BridgeMetrics::new()),
            failures,
        }
    }

    /// The shared counters.
    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    /// Receives every failure reported from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeFailure> {
        self.failures.subscribe()
    }

    /// Counts a successful append.
    pub fn published(&self) {
        self.metrics.events_published.increment();
    }

    /// Counts a delivered inbound event.
    pub fn dispatched(&self) {
        self.metrics.events_dispatched.increment();
    }

    /// Counts and reports a failure.
    pub fn report(&self, failure: BridgeFailure) {
        let counter = match &failure {
            BridgeFailure::Publish { .. } => &self.metrics.publish_failures,
            BridgeFailure::EstablishFailed { .. } => &self.metrics.establish_failures,
            BridgeFailure::SubscriptionDropped { .. } => &self.metrics.subscriptions_dropped,
            BridgeFailure::Undecodable { .. } | BridgeFailure::Dispatch { .. } => {
                &self.metrics.events_dropped
            }
        };
        counter.increment();
        // no receivers is fine
        let _ = self.failures.send(failure);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::SubscriptionKind;

    #[test]
    fn report_counts_and_broadcasts() {
        let diagnostics = Diagnostics::new();
        let mut rx = diagnostics.subscribe();
        let key = SubscriptionKey::new(SubscriptionKind::CatchUp, 0);

        diagnostics.report(BridgeFailure::Undecodable {
            key,
            error: DecodeError::Unresolvable,
        });
        diagnostics.report(BridgeFailure::Dispatch {
            key,
            error: DispatchError::NotBridged,
        });

        assert_eq!(diagnostics.metrics().events_dropped.get(), 2);
        assert_eq!(
            rx.try_recv().unwrap(),
            BridgeFailure::Undecodable {
                key,
                error: DecodeError::Unresolvable
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), BridgeFailure::Dispatch { .. }));
    }

    #[test]
    fn reporting_without_receivers_still_counts() {
        let diagnostics = Diagnostics::new();
        diagnostics.report(BridgeFailure::Publish {
            stream: StreamId::try_new("s").unwrap(),
            reason: "down".into(),
        });
        assert_eq!(diagnostics.metrics().snapshot().publish_failures, 1);
    }

    #[test]
    fn clones_share_counters() {
        let diagnostics = Diagnostics::new();
        let clone = diagnostics.clone();
        clone.dispatched();
        assert_eq!(diagnostics.metrics().events_dispatched.get(), 1);
    }
}
