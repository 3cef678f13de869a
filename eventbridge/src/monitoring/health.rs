//! Health checks over subscription liveness.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::registry::SubscriptionRegistry;
use crate::subscription::SubscriptionKind;

/// Overall liveness of the bridge's subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Every subscription kind is live
    Healthy,
    /// Some slots are live, others are not
    Degraded,
    /// No slot is live
    Unhealthy,
}

/// Outcome of one health check.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// Overall status
    pub status: HealthStatus,
    /// Summary such as "1 of 2 subscriptions are live"
    pub message: String,
    /// When the check ran
    pub checked_at: Instant,
    /// Time spent inspecting the registry
    pub duration: Duration,
    /// Per-kind liveness and the live slot count
    pub metadata: HashMap<String, String>,
}

impl HealthCheckResult {
    /// A result with no metadata yet.
    pub fn new(status: HealthStatus, message: impl Into<String>, duration: Duration) -> Self {
        Self {
            status,
            message: message.into(),
            checked_at: Instant::now(),
            duration,
            metadata: HashMap::new(),
        }
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A named check that can be polled by a readiness probe.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Stable name for reporting
    fn name(&self) -> &str;

    /// Runs the check.
    async fn check(&self) -> HealthCheckResult;
}

/// Reports whether the bridge's subscriptions are delivering events live.
///
/// Healthy when every kind is live, unhealthy when no slot is live, degraded
/// in between.
#[derive(Debug, Clone)]
pub struct SubscriptionLivenessCheck {
    registry: Arc<SubscriptionRegistry>,
}

impl SubscriptionLivenessCheck {
    /// Checks the slots tracked by `registry`.
    pub const fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl HealthCheck for SubscriptionLivenessCheck {
    fn name(&self) -> &'static str {
        "subscription_liveness"
    }

    async fn check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let live = self.registry.live_count();
        let total = self.registry.statuses().len();

        let (status, message) = if self.registry.is_live() {
            (HealthStatus::Healthy, format!("All {total} subscriptions are live"))
        } else if live > 0 {
            (
                HealthStatus::Degraded,
                format!("{live} of {total} subscriptions are live"),
            )
        } else {
            (HealthStatus::Unhealthy, "No subscription is live".to_string())
        };
        let mut result = HealthCheckResult::new(status, message, start.elapsed());

        for kind in SubscriptionKind::ALL {
            result = result.with_metadata(
                format!("{kind}_live"),
                self.registry.all_live(kind).to_string(),
            );
        }
        result.with_metadata("live_subscriptions", live.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{SubscriptionKey, SubscriptionSpec};
    use crate::transport::TransportSubscription;
    use crate::types::StreamId;

    #[derive(Debug)]
    struct FakeHandle(StreamId);

    impl TransportSubscription for FakeHandle {
        fn stream_id(&self) -> &StreamId {
            &self.0
        }
    }

    fn stream(name: &str) -> StreamId {
        StreamId::try_new(name).unwrap()
    }

    fn registry_with_volatile(names: &[&str]) -> Arc<SubscriptionRegistry> {
        let registry = Arc::new(SubscriptionRegistry::new());
        let specs: Vec<_> = names
            .iter()
            .map(|n| SubscriptionSpec::volatile(stream(n)))
            .collect();
        for kind in SubscriptionKind::ALL {
            if kind == SubscriptionKind::Volatile {
                registry.begin(kind, &specs);
            } else {
                registry.begin(kind, &[]);
                registry.complete(kind);
            }
        }
        registry
    }

    fn establish(registry: &SubscriptionRegistry, index: usize, name: &str) {
        registry
            .record_established(
                SubscriptionKey::new(SubscriptionKind::Volatile, index),
                Box::new(FakeHandle(stream(name))),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn healthy_when_everything_is_live() {
        let registry = registry_with_volatile(&["a"]);
        establish(&registry, 0, "a");
        registry.complete(SubscriptionKind::Volatile);

        let check = SubscriptionLivenessCheck::new(registry);
        let result = check.check().await;

        assert_eq!(check.name(), "subscription_liveness");
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.metadata.get("volatile_live").map(String::as_str), Some("true"));
    }

    #[tokio::test]
    async fn degraded_when_partially_live() {
        let registry = registry_with_volatile(&["a", "b"]);
        establish(&registry, 0, "a");
        registry
            .record_failed(SubscriptionKey::new(SubscriptionKind::Volatile, 1))
            .unwrap();
        registry.complete(SubscriptionKind::Volatile);

        let result = SubscriptionLivenessCheck::new(registry).check().await;

        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(result.message, "1 of 2 subscriptions are live");
    }

    #[tokio::test]
    async fn unhealthy_before_anything_is_live() {
        let registry = registry_with_volatile(&["a"]);
        let result = SubscriptionLivenessCheck::new(registry).check().await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(
            result.metadata.get("catch-up_live").map(String::as_str),
            Some("true")
        );
    }
}
