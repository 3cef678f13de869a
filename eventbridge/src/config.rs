//! Bridge configuration with type-safe validation.
//!
//! Every value that could be invalid is a `nutype` newtype, so a
//! [`BridgeConfig`] that deserialized successfully is ready to use. Loading
//! the document (file, environment, remote store) is left to the host; any
//! serde format works, and [`BridgeConfig::from_json_str`] covers the common
//! case.

use crate::errors::ConfigError;
use crate::subscription::SubscriptionSpec;
use crate::types::StreamId;
use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Address of the event-log service.
#[nutype(
    sanitize(trim),
    validate(not_empty),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct Endpoint(String);

/// Settling delay before each kind of subscription is established, in
/// milliseconds.
///
/// Validated to be at most ten minutes so a typo cannot stall startup
/// indefinitely.
#[nutype(
    validate(less_or_equal = 600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct SubscriptionsDelayMs(u64);

impl SubscriptionsDelayMs {
    /// Convert to Duration for use with tokio::time::sleep.
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.into())
    }
}

/// How to reach the event-log service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Service address, passed to the transport unchanged.
    pub endpoint: Endpoint,
    /// Transport-specific options (credentials, heartbeat, ...). Opaque to the bridge.
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl ConnectionSettings {
    /// Settings for `endpoint` with no extra options.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            options: HashMap::new(),
        }
    }

    /// Adds a transport option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Everything the bridge needs at startup, except the event type registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Connection to the event log.
    pub connection: ConnectionSettings,
    /// Stream events are published to when no stream is given.
    pub feature_stream: StreamId,
    /// Optional delay before each kind's subscriptions are established.
    #[serde(default)]
    pub subscriptions_delay: Option<SubscriptionsDelayMs>,
    /// Subscriptions to establish.
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionSpec>,
}

impl BridgeConfig {
    /// A configuration with no subscriptions and no settling delay.
    pub const fn new(connection: ConnectionSettings, feature_stream: StreamId) -> Self {
        Self {
            connection,
            feature_stream,
            subscriptions_delay: None,
            subscriptions: Vec::new(),
        }
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the document is malformed or any
    /// value fails validation.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the settling delay in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the delay exceeds ten minutes.
    pub fn with_subscriptions_delay_ms(mut self, millis: u64) -> Result<Self, ConfigError> {
        let delay =
            SubscriptionsDelayMs::try_new(millis).map_err(|e| ConfigError::InvalidValue {
                field: "subscriptions_delay",
                reason: e.to_string(),
            })?;
        self.subscriptions_delay = Some(delay);
        Ok(self)
    }

    /// Adds one subscription.
    #[must_use]
    pub fn with_subscription(mut self, spec: SubscriptionSpec) -> Self {
        self.subscriptions.push(spec);
        self
    }

    /// Adds several subscriptions, keeping their order.
    #[must_use]
    pub fn with_subscriptions(mut self, specs: impl IntoIterator<Item = SubscriptionSpec>) -> Self {
        self.subscriptions.extend(specs);
        self
    }

    /// The settling delay, if one is configured and non-zero.
    pub fn settling_delay(&self) -> Option<Duration> {
        self.subscriptions_delay
            .map(SubscriptionsDelayMs::as_duration)
            .filter(|delay| !delay.is_zero())
    }
}
