//! `EventBridge` - bridges an application event bus to an append-only event log
//!
//! Outbound, domain events are published to named streams. Inbound, events
//! arrive through catch-up, volatile and persistent subscriptions, are decoded
//! through an explicit [`EventTypeRegistry`] and handed to a single outbound
//! channel. The bridge reports whether every subscription is delivering live.
//!
//! ```no_run
//! use eventbridge::{BridgeConfig, DispatchBridge, EventStoreBridge, EventTypeRegistry};
//! # use std::sync::Arc;
//! # async fn run(transport: Arc<dyn eventbridge::Transport>) -> Result<(), Box<dyn std::error::Error>> {
//! #[derive(serde::Deserialize)]
//! struct UserRegistered { id: u64, name: String }
//!
//! let config = BridgeConfig::from_json_str(r#"{
//!     "connection": { "endpoint": "tcp://localhost:1113" },
//!     "feature_stream": "users",
//!     "subscriptions": [{ "type": "catch-up", "stream": "$ce-user" }]
//! }"#)?;
//! let types = EventTypeRegistry::<UserRegistered>::builder()
//!     .register::<UserRegistered>("UserRegistered")
//!     .build();
//! let (dispatch, mut events) = DispatchBridge::channel();
//!
//! let bridge = EventStoreBridge::start(config, transport, types, dispatch).await?;
//! while let Some(event) = events.recv().await {
//!     println!("user {} registered as {}", event.id, event.name);
//! }
//! bridge.close().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bridge;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod errors;
pub mod event;
pub mod monitoring;
pub mod publisher;
pub mod registry;
pub mod subscription;
pub mod transport;
pub mod type_registry;
pub mod types;

pub use bridge::EventStoreBridge;
pub use config::{BridgeConfig, ConnectionSettings, Endpoint, SubscriptionsDelayMs};
pub use dispatch::DispatchBridge;
pub use errors::{
    BridgeError, CodecError, ConfigError, DecodeError, DispatchError, SubscriptionError,
    TransportError, TransportResult,
};
pub use event::{DomainEvent, EventData, RecordedEvent, ResolvedEvent};
pub use monitoring::{
    BridgeFailure, HealthCheck, HealthCheckResult, HealthStatus, MetricsSnapshot,
    SubscriptionLivenessCheck,
};
pub use publisher::PublishOutcome;
pub use registry::SubscriptionStatus;
pub use subscription::{
    DropReason, SubscriptionKey, SubscriptionKind, SubscriptionSink, SubscriptionSpec,
    SubscriptionState,
};
pub use transport::{ExpectedVersion, Transport, TransportSubscription};
pub use type_registry::{EventTypeRegistry, EventTypeRegistryBuilder};
pub use types::{EventId, EventNumber, GroupName, StreamId, Timestamp};
