//! Shared fixtures for the bridge integration tests.
//!
//! Every test drives a real [`EventStoreBridge`] over an
//! [`InMemoryTransport`], observing inbound events on the outbound channel.

// Allow dead_code because not all test binaries use all exports from this module
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use eventbridge::codec::encode;
use eventbridge::{
    BridgeConfig, ConnectionSettings, DispatchBridge, DomainEvent, Endpoint, EventStoreBridge,
    EventTypeRegistry, ExpectedVersion, GroupName, StreamId, SubscriptionSpec, Transport,
};
use eventbridge_memory::InMemoryTransport;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// The feature stream every fixture publishes to by default.
pub const FEATURE_STREAM: &str = "orders";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: u32,
    pub quantity: u32,
}

impl DomainEvent for OrderPlaced {
    fn event_type(&self) -> &str {
        "OrderPlaced"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: u32,
}

impl DomainEvent for OrderShipped {
    fn event_type(&self) -> &str {
        "OrderShipped"
    }
}

/// Published but never registered for decoding.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecorded {
    pub note: String,
}

impl DomainEvent for AuditRecorded {
    fn event_type(&self) -> &str {
        "AuditRecorded"
    }
}

/// What the application receives on its outbound channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    Placed(OrderPlaced),
    Shipped(OrderShipped),
}

impl From<OrderPlaced> for OrderEvent {
    fn from(event: OrderPlaced) -> Self {
        Self::Placed(event)
    }
}

impl From<OrderShipped> for OrderEvent {
    fn from(event: OrderShipped) -> Self {
        Self::Shipped(event)
    }
}

pub fn stream(name: &str) -> StreamId {
    StreamId::try_new(name).expect("valid stream name")
}

pub fn group(name: &str) -> GroupName {
    GroupName::try_new(name).expect("valid group name")
}

pub fn order_types() -> EventTypeRegistry<OrderEvent> {
    EventTypeRegistry::builder()
        .register::<OrderPlaced>("OrderPlaced")
        .register::<OrderShipped>("OrderShipped")
        .build()
}

pub fn config(subscriptions: impl IntoIterator<Item = SubscriptionSpec>) -> BridgeConfig {
    let endpoint = Endpoint::try_new("memory://local").expect("valid endpoint");
    BridgeConfig::new(ConnectionSettings::new(endpoint), stream(FEATURE_STREAM))
        .with_subscriptions(subscriptions)
}

/// A started bridge plus the handles a test needs to observe it.
pub struct Harness {
    pub bridge: EventStoreBridge<OrderEvent>,
    pub transport: InMemoryTransport,
    pub events: mpsc::UnboundedReceiver<OrderEvent>,
}

impl Harness {
    /// Starts a bridge over a fresh transport.
    pub async fn start(subscriptions: impl IntoIterator<Item = SubscriptionSpec>) -> Self {
        Self::start_on(InMemoryTransport::new(), config(subscriptions)).await
    }

    /// Starts a bridge over `transport`, which may already hold events.
    pub async fn start_on(transport: InMemoryTransport, config: BridgeConfig) -> Self {
        let (dispatch, events) = DispatchBridge::channel();
        let bridge = EventStoreBridge::start(
            config,
            Arc::new(transport.clone()) as Arc<dyn Transport>,
            order_types(),
            dispatch,
        )
        .await
        .expect("bridge should start");
        Self {
            bridge,
            transport,
            events,
        }
    }

    /// The next event on the outbound channel.
    pub async fn next_event(&mut self) -> OrderEvent {
        tokio::time::timeout(Duration::from_secs(1), self.events.recv())
            .await
            .expect("an event should arrive")
            .expect("outbound channel should be open")
    }

    /// Asserts nothing else is waiting on the outbound channel.
    pub fn assert_no_pending_events(&mut self) {
        assert!(self.events.try_recv().is_err(), "unexpected pending event");
    }
}

/// Appends `events` to `stream` before any bridge is started.
pub async fn seed<T: DomainEvent>(transport: &InMemoryTransport, stream: &StreamId, events: &[T]) {
    transport
        .connect(&config([]).connection)
        .await
        .expect("in-memory transport should connect");
    let data = events
        .iter()
        .map(|event| {
            encode(event)
                .expect("event should encode")
                .expect("event should not be null")
        })
        .collect();
    transport
        .append_to_stream(stream, ExpectedVersion::Any, data)
        .await
        .expect("seed append should succeed");
}

/// Polls `condition` until it holds, failing the test after a second.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition did not hold within a second");
}
