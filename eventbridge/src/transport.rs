//! Transport abstraction for the external event log.
//!
//! The `Transport` trait is the port between the bridge and a concrete
//! event-log client. Implementations own the wire protocol; the bridge only
//! relies on the primitives below.

use crate::config::ConnectionSettings;
use crate::errors::TransportResult;
use crate::event::EventData;
use crate::subscription::SubscriptionSink;
use crate::types::{EventNumber, GroupName, StreamId};
use async_trait::async_trait;
use std::fmt::Debug;

/// Expected version for optimistic concurrency control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Any version is acceptable (no concurrency control)
    Any,
    /// The stream must not exist
    NoStream,
    /// The stream must have exactly this last event number
    Exact(EventNumber),
}

/// A live subscription owned by the transport.
///
/// Dropping the handle does not unsubscribe; subscriptions end when the
/// transport drops them or when the transport is closed.
pub trait TransportSubscription: Send + Sync + Debug {
    /// The stream the subscription is attached to.
    fn stream_id(&self) -> &StreamId;
}

/// Connection to an append-only event log.
///
/// Subscriptions report their events and lifecycle through the supplied
/// [`SubscriptionSink`]. Sinks must be used from the transport's own delivery
/// context; sending never blocks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the connection. Called once at startup.
    async fn connect(&self, settings: &ConnectionSettings) -> TransportResult<()>;

    /// Appends `events` to `stream`.
    async fn append_to_stream(
        &self,
        stream: &StreamId,
        expected_version: ExpectedVersion,
        events: Vec<EventData>,
    ) -> TransportResult<()>;

    /// Subscribes from `checkpoint` (exclusive), or from the start of the
    /// stream when `None`. The sink receives `live` once replay has caught up.
    async fn subscribe_to_stream_from(
        &self,
        stream: &StreamId,
        checkpoint: Option<EventNumber>,
        resolve_link_tos: bool,
        sink: SubscriptionSink,
    ) -> TransportResult<Box<dyn TransportSubscription>>;

    /// Subscribes to events appended from now on. Never signals `live`.
    async fn subscribe_to_stream(
        &self,
        stream: &StreamId,
        resolve_link_tos: bool,
        sink: SubscriptionSink,
    ) -> TransportResult<Box<dyn TransportSubscription>>;

    /// Joins the persistent subscription `group` on `stream`. Never signals
    /// `live`.
    async fn connect_to_persistent_subscription(
        &self,
        stream: &StreamId,
        group: &GroupName,
        sink: SubscriptionSink,
    ) -> TransportResult<Box<dyn TransportSubscription>>;

    /// Releases every subscription and the connection.
    async fn close(&self) -> TransportResult<()>;
}
