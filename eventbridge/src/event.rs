//! Wire-level event shapes and the domain event contract.

use crate::types::{EventId, EventNumber, StreamId, Timestamp};
use serde::Serialize;

/// A domain event that can be published through the bridge.
///
/// The type tag is written alongside the JSON body and is the key inbound
/// decoders are registered under.
pub trait DomainEvent: Serialize + Send + Sync {
    /// The type tag stored with the event.
    fn event_type(&self) -> &str;
}

/// An event ready to be appended to a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventData {
    /// Unique identifier of this write
    pub event_id: EventId,
    /// Type tag of the event
    pub event_type: String,
    /// Whether `data` holds JSON
    pub is_json: bool,
    /// Encoded body
    pub data: Vec<u8>,
    /// Optional encoded metadata
    pub metadata: Option<Vec<u8>>,
}

impl EventData {
    /// Creates a JSON event without metadata.
    pub fn json(event_id: EventId, event_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            is_json: true,
            data,
            metadata: None,
        }
    }
}

/// An event as it was recorded by the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Identifier assigned when the event was written
    pub event_id: EventId,
    /// The stream the event was written to
    pub event_stream_id: StreamId,
    /// Position within the stream
    pub event_number: EventNumber,
    /// Type tag of the event
    pub event_type: String,
    /// Whether `data` holds JSON
    pub is_json: bool,
    /// Encoded body
    pub data: Vec<u8>,
    /// Optional encoded metadata
    pub metadata: Option<Vec<u8>>,
    /// When the event was recorded
    pub created: Timestamp,
}

impl RecordedEvent {
    /// Records `data` at `event_number` of `stream`.
    pub fn from_event_data(stream: StreamId, event_number: EventNumber, data: EventData) -> Self {
        Self {
            event_id: data.event_id,
            event_stream_id: stream,
            event_number,
            event_type: data.event_type,
            is_json: data.is_json,
            data: data.data,
            metadata: data.metadata,
            created: Timestamp::now(),
        }
    }
}

/// An event delivered to a subscription.
///
/// `event` is `None` when the log delivered a link whose target could not be
/// resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEvent {
    /// The resolved event, if any
    pub event: Option<RecordedEvent>,
}

impl ResolvedEvent {
    /// Wraps a recorded event.
    pub const fn new(event: RecordedEvent) -> Self {
        Self { event: Some(event) }
    }

    /// A delivery whose link could not be resolved.
    pub const fn unresolved() -> Self {
        Self { event: None }
    }

    /// The event number, when the event is present.
    pub fn event_number(&self) -> Option<EventNumber> {
        self.event.as_ref().map(|e| e.event_number)
    }
}

impl From<RecordedEvent> for ResolvedEvent {
    fn from(event: RecordedEvent) -> Self {
        Self::new(event)
    }
}
