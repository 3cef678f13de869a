//! Error types for `EventBridge`.
//!
//! Each subsystem gets its own error enum so callers can tell a startup
//! failure apart from a problem with a single subscription or payload.
//!
//! # Error Categories
//!
//! - **TransportError**: failures reported by the event-log connection
//! - **BridgeError**: fatal startup failures (the transport could not connect)
//! - **SubscriptionError**: establishment failures and state machine misuse
//! - **DecodeError**: inbound payloads that cannot become domain events
//! - **CodecError**: outbound events that cannot be serialized
//! - **DispatchError**: the outbound channel cannot accept an event
//! - **ConfigError**: invalid configuration values
//!
//! Only `BridgeError` and `ConfigError` are ever returned to the host
//! application. Everything on the publish and dispatch paths is logged,
//! counted and reported on the diagnostics channel instead.

use crate::subscription::{SubscriptionKind, SubscriptionState, SubscriptionTransition};
use crate::types::{GroupName, StreamId};
use thiserror::Error;

/// Errors reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection to the event log could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The operation requires an open connection.
    #[error("Transport is not connected")]
    NotConnected,

    /// Appending events to a stream failed.
    #[error("Append to stream '{stream}' failed: {reason}")]
    AppendFailed {
        /// The target stream
        stream: StreamId,
        /// Why the append failed
        reason: String,
    },

    /// A subscription could not be created.
    #[error("Subscription to stream '{stream}' failed: {reason}")]
    SubscribeFailed {
        /// The stream that was subscribed to
        stream: StreamId,
        /// Why the subscription failed
        reason: String,
    },

    /// The persistent subscription group does not exist on the server.
    #[error("Persistent subscription '{group}' on stream '{stream}' does not exist")]
    PersistentSubscriptionNotFound {
        /// The stream of the group
        stream: StreamId,
        /// The missing group
        group: GroupName,
    },

    /// The connection has been closed.
    #[error("Transport closed")]
    Closed,
}

/// Fatal errors raised while starting the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The transport could not connect. This is not retried.
    #[error("Failed to connect to the event store: {0}")]
    Connect(#[source] TransportError),
}

/// Errors in the subscription lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The transport rejected a subscribe call.
    #[error("Failed to establish {kind} subscription to '{stream}': {source}")]
    EstablishFailed {
        /// The stream of the failed subscription
        stream: StreamId,
        /// Which discipline was being established
        kind: SubscriptionKind,
        /// The transport failure
        #[source]
        source: TransportError,
    },

    /// A lifecycle signal arrived that the current state does not accept.
    #[error("Invalid subscription transition: {event:?} while {from:?}")]
    InvalidTransition {
        /// The state the slot was in
        from: SubscriptionState,
        /// The signal that was rejected
        event: SubscriptionTransition,
    },

    /// A lifecycle signal referenced a slot the registry does not know.
    #[error("Unknown {kind} subscription slot {index}")]
    UnknownSlot {
        /// The kind of the slot
        kind: SubscriptionKind,
        /// Index of the slot
        index: usize,
    },
}

/// Reasons an inbound payload is dropped instead of dispatched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is missing or is not JSON encoded.
    #[error("Received event that could not be resolved!")]
    Unresolvable,

    /// No decoder is registered for the event type tag.
    #[error("Received event that could not be handled! (type '{0}')")]
    UnhandledEventType(String),

    /// The body is not valid JSON.
    #[error("Malformed payload for event type '{event_type}': {reason}")]
    MalformedPayload {
        /// The event type tag
        event_type: String,
        /// The parse error
        reason: String,
    },

    /// The effective dispatch key has no registered decoder.
    #[error("Event of type {0} not handled")]
    DispatchKeyUnhandled(String),

    /// The registered decoder rejected the positional arguments.
    #[error("Failed to construct event of type '{event_type}': {reason}")]
    Construction {
        /// The event type tag
        event_type: String,
        /// Why construction failed
        reason: String,
    },
}

/// Errors raised while encoding an outbound event.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The event could not be serialized to JSON.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The outbound channel could not accept an event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// No consumer has been bridged yet.
    #[error("No outbound channel is bridged")]
    NotBridged,

    /// The consumer dropped its receiver.
    #[error("Outbound channel is closed")]
    Closed,
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed or failed validation.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),

    /// A configuration value was rejected.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// The offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for subscription operations.
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

/// Result type for decoding inbound events.
pub type DecodeResult<T> = Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_messages_match_log_lines() {
        assert_eq!(
            DecodeError::Unresolvable.to_string(),
            "Received event that could not be resolved!"
        );
        assert_eq!(
            DecodeError::DispatchKeyUnhandled("UserCreated".into()).to_string(),
            "Event of type UserCreated not handled"
        );
    }

    #[test]
    fn establish_failure_names_stream_and_kind() {
        let stream = StreamId::try_new("orders").unwrap();
        let err = SubscriptionError::EstablishFailed {
            stream: stream.clone(),
            kind: SubscriptionKind::Persistent,
            source: TransportError::NotConnected,
        };
        let message = err.to_string();
        assert!(message.contains("orders"));
        assert!(message.contains("persistent"));
    }
}
