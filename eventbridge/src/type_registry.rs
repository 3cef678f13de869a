//! Type registry mapping event type tags to decoders.
//!
//! The registry is assembled once at startup with one registration per event
//! type, then frozen and shared with the coordinator. Registering a tag twice
//! keeps the last decoder; merging another registry overlays its entries onto
//! the ones already present.

use crate::codec::{dispatch_key, positional_args};
use crate::errors::{DecodeError, DecodeResult};
use crate::event::ResolvedEvent;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builds a domain event from positional JSON arguments.
pub type DecodeFn<E> = Arc<dyn Fn(Vec<Value>) -> Result<E, String> + Send + Sync>;

/// Immutable mapping from type tag to decoder.
pub struct EventTypeRegistry<E> {
    decoders: HashMap<String, DecodeFn<E>>,
}

impl<E: 'static> EventTypeRegistry<E> {
    /// Starts an empty builder.
    pub fn builder() -> EventTypeRegistryBuilder<E> {
        EventTypeRegistryBuilder::new()
    }

    /// Reopens this registry for further registrations.
    pub fn into_builder(self) -> EventTypeRegistryBuilder<E> {
        EventTypeRegistryBuilder {
            decoders: self.decoders,
        }
    }

    /// Checks if a decoder is registered for `type_name`.
    pub fn is_type_registered(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// All registered tags, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.decoders.keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of registered tags.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Turns an inbound delivery into a domain event.
    ///
    /// The payload must be present and JSON, its recorded type tag must be
    /// registered, and its [dispatch key](crate::codec::dispatch_key) must be
    /// registered too. The decoder invoked is always the one registered under
    /// the recorded tag, even when the dispatch key came from the body.
    pub fn decode(&self, resolved: &ResolvedEvent) -> DecodeResult<E> {
        let recorded = match &resolved.event {
            Some(recorded) if recorded.is_json => recorded,
            _ => return Err(DecodeError::Unresolvable),
        };

        let decoder = self
            .decoders
            .get(&recorded.event_type)
            .ok_or_else(|| DecodeError::UnhandledEventType(recorded.event_type.clone()))?;

        let body: Value =
            serde_json::from_slice(&recorded.data).map_err(|e| DecodeError::MalformedPayload {
                event_type: recorded.event_type.clone(),
                reason: e.to_string(),
            })?;

        let key = dispatch_key(&recorded.event_type, &body)?;
        if !self.decoders.contains_key(&key) {
            return Err(DecodeError::DispatchKeyUnhandled(key));
        }

        decoder(positional_args(body)).map_err(|reason| DecodeError::Construction {
            event_type: recorded.event_type.clone(),
            reason,
        })
    }
}

impl<E> Clone for EventTypeRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            decoders: self.decoders.clone(),
        }
    }
}

impl<E> fmt::Debug for EventTypeRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&String> = self.decoders.keys().collect();
        tags.sort();
        f.debug_struct("EventTypeRegistry")
            .field("types", &tags)
            .finish()
    }
}

/// Collects decoders before the registry is frozen.
pub struct EventTypeRegistryBuilder<E> {
    decoders: HashMap<String, DecodeFn<E>>,
}

impl<E: 'static> EventTypeRegistryBuilder<E> {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers `T` under `type_name`.
    ///
    /// Positional arguments are deserialized into `T` field by field in
    /// declaration order, then converted into the domain event type.
    #[must_use]
    pub fn register<T>(self, type_name: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Into<E> + 'static,
    {
        self.register_with(type_name, |args: Vec<Value>| {
            let no_fields = args.is_empty();
            serde_json::from_value::<T>(Value::Array(args))
                .or_else(|err| {
                    // unit structs only deserialize from null
                    if no_fields {
                        serde_json::from_value::<T>(Value::Null)
                    } else {
                        Err(err)
                    }
                })
                .map(Into::into)
                .map_err(|e| e.to_string())
        })
    }

    /// Registers a custom decoder under `type_name`.
    #[must_use]
    pub fn register_with<F>(mut self, type_name: impl Into<String>, decoder: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<E, String> + Send + Sync + 'static,
    {
        self.insert(type_name.into(), Arc::new(decoder));
        self
    }

    /// Overlays every decoder of `other`; its entries win on conflicting tags.
    #[must_use]
    pub fn merge(mut self, other: EventTypeRegistry<E>) -> Self {
        for (type_name, decoder) in other.decoders {
            self.insert(type_name, decoder);
        }
        self
    }

    /// Freezes the registry.
    pub fn build(self) -> EventTypeRegistry<E> {
        EventTypeRegistry {
            decoders: self.decoders,
        }
    }

    fn insert(&mut self, type_name: String, decoder: DecodeFn<E>) {
        if self.decoders.insert(type_name.clone(), decoder).is_some() {
            debug!(event_type = %type_name, "Replacing previously registered decoder");
        }
    }
}

impl<E: 'static> Default for EventTypeRegistryBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::event::{DomainEvent, RecordedEvent};
    use crate::types::{EventId, EventNumber, StreamId, Timestamp};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Foo {
        a: u32,
        b: u32,
    }

    impl DomainEvent for Foo {
        fn event_type(&self) -> &str {
            "Foo"
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Ping;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestEvent {
        Foo(Foo),
        Ping,
        Custom(String),
    }

    impl From<Foo> for TestEvent {
        fn from(foo: Foo) -> Self {
            Self::Foo(foo)
        }
    }

    impl From<Ping> for TestEvent {
        fn from(_: Ping) -> Self {
            Self::Ping
        }
    }

    fn recorded(event_type: &str, is_json: bool, data: &[u8]) -> ResolvedEvent {
        ResolvedEvent::new(RecordedEvent {
            event_id: EventId::generate(),
            event_stream_id: StreamId::try_new("test").unwrap(),
            event_number: EventNumber::first(),
            event_type: event_type.to_owned(),
            is_json,
            data: data.to_vec(),
            metadata: None,
            created: Timestamp::now(),
        })
    }

    fn registry() -> EventTypeRegistry<TestEvent> {
        EventTypeRegistry::builder()
            .register::<Foo>("Foo")
            .register::<Ping>("Ping")
            .build()
    }

    #[test]
    fn round_trips_through_encode_and_decode() {
        let original = Foo { a: 1, b: 2 };
        let data = encode(&original).unwrap().unwrap();

        let decoded = registry()
            .decode(&recorded(&data.event_type, data.is_json, &data.data))
            .unwrap();

        assert_eq!(decoded, TestEvent::Foo(original));
    }

    #[test]
    fn values_are_applied_positionally_not_by_name() {
        let decoded = registry()
            .decode(&recorded("Foo", true, br#"{"second": 2, "first": 1}"#))
            .unwrap();
        assert_eq!(decoded, TestEvent::Foo(Foo { a: 2, b: 1 }));
    }

    #[test]
    fn field_less_events_decode_from_empty_object() {
        let decoded = registry().decode(&recorded("Ping", true, b"{}")).unwrap();
        assert_eq!(decoded, TestEvent::Ping);
    }

    #[test]
    fn rejects_missing_or_non_json_payloads() {
        assert_eq!(
            registry().decode(&ResolvedEvent::unresolved()),
            Err(DecodeError::Unresolvable)
        );
        assert_eq!(
            registry().decode(&recorded("Foo", false, br#"{"a":1,"b":2}"#)),
            Err(DecodeError::Unresolvable)
        );
    }

    #[test]
    fn rejects_unregistered_type_tags() {
        assert_eq!(
            registry().decode(&recorded("Bar", true, b"{}")),
            Err(DecodeError::UnhandledEventType("Bar".into()))
        );
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(matches!(
            registry().decode(&recorded("Foo", true, b"{not json")),
            Err(DecodeError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn reports_construction_failures() {
        assert!(matches!(
            registry().decode(&recorded("Foo", true, br#"{"a":"x","b":2}"#)),
            Err(DecodeError::Construction { .. })
        ));
    }

    #[test]
    fn empty_type_tag_dispatches_on_body_but_invokes_original_decoder() {
        let registry = EventTypeRegistry::<TestEvent>::builder()
            .register_with("", |_| Ok(TestEvent::Custom("empty-tag decoder".into())))
            .register::<Foo>("Foo")
            .build();
        let body = json!({"content": {"eventType": "Foo"}}).to_string();

        let decoded = registry
            .decode(&recorded("", true, body.as_bytes()))
            .unwrap();
        assert_eq!(decoded, TestEvent::Custom("empty-tag decoder".into()));

        let body = json!({"content": {"eventType": "Unknown"}}).to_string();
        assert_eq!(
            registry.decode(&recorded("", true, body.as_bytes())),
            Err(DecodeError::DispatchKeyUnhandled("Unknown".into()))
        );
    }

    #[test]
    fn last_registration_wins_and_merge_overlays() {
        let base = EventTypeRegistry::<TestEvent>::builder()
            .register_with("Foo", |_| Ok(TestEvent::Custom("first".into())))
            .register::<Ping>("Ping")
            .build();
        let overlay = EventTypeRegistry::<TestEvent>::builder()
            .register_with("Foo", |_| Ok(TestEvent::Custom("second".into())))
            .build();

        let merged = base.into_builder().merge(overlay).build();

        assert_eq!(merged.registered_types(), vec!["Foo", "Ping"]);
        assert_eq!(
            merged.decode(&recorded("Foo", true, b"{}")).unwrap(),
            TestEvent::Custom("second".into())
        );
        assert_eq!(
            merged.decode(&recorded("Ping", true, b"{}")).unwrap(),
            TestEvent::Ping
        );
    }
}
