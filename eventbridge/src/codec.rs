//! JSON encoding of outbound events and the positional projection used to
//! decode inbound ones.

use crate::errors::{CodecError, DecodeError, DecodeResult};
use crate::event::{DomainEvent, EventData};
use crate::types::EventId;
use serde_json::Value;

/// Encodes `event` as a JSON [`EventData`] with a fresh identifier.
///
/// Returns `Ok(None)` when the event serializes to JSON `null`; such an event
/// is treated as absent and never written.
pub fn encode<T>(event: &T) -> Result<Option<EventData>, CodecError>
where
    T: DomainEvent + ?Sized,
{
    let body = serde_json::to_value(event)?;
    if body.is_null() {
        return Ok(None);
    }
    let data = serde_json::to_vec(&body)?;
    Ok(Some(EventData::json(
        EventId::generate(),
        event.event_type(),
        data,
    )))
}

/// Projects a decoded body onto the positional argument list handed to
/// decoders.
///
/// Object values come out in property order: keys that are array indices
/// first, ascending, then every other key in insertion order. Arrays pass
/// through unchanged; any other value yields no arguments.
pub fn positional_args(body: Value) -> Vec<Value> {
    match body {
        Value::Object(map) => {
            let mut indexed = Vec::new();
            let mut named = Vec::new();
            for (key, value) in map {
                match array_index(&key) {
                    Some(index) => indexed.push((index, value)),
                    None => named.push(value),
                }
            }
            indexed.sort_by_key(|(index, _)| *index);
            indexed
                .into_iter()
                .map(|(_, value)| value)
                .chain(named)
                .collect()
        }
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

// Canonical array index: decimal without leading zeros, below 2^32 - 1.
fn array_index(key: &str) -> Option<u32> {
    let index: u32 = key.parse().ok()?;
    (index != u32::MAX && index.to_string() == key).then_some(index)
}

/// The key an inbound event is dispatched on.
///
/// This is the recorded type tag, or the body's `content.eventType` when the
/// tag is empty. Decoding still invokes the decoder registered under the
/// recorded tag; only the registration check uses this key.
pub fn dispatch_key(event_type: &str, body: &Value) -> DecodeResult<String> {
    if !event_type.is_empty() {
        return Ok(event_type.to_owned());
    }
    match body.pointer("/content/eventType") {
        Some(Value::String(key)) => Ok(key.clone()),
        Some(Value::Null) | None => Err(DecodeError::MalformedPayload {
            event_type: event_type.to_owned(),
            reason: "missing content.eventType".to_owned(),
        }),
        Some(other) => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Foo {
        a: u32,
        b: u32,
    }

    impl DomainEvent for Foo {
        fn event_type(&self) -> &str {
            "Foo"
        }
    }

    #[derive(Serialize)]
    struct Nothing;

    impl DomainEvent for Nothing {
        fn event_type(&self) -> &str {
            "Nothing"
        }
    }

    #[test]
    fn encode_writes_type_tag_and_json_body() {
        let data = encode(&Foo { a: 1, b: 2 }).unwrap().unwrap();
        assert_eq!(data.event_type, "Foo");
        assert!(data.is_json);
        assert!(data.metadata.is_none());
        assert_eq!(data.data, br#"{"a":1,"b":2}"#.to_vec());
    }

    #[test]
    fn encode_mints_distinct_ids() {
        let first = encode(&Foo { a: 1, b: 2 }).unwrap().unwrap();
        let second = encode(&Foo { a: 1, b: 2 }).unwrap().unwrap();
        assert_ne!(first.event_id, second.event_id);
    }

    #[test]
    fn null_body_encodes_to_nothing() {
        assert!(encode(&Nothing).unwrap().is_none());
    }

    #[test]
    fn object_values_keep_insertion_order() {
        let args = positional_args(json!({"z": 1, "a": 2, "m": 3}));
        assert_eq!(args, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn index_like_keys_come_first_in_numeric_order() {
        let args = positional_args(json!({"b": "b", "10": "ten", "2": "two", "01": "zero-one"}));
        assert_eq!(
            args,
            vec![json!("two"), json!("ten"), json!("b"), json!("zero-one")]
        );
    }

    #[test]
    fn non_objects_project_sensibly() {
        assert_eq!(positional_args(json!([1, 2])), vec![json!(1), json!(2)]);
        assert!(positional_args(json!(42)).is_empty());
        assert!(positional_args(Value::Null).is_empty());
    }

    #[test]
    fn dispatch_key_prefers_recorded_type() {
        let body = json!({"content": {"eventType": "Other"}});
        assert_eq!(dispatch_key("Foo", &body).unwrap(), "Foo");
        assert_eq!(dispatch_key("", &body).unwrap(), "Other");
    }

    #[test]
    fn dispatch_key_requires_fallback_when_type_is_empty() {
        assert!(matches!(
            dispatch_key("", &json!({"a": 1})),
            Err(DecodeError::MalformedPayload { .. })
        ));
    }

    proptest! {
        #[test]
        fn named_keys_preserve_insertion_order(values in proptest::collection::vec(any::<i64>(), 0..16)) {
            let mut map = serde_json::Map::new();
            for (i, v) in values.iter().enumerate() {
                map.insert(format!("k{i}"), json!(v));
            }
            let args = positional_args(Value::Object(map));
            let expected: Vec<Value> = values.iter().map(|v| json!(v)).collect();
            prop_assert_eq!(args, expected);
        }
    }
}
