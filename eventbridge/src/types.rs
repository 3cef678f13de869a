//! Core types for the `EventBridge` library.
//!
//! Identifiers that cross the transport boundary are validated newtypes, so a
//! stream or persistent group name can never be empty once constructed.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stream identifier in the external event log.
///
/// `StreamId` values are guaranteed to be non-empty and at most 255 characters.
/// Surrounding whitespace is trimmed.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct StreamId(String);

/// Name of a server-side persistent subscription group.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct GroupName(String);

/// A globally unique event identifier.
///
/// Identifiers minted by [`EventId::generate`] are UUIDv7, so events published
/// in sequence sort in creation order.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Deref,
    Display,
    Serialize,
    Deserialize
))]
pub struct EventId(Uuid);

impl EventId {
    /// Mints a fresh time-ordered identifier.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::generate()
    }
}

/// Position of an event within its stream.
///
/// Numbers start at 0 and double as catch-up checkpoints: a catch-up
/// subscription started from checkpoint `n` receives events numbered `n + 1`
/// onwards.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    From,
    Serialize,
    Deserialize
))]
pub struct EventNumber(u64);

impl EventNumber {
    /// The first event number of any stream.
    pub fn first() -> Self {
        Self::new(0)
    }

    /// Returns the number following this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.into_inner().saturating_add(1))
    }
}

/// A timestamp for when an event was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn stream_id_accepts_valid_strings(s in "[a-zA-Z0-9_$-]{1,255}") {
            let result = StreamId::try_new(s.clone());
            prop_assert!(result.is_ok());
            let stream_id = result.unwrap();
            prop_assert_eq!(stream_id.as_ref(), &s);
        }

        #[test]
        fn stream_id_trims_whitespace(s in " {0,10}[a-zA-Z0-9_-]{1,240} {0,10}") {
            let stream_id = StreamId::try_new(s.clone()).unwrap();
            prop_assert_eq!(stream_id.as_ref(), s.trim());
        }

        #[test]
        fn stream_id_rejects_overlong_strings(s in "[a-z]{256,300}") {
            prop_assert!(StreamId::try_new(s).is_err());
        }

        #[test]
        fn event_number_next_is_monotonic(n in 0u64..u64::MAX) {
            let number = EventNumber::new(n);
            prop_assert!(number.next() > number);
        }
    }

    #[test]
    fn stream_id_rejects_blank_strings() {
        assert!(StreamId::try_new("").is_err());
        assert!(StreamId::try_new("   ").is_err());
    }

    #[test]
    fn group_name_rejects_blank_strings() {
        assert!(GroupName::try_new(" ").is_err());
        assert_eq!(GroupName::try_new(" billing ").unwrap().as_ref(), "billing");
    }

    #[test]
    fn generated_event_ids_are_v7_and_unique() {
        let first = EventId::generate();
        let second = EventId::generate();
        assert_eq!(first.get_version(), Some(uuid::Version::SortRand));
        assert_ne!(first, second);
    }
}
