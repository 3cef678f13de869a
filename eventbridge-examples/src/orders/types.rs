//! Type-safe domain types for the orders example
//!
//! Validation runs on deserialization too, so an inbound event carrying an
//! invalid value fails to decode instead of reaching the application.

use nutype::nutype;

/// Identifies an order.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct OrderId(String);

/// Number of units ordered; at least one.
#[nutype(
    validate(greater = 0, less_or_equal = 10_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct Quantity(u32);

/// Carrier tracking reference.
#[nutype(
    sanitize(trim, uppercase),
    validate(not_empty),
    derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)
)]
pub struct TrackingCode(String);
