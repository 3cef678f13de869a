//! Example applications using the `EventBridge` library
//!
//! This crate provides example domains demonstrating how an application
//! publishes its events through the bridge and consumes them back from
//! subscriptions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// These are examples, so we don't need to be as pedantic
#![allow(clippy::missing_const_for_fn)]

/// Order fulfilment example: orders placed and shipped through the bridge
pub mod orders;
