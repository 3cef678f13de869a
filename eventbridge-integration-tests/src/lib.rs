//! Integration tests for `EventBridge`
//!
//! This crate contains integration tests that verify the bridge facade
//! together with the in-memory transport: publishing, subscription
//! establishment, liveness and inbound dispatch.

// This is a test-only crate
#![cfg(test)]
