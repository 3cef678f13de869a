//! Monitoring and observability for the bridge.
//!
//! Nothing on the publish or dispatch paths is returned to the caller as an
//! error. This module is where those failures become visible: atomic
//! counters, a broadcast channel of failure reports, and a health check that
//! turns subscription liveness into a [`HealthStatus`].

pub mod failures;
pub mod health;
pub mod metrics;

pub use failures::*;
pub use health::*;
pub use metrics::*;
