//! Order fulfilment domain used by the `orders` example.

pub mod events;
pub mod types;
