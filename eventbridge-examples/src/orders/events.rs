//! Order events and the registry that decodes them from the event log.

use crate::orders::types::{OrderId, Quantity, TrackingCode};
use eventbridge::{DomainEvent, EventTypeRegistry};
use serde::{Deserialize, Serialize};

/// A customer placed an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    /// The new order
    pub order_id: OrderId,
    /// Units ordered
    pub quantity: Quantity,
}

impl DomainEvent for OrderPlaced {
    fn event_type(&self) -> &str {
        "OrderPlaced"
    }
}

/// An order left the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    /// The shipped order
    pub order_id: OrderId,
    /// Carrier reference
    pub tracking: TrackingCode,
}

impl DomainEvent for OrderShipped {
    fn event_type(&self) -> &str {
        "OrderShipped"
    }
}

/// An order was cancelled before shipping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    /// The cancelled order
    pub order_id: OrderId,
}

impl DomainEvent for OrderCancelled {
    fn event_type(&self) -> &str {
        "OrderCancelled"
    }
}

/// Every order event the application consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    /// See [`OrderPlaced`]
    Placed(OrderPlaced),
    /// See [`OrderShipped`]
    Shipped(OrderShipped),
    /// See [`OrderCancelled`]
    Cancelled(OrderCancelled),
}

impl OrderEvent {
    /// The order the event is about.
    pub fn order_id(&self) -> &OrderId {
        match self {
            Self::Placed(e) => &e.order_id,
            Self::Shipped(e) => &e.order_id,
            Self::Cancelled(e) => &e.order_id,
        }
    }
}

impl From<OrderPlaced> for OrderEvent {
    fn from(event: OrderPlaced) -> Self {
        Self::Placed(event)
    }
}

impl From<OrderShipped> for OrderEvent {
    fn from(event: OrderShipped) -> Self {
        Self::Shipped(event)
    }
}

impl From<OrderCancelled> for OrderEvent {
    fn from(event: OrderCancelled) -> Self {
        Self::Cancelled(event)
    }
}

/// Decoders for every order event, keyed by type tag.
pub fn registry() -> EventTypeRegistry<OrderEvent> {
    EventTypeRegistry::builder()
        .register::<OrderPlaced>("OrderPlaced")
        .register::<OrderShipped>("OrderShipped")
        .register::<OrderCancelled>("OrderCancelled")
        .build()
}
