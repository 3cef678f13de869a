//! Orders example application
//!
//! This example demonstrates the bridge end to end over the in-memory log:
//! - Configuration from a JSON document
//! - Catch-up replay of history and a persistent billing group
//! - Publishing order events and consuming them from the outbound channel
//! - Liveness, health and metrics reporting

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use eventbridge::{
    BridgeConfig, DispatchBridge, EventStoreBridge, GroupName, HealthCheck, StreamId, Transport,
};
use eventbridge_examples::orders::events::{
    registry, OrderCancelled, OrderEvent, OrderPlaced, OrderShipped,
};
use eventbridge_examples::orders::types::{OrderId, Quantity, TrackingCode};
use eventbridge_memory::InMemoryTransport;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

// Consumer gives up after this long without an event
const IDLE: Duration = Duration::from_millis(250);

const CONFIG: &str = r#"{
    "connection": { "endpoint": "memory://orders" },
    "feature_stream": "orders",
    "subscriptions_delay": 100,
    "subscriptions": [
        { "type": "catch-up", "stream": "orders" },
        { "type": "persistent", "stream": "orders", "group": "billing" }
    ]
}"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting orders example");

    let config = BridgeConfig::from_json_str(CONFIG)?;
    let transport = InMemoryTransport::new();
    transport.create_persistent_subscription(
        &StreamId::try_new("orders")?,
        &GroupName::try_new("billing")?,
    );

    let (dispatch, mut events) = DispatchBridge::channel();
    let bridge = EventStoreBridge::start(
        config,
        Arc::new(transport.clone()) as Arc<dyn Transport>,
        registry(),
        dispatch,
    )
    .await?;

    let consumer = tokio::spawn(async move {
        let mut received = 0usize;
        while let Ok(Some(event)) = tokio::time::timeout(IDLE, events.recv()).await {
            received += 1;
            match &event {
                OrderEvent::Placed(e) => info!("Order {} placed for {} units", e.order_id, e.quantity),
                OrderEvent::Shipped(e) => info!("Order {} shipped as {}", e.order_id, e.tracking),
                OrderEvent::Cancelled(e) => info!("Order {} cancelled", e.order_id),
            }
        }
        received
    });

    let order_id = OrderId::try_new("ORD-1001")?;
    let placed = OrderPlaced {
        order_id: order_id.clone(),
        quantity: Quantity::try_new(2)?,
    };
    let shipped = OrderShipped {
        order_id: order_id.clone(),
        tracking: TrackingCode::try_new("1z999aa1")?,
    };
    let _ = bridge.publish(Some(&placed), None).await;
    let _ = bridge.publish(Some(&shipped), None).await;

    // Cancellations go to their own stream, which nothing subscribes to
    let cancelled = OrderCancelled {
        order_id: OrderId::try_new("ORD-1002")?,
    };
    let audit = StreamId::try_new("orders-cancelled")?;
    let _ = bridge.publish(Some(&cancelled), Some(&audit)).await;

    let received = consumer.await?;
    info!("Consumed {received} events");

    let health = bridge.liveness_check().check().await;
    info!("Bridge health: {:?} ({})", health.status, health.message);
    for status in bridge.subscription_statuses() {
        info!(
            "{} subscription #{} on {} is {:?}",
            status.kind, status.index, status.stream, status.state
        );
    }
    info!("Metrics: {}", serde_json::to_string(&bridge.metrics())?);

    bridge.close().await;
    if bridge.is_live() {
        warn!("Bridge still reports live after close");
    }

    Ok(())
}
