//! The bridge facade wiring transport, publisher and coordinator together.

use crate::config::BridgeConfig;
use crate::coordinator::SubscriptionCoordinator;
use crate::dispatch::DispatchBridge;
use crate::errors::BridgeError;
use crate::event::DomainEvent;
use crate::monitoring::{BridgeFailure, Diagnostics, MetricsSnapshot, SubscriptionLivenessCheck};
use crate::publisher::{PublishOutcome, Publisher};
use crate::registry::SubscriptionStatus;
use crate::subscription::SubscriptionKind;
use crate::transport::Transport;
use crate::type_registry::EventTypeRegistry;
use crate::types::StreamId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, Instrument};

/// Connects an application's event pipeline to an external event log.
///
/// Outbound, [`publish`](Self::publish) appends domain events to a stream.
/// Inbound, every configured subscription feeds decoded events into the
/// [`DispatchBridge`]. Liveness queries report whether all subscriptions are
/// delivering live.
///
/// Subscriptions that the transport drops are not re-established; the bridge
/// must be closed and started again to recover them.
pub struct EventStoreBridge<E> {
    transport: Arc<dyn Transport>,
    publisher: Publisher,
    coordinator: Arc<SubscriptionCoordinator<E>>,
    dispatch: DispatchBridge<E>,
    diagnostics: Diagnostics,
    establishment: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<E> EventStoreBridge<E>
where
    E: Send + 'static,
{
    /// Connects, then establishes every configured subscription before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Connect`] when the transport cannot connect.
    /// Failing subscriptions are not errors; they leave the bridge not live.
    #[instrument(skip_all, fields(endpoint = %config.connection.endpoint))]
    pub async fn start(
        config: BridgeConfig,
        transport: Arc<dyn Transport>,
        types: EventTypeRegistry<E>,
        dispatch: DispatchBridge<E>,
    ) -> Result<Self, BridgeError> {
        let bridge = Self::connected(&config, transport, types, dispatch).await?;
        let settling_delay = config.settling_delay();
        bridge
            .coordinator
            .start(config.subscriptions, settling_delay)
            .await;
        Ok(bridge)
    }

    /// Connects and returns immediately; subscriptions are established in the
    /// background and the bridge reads not live until they are.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Connect`] when the transport cannot connect.
    #[instrument(skip_all, fields(endpoint = %config.connection.endpoint))]
    pub async fn connect(
        config: BridgeConfig,
        transport: Arc<dyn Transport>,
        types: EventTypeRegistry<E>,
        dispatch: DispatchBridge<E>,
    ) -> Result<Self, BridgeError> {
        let bridge = Self::connected(&config, transport, types, dispatch).await?;
        let settling_delay = config.settling_delay();
        let coordinator = Arc::clone(&bridge.coordinator);
        let task = tokio::spawn(
            async move {
                coordinator.start(config.subscriptions, settling_delay).await;
            }
            .in_current_span(),
        );
        *bridge.establishment.lock() = Some(task);
        Ok(bridge)
    }

    async fn connected(
        config: &BridgeConfig,
        transport: Arc<dyn Transport>,
        types: EventTypeRegistry<E>,
        dispatch: DispatchBridge<E>,
    ) -> Result<Self, BridgeError> {
        if let Err(err) = transport.connect(&config.connection).await {
            error!("Failed to connect to {}: {err}", config.connection.endpoint);
            return Err(BridgeError::Connect(err));
        }
        info!("Connected to {}", config.connection.endpoint);

        let diagnostics = Diagnostics::new();
        let publisher = Publisher::new(
            Arc::clone(&transport),
            config.feature_stream.clone(),
            diagnostics.clone(),
        );
        let coordinator = SubscriptionCoordinator::new(
            Arc::clone(&transport),
            Arc::new(types),
            dispatch.clone(),
            diagnostics.clone(),
        );

        Ok(Self {
            transport,
            publisher,
            coordinator: Arc::new(coordinator),
            dispatch,
            diagnostics,
            establishment: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Waits for background establishment started by
    /// [`connect`](Self::connect). Returns immediately otherwise.
    pub async fn established(&self) {
        let task = self.establishment.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    error!("Subscription establishment terminated abnormally: {err}");
                }
            }
        }
    }

    /// Publishes `event` to `stream`, or to the configured feature stream.
    ///
    /// Never fails; see [`PublishOutcome`].
    pub async fn publish<T>(&self, event: Option<&T>, stream: Option<&StreamId>) -> PublishOutcome
    where
        T: DomainEvent + ?Sized,
    {
        self.publisher.publish(event, stream).await
    }

    /// Re-targets the outbound channel.
    pub fn bridge_events_to(&self, sender: mpsc::UnboundedSender<E>) {
        self.dispatch.bridge_events_to(sender);
    }

    /// Whether every catch-up subscription has caught up and is live.
    pub fn all_catch_up_subscriptions_live(&self) -> bool {
        self.coordinator.registry().all_live(SubscriptionKind::CatchUp)
    }

    /// Whether every volatile subscription is live.
    pub fn all_volatile_subscriptions_live(&self) -> bool {
        self.coordinator.registry().all_live(SubscriptionKind::Volatile)
    }

    /// Whether every persistent subscription is live.
    pub fn all_persistent_subscriptions_live(&self) -> bool {
        self.coordinator
            .registry()
            .all_live(SubscriptionKind::Persistent)
    }

    /// Whether every subscription of every kind is live.
    pub fn is_live(&self) -> bool {
        self.coordinator.registry().is_live()
    }

    /// Snapshot of every subscription slot.
    pub fn subscription_statuses(&self) -> Vec<SubscriptionStatus> {
        self.coordinator.registry().statuses()
    }

    /// A health check over this bridge's subscriptions.
    pub fn liveness_check(&self) -> SubscriptionLivenessCheck {
        SubscriptionLivenessCheck::new(Arc::clone(self.coordinator.registry()))
    }

    /// Current counter values.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.diagnostics.metrics().snapshot()
    }

    /// Receives every failure reported from now on.
    pub fn failures(&self) -> broadcast::Receiver<BridgeFailure> {
        self.diagnostics.subscribe()
    }

    /// Stops dispatching and closes the transport.
    ///
    /// Every subscription reads dropped afterwards. Closing twice is harmless.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let establishment = self.establishment.lock().take();
        if let Some(task) = establishment {
            task.abort();
        }
        self.coordinator.stop().await;
        self.coordinator.registry().drop_all();
        if let Err(err) = self.transport.close().await {
            error!("Failed to close transport: {err}");
        }
        info!("Event store bridge closed");
    }
}

impl<E> std::fmt::Debug for EventStoreBridge<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStoreBridge")
            .field("publisher", &self.publisher)
            .field("coordinator", &self.coordinator)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
