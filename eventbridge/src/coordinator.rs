//! The subscription coordinator.
//!
//! The coordinator turns a declarative list of [`SubscriptionSpec`]s into live
//! transport subscriptions and runs the dispatch loop that feeds inbound events
//! to the [`DispatchBridge`].
//!
//! # Establishment
//!
//! Specs are partitioned by kind. The three kinds are established
//! independently and concurrently; within a kind, every subscribe call is
//! launched at once and their joint completion is awaited. A failed subscribe
//! call is logged and reported but never aborts its siblings; it leaves an
//! empty slot, so its kind reads not live.
//!
//! # Dispatch loop
//!
//! Transports report through one channel per kind. A background task
//! `select!`s over the three channels and a control channel. Events are
//! decoded and dispatched; live and dropped signals drive the slot state
//! machines in the [`SubscriptionRegistry`].
//!
//! Dropped subscriptions are never re-established. Recovering from a drop
//! requires restarting the bridge.

use crate::dispatch::DispatchBridge;
use crate::errors::{DecodeError, SubscriptionError};
use crate::event::ResolvedEvent;
use crate::monitoring::{BridgeFailure, Diagnostics};
use crate::registry::SubscriptionRegistry;
use crate::subscription::{
    partition_by_kind, DropReason, SubscriptionKey, SubscriptionKind, SubscriptionMessage,
    SubscriptionSignal, SubscriptionSink, SubscriptionSpec, SubscriptionTransition,
};
use crate::transport::Transport;
use crate::type_registry::EventTypeRegistry;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn, Instrument};

type MessageReceiver = mpsc::UnboundedReceiver<SubscriptionMessage>;
type MessageSender = mpsc::UnboundedSender<SubscriptionMessage>;

#[derive(Debug)]
enum Control {
    Stop,
}

#[derive(Debug)]
struct RunningLoop {
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

/// Establishes subscriptions and dispatches what they deliver.
pub struct SubscriptionCoordinator<E> {
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    types: Arc<EventTypeRegistry<E>>,
    dispatch: DispatchBridge<E>,
    diagnostics: Diagnostics,
    dispatch_loop: Mutex<Option<RunningLoop>>,
}

impl<E> SubscriptionCoordinator<E>
where
    E: Send + 'static,
{
    /// Creates a coordinator; nothing happens until [`start`](Self::start).
    pub fn new(
        transport: Arc<dyn Transport>,
        types: Arc<EventTypeRegistry<E>>,
        dispatch: DispatchBridge<E>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            transport,
            registry: Arc::new(SubscriptionRegistry::new()),
            types,
            dispatch,
            diagnostics,
            dispatch_loop: Mutex::new(None),
        }
    }

    /// The slot registry backing the liveness queries.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Starts the dispatch loop, then establishes every subscription.
    ///
    /// Each non-empty kind waits `settling_delay` before its first subscribe
    /// call. Returns once all three kinds have finished establishing; catch-up
    /// subscriptions may still be replaying history at that point.
    #[instrument(skip_all, fields(count = specs.len()))]
    pub async fn start(&self, specs: Vec<SubscriptionSpec>, settling_delay: Option<Duration>) {
        let (catch_up_tx, volatile_tx, persistent_tx) = self.spawn_dispatch_loop();
        let (catch_up, volatile, persistent) = partition_by_kind(specs);

        tokio::join!(
            self.establish_kind(SubscriptionKind::CatchUp, catch_up, settling_delay, catch_up_tx),
            self.establish_kind(SubscriptionKind::Volatile, volatile, settling_delay, volatile_tx),
            self.establish_kind(
                SubscriptionKind::Persistent,
                persistent,
                settling_delay,
                persistent_tx
            ),
        );
    }

    /// Stops the dispatch loop and waits for it to finish.
    ///
    /// Messages still queued are discarded. Stopping twice is a no-op.
    pub async fn stop(&self) {
        let running = self.dispatch_loop.lock().take();
        if let Some(RunningLoop { control, task }) = running {
            let _ = control.send(Control::Stop);
            if let Err(err) = task.await {
                error!("Dispatch loop terminated abnormally: {err}");
            }
        }
    }

    fn spawn_dispatch_loop(&self) -> (MessageSender, MessageSender, MessageSender) {
        let (catch_up_tx, catch_up_rx) = mpsc::unbounded_channel();
        let (volatile_tx, volatile_rx) = mpsc::unbounded_channel();
        let (persistent_tx, persistent_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            registry: Arc::clone(&self.registry),
            types: Arc::clone(&self.types),
            dispatch: self.dispatch.clone(),
            diagnostics: self.diagnostics.clone(),
        };
        let task = tokio::spawn(
            dispatcher
                .run([catch_up_rx, volatile_rx, persistent_rx], control_rx)
                .in_current_span(),
        );

        let previous = self.dispatch_loop.lock().replace(RunningLoop {
            control: control_tx,
            task,
        });
        if let Some(previous) = previous {
            debug!("Replacing running dispatch loop");
            let _ = previous.control.send(Control::Stop);
        }

        (catch_up_tx, volatile_tx, persistent_tx)
    }

    #[instrument(skip(self, specs, settling_delay, tx), fields(count = specs.len()))]
    async fn establish_kind(
        &self,
        kind: SubscriptionKind,
        specs: Vec<SubscriptionSpec>,
        settling_delay: Option<Duration>,
        tx: MessageSender,
    ) {
        if !specs.is_empty() {
            if let Some(delay) = settling_delay {
                tokio::time::sleep(delay).await;
            }
        }

        self.registry.begin(kind, &specs);

        let attempts = specs.iter().enumerate().map(|(index, spec)| {
            let sink = SubscriptionSink::new(SubscriptionKey::new(kind, index), tx.clone());
            self.establish(spec, sink)
        });
        join_all(attempts).await;

        self.registry.complete(kind);
    }

    async fn establish(&self, spec: &SubscriptionSpec, sink: SubscriptionSink) {
        let key = sink.key();
        let result = match spec {
            SubscriptionSpec::CatchUp {
                stream,
                resolve_link_tos,
                last_checkpoint,
            } => {
                info!("Catching up and subscribing to stream {stream}!");
                self.transport
                    .subscribe_to_stream_from(stream, *last_checkpoint, *resolve_link_tos, sink)
                    .await
            }
            SubscriptionSpec::Volatile {
                stream,
                resolve_link_tos,
            } => {
                info!("Volatile and subscribing to stream {stream}!");
                self.transport
                    .subscribe_to_stream(stream, *resolve_link_tos, sink)
                    .await
            }
            SubscriptionSpec::Persistent { stream, group } => {
                info!("Connecting to persistent subscription {group} on stream {stream}!");
                self.transport
                    .connect_to_persistent_subscription(stream, group, sink)
                    .await
            }
        };

        match result {
            Ok(handle) => match self.registry.record_established(key, handle) {
                Ok(state) if key.kind == SubscriptionKind::Volatile && state.is_live() => {
                    info!("Volatile processing of EventStore events started!");
                }
                Ok(_) => {}
                Err(err) => debug!(%err, "Ignoring establishment result"),
            },
            Err(source) => {
                let reason = source.to_string();
                let err = SubscriptionError::EstablishFailed {
                    stream: spec.stream().clone(),
                    kind: key.kind,
                    source,
                };
                error!("{err}");
                if let Err(err) = self.registry.record_failed(key) {
                    debug!(%err, "Ignoring establishment failure");
                }
                self.diagnostics.report(BridgeFailure::EstablishFailed {
                    key,
                    stream: spec.stream().clone(),
                    reason,
                });
            }
        }
    }
}

impl<E> std::fmt::Debug for SubscriptionCoordinator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionCoordinator")
            .field("registry", &self.registry)
            .field("types", &self.types)
            .field("dispatch", &self.dispatch)
            .field("running", &self.dispatch_loop.lock().is_some())
            .finish_non_exhaustive()
    }
}

/// State owned by the dispatch loop task.
struct Dispatcher<E> {
    registry: Arc<SubscriptionRegistry>,
    types: Arc<EventTypeRegistry<E>>,
    dispatch: DispatchBridge<E>,
    diagnostics: Diagnostics,
}

impl<E: 'static> Dispatcher<E> {
    async fn run(
        self,
        [mut catch_up, mut volatile, mut persistent]: [MessageReceiver; 3],
        mut control: mpsc::UnboundedReceiver<Control>,
    ) {
        let mut open = [true; 3];
        while open.iter().any(|o| *o) {
            tokio::select! {
                biased;
                _ = control.recv() => break,
                message = catch_up.recv(), if open[0] => self.on_message(message, &mut open[0]),
                message = volatile.recv(), if open[1] => self.on_message(message, &mut open[1]),
                message = persistent.recv(), if open[2] => self.on_message(message, &mut open[2]),
            }
        }
        debug!("Dispatch loop stopped");
    }

    fn on_message(&self, message: Option<SubscriptionMessage>, open: &mut bool) {
        match message {
            Some(message) => self.handle(message),
            None => *open = false,
        }
    }

    fn handle(&self, SubscriptionMessage { key, signal }: SubscriptionMessage) {
        match signal {
            SubscriptionSignal::Event(resolved) => self.on_event(key, &resolved),
            SubscriptionSignal::Live => self.on_live(key),
            SubscriptionSignal::Dropped { reason, error } => self.on_dropped(key, reason, error),
        }
    }

    fn on_event(&self, key: SubscriptionKey, resolved: &ResolvedEvent) {
        let event = match self.types.decode(resolved) {
            Ok(event) => event,
            Err(err) => {
                match &err {
                    DecodeError::DispatchKeyUnhandled(_) => warn!("{err}"),
                    _ => error!("{err}"),
                }
                self.diagnostics
                    .report(BridgeFailure::Undecodable { key, error: err });
                return;
            }
        };

        match self.dispatch.dispatch(event) {
            Ok(()) => self.diagnostics.dispatched(),
            Err(err) => {
                warn!(kind = %key.kind, index = key.index, "Dropping decoded event: {err}");
                self.diagnostics
                    .report(BridgeFailure::Dispatch { key, error: err });
            }
        }
    }

    fn on_live(&self, key: SubscriptionKey) {
        match self.registry.apply(key, SubscriptionTransition::Live) {
            Ok(_) => info!("Live processing of EventStore events started!"),
            Err(err) => debug!(%err, "Ignoring live signal"),
        }
    }

    fn on_dropped(&self, key: SubscriptionKey, reason: DropReason, error: Option<String>) {
        if let Err(err) = self.registry.apply(key, SubscriptionTransition::Dropped) {
            debug!(%err, "Ignoring drop signal");
            return;
        }
        let stream = self.registry.stream_of(key);
        error!(
            kind = %key.kind,
            index = key.index,
            stream = ?stream,
            %reason,
            "Subscription dropped: {}",
            error.as_deref().unwrap_or("no error reported")
        );
        self.diagnostics.report(BridgeFailure::SubscriptionDropped {
            key,
            stream,
            reason,
            error,
        });
    }
}
