//! In-memory transport for the `EventBridge` library
//!
//! This crate provides an in-process implementation of the `Transport` trait
//! from the eventbridge crate, useful for testing and development scenarios
//! where no event-log server is available. It also offers fault injection so
//! failure handling can be exercised deterministically.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use eventbridge::config::ConnectionSettings;
use eventbridge::errors::{TransportError, TransportResult};
use eventbridge::event::{EventData, RecordedEvent, ResolvedEvent};
use eventbridge::subscription::{DropReason, SubscriptionSink};
use eventbridge::transport::{ExpectedVersion, Transport, TransportSubscription};
use eventbridge::types::{EventNumber, GroupName, StreamId};
use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Discipline {
    CatchUp,
    Volatile,
    Persistent(GroupName),
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    stream: StreamId,
    discipline: Discipline,
    sink: SubscriptionSink,
}

#[derive(Debug, Default)]
struct State {
    connected: Option<ConnectionSettings>,
    closed: bool,
    connect_failure: Option<String>,
    streams: HashMap<StreamId, Vec<RecordedEvent>>,
    subscribers: Vec<Subscriber>,
    // round-robin cursor per group
    groups: HashMap<(StreamId, GroupName), usize>,
    failing_appends: usize,
    failing_streams: HashSet<StreamId>,
    hold_live: bool,
    held_live: Vec<SubscriptionSink>,
    next_id: u64,
}

impl State {
    fn ensure_open(&self) -> TransportResult<()> {
        if self.closed || self.connected.is_none() {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    fn ensure_subscribable(&self, stream: &StreamId) -> TransportResult<()> {
        self.ensure_open()?;
        if self.failing_streams.contains(stream) {
            return Err(TransportError::SubscribeFailed {
                stream: stream.clone(),
                reason: "subscription refused".to_owned(),
            });
        }
        Ok(())
    }

    fn attach(
        &mut self,
        stream: &StreamId,
        discipline: Discipline,
        sink: SubscriptionSink,
    ) -> MemorySubscription {
        self.next_id += 1;
        let id = self.next_id;
        self.subscribers.push(Subscriber {
            id,
            stream: stream.clone(),
            discipline,
            sink,
        });
        MemorySubscription {
            id,
            stream: stream.clone(),
        }
    }

    fn last_number(&self, stream: &StreamId) -> Option<EventNumber> {
        self.streams
            .get(stream)
            .and_then(|events| events.last())
            .map(|event| event.event_number)
    }

    /// Delivers to every catch-up and volatile subscriber of `stream` and to
    /// one consumer of each persistent group on it.
    fn deliver(&mut self, stream: &StreamId, event: &ResolvedEvent) {
        let mut closed = Vec::new();
        let mut groups: HashMap<GroupName, Vec<usize>> = HashMap::new();

        for (position, subscriber) in self.subscribers.iter().enumerate() {
            if &subscriber.stream != stream {
                continue;
            }
            match &subscriber.discipline {
                Discipline::CatchUp | Discipline::Volatile => {
                    if !subscriber.sink.event(event.clone()) {
                        closed.push(subscriber.id);
                    }
                }
                Discipline::Persistent(group) => {
                    groups.entry(group.clone()).or_default().push(position);
                }
            }
        }

        for (group, consumers) in groups {
            let cursor = self
                .groups
                .entry((stream.clone(), group))
                .or_default();
            let subscriber = &self.subscribers[consumers[*cursor % consumers.len()]];
            *cursor = cursor.wrapping_add(1);
            if !subscriber.sink.event(event.clone()) {
                closed.push(subscriber.id);
            }
        }

        if !closed.is_empty() {
            debug!(count = closed.len(), "Pruning subscribers whose receiver is gone");
            self.subscribers.retain(|s| !closed.contains(&s.id));
        }
    }
}

/// Handle to a subscription held by [`InMemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySubscription {
    id: u64,
    stream: StreamId,
}

impl TransportSubscription for MemorySubscription {
    fn stream_id(&self) -> &StreamId {
        &self.stream
    }
}

/// Thread-safe in-memory event log for testing
///
/// Clones share the same streams and subscribers. Link resolution is not
/// modelled; `resolve_link_tos` is accepted and ignored.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<State>>,
}

impl InMemoryTransport {
    /// Create a new empty in-memory transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `connect` call fail with `reason`.
    pub fn fail_connect(&self, reason: impl Into<String>) {
        self.state.lock().connect_failure = Some(reason.into());
    }

    /// Makes the next `count` appends fail.
    pub fn fail_next_appends(&self, count: usize) {
        self.state.lock().failing_appends = count;
    }

    /// Makes every subscribe call on `stream` fail.
    pub fn fail_subscriptions_to(&self, stream: &StreamId) {
        self.state.lock().failing_streams.insert(stream.clone());
    }

    /// Withholds live signals of catch-up subscriptions until
    /// [`release_live_signals`](Self::release_live_signals).
    pub fn hold_live_signals(&self) {
        self.state.lock().hold_live = true;
    }

    /// Sends every withheld live signal and stops withholding.
    pub fn release_live_signals(&self) {
        let held = {
            let mut state = self.state.lock();
            state.hold_live = false;
            std::mem::take(&mut state.held_live)
        };
        for sink in held {
            sink.live();
        }
    }

    /// Creates the persistent subscription group `group` on `stream`.
    pub fn create_persistent_subscription(&self, stream: &StreamId, group: &GroupName) {
        self.state
            .lock()
            .groups
            .entry((stream.clone(), group.clone()))
            .or_default();
    }

    /// Deletes a persistent group, dropping its consumers.
    pub fn delete_persistent_subscription(&self, stream: &StreamId, group: &GroupName) {
        let mut state = self.state.lock();
        state.groups.remove(&(stream.clone(), group.clone()));
        let target = Discipline::Persistent(group.clone());
        state.subscribers.retain(|subscriber| {
            let matches = &subscriber.stream == stream && subscriber.discipline == target;
            if matches {
                subscriber
                    .sink
                    .dropped(DropReason::PersistentSubscriptionDeleted, None);
            }
            !matches
        });
    }

    /// Drops every subscription on `stream` with `reason`.
    pub fn drop_subscriptions(&self, stream: &StreamId, reason: DropReason, error: Option<String>) {
        let mut state = self.state.lock();
        state.subscribers.retain(|subscriber| {
            let matches = &subscriber.stream == stream;
            if matches {
                subscriber.sink.dropped(reason, error.clone());
            }
            !matches
        });
    }

    /// Delivers `event` to the subscribers of `stream` without storing it.
    ///
    /// Useful for payloads a real server could deliver but an append cannot
    /// produce, such as unresolved links or binary events.
    pub fn inject(&self, stream: &StreamId, event: ResolvedEvent) {
        self.state.lock().deliver(stream, &event);
    }

    /// Every event stored in `stream`, in order.
    pub fn read_stream(&self, stream: &StreamId) -> Vec<RecordedEvent> {
        self.state
            .lock()
            .streams
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of subscriptions attached to `stream`.
    pub fn subscriber_count(&self, stream: &StreamId) -> usize {
        self.state
            .lock()
            .subscribers
            .iter()
            .filter(|subscriber| &subscriber.stream == stream)
            .count()
    }

    /// Settings passed to the last successful `connect`.
    pub fn connection_settings(&self) -> Option<ConnectionSettings> {
        self.state.lock().connected.clone()
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn connect(&self, settings: &ConnectionSettings) -> TransportResult<()> {
        let mut state = self.state.lock();
        if let Some(reason) = state.connect_failure.take() {
            return Err(TransportError::ConnectionFailed(reason));
        }
        state.connected = Some(settings.clone());
        state.closed = false;
        debug!(endpoint = %settings.endpoint, "In-memory transport connected");
        Ok(())
    }

    async fn append_to_stream(
        &self,
        stream: &StreamId,
        expected_version: ExpectedVersion,
        events: Vec<EventData>,
    ) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        if state.failing_appends > 0 {
            state.failing_appends -= 1;
            return Err(TransportError::AppendFailed {
                stream: stream.clone(),
                reason: "injected append failure".to_owned(),
            });
        }

        let last = state.last_number(stream);
        let version_ok = match expected_version {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => last.is_none(),
            ExpectedVersion::Exact(expected) => last == Some(expected),
        };
        if !version_ok {
            return Err(TransportError::AppendFailed {
                stream: stream.clone(),
                reason: format!("wrong expected version {expected_version:?}, last event {last:?}"),
            });
        }

        let mut next = last.map_or_else(EventNumber::first, EventNumber::next);
        for data in events {
            let recorded = RecordedEvent::from_event_data(stream.clone(), next, data);
            next = next.next();
            state
                .streams
                .entry(stream.clone())
                .or_default()
                .push(recorded.clone());
            state.deliver(stream, &ResolvedEvent::new(recorded));
        }
        Ok(())
    }

    async fn subscribe_to_stream_from(
        &self,
        stream: &StreamId,
        checkpoint: Option<EventNumber>,
        _resolve_link_tos: bool,
        sink: SubscriptionSink,
    ) -> TransportResult<Box<dyn TransportSubscription>> {
        let mut state = self.state.lock();
        state.ensure_subscribable(stream)?;

        let history = state.streams.get(stream).cloned().unwrap_or_default();
        for recorded in history
            .into_iter()
            .filter(|e| checkpoint.map_or(true, |c| e.event_number > c))
        {
            sink.event(ResolvedEvent::new(recorded));
        }

        if state.hold_live {
            state.held_live.push(sink.clone());
        } else {
            sink.live();
        }
        Ok(Box::new(state.attach(stream, Discipline::CatchUp, sink)))
    }

    async fn subscribe_to_stream(
        &self,
        stream: &StreamId,
        _resolve_link_tos: bool,
        sink: SubscriptionSink,
    ) -> TransportResult<Box<dyn TransportSubscription>> {
        let mut state = self.state.lock();
        state.ensure_subscribable(stream)?;
        Ok(Box::new(state.attach(stream, Discipline::Volatile, sink)))
    }

    async fn connect_to_persistent_subscription(
        &self,
        stream: &StreamId,
        group: &GroupName,
        sink: SubscriptionSink,
    ) -> TransportResult<Box<dyn TransportSubscription>> {
        let mut state = self.state.lock();
        state.ensure_subscribable(stream)?;
        if !state.groups.contains_key(&(stream.clone(), group.clone())) {
            return Err(TransportError::PersistentSubscriptionNotFound {
                stream: stream.clone(),
                group: group.clone(),
            });
        }
        Ok(Box::new(state.attach(
            stream,
            Discipline::Persistent(group.clone()),
            sink,
        )))
    }

    async fn close(&self) -> TransportResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.held_live.clear();
        for subscriber in state.subscribers.drain(..) {
            subscriber.sink.dropped(DropReason::ConnectionClosed, None);
        }
        debug!("In-memory transport closed");
        Ok(())
    }
}
