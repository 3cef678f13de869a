//! Subscription vocabulary: declarative specs, the per-slot lifecycle state
//! machine, and the message channel transports use to report back.
//!
//! Transports never call into the coordinator directly. Every subscription is
//! handed a [`SubscriptionSink`] bound to its slot; events, the live signal and
//! drops travel through the sink as [`SubscriptionMessage`]s on one channel per
//! [`SubscriptionKind`].

use crate::event::ResolvedEvent;
use crate::errors::{SubscriptionError, SubscriptionResult};
use crate::types::{EventNumber, GroupName, StreamId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// The three subscription disciplines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionKind {
    /// Replays history from a checkpoint, then continues live.
    CatchUp,
    /// Receives only events appended after subscribing.
    Volatile,
    /// Server-tracked competing-consumer group.
    Persistent,
}

impl SubscriptionKind {
    /// Every kind, in registry order.
    pub const ALL: [Self; 3] = [Self::CatchUp, Self::Volatile, Self::Persistent];

    /// Whether the transport signals liveness separately from establishment.
    pub const fn awaits_live_signal(self) -> bool {
        matches!(self, Self::CatchUp)
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CatchUp => "catch-up",
            Self::Volatile => "volatile",
            Self::Persistent => "persistent",
        })
    }
}

const fn default_resolve_link_tos() -> bool {
    true
}

// An omitted checkpoint resumes after the first event. Only an explicit
// `null` replays the whole stream.
#[allow(clippy::unnecessary_wraps)]
fn default_last_checkpoint() -> Option<EventNumber> {
    Some(EventNumber::first())
}

/// Declarative description of one subscription, consumed once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SubscriptionSpec {
    /// Catch-up subscription from an optional checkpoint.
    CatchUp {
        /// Stream to subscribe to
        stream: StreamId,
        /// Whether link events are resolved to their targets
        #[serde(default = "default_resolve_link_tos")]
        resolve_link_tos: bool,
        /// Last processed event, exclusive. Defaults to the first event;
        /// `None` replays the whole stream.
        #[serde(default = "default_last_checkpoint")]
        last_checkpoint: Option<EventNumber>,
    },
    /// Volatile subscription to new events only.
    Volatile {
        /// Stream to subscribe to
        stream: StreamId,
        /// Whether link events are resolved to their targets
        #[serde(default = "default_resolve_link_tos")]
        resolve_link_tos: bool,
    },
    /// Connection to an existing persistent subscription group.
    Persistent {
        /// Stream the group is defined on
        stream: StreamId,
        /// The group name
        group: GroupName,
    },
}

impl SubscriptionSpec {
    /// A catch-up subscription with the default checkpoint.
    ///
    /// Replay starts after event number 0, the same as a configuration entry
    /// that leaves `last_checkpoint` out.
    pub fn catch_up(stream: StreamId) -> Self {
        Self::CatchUp {
            stream,
            resolve_link_tos: true,
            last_checkpoint: default_last_checkpoint(),
        }
    }

    /// A catch-up subscription replaying the whole stream.
    pub const fn catch_up_from_start(stream: StreamId) -> Self {
        Self::CatchUp {
            stream,
            resolve_link_tos: true,
            last_checkpoint: None,
        }
    }

    /// A volatile subscription.
    pub const fn volatile(stream: StreamId) -> Self {
        Self::Volatile {
            stream,
            resolve_link_tos: true,
        }
    }

    /// A persistent subscription group connection.
    pub const fn persistent(stream: StreamId, group: GroupName) -> Self {
        Self::Persistent { stream, group }
    }

    /// Sets the checkpoint of a catch-up spec. Other kinds are returned unchanged.
    #[must_use]
    pub fn with_last_checkpoint(mut self, checkpoint: EventNumber) -> Self {
        if let Self::CatchUp {
            last_checkpoint, ..
        } = &mut self
        {
            *last_checkpoint = Some(checkpoint);
        }
        self
    }

    /// Sets link resolution. Persistent specs are returned unchanged.
    #[must_use]
    pub fn with_resolve_link_tos(mut self, resolve: bool) -> Self {
        match &mut self {
            Self::CatchUp {
                resolve_link_tos, ..
            }
            | Self::Volatile {
                resolve_link_tos, ..
            } => *resolve_link_tos = resolve,
            Self::Persistent { .. } => {}
        }
        self
    }

    /// The discipline of this spec.
    pub const fn kind(&self) -> SubscriptionKind {
        match self {
            Self::CatchUp { .. } => SubscriptionKind::CatchUp,
            Self::Volatile { .. } => SubscriptionKind::Volatile,
            Self::Persistent { .. } => SubscriptionKind::Persistent,
        }
    }

    /// The stream this spec subscribes to.
    pub const fn stream(&self) -> &StreamId {
        match self {
            Self::CatchUp { stream, .. }
            | Self::Volatile { stream, .. }
            | Self::Persistent { stream, .. } => stream,
        }
    }
}

/// Splits specs by kind, keeping input order within each kind.
pub fn partition_by_kind(
    specs: Vec<SubscriptionSpec>,
) -> (
    Vec<SubscriptionSpec>,
    Vec<SubscriptionSpec>,
    Vec<SubscriptionSpec>,
) {
    let mut catch_up = Vec::new();
    let mut volatile = Vec::new();
    let mut persistent = Vec::new();
    for spec in specs {
        match spec.kind() {
            SubscriptionKind::CatchUp => catch_up.push(spec),
            SubscriptionKind::Volatile => volatile.push(spec),
            SubscriptionKind::Persistent => persistent.push(spec),
        }
    }
    (catch_up, volatile, persistent)
}

/// Lifecycle state of one subscription slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionState {
    /// The subscribe call is in flight.
    Establishing,
    /// A catch-up subscription is connected and replaying history.
    CatchingUp,
    /// Events are being delivered live.
    Live,
    /// The transport dropped the subscription. Terminal.
    Dropped,
    /// The subscribe call failed. Terminal.
    Failed,
}

/// Signals that move a slot between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionTransition {
    /// The subscribe call returned a handle.
    Established,
    /// The transport reported live processing.
    Live,
    /// The transport dropped the subscription.
    Dropped,
    /// The subscribe call failed.
    Failed,
}

impl SubscriptionState {
    /// Applies `event` to a slot of `kind`.
    ///
    /// `Dropped` and `Failed` are terminal: nothing revives them, so a dropped
    /// subscription stays down until the process is restarted. A live signal
    /// may overtake the establishment result, in which case the slot stays
    /// live once the handle arrives.
    pub fn transition(
        self,
        kind: SubscriptionKind,
        event: SubscriptionTransition,
    ) -> SubscriptionResult<Self> {
        use SubscriptionState as S;
        use SubscriptionTransition as T;

        match (self, event) {
            (S::Establishing, T::Established) if kind.awaits_live_signal() => Ok(S::CatchingUp),
            (S::Establishing, T::Established) => Ok(S::Live),
            (S::Live, T::Established) => Ok(S::Live),
            (S::Dropped, T::Established) => Ok(S::Dropped),
            (S::Establishing | S::CatchingUp | S::Live, T::Live) => Ok(S::Live),
            (S::Establishing | S::CatchingUp | S::Live, T::Dropped) => Ok(S::Dropped),
            (S::Establishing, T::Failed) => Ok(S::Failed),
            (from, event) => Err(SubscriptionError::InvalidTransition { from, event }),
        }
    }

    /// Whether events are flowing live.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }

    /// Whether the slot can never become live again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Dropped | Self::Failed)
    }
}

/// Identifies a slot: its kind and its index among the specs of that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    /// The kind of the slot
    pub kind: SubscriptionKind,
    /// Position among the specs of that kind
    pub index: usize,
}

impl SubscriptionKey {
    /// Creates a key.
    pub const fn new(kind: SubscriptionKind, index: usize) -> Self {
        Self { kind, index }
    }
}

/// Why a transport dropped a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The subscription was closed on request.
    UserInitiated,
    /// The connection to the event log closed.
    ConnectionClosed,
    /// The server refused or lost the subscription.
    ServerError,
    /// Catch-up replay failed.
    CatchUpError,
    /// The subscriber could not keep up with the stream.
    ProcessingQueueOverflow,
    /// The persistent group was deleted on the server.
    PersistentSubscriptionDeleted,
    /// The group has reached its consumer limit.
    MaxSubscribersReached,
    /// Any other reason.
    Unknown,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UserInitiated => "userInitiated",
            Self::ConnectionClosed => "connectionClosed",
            Self::ServerError => "serverError",
            Self::CatchUpError => "catchUpError",
            Self::ProcessingQueueOverflow => "processingQueueOverflow",
            Self::PersistentSubscriptionDeleted => "persistentSubscriptionDeleted",
            Self::MaxSubscribersReached => "maxSubscribersReached",
            Self::Unknown => "unknown",
        })
    }
}

/// A notification from a transport subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionSignal {
    /// An event was delivered.
    Event(ResolvedEvent),
    /// Historical replay finished; live processing started.
    Live,
    /// The subscription was dropped.
    Dropped {
        /// Why it was dropped
        reason: DropReason,
        /// Error text supplied by the transport
        error: Option<String>,
    },
}

/// A signal tagged with the slot it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionMessage {
    /// The originating slot
    pub key: SubscriptionKey,
    /// What happened
    pub signal: SubscriptionSignal,
}

/// Where a transport reports what happens to one subscription.
///
/// Sending never blocks. Every method returns `false` once the coordinator has
/// stopped listening, which transports may use to prune the subscriber.
#[derive(Debug, Clone)]
pub struct SubscriptionSink {
    key: SubscriptionKey,
    tx: mpsc::UnboundedSender<SubscriptionMessage>,
}

impl SubscriptionSink {
    /// Binds a sink to `key` on the kind channel `tx`.
    pub const fn new(key: SubscriptionKey, tx: mpsc::UnboundedSender<SubscriptionMessage>) -> Self {
        Self { key, tx }
    }

    /// The slot this sink reports for.
    pub const fn key(&self) -> SubscriptionKey {
        self.key
    }

    /// Delivers an event.
    pub fn event(&self, event: ResolvedEvent) -> bool {
        self.send(SubscriptionSignal::Event(event))
    }

    /// Reports that live processing started.
    pub fn live(&self) -> bool {
        self.send(SubscriptionSignal::Live)
    }

    /// Reports that the subscription was dropped.
    pub fn dropped(&self, reason: DropReason, error: Option<String>) -> bool {
        self.send(SubscriptionSignal::Dropped { reason, error })
    }

    /// Whether the coordinator stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, signal: SubscriptionSignal) -> bool {
        self.tx
            .send(SubscriptionMessage {
                key: self.key,
                signal,
            })
            .is_ok()
    }
}
