//! Runtime bookkeeping of subscription slots and their liveness.
//!
//! Each kind owns an independent, separately locked list of slots. A slot is
//! created in `Establishing` state as soon as establishment of its kind begins,
//! so lifecycle signals that overtake the subscribe call always find it.
//!
//! A kind reads live only once its establishment has completed with one slot
//! per expected spec and every slot holding a live handle. Before
//! [`SubscriptionRegistry::begin`] runs, or while establishment is in flight,
//! the kind reads not live.

use crate::errors::{SubscriptionError, SubscriptionResult};
use crate::subscription::{
    SubscriptionKey, SubscriptionKind, SubscriptionSpec, SubscriptionState, SubscriptionTransition,
};
use crate::transport::TransportSubscription;
use crate::types::StreamId;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

/// Operator-facing snapshot of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStatus {
    /// Kind of the slot
    pub kind: SubscriptionKind,
    /// Position among the specs of that kind
    pub index: usize,
    /// Subscribed stream
    pub stream: StreamId,
    /// Current lifecycle state
    pub state: SubscriptionState,
}

#[derive(Debug)]
struct Slot {
    stream: StreamId,
    state: SubscriptionState,
    handle: Option<Box<dyn TransportSubscription>>,
}

impl Slot {
    fn is_live(&self) -> bool {
        self.handle.is_some() && self.state.is_live()
    }
}

#[derive(Debug, Default)]
struct KindSlots {
    expected: Option<usize>,
    complete: bool,
    slots: Vec<Slot>,
}

impl KindSlots {
    fn all_live(&self) -> bool {
        self.complete
            && self.expected == Some(self.slots.len())
            && self.slots.iter().all(Slot::is_live)
    }
}

/// The three per-kind slot lists.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    catch_up: RwLock<KindSlots>,
    volatile: RwLock<KindSlots>,
    persistent: RwLock<KindSlots>,
}

impl SubscriptionRegistry {
    /// An empty registry; every kind reads not live.
    pub fn new() -> Self {
        Self::default()
    }

    const fn slots(&self, kind: SubscriptionKind) -> &RwLock<KindSlots> {
        match kind {
            SubscriptionKind::CatchUp => &self.catch_up,
            SubscriptionKind::Volatile => &self.volatile,
            SubscriptionKind::Persistent => &self.persistent,
        }
    }

    /// Starts establishment of `kind`: records the expected count and one
    /// `Establishing` slot per spec, in order.
    ///
    /// Calling it again for the same kind discards the previous slots.
    pub fn begin(&self, kind: SubscriptionKind, specs: &[SubscriptionSpec]) {
        let mut guard = self.slots(kind).write();
        guard.expected = Some(specs.len());
        guard.complete = false;
        guard.slots = specs
            .iter()
            .map(|spec| Slot {
                stream: spec.stream().clone(),
                state: SubscriptionState::Establishing,
                handle: None,
            })
            .collect();
    }

    /// Marks establishment of `kind` as finished.
    pub fn complete(&self, kind: SubscriptionKind) {
        self.slots(kind).write().complete = true;
    }

    /// Stores the handle returned by a successful subscribe call.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::UnknownSlot`] when `key` was never begun.
    /// The handle is kept even when the slot was dropped before establishment
    /// finished, so the transport can still release it on close.
    pub fn record_established(
        &self,
        key: SubscriptionKey,
        handle: Box<dyn TransportSubscription>,
    ) -> SubscriptionResult<SubscriptionState> {
        let mut guard = self.slots(key.kind).write();
        let slot = slot_mut(&mut guard, key)?;
        slot.handle = Some(handle);
        let next = slot.state.transition(key.kind, SubscriptionTransition::Established)?;
        slot.state = next;
        Ok(next)
    }

    /// Records a failed subscribe call; the slot stays without a handle.
    ///
    /// # Errors
    ///
    /// Returns an error when `key` is unknown or the slot already moved on.
    pub fn record_failed(&self, key: SubscriptionKey) -> SubscriptionResult<SubscriptionState> {
        self.apply(key, SubscriptionTransition::Failed)
    }

    /// Applies a lifecycle signal to the slot at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::UnknownSlot`] for an unknown key and
    /// [`SubscriptionError::InvalidTransition`] when the slot's state does not
    /// accept `transition`. The slot is left unchanged in both cases.
    pub fn apply(
        &self,
        key: SubscriptionKey,
        transition: SubscriptionTransition,
    ) -> SubscriptionResult<SubscriptionState> {
        let mut guard = self.slots(key.kind).write();
        let slot = slot_mut(&mut guard, key)?;
        let next = slot.state.transition(key.kind, transition)?;
        slot.state = next;
        Ok(next)
    }

    /// Moves every non-terminal slot to `Dropped` and releases all handles.
    ///
    /// Every kind reads not live afterwards, including kinds without slots.
    pub fn drop_all(&self) {
        for kind in SubscriptionKind::ALL {
            let mut guard = self.slots(kind).write();
            guard.complete = false;
            for (index, slot) in guard.slots.iter_mut().enumerate() {
                match slot.state.transition(kind, SubscriptionTransition::Dropped) {
                    Ok(next) => slot.state = next,
                    Err(err) => debug!(%kind, index, %err, "Slot already terminal"),
                }
                slot.handle = None;
            }
        }
    }

    /// The stream subscribed by the slot at `key`.
    pub fn stream_of(&self, key: SubscriptionKey) -> Option<StreamId> {
        self.slots(key.kind)
            .read()
            .slots
            .get(key.index)
            .map(|slot| slot.stream.clone())
    }

    /// The state of the slot at `key`.
    pub fn state_of(&self, key: SubscriptionKey) -> Option<SubscriptionState> {
        self.slots(key.kind)
            .read()
            .slots
            .get(key.index)
            .map(|slot| slot.state)
    }

    /// Number of specs of `kind` recorded at establishment start, if begun.
    pub fn expected_count(&self, kind: SubscriptionKind) -> Option<usize> {
        self.slots(kind).read().expected
    }

    /// Whether every subscription of `kind` is established and live.
    pub fn all_live(&self, kind: SubscriptionKind) -> bool {
        self.slots(kind).read().all_live()
    }

    /// Whether every kind is live.
    pub fn is_live(&self) -> bool {
        SubscriptionKind::ALL.into_iter().all(|kind| self.all_live(kind))
    }

    /// Number of live slots across all kinds.
    pub fn live_count(&self) -> usize {
        SubscriptionKind::ALL
            .into_iter()
            .map(|kind| {
                self.slots(kind)
                    .read()
                    .slots
                    .iter()
                    .filter(|slot| slot.is_live())
                    .count()
            })
            .sum()
    }

    /// Snapshot of every slot, kinds in registry order.
    pub fn statuses(&self) -> Vec<SubscriptionStatus> {
        let mut statuses = Vec::new();
        for kind in SubscriptionKind::ALL {
            let guard = self.slots(kind).read();
            statuses.extend(guard.slots.iter().enumerate().map(|(index, slot)| {
                SubscriptionStatus {
                    kind,
                    index,
                    stream: slot.stream.clone(),
                    state: slot.state,
                }
            }));
        }
        statuses
    }
}

fn slot_mut(slots: &mut KindSlots, key: SubscriptionKey) -> SubscriptionResult<&mut Slot> {
    slots
        .slots
        .get_mut(key.index)
        .ok_or(SubscriptionError::UnknownSlot {
            kind: key.kind,
            index: key.index,
        })
}
