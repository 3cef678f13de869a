//! The outbound channel into the host application's event bus.

use crate::errors::DispatchError;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Single outbound channel receiving every successfully decoded event.
///
/// Pushes never block. The consumer decides its own backpressure policy. The
/// target can be re-bridged at any time, e.g. once the host bus finishes its
/// own initialization.
pub struct DispatchBridge<E> {
    target: Arc<RwLock<Option<mpsc::UnboundedSender<E>>>>,
}

impl<E> DispatchBridge<E> {
    /// A bridge with no consumer yet; events are dropped until one is bridged.
    pub fn unbridged() -> Self {
        Self {
            target: Arc::new(RwLock::new(None)),
        }
    }

    /// A bridge connected to a fresh channel, plus that channel's receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = Self::unbridged();
        bridge.bridge_events_to(tx);
        (bridge, rx)
    }

    /// Re-targets the outbound channel.
    pub fn bridge_events_to(&self, sender: mpsc::UnboundedSender<E>) {
        *self.target.write() = Some(sender);
    }

    /// Whether a live consumer is attached.
    pub fn is_bridged(&self) -> bool {
        self.target
            .read()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Hands `event` to the consumer.
    pub fn dispatch(&self, event: E) -> Result<(), DispatchError> {
        let guard = self.target.read();
        let tx = guard.as_ref().ok_or(DispatchError::NotBridged)?;
        tx.send(event).map_err(|_| DispatchError::Closed)
    }
}

impl<E> Clone for DispatchBridge<E> {
    fn clone(&self) -> Self {
        Self {
            target: Arc::clone(&self.target),
        }
    }
}

impl<E> Default for DispatchBridge<E> {
    fn default() -> Self {
        Self::unbridged()
    }
}

impl<E> std::fmt::Debug for DispatchBridge<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchBridge")
            .field("bridged", &self.is_bridged())
            .finish()
    }
}
