//! Input notifications and the bounded queue that carries them.
//!
//! The tracking layer pushes events from whatever thread it runs on; the
//! engine drains them all at the top of each tick. Pushing never blocks:
//! when the queue is full the event is dropped, counted, and logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

use crate::hand::{Hand, ModelHand};
use crate::world::{ItemKey, ObjectRef};

// ── InputEvent ─────────────────────────────────────────────

/// Push notification from the external input layer.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// A controller grasped a world object.
    Grabbed {
        hand: Hand,
        object: ObjectRef,
        key: ItemKey,
    },
    /// A controller released a world object.
    Dropped {
        hand: Hand,
        object: ObjectRef,
        key: ItemKey,
    },
    /// Physics contact reported for whatever `hand` is holding.
    ContactImpulse {
        hand: Hand,
        mass: f32,
        relative_velocity: f32,
    },
    /// The world now shows `key` equipped in a model hand.
    Equipped { hand: ModelHand, key: ItemKey },
    /// The world no longer shows `key` equipped in a model hand.
    Unequipped { hand: ModelHand, key: ItemKey },
    MenuOpened,
    MenuClosed,
    /// The player died or a save was loaded; nothing tracked survives.
    Reset,
}

impl InputEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grabbed { .. } => "grabbed",
            Self::Dropped { .. } => "dropped",
            Self::ContactImpulse { .. } => "contact-impulse",
            Self::Equipped { .. } => "equipped",
            Self::Unequipped { .. } => "unequipped",
            Self::MenuOpened => "menu-opened",
            Self::MenuClosed => "menu-closed",
            Self::Reset => "reset",
        }
    }
}

// ── EventQueue ─────────────────────────────────────────────

/// Producer handle. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<InputEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Enqueue without blocking. Returns false if the event was dropped.
    pub fn push(&self, event: InputEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(event = event.as_str(), dropped = n, "input queue full, event dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Bounded multi-producer queue consumed by the engine.
#[derive(Debug)]
pub struct EventQueue {
    tx: Sender<InputEvent>,
    rx: Receiver<InputEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Take everything queued so far, in arrival order.
    pub fn drain(&self) -> Vec<InputEvent> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Events lost to a full queue since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grab(n: u64) -> InputEvent {
        InputEvent::Grabbed {
            hand: Hand::Left,
            object: ObjectRef(n),
            key: ItemKey::new("herb-lavender"),
        }
    }

    #[test]
    fn test_drain_preserves_order() {
        let q = EventQueue::new(8);
        let tx = q.sender();
        tx.push(grab(1));
        tx.push(InputEvent::MenuOpened);
        tx.push(grab(2));
        let events = q.drain();
        assert_eq!(events, vec![grab(1), InputEvent::MenuOpened, grab(2)]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let q = EventQueue::new(2);
        let tx = q.sender();
        assert!(tx.push(grab(1)));
        assert!(tx.push(grab(2)));
        assert!(!tx.push(grab(3)));
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.drain(), vec![grab(1), grab(2)]);
    }

    #[test]
    fn test_sender_from_other_thread() {
        let q = EventQueue::new(16);
        let tx = q.sender();
        let handle = std::thread::spawn(move || {
            for i in 0..4 {
                tx.push(grab(i));
            }
        });
        handle.join().unwrap();
        assert_eq!(q.len(), 4);
    }
}
