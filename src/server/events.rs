//! Event queue
//!
//! Database-originated notifications (objects discovered during a lazy
//! scan) land here and are written to the interrupt pipe by the engine
//! between steps of the transaction, stamped with the current transaction
//! id. The database holds only a weak reference, so tearing down the
//! server never leaves a cycle.

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::database::{EventSink, ObjectHandle};
use crate::protocol::consts::event;

/// One queued interrupt event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEvent {
    pub code: u16,
    pub param: u32,
}

/// Unbounded queue bridging database notifications to the engine
pub struct EventQueue {
    sender: Sender<PendingEvent>,
    receiver: Receiver<PendingEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Take everything queued so far.
    pub fn drain(&self) -> Vec<PendingEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventQueue {
    fn object_added(&self, handle: ObjectHandle) {
        let _ = self.sender.send(PendingEvent {
            code: event::OBJECT_ADDED,
            param: handle,
        });
    }

    fn object_removed(&self, handle: ObjectHandle) {
        let _ = self.sender.send(PendingEvent {
            code: event::OBJECT_REMOVED,
            param: handle,
        });
    }
}
