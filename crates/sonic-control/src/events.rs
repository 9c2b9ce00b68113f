//! Session events.
//!
//! All components of a session publish on one [`EventBus`]. Subscribers that
//! fall behind lose the oldest events; publishing never blocks.

use sonic_protocol::Answer;
use tokio::sync::broadcast;

use crate::procedures::ProcedureType;

/// Capacity of the event channel.
pub const EVENT_CAPACITY: usize = 256;

/// An event of a device session.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The communicator lost or closed its connection.
    Disconnected,
    /// A status update was polled.
    Update(Answer),
    /// A procedure started.
    ProcedureRunning(ProcedureType),
    /// The running procedure ended.
    ProcedureStopped,
}

/// Broadcast channel shared by the components of one session.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        EventBus { sender }
    }

    /// Subscribe to all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: Event) {
        tracing::trace!(?event, "emit");
        let _ = self.sender.send(event);
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
