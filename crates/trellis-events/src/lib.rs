use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trellis_core::LayoutPhase;

pub mod telemetry;

/// Lifecycle notifications published by the operation coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Queue
    OperationQueued {
        operation_id: u64,
        label: String,
    },
    OperationSuperseded {
        operation_id: u64,
        label: String,
        superseded_by: u64,
    },
    OperationCancelled {
        operation_id: u64,
        label: String,
    },

    // Execution
    OperationStarted {
        operation_id: u64,
        label: String,
        correlation_id: String,
    },
    OperationCompleted {
        operation_id: u64,
        label: String,
        frame_id: Option<u64>,
        duration_ms: u64,
    },
    /// Target state already reached; nothing was mutated.
    OperationNoOp {
        operation_id: u64,
        label: String,
    },
    OperationFailed {
        operation_id: u64,
        label: String,
        message: String,
    },

    // Layout / render
    LayoutPhaseChanged {
        phase: LayoutPhase,
    },
    FrameReady {
        frame_id: u64,
        revision: u64,
        /// The coordinator blocks the queue until this frame is acknowledged.
        awaiting_ack: bool,
    },
    RenderAckTimedOut {
        frame_id: u64,
    },
}

/// Fan-out bus. Each subscriber owns an unbounded channel; an event
/// published while nobody is subscribed is dropped.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<Event>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        Subscription { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver to every live subscriber, forgetting the ones that hung up.
    pub fn publish(&self, event: Event) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Receiving end handed out by [`EventBus::subscribe`]. Dropping it
/// unsubscribes.
pub struct Subscription {
    rx: Receiver<Event>,
}

impl Subscription {
    pub fn receiver(&self) -> &Receiver<Event> {
        &self.rx
    }

    /// Drain pending events without blocking.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }

    /// Dispatch all pending events to a listener.
    pub fn dispatch_to<L: EventListener>(&self, listener: &mut L) {
        while let Ok(event) = self.rx.try_recv() {
            listener.handle_event(&event);
        }
    }
}

/// Implement this to receive events from the EventBus.
pub trait EventListener {
    fn handle_event(&mut self, event: &Event);
}
