//! FIFO operation queue with same-class supersession.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::oneshot;

use crate::operation::{Operation, OperationId, OperationOutcome};

pub struct QueuedOperation {
    pub id: OperationId,
    pub operation: Operation,
    pub enqueued_at: Instant,
    responder: Option<oneshot::Sender<OperationOutcome>>,
}

impl QueuedOperation {
    pub fn label(&self) -> String {
        self.operation.label()
    }

    /// Deliver the outcome to whoever holds the ticket. A dropped ticket is
    /// not an error.
    pub fn resolve(mut self, outcome: OperationOutcome) {
        if let Some(responder) = self.responder.take() {
            let _ = responder.send(outcome);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedSummary {
    pub id: OperationId,
    pub label: String,
}

#[derive(Default)]
pub struct OperationQueue {
    entries: VecDeque<QueuedOperation>,
    next_id: u64,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation. Returns its id and any queued operations it
    /// supersedes; the caller resolves those. A superseding operation takes
    /// the place of the earliest entry it replaces, so operations queued
    /// after that entry still run after it.
    pub fn push(
        &mut self,
        operation: Operation,
        responder: Option<oneshot::Sender<OperationOutcome>>,
    ) -> (OperationId, Vec<QueuedOperation>) {
        self.next_id += 1;
        let id = OperationId(self.next_id);

        let class = operation.class();
        let mut superseded = Vec::new();
        let mut slot = None;
        if class.is_coalescable() {
            let mut kept = VecDeque::with_capacity(self.entries.len());
            for entry in self.entries.drain(..) {
                if entry.operation.class() == class {
                    slot.get_or_insert(kept.len());
                    superseded.push(entry);
                } else {
                    kept.push_back(entry);
                }
            }
            self.entries = kept;
        }

        let entry = QueuedOperation {
            id,
            operation,
            enqueued_at: Instant::now(),
            responder,
        };
        match slot {
            Some(index) => self.entries.insert(index, entry),
            None => self.entries.push_back(entry),
        }
        (id, superseded)
    }

    pub fn pop(&mut self) -> Option<QueuedOperation> {
        self.entries.pop_front()
    }

    /// Remove a still-queued operation.
    pub fn cancel(&mut self, id: OperationId) -> Option<QueuedOperation> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        self.entries.remove(index)
    }

    pub fn drain(&mut self) -> Vec<QueuedOperation> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summaries(&self) -> Vec<QueuedSummary> {
        self.entries
            .iter()
            .map(|entry| QueuedSummary {
                id: entry.id,
                label: entry.label(),
            })
            .collect()
    }
}
