//! Background worker that drains the queue on a tokio task.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use trellis_graph::GraphModel;

use crate::coordinator::{CoordinatorStatus, Frame, OperationCoordinator, OperationTicket};
use crate::error::OperationError;
use crate::operation::{Operation, OperationId};

impl OperationCoordinator {
    /// Move the coordinator onto a worker task. Must be called inside a tokio
    /// runtime.
    pub fn spawn(self) -> CoordinatorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = self.clone();
        let task = tokio::spawn(async move { worker.run(shutdown_rx).await });
        CoordinatorHandle {
            coordinator: self,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Operation worker started");
        'worker: loop {
            while self.process_next().await.is_some() {
                if *shutdown.borrow() {
                    break 'worker;
                }
            }
            tokio::select! {
                _ = self.wait_for_work() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break 'worker;
                    }
                }
            }
        }
        let cancelled = self.cancel_all();
        info!("Operation worker stopped, {} queued operations cancelled", cancelled);
    }
}

/// Front door to a spawned coordinator.
pub struct CoordinatorHandle {
    coordinator: OperationCoordinator,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub fn enqueue(&self, operation: Operation) -> OperationTicket {
        self.coordinator.enqueue(operation)
    }

    pub fn cancel(&self, id: OperationId) -> bool {
        self.coordinator.cancel(id)
    }

    pub fn acknowledge_render(&self, frame_id: u64) -> bool {
        self.coordinator.acknowledge_render(frame_id)
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.coordinator.status()
    }

    pub fn errors(&self) -> Vec<OperationError> {
        self.coordinator.errors()
    }

    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.coordinator.latest_frame()
    }

    pub fn read_model<R>(&self, f: impl FnOnce(&GraphModel) -> R) -> R {
        self.coordinator.read_model(f)
    }

    pub fn coordinator(&self) -> &OperationCoordinator {
        &self.coordinator
    }

    /// Stop after the executing operation finishes. Anything still queued
    /// resolves as cancelled.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!("Operation worker ended abnormally: {}", err);
        }
    }
}
