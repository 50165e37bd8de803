//! The single gateway through which the graph model is mutated.
//!
//! Operations run strictly one at a time: mutate, lay out if positions may
//! have moved, render, then hold the queue until the renderer acknowledges
//! the frame or the acknowledgement times out.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, info, warn};
use trellis_core::{ConfigError, CoordinatorConfig, LayoutPhase, Validate};
use trellis_events::{Event, EventBus, telemetry};
use trellis_graph::{GraphModel, LayoutBridge, MutationOutcome, RenderBridge, RenderData};

use crate::error::{ErrorLog, ExecutionError, OperationError};
use crate::operation::{Operation, OperationId, OperationOutcome};
use crate::queue::{OperationQueue, QueuedOperation, QueuedSummary};

/// Render output handed to the renderer, tagged for acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub frame_id: u64,
    pub operation_id: OperationId,
    pub awaiting_ack: bool,
    pub data: RenderData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Executing,
    AwaitingRenderAck,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Operations that changed the model (or relaid it out).
    pub completed: u64,
    pub no_ops: u64,
    pub failed: u64,
    pub superseded: u64,
    pub cancelled: u64,
    pub layout_passes: u64,
    pub frames: u64,
    pub ack_timeouts: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightStatus {
    pub id: OperationId,
    pub label: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub state: CoordinatorState,
    pub queue_depth: usize,
    pub queued: Vec<QueuedSummary>,
    pub in_flight: Option<InFlightStatus>,
    pub awaiting_ack: Option<u64>,
    pub error_count: usize,
    pub revision: u64,
    pub layout_phase: LayoutPhase,
    pub stats: CoordinatorStats,
}

/// Resolves once the operation finishes, is superseded or is cancelled.
pub struct OperationTicket {
    id: OperationId,
    rx: oneshot::Receiver<OperationOutcome>,
}

impl OperationTicket {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub async fn outcome(self) -> OperationOutcome {
        self.rx.await.unwrap_or(OperationOutcome::Cancelled)
    }
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    no_ops: AtomicU64,
    failed: AtomicU64,
    superseded: AtomicU64,
    cancelled: AtomicU64,
    layout_passes: AtomicU64,
    frames: AtomicU64,
    ack_timeouts: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CoordinatorStats {
        CoordinatorStats {
            completed: self.completed.load(Ordering::Relaxed),
            no_ops: self.no_ops.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            layout_passes: self.layout_passes.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            ack_timeouts: self.ack_timeouts.load(Ordering::Relaxed),
        }
    }
}

struct InFlight {
    id: OperationId,
    label: String,
    started: Instant,
}

struct PendingAck {
    frame_id: u64,
    tx: oneshot::Sender<()>,
}

struct Shared {
    model: RwLock<GraphModel>,
    queue: Mutex<OperationQueue>,
    errors: Mutex<ErrorLog>,
    in_flight: Mutex<Option<InFlight>>,
    pending_ack: Mutex<Option<PendingAck>>,
    latest_frame: RwLock<Option<Arc<Frame>>>,
    next_frame: AtomicU64,
    counters: Counters,
    /// Signalled on every enqueue.
    work: Notify,
    /// Held for the whole of one operation so executions never overlap.
    turn: tokio::sync::Mutex<()>,
}

enum Execution {
    NoOp,
    Completed { layout: bool, frame_id: u64 },
}

/// Serializes operations against one [`GraphModel`].
///
/// Cloning is cheap and every clone drives the same queue and model.
#[derive(Clone)]
pub struct OperationCoordinator {
    shared: Arc<Shared>,
    layout: LayoutBridge,
    render: RenderBridge,
    events: EventBus,
    config: CoordinatorConfig,
}

impl OperationCoordinator {
    pub fn new(
        model: GraphModel,
        layout: LayoutBridge,
        events: EventBus,
        config: CoordinatorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::assemble(model, layout, events, config))
    }

    /// Default layout engine, a fresh event bus and default configuration.
    /// Subscribe through [`OperationCoordinator::events`]; until then events
    /// are dropped.
    pub fn with_model(model: GraphModel) -> Self {
        Self::assemble(
            model,
            LayoutBridge::default(),
            EventBus::new(),
            CoordinatorConfig::default(),
        )
    }

    fn assemble(
        model: GraphModel,
        layout: LayoutBridge,
        events: EventBus,
        config: CoordinatorConfig,
    ) -> Self {
        let shared = Shared {
            model: RwLock::new(model),
            queue: Mutex::new(OperationQueue::new()),
            errors: Mutex::new(ErrorLog::new(config.error_log_capacity)),
            in_flight: Mutex::new(None),
            pending_ack: Mutex::new(None),
            latest_frame: RwLock::new(None),
            next_frame: AtomicU64::new(0),
            counters: Counters::default(),
            work: Notify::new(),
            turn: tokio::sync::Mutex::new(()),
        };
        Self {
            shared: Arc::new(shared),
            layout,
            render: RenderBridge::new(),
            events,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    pub fn enqueue(&self, operation: Operation) -> OperationTicket {
        let (tx, rx) = oneshot::channel();
        let label = operation.label();
        let (id, superseded) = self.shared.queue.lock().push(operation, Some(tx));
        debug!("Queued {} as {}", label, id);
        self.events.publish(Event::OperationQueued {
            operation_id: id.0,
            label: label.clone(),
        });

        for entry in superseded {
            let old_label = entry.label();
            telemetry::operation_superseded(&old_label, &label);
            Counters::bump(&self.shared.counters.superseded);
            self.events.publish(Event::OperationSuperseded {
                operation_id: entry.id.0,
                label: old_label,
                superseded_by: id.0,
            });
            entry.resolve(OperationOutcome::Superseded { by: id });
        }

        self.shared.work.notify_one();
        OperationTicket { id, rx }
    }

    /// Cancel a still-queued operation. Returns false if it already started
    /// or is unknown.
    pub fn cancel(&self, id: OperationId) -> bool {
        let Some(entry) = self.shared.queue.lock().cancel(id) else {
            return false;
        };
        self.resolve_cancelled(entry);
        true
    }

    pub(crate) fn cancel_all(&self) -> usize {
        let remaining = self.shared.queue.lock().drain();
        let count = remaining.len();
        for entry in remaining {
            self.resolve_cancelled(entry);
        }
        count
    }

    fn resolve_cancelled(&self, entry: QueuedOperation) {
        let label = entry.label();
        info!("Cancelled {} ({})", label, entry.id);
        Counters::bump(&self.shared.counters.cancelled);
        self.events.publish(Event::OperationCancelled {
            operation_id: entry.id.0,
            label,
        });
        entry.resolve(OperationOutcome::Cancelled);
    }

    pub(crate) async fn wait_for_work(&self) {
        self.shared.work.notified().await;
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Execute the operation at the head of the queue, if any.
    pub async fn process_next(&self) -> Option<(OperationId, OperationOutcome)> {
        let _turn = self.shared.turn.lock().await;
        let entry = self.shared.queue.lock().pop()?;
        let id = entry.id;
        let label = entry.label();
        let correlation_id = telemetry::new_correlation_id();
        let started = Instant::now();

        *self.shared.in_flight.lock() = Some(InFlight {
            id,
            label: label.clone(),
            started,
        });
        telemetry::operation_start(&label, &correlation_id);
        self.events.publish(Event::OperationStarted {
            operation_id: id.0,
            label: label.clone(),
            correlation_id: correlation_id.clone(),
        });

        let result = self
            .execute(&entry.operation, id, &label, &correlation_id)
            .await;
        let outcome = match result {
            Ok(Execution::NoOp) => {
                debug!("{} left the model unchanged", label);
                telemetry::operation_success(&label, &correlation_id, None);
                Counters::bump(&self.shared.counters.no_ops);
                self.events.publish(Event::OperationNoOp {
                    operation_id: id.0,
                    label: label.clone(),
                });
                OperationOutcome::NoOp
            }
            Ok(Execution::Completed { layout, frame_id }) => {
                let elapsed = started.elapsed();
                telemetry::operation_success(&label, &correlation_id, Some(elapsed.as_millis()));
                Counters::bump(&self.shared.counters.completed);
                self.events.publish(Event::OperationCompleted {
                    operation_id: id.0,
                    label: label.clone(),
                    frame_id: Some(frame_id),
                    duration_ms: elapsed.as_millis() as u64,
                });
                OperationOutcome::Completed {
                    layout,
                    frame_id: Some(frame_id),
                }
            }
            Err(err) => {
                let error = OperationError::new(id, &label, err.kind(), err.to_string());
                telemetry::operation_failure(&label, &correlation_id, Some(error.message.clone()));
                Counters::bump(&self.shared.counters.failed);
                self.shared.errors.lock().push(error.clone());
                self.events.publish(Event::OperationFailed {
                    operation_id: id.0,
                    label: label.clone(),
                    message: error.message.clone(),
                });
                OperationOutcome::Failed(error)
            }
        };

        *self.shared.in_flight.lock() = None;
        entry.resolve(outcome.clone());
        Some((id, outcome))
    }

    /// Drain the queue, including operations enqueued while draining.
    pub async fn run_until_idle(&self) -> Vec<(OperationId, OperationOutcome)> {
        let mut outcomes = Vec::new();
        while let Some(result) = self.process_next().await {
            outcomes.push(result);
        }
        outcomes
    }

    async fn execute(
        &self,
        operation: &Operation,
        id: OperationId,
        label: &str,
        correlation_id: &str,
    ) -> Result<Execution, ExecutionError> {
        let mutated = self.mutate(operation)?;
        if !mutated && !matches!(operation, Operation::Relayout) {
            return Ok(Execution::NoOp);
        }

        let layout = operation.affects_layout();
        if layout {
            self.run_layout().await?;
        }
        let frame_id = self
            .render_frame(id, label, correlation_id, layout)
            .await;
        Ok(Execution::Completed { layout, frame_id })
    }

    /// Apply the operation's model change. Returns whether anything changed.
    fn mutate(&self, operation: &Operation) -> Result<bool, ExecutionError> {
        match operation {
            Operation::Batch(actions) if actions.len() > self.config.max_batch_size => {
                return Err(ExecutionError::Rejected(format!(
                    "Batch of {} actions exceeds max_batch_size {}",
                    actions.len(),
                    self.config.max_batch_size
                )));
            }
            Operation::UpdateLayoutConfig(config) => config.validate()?,
            Operation::UpdateStyle(style) => style.validate()?,
            _ => {}
        }

        let mut model = self.shared.model.write();
        let outcome = match operation {
            Operation::Expand(id) => model.expand_container(id),
            Operation::Collapse(id) => model.collapse_container(id),
            Operation::Toggle(id) => model.toggle_container(id),
            Operation::ExpandAll => model.expand_all(),
            Operation::CollapseAll => model.collapse_all(),
            Operation::Batch(actions) => {
                let batch = model.apply_batch(actions);
                if batch.is_applied() {
                    MutationOutcome::Applied
                } else if batch.unknown > 0 && batch.unchanged == 0 {
                    MutationOutcome::UnknownTarget
                } else {
                    MutationOutcome::Unchanged
                }
            }
            Operation::Search(query) => model.search(query),
            Operation::ClearSearch => model.clear_search(),
            Operation::Reveal(id) => model.expand_container_for_search(id),
            Operation::RevealMatch(index) => model.reveal_match(*index),
            Operation::UpdateLayoutConfig(config) => model.set_layout_config(config.clone()),
            Operation::UpdateStyle(style) => model.set_style_config(style.clone()),
            Operation::Relayout => MutationOutcome::Unchanged,
        };

        match outcome {
            MutationOutcome::Applied => {
                if self.config.audit_invariants {
                    model.check_invariants()?;
                }
                Ok(true)
            }
            MutationOutcome::Unchanged => Ok(false),
            MutationOutcome::UnknownTarget => {
                warn!("{} names nothing in the model; skipping", operation);
                Ok(false)
            }
        }
    }

    async fn run_layout(&self) -> Result<(), ExecutionError> {
        let request = {
            let mut model = self.shared.model.write();
            model.begin_layout();
            self.layout.build_request(&model)
        };
        self.publish_phase(LayoutPhase::Computing);
        Counters::bump(&self.shared.counters.layout_passes);

        let entries = match self.layout.compute(request).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Layout engine '{}' failed: {:#}", self.layout.engine_name(), err);
                self.shared.model.write().fail_layout();
                self.publish_phase(LayoutPhase::Error);
                return Err(ExecutionError::Layout(err));
            }
        };

        let applied = {
            let mut model = self.shared.model.write();
            self.layout.apply(&mut model, &entries)
        };
        match applied {
            Ok(count) => {
                debug!("Applied layout to {} entities", count);
                self.publish_phase(LayoutPhase::Ready);
                Ok(())
            }
            Err(err) => {
                self.publish_phase(LayoutPhase::Error);
                Err(err.into())
            }
        }
    }

    fn publish_phase(&self, phase: LayoutPhase) {
        self.events.publish(Event::LayoutPhaseChanged { phase });
    }

    /// Render the current model and, for layout-affecting operations, hold
    /// until the renderer acknowledges the frame or the timeout elapses.
    async fn render_frame(
        &self,
        operation_id: OperationId,
        label: &str,
        correlation_id: &str,
        wait_for_ack: bool,
    ) -> u64 {
        let data = {
            let model = self.shared.model.read();
            self.render.render(&model.snapshot(), model.style_config())
        };
        let frame_id = self.shared.next_frame.fetch_add(1, Ordering::SeqCst) + 1;
        let revision = data.revision;

        // Registered before the frame becomes observable so an immediate ack
        // is not lost.
        let pending = wait_for_ack.then(|| {
            let (tx, rx) = oneshot::channel();
            *self.shared.pending_ack.lock() = Some(PendingAck { frame_id, tx });
            rx
        });
        *self.shared.latest_frame.write() = Some(Arc::new(Frame {
            frame_id,
            operation_id,
            awaiting_ack: wait_for_ack,
            data,
        }));
        Counters::bump(&self.shared.counters.frames);
        self.events.publish(Event::FrameReady {
            frame_id,
            revision,
            awaiting_ack: wait_for_ack,
        });

        let Some(rx) = pending else {
            return frame_id;
        };
        match tokio::time::timeout(self.config.render_ack_timeout(), rx).await {
            Ok(Ok(())) => debug!("Frame {} acknowledged", frame_id),
            Ok(Err(_)) | Err(_) => {
                {
                    let mut pending = self.shared.pending_ack.lock();
                    if pending.as_ref().is_some_and(|p| p.frame_id == frame_id) {
                        *pending = None;
                    }
                }
                telemetry::render_ack_timeout(
                    label,
                    correlation_id,
                    frame_id,
                    self.config.render_ack_timeout_ms,
                );
                Counters::bump(&self.shared.counters.ack_timeouts);
                self.events.publish(Event::RenderAckTimedOut { frame_id });
            }
        }
        frame_id
    }

    /// Called by the renderer once the frame has settled on screen.
    ///
    /// Returns false for a frame that is not awaiting acknowledgement.
    pub fn acknowledge_render(&self, frame_id: u64) -> bool {
        let mut pending = self.shared.pending_ack.lock();
        match pending.take() {
            Some(ack) if ack.frame_id == frame_id => {
                let _ = ack.tx.send(());
                true
            }
            other => {
                debug!("Ignoring render ack for frame {}", frame_id);
                *pending = other;
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn status(&self) -> CoordinatorStatus {
        let queued = self.shared.queue.lock().summaries();
        let in_flight = self.shared.in_flight.lock().as_ref().map(|f| InFlightStatus {
            id: f.id,
            label: f.label.clone(),
            elapsed_ms: f.started.elapsed().as_millis() as u64,
        });
        let awaiting_ack = self.shared.pending_ack.lock().as_ref().map(|p| p.frame_id);
        let (revision, layout_phase) = {
            let model = self.shared.model.read();
            (model.revision(), model.layout_phase())
        };
        let state = match (&in_flight, awaiting_ack) {
            (None, _) => CoordinatorState::Idle,
            (Some(_), Some(_)) => CoordinatorState::AwaitingRenderAck,
            (Some(_), None) => CoordinatorState::Executing,
        };

        CoordinatorStatus {
            state,
            queue_depth: queued.len(),
            queued,
            in_flight,
            awaiting_ack,
            error_count: self.shared.errors.lock().len(),
            revision,
            layout_phase,
            stats: self.shared.counters.snapshot(),
        }
    }

    pub fn errors(&self) -> Vec<OperationError> {
        self.shared.errors.lock().to_vec()
    }

    pub fn clear_errors(&self) {
        self.shared.errors.lock().clear();
    }

    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.shared.latest_frame.read().clone()
    }

    /// Read-only access to the model. Mutations go through [`Self::enqueue`].
    pub fn read_model<R>(&self, f: impl FnOnce(&GraphModel) -> R) -> R {
        f(&self.shared.model.read())
    }
}
