//! Serialized execution of graph operations.
//!
//! Every model mutation is an [`Operation`] pushed through one
//! [`OperationCoordinator`]. Search and configuration updates coalesce while
//! queued, toggles that find their target state already reached run as
//! no-ops, and failures are logged per operation without stopping the queue.

pub mod coordinator;
pub mod error;
pub mod handle;
pub mod operation;
pub mod queue;

pub use coordinator::{
    CoordinatorState, CoordinatorStats, CoordinatorStatus, Frame, InFlightStatus,
    OperationCoordinator, OperationTicket,
};
pub use error::{ErrorKind, ErrorLog, OperationError};
pub use handle::CoordinatorHandle;
pub use operation::{Operation, OperationClass, OperationId, OperationOutcome, ParseOperationError};
pub use queue::QueuedSummary;
