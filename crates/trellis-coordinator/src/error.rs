use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;
use trellis_core::{ConfigError, InvariantViolation, ValidationError};

use crate::operation::OperationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The layout engine returned malformed geometry.
    Validation,
    /// The model failed its invariant audit after the mutation.
    Invariant,
    Config,
    /// The layout engine itself failed.
    Layout,
    /// Refused before touching the model.
    Rejected,
}

/// A failure isolated to one queued operation.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{label} ({operation_id}) failed: {message}")]
pub struct OperationError {
    pub operation_id: OperationId,
    pub label: String,
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl OperationError {
    pub fn new(
        operation_id: OperationId,
        label: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation_id,
            label: label.into(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Failure raised inside the execution pipeline, before it is stamped with
/// the operation it belongs to.
#[derive(Error, Debug)]
pub(crate) enum ExecutionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Layout engine failed: {0:#}")]
    Layout(anyhow::Error),
    #[error("{0}")]
    Rejected(String),
}

impl ExecutionError {
    pub(crate) fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Invariant(_) => ErrorKind::Invariant,
            Self::Config(_) => ErrorKind::Config,
            Self::Layout(_) => ErrorKind::Layout,
            Self::Rejected(_) => ErrorKind::Rejected,
        }
    }
}

/// Bounded, oldest-first record of operation failures.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    entries: VecDeque<OperationError>,
    capacity: usize,
    total: u64,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
            total: 0,
        }
    }

    pub fn push(&mut self, error: OperationError) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(error);
        self.total += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Failures recorded since creation, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn to_vec(&self) -> Vec<OperationError> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::ValidationReason;

    #[test]
    fn error_log_evicts_oldest() {
        let mut log = ErrorLog::new(2);
        for i in 0..3 {
            log.push(OperationError::new(
                OperationId(i),
                "relayout",
                ErrorKind::Layout,
                "engine down",
            ));
        }
        let ids: Vec<_> = log.to_vec().iter().map(|e| e.operation_id).collect();
        assert_eq!(ids, vec![OperationId(1), OperationId(2)]);
        assert_eq!(log.total(), 3);
    }

    #[test]
    fn execution_errors_are_classified() {
        let err: ExecutionError =
            ValidationError::new("n1", "x", ValidationReason::Missing).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = ExecutionError::Layout(anyhow::anyhow!("timeout"));
        assert_eq!(err.kind(), ErrorKind::Layout);
        assert_eq!(err.to_string(), "Layout engine failed: timeout");
    }

    #[test]
    fn operation_error_display_names_the_operation() {
        let err = OperationError::new(OperationId(7), "expand(c1)", ErrorKind::Layout, "gone");
        assert_eq!(err.to_string(), "expand(c1) (#7) failed: gone");
    }
}
