//! Structured lifecycle logging for queued operations.
//!
//! Every record goes to [`TELEMETRY_TARGET`] and carries the operation's
//! correlation id so a single operation can be followed through the log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const TELEMETRY_TARGET: &str = "trellis::coordinator::telemetry";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationLifecycle {
    Start,
    Success,
    Failure,
    Superseded,
}

impl fmt::Display for OperationLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "operation_start"),
            Self::Success => write!(f, "operation_success"),
            Self::Failure => write!(f, "operation_failure"),
            Self::Superseded => write!(f, "operation_superseded"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationTelemetry {
    pub correlation_id: String,
    pub operation: String,
    pub lifecycle: OperationLifecycle,
    pub error_reason: Option<String>,
    pub duration_ms: Option<u128>,
}

impl OperationTelemetry {
    fn new(operation: &str, correlation_id: &str, lifecycle: OperationLifecycle) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            operation: operation.to_string(),
            lifecycle,
            error_reason: None,
            duration_ms: None,
        }
    }

    fn now_unix_ms() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    }
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn operation_start(operation: &str, correlation_id: &str) -> OperationTelemetry {
    let telemetry = OperationTelemetry::new(operation, correlation_id, OperationLifecycle::Start);
    info!(
        target: TELEMETRY_TARGET,
        operation = %telemetry.operation,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "operation_start"
    );
    telemetry
}

pub fn operation_success(
    operation: &str,
    correlation_id: &str,
    duration_ms: Option<u128>,
) -> OperationTelemetry {
    let mut telemetry =
        OperationTelemetry::new(operation, correlation_id, OperationLifecycle::Success);
    telemetry.duration_ms = duration_ms;
    info!(
        target: TELEMETRY_TARGET,
        operation = %telemetry.operation,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        duration_ms = ?telemetry.duration_ms,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "operation_success"
    );
    telemetry
}

pub fn operation_failure(
    operation: &str,
    correlation_id: &str,
    reason: Option<String>,
) -> OperationTelemetry {
    let mut telemetry =
        OperationTelemetry::new(operation, correlation_id, OperationLifecycle::Failure);
    telemetry.error_reason = reason;
    let error_reason = telemetry.error_reason.as_deref().unwrap_or("unclassified");

    error!(
        target: TELEMETRY_TARGET,
        operation = %telemetry.operation,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        error = %error_reason,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "operation_failure"
    );

    telemetry
}

/// Superseded operations never start, so they have no correlation id yet.
pub fn operation_superseded(operation: &str, superseded_by: &str) -> OperationTelemetry {
    let telemetry = OperationTelemetry::new(operation, "", OperationLifecycle::Superseded);
    info!(
        target: TELEMETRY_TARGET,
        operation = %telemetry.operation,
        superseded_by = %superseded_by,
        lifecycle = %telemetry.lifecycle,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "operation_superseded"
    );
    telemetry
}

pub fn render_ack_timeout(operation: &str, correlation_id: &str, frame_id: u64, timeout_ms: u64) {
    warn!(
        target: TELEMETRY_TARGET,
        operation = %operation,
        correlation_id = %correlation_id,
        frame_id,
        timeout_ms,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "render_ack_timeout"
    );
}
