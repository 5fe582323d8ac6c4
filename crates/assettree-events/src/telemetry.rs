use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};
use uuid::Uuid;

const TELEMETRY_TARGET: &str = "assettree::events::telemetry";

pub const OP_CHANGE_VISIBILITY: &str = "ChangeVisibility";
pub const OP_FIND_PATHS: &str = "FindPaths";
pub const OP_LABEL_SEARCH: &str = "LabelSearch";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationLifecycle {
    Start,
    Success,
    Failure,
}

impl fmt::Display for OperationLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "operation_start"),
            Self::Success => write!(f, "operation_success"),
            Self::Failure => write!(f, "operation_failure"),
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

pub fn operation_start(operation: &str, correlation_id: &str, subject: &str) -> OperationTelemetry {
    let telemetry = OperationTelemetry::new(operation, correlation_id, OperationLifecycle::Start);
    info!(
        target: TELEMETRY_TARGET,
        operation = %telemetry.operation,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        subject = %subject,
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

pub fn debug_context(operation: &str, correlation_id: &str, context: &str) {
    debug!(
        target: TELEMETRY_TARGET,
        operation = %operation,
        correlation_id = %correlation_id,
        context = %context,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "operation_context"
    );
}
