//! Core types and error definitions for the Ensemble orchestration engine.
//!
//! This crate provides the foundational types shared across all Ensemble crates:
//! the error taxonomy, the closed set of worker capabilities, and the data model
//! that flows from a request through decomposition, routing, execution and synthesis.
//!
//! # Main types
//!
//! - [`EnsembleError`]: Unified error enum with stable error codes.
//! - [`EnsembleResult`]: Convenience alias for `Result<T, EnsembleError>`.
//! - [`CapabilityId`]: Compile-time-checked set of specialist capabilities.
//! - [`Task`]: A high-level content-generation request.
//! - [`Subtask`] / [`Assignment`]: Decomposed and routed units of work.
//! - [`AssignmentResult`]: Terminal outcome of one assignment.
//! - [`SynthesizedOutput`]: The merged artifact returned to callers.

/// Capability identifiers and metadata.
pub mod capability;
/// Synthesized output and quality types.
pub mod output;
/// Assignment results and their status machine.
pub mod result;
/// Requests, subtasks and assignments.
pub mod task;

pub use capability::{CapabilityCategory, CapabilityDefinition, CapabilityId, DurationBucket};
pub use output::{
    Contribution, OutputMetadata, QualityMetrics, QualityOverrides, QualityThresholds,
    QualityWarning, SynthesizedOutput,
};
pub use result::{
    AssignmentResult, ErrorInfo, Issue, MemoryUpdate, ResultMetrics, ResultStatus, Severity,
};
pub use task::{
    Assignment, EntityKind, EntityRef, InvocationPayload, Subtask, SubtaskContext, SubtaskKind,
    Task, TaskConstraints, TaskContext, TaskRequirements, TaskType,
};

// --- Error types ---

/// Top-level error type for the Ensemble engine.
///
/// Assignment-level failures never surface as this type to callers of
/// `orchestrate`; they are converted into terminal [`AssignmentResult`]s.
/// Only session-structural failures propagate.
#[derive(Debug, thiserror::Error)]
pub enum EnsembleError {
    /// No resolvable capability, or an invalid configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A network-level failure talking to the remote worker service.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A remote call exceeded its per-call timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The remote worker rejected the request as malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The remote worker answered but reported that generation failed.
    #[error("Worker error: {0}")]
    Worker(String),

    /// The circuit breaker is open; the call was rejected locally.
    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    /// The request could not be turned into a valid subtask graph.
    #[error("Decomposition error: {0}")]
    Decomposition(String),

    /// Synthesis could not be performed (e.g. no successful results).
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Nothing is ready and nothing is in flight, yet work remains.
    #[error("Scheduling deadlock: {0}")]
    Deadlock(String),

    /// The session or call was cancelled.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Unknown session or invalid session state transition.
    #[error("Session error: {0}")]
    Session(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnsembleError {
    /// Stable, machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            EnsembleError::Configuration(_) => "CONFIGURATION_ERROR",
            EnsembleError::Transport(_) => "TRANSPORT_ERROR",
            EnsembleError::Timeout(_) => "TIMEOUT",
            EnsembleError::Validation(_) => "VALIDATION_ERROR",
            EnsembleError::Worker(_) => "WORKER_ERROR",
            EnsembleError::CircuitOpen(_) => "CIRCUIT_OPEN",
            EnsembleError::Decomposition(_) => "DECOMPOSITION_ERROR",
            EnsembleError::Synthesis(_) => "SYNTHESIS_ERROR",
            EnsembleError::Deadlock(_) => "SCHEDULING_DEADLOCK",
            EnsembleError::Cancelled(_) => "CANCELLED",
            EnsembleError::Session(_) => "SESSION_ERROR",
            EnsembleError::Json(_) => "SERIALIZATION_ERROR",
            EnsembleError::Io(_) => "IO_ERROR",
        }
    }

    /// Whether the error is transient and worth retrying at the transport level.
    pub fn is_retryable(&self) -> bool {
        self.is_transport()
    }

    /// Whether the error indicates an unhealthy endpoint (counts against the breaker).
    pub fn is_transport(&self) -> bool {
        matches!(self, EnsembleError::Transport(_) | EnsembleError::Timeout(_))
    }
}

/// A convenience `Result` alias using [`EnsembleError`].
pub type EnsembleResult<T> = Result<T, EnsembleError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            EnsembleError::Configuration("x".into()).code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(EnsembleError::CircuitOpen("x".into()).code(), "CIRCUIT_OPEN");
        assert_eq!(EnsembleError::Synthesis("x".into()).code(), "SYNTHESIS_ERROR");
        assert_eq!(EnsembleError::Cancelled("x".into()).code(), "CANCELLED");
    }

    #[test]
    fn test_retry_classification() {
        assert!(EnsembleError::Transport("503".into()).is_retryable());
        assert!(EnsembleError::Timeout("30s".into()).is_retryable());
        assert!(!EnsembleError::Validation("bad payload".into()).is_retryable());
        assert!(!EnsembleError::CircuitOpen("worker".into()).is_retryable());
        assert!(!EnsembleError::Cancelled("a".into()).is_retryable());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: EnsembleError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.code(), "SERIALIZATION_ERROR");
    }
}
