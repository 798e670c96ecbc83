use crate::capability::CapabilityId;
use crate::EnsembleError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an assignment. Terminal values never change once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResultStatus::Completed
                | ResultStatus::Failed
                | ResultStatus::Timeout
                | ResultStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: ResultStatus) -> bool {
        match self {
            ResultStatus::Pending => next != ResultStatus::Pending,
            ResultStatus::Running => next != ResultStatus::Pending && next != ResultStatus::Running,
            _ => false,
        }
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Running => "running",
            ResultStatus::Completed => "completed",
            ResultStatus::Failed => "failed",
            ResultStatus::Timeout => "timeout",
            ResultStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Severity of a flagged issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A problem flagged by a worker or by the engine itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub source: Option<CapabilityId>,
    #[serde(default)]
    pub subtask_id: Option<Uuid>,
}

impl Issue {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            source: None,
            subtask_id: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn with_source(mut self, source: CapabilityId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_subtask(mut self, subtask_id: Uuid) -> Self {
        self.subtask_id = Some(subtask_id);
        self
    }
}

/// A suggested change to project memory (entity facts) from a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub entity_id: String,
    pub field: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Per-assignment execution metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetrics {
    pub duration_ms: u64,
    /// Transport attempts made, including retries.
    pub attempts: u32,
    /// Engine-level re-executions of the whole assignment.
    pub reexecutions: u32,
}

/// Error details attached to a non-completed result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl From<&EnsembleError> for ErrorInfo {
    fn from(err: &EnsembleError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub assignment_id: Uuid,
    pub subtask_id: Uuid,
    pub capability: CapabilityId,
    pub stage: String,
    pub status: ResultStatus,
    pub output: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub memory_updates: Vec<MemoryUpdate>,
    #[serde(default)]
    pub metrics: ResultMetrics,
    pub error: Option<ErrorInfo>,
}

impl AssignmentResult {
    /// A fresh pending result for the given assignment coordinates.
    pub fn pending(
        assignment_id: Uuid,
        subtask_id: Uuid,
        capability: CapabilityId,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            assignment_id,
            subtask_id,
            capability,
            stage: stage.into(),
            status: ResultStatus::Pending,
            output: None,
            confidence: 0.0,
            issues: Vec::new(),
            memory_updates: Vec::new(),
            metrics: ResultMetrics::default(),
            error: None,
        }
    }

    /// Move to `next` if allowed. Returns `false` (and leaves the status
    /// untouched) when the current status is terminal.
    pub fn transition(&mut self, next: ResultStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Finish as completed with the given output.
    pub fn complete(mut self, output: impl Into<String>, confidence: f64) -> Self {
        if self.transition(ResultStatus::Completed) {
            self.output = Some(output.into());
            self.confidence = confidence.clamp(0.0, 1.0);
        }
        self
    }

    /// Finish with the status matching `err` (timeout, cancelled or failed).
    pub fn fail(mut self, err: &EnsembleError) -> Self {
        let status = match err {
            EnsembleError::Timeout(_) => ResultStatus::Timeout,
            EnsembleError::Cancelled(_) => ResultStatus::Cancelled,
            _ => ResultStatus::Failed,
        };
        if self.transition(status) {
            self.error = Some(ErrorInfo::from(err));
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Completed
    }

    /// Error code, if any.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}
