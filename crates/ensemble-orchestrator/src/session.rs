use crate::task_queue::{AssignmentQueue, StatusCounts};
use chrono::{DateTime, Utc};
use ensemble_core::{
    AssignmentResult, EnsembleError, EnsembleResult, Issue, ResultStatus, Severity, Subtask,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lifecycle of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Decomposed,
    Routed,
    Executing,
    Synthesizing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal move.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Created, Decomposed)
            | (Decomposed, Routed)
            | (Routed, Executing)
            | (Executing, Synthesizing)
            | (Synthesizing, Completed) => true,
            (Executing | Synthesizing, Cancelled) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Created => "created",
            SessionStatus::Decomposed => "decomposed",
            SessionStatus::Routed => "routed",
            SessionStatus::Executing => "executing",
            SessionStatus::Synthesizing => "synthesizing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of a session's progress and per-subtask outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub task_id: Uuid,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub counts: StatusCounts,
    pub critical_path_ms: u64,
    /// One result per subtask, in decomposition order.
    pub results: Vec<AssignmentResult>,
    /// Issues raised by results plus one entry per unsuccessful subtask.
    pub issues: Vec<Issue>,
}

struct SessionState {
    status: SessionStatus,
    subtasks: Vec<Subtask>,
    critical_path_ms: u64,
}

/// One end-to-end orchestration run.
pub struct Session {
    task_id: Uuid,
    started_at: DateTime<Utc>,
    started: Instant,
    cancel: CancellationToken,
    queue: Arc<RwLock<AssignmentQueue>>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(task_id: Uuid, cancel: CancellationToken) -> Self {
        Self {
            task_id,
            started_at: Utc::now(),
            started: Instant::now(),
            cancel,
            queue: Arc::new(RwLock::new(AssignmentQueue::new())),
            state: Mutex::new(SessionState {
                status: SessionStatus::Created,
                subtasks: Vec::new(),
                critical_path_ms: 0,
            }),
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn queue(&self) -> &Arc<RwLock<AssignmentQueue>> {
        &self.queue
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&self, next: SessionStatus) -> EnsembleResult<()> {
        let mut state = self.state.lock();
        if !state.status.can_transition_to(next) {
            return Err(EnsembleError::Session(format!(
                "invalid transition {} -> {next} for session {}",
                state.status, self.task_id
            )));
        }
        state.status = next;
        Ok(())
    }

    /// Record the decomposition this session executes.
    pub fn set_plan(&self, subtasks: Vec<Subtask>, critical_path_ms: u64) {
        let mut state = self.state.lock();
        state.subtasks = subtasks;
        state.critical_path_ms = critical_path_ms;
    }

    pub fn subtasks(&self) -> Vec<Subtask> {
        self.state.lock().subtasks.clone()
    }

    pub fn critical_path_ms(&self) -> u64 {
        self.state.lock().critical_path_ms
    }

    /// Build a report from the current state.
    pub async fn report(&self) -> ExecutionReport {
        let (status, subtasks, critical_path_ms) = {
            let state = self.state.lock();
            (state.status, state.subtasks.clone(), state.critical_path_ms)
        };
        let queue = self.queue.read().await;

        let results: Vec<AssignmentResult> = subtasks
            .iter()
            .filter_map(|s| queue.get(s.id).cloned())
            .collect();
        let issues = collect_issues(&results);

        ExecutionReport {
            task_id: self.task_id,
            status,
            started_at: self.started_at,
            elapsed_ms: self.elapsed_ms(),
            counts: queue.counts(),
            critical_path_ms,
            results,
            issues,
        }
    }
}

/// Issues carried by `results`, followed by one issue per result that
/// ended without completing.
pub fn collect_issues(results: &[AssignmentResult]) -> Vec<Issue> {
    let mut issues: Vec<Issue> = results.iter().flat_map(|r| r.issues.clone()).collect();
    for result in results {
        if !result.status.is_terminal() || result.is_success() {
            continue;
        }
        let severity = if result.status == ResultStatus::Cancelled {
            Severity::Info
        } else {
            Severity::Error
        };
        let detail = result
            .error
            .as_ref()
            .map(|e| format!("{}: {}", e.code, e.message))
            .unwrap_or_default();
        issues.push(
            Issue::new(
                severity,
                format!("stage '{}' {}: {detail}", result.stage, result.status),
            )
            .with_source(result.capability)
            .with_subtask(result.subtask_id),
        );
    }
    issues
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ensemble_core::CapabilityId;

    #[test]
    fn test_forward_chain() {
        let session = Session::new(Uuid::new_v4(), CancellationToken::new());
        for next in [
            SessionStatus::Decomposed,
            SessionStatus::Routed,
            SessionStatus::Executing,
            SessionStatus::Synthesizing,
            SessionStatus::Completed,
        ] {
            session.transition(next).unwrap();
        }
        assert!(session.status().is_terminal());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let session = Session::new(Uuid::new_v4(), CancellationToken::new());
        let err = session.transition(SessionStatus::Executing).unwrap_err();
        assert_eq!(err.code(), "SESSION_ERROR");
        assert!(session.transition(SessionStatus::Cancelled).is_err());
        assert_eq!(session.status(), SessionStatus::Created);
    }

    #[test]
    fn test_cancel_and_fail_reachability() {
        use SessionStatus::*;
        assert!(Executing.can_transition_to(Cancelled));
        assert!(Synthesizing.can_transition_to(Cancelled));
        assert!(!Routed.can_transition_to(Cancelled));
        assert!(Created.can_transition_to(Failed));
        assert!(Synthesizing.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Cancelled.can_transition_to(Completed));
    }

    #[test]
    fn test_collect_issues_flags_unsuccessful() {
        let ok = AssignmentResult::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            CapabilityId::Outliner,
            "plan",
        )
        .complete("outline", 0.9);
        let failed = AssignmentResult::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            CapabilityId::SectionWriter,
            "section-1",
        )
        .fail(&EnsembleError::Worker("model refused".into()));
        let issues = collect_issues(&[ok, failed.clone()]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].subtask_id, Some(failed.subtask_id));
        assert!(issues[0].message.contains("section-1"));
        assert!(issues[0].message.contains("WORKER_ERROR"));
        assert_eq!(failed.status, ResultStatus::Failed);
    }

    #[tokio::test]
    async fn test_report_before_routing_is_empty() {
        let session = Session::new(Uuid::new_v4(), CancellationToken::new());
        let report = session.report().await;
        assert_eq!(report.status, SessionStatus::Created);
        assert!(report.results.is_empty());
        assert_eq!(report.counts, StatusCounts::default());
    }
}
