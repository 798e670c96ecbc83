use crate::events::{EventBus, ProgressEvent};
use crate::monitor::CapabilityMonitor;
use crate::task_queue::AssignmentQueue;
use ensemble_core::{
    Assignment, AssignmentResult, EnsembleError, EnsembleResult, ErrorInfo, Issue, ResultStatus,
};
use ensemble_worker::AssignmentExecutor;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Error code recorded on assignments skipped because an upstream failed.
pub const DEPENDENCY_FAILED: &str = "DEPENDENCY_FAILED";

/// Error codes never re-executed at the engine level.
const NON_REEXECUTABLE: &[&str] = &[
    "VALIDATION_ERROR",
    "CIRCUIT_OPEN",
    "CANCELLED",
    DEPENDENCY_FAILED,
];

/// What happens to dependents of an assignment that did not complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyFailurePolicy {
    /// Run dependents anyway with whatever upstream context exists.
    #[default]
    Proceed,
    /// Fail dependents with `DEPENDENCY_FAILED`, transitively.
    Block,
}

/// Scheduling knobs for one engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_concurrency: usize,
    pub parallel: bool,
    pub dependency_policy: DependencyFailurePolicy,
    pub assignment_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            parallel: true,
            dependency_policy: DependencyFailurePolicy::Proceed,
            assignment_retries: 1,
        }
    }
}

impl EngineConfig {
    /// Upper bound on simultaneously dispatched assignments.
    pub fn in_flight_limit(&self) -> usize {
        if self.parallel {
            self.max_concurrency.max(1)
        } else {
            1
        }
    }
}

/// An assignment prepared for dispatch, with upstream context injected.
struct Dispatch {
    assignment: Assignment,
    degraded: Vec<Issue>,
}

/// Drives an [`AssignmentQueue`] to completion over an [`AssignmentExecutor`].
///
/// The in-flight set is a `FuturesUnordered` that never holds more than
/// [`EngineConfig::in_flight_limit`] futures. An assignment is dispatched
/// only once every dependency has a terminal result.
pub struct ExecutionEngine {
    executor: Arc<dyn AssignmentExecutor>,
    config: EngineConfig,
    events: EventBus,
    monitor: Arc<CapabilityMonitor>,
}

impl ExecutionEngine {
    pub fn new(
        executor: Arc<dyn AssignmentExecutor>,
        config: EngineConfig,
        events: EventBus,
        monitor: Arc<CapabilityMonitor>,
    ) -> Self {
        Self {
            executor,
            config,
            events,
            monitor,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every assignment in `queue` to a terminal result.
    ///
    /// Returns `Cancelled` when `cancel` fires: in-flight calls are drained
    /// (they observe the same token) and undispatched ones are marked
    /// cancelled. Returns `Deadlock` if work remains but nothing can run.
    pub async fn run(
        &self,
        queue: &Arc<RwLock<AssignmentQueue>>,
        cancel: &CancellationToken,
        stream_progress: bool,
    ) -> EnsembleResult<()> {
        let limit = self.config.in_flight_limit();
        let mut in_flight = FuturesUnordered::new();

        info!(
            limit,
            policy = ?self.config.dependency_policy,
            "Execution engine started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let (ready, blocked) = {
                let mut q = queue.write().await;
                self.take_ready(&mut q, limit.saturating_sub(in_flight.len()))
            };
            for dispatch in ready {
                in_flight.push(self.dispatch(dispatch, cancel.clone(), stream_progress));
            }
            if blocked > 0 {
                continue;
            }

            if in_flight.is_empty() {
                let q = queue.read().await;
                if q.is_done() {
                    info!(counts = ?q.counts(), "Execution engine finished");
                    return Ok(());
                }
                warn!(pending = q.pending_count(), "Nothing ready and nothing in flight");
                return Err(EnsembleError::Deadlock(format!(
                    "{} assignments pending with unsatisfiable dependencies",
                    q.pending_count()
                )));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(result) = in_flight.next() => {
                    queue.write().await.record(result);
                }
            }
        }

        while let Some(result) = in_flight.next().await {
            queue.write().await.record(result);
        }
        let cancelled = queue.write().await.cancel_pending();
        info!(undispatched = cancelled.len(), "Execution cancelled");
        Err(EnsembleError::Cancelled(
            "session cancelled during execution".to_string(),
        ))
    }

    /// Pull up to `capacity` ready assignments out of the queue, marking
    /// them running. Under [`DependencyFailurePolicy::Block`], ready
    /// assignments with an unsuccessful dependency are failed in place;
    /// their count is returned alongside.
    fn take_ready(&self, queue: &mut AssignmentQueue, capacity: usize) -> (Vec<Dispatch>, usize) {
        let ready: Vec<Assignment> = queue.all_ready().into_iter().cloned().collect();
        let mut dispatched = Vec::new();
        let mut blocked = 0;

        for assignment in ready {
            if self.config.dependency_policy == DependencyFailurePolicy::Block {
                if let Some(failed) = first_unsuccessful_dependency(queue, &assignment) {
                    let mut result = AssignmentResult::pending(
                        assignment.id,
                        assignment.subtask_id,
                        assignment.capability,
                        assignment.stage.clone(),
                    );
                    result.transition(ResultStatus::Failed);
                    result.error = Some(ErrorInfo {
                        code: DEPENDENCY_FAILED.to_string(),
                        message: format!("upstream stage '{failed}' did not complete"),
                    });
                    debug!(stage = %assignment.stage, upstream = %failed, "Assignment blocked");
                    queue.record(result);
                    blocked += 1;
                    continue;
                }
            }
            if dispatched.len() >= capacity {
                continue;
            }
            let prepared = prepare(queue, assignment);
            queue.mark_running(prepared.assignment.subtask_id);
            dispatched.push(prepared);
        }
        (dispatched, blocked)
    }

    /// Execute one assignment, re-executing failed attempts up to the
    /// configured budget.
    async fn dispatch(
        &self,
        dispatch: Dispatch,
        cancel: CancellationToken,
        stream_progress: bool,
    ) -> AssignmentResult {
        let Dispatch {
            assignment,
            degraded,
        } = dispatch;
        let capability = assignment.capability;
        let started = Instant::now();

        self.monitor.start_call(capability).await;
        if stream_progress {
            self.events.publish(ProgressEvent::AssignmentStarted {
                task_id: assignment.task_id,
                assignment_id: assignment.id,
                stage: assignment.stage.clone(),
                capability,
            });
        }
        debug!(
            assignment_id = %assignment.id,
            stage = %assignment.stage,
            capability = %capability,
            "Assignment dispatched"
        );

        let mut reexecutions = 0;
        let mut attempts = 0;
        let mut result = loop {
            let result = self.executor.execute(&assignment, &cancel).await;
            attempts += result.metrics.attempts.max(1);
            if result.is_success()
                || reexecutions >= self.config.assignment_retries
                || !should_reexecute(&result)
                || cancel.is_cancelled()
            {
                break result;
            }

            reexecutions += 1;
            let error = result
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            warn!(
                assignment_id = %assignment.id,
                stage = %assignment.stage,
                reexecution = reexecutions,
                error = %error,
                "Re-executing failed assignment"
            );
            self.monitor.record_reexecution(capability).await;
            if stream_progress {
                self.events.publish(ProgressEvent::AssignmentRetrying {
                    task_id: assignment.task_id,
                    assignment_id: assignment.id,
                    stage: assignment.stage.clone(),
                    reexecution: reexecutions,
                    error,
                });
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        result.metrics.attempts = attempts;
        result.metrics.reexecutions = reexecutions;
        result.metrics.duration_ms = duration_ms;
        if !degraded.is_empty() {
            let mut issues = degraded;
            issues.append(&mut result.issues);
            result.issues = issues;
        }

        self.monitor
            .finish_call(capability, result.status, duration_ms)
            .await;
        if stream_progress {
            let event = if result.is_success() {
                ProgressEvent::AssignmentCompleted {
                    task_id: assignment.task_id,
                    assignment_id: assignment.id,
                    stage: assignment.stage.clone(),
                    duration_ms,
                }
            } else {
                ProgressEvent::AssignmentFailed {
                    task_id: assignment.task_id,
                    assignment_id: assignment.id,
                    stage: assignment.stage.clone(),
                    status: result.status,
                    code: result.error_code().map(str::to_string),
                }
            };
            self.events.publish(event);
        }
        result
    }
}

fn should_reexecute(result: &AssignmentResult) -> bool {
    matches!(result.status, ResultStatus::Failed | ResultStatus::Timeout)
        && !result
            .error_code()
            .is_some_and(|code| NON_REEXECUTABLE.contains(&code))
}

fn first_unsuccessful_dependency(
    queue: &AssignmentQueue,
    assignment: &Assignment,
) -> Option<String> {
    assignment.depends_on.iter().find_map(|dep| {
        queue
            .get(*dep)
            .filter(|r| r.status.is_terminal() && !r.is_success())
            .map(|r| r.stage.clone())
    })
}

/// Inject completed upstream outputs under `upstream` and list unsuccessful
/// ones under `missing_upstream`, flagging each gap as an issue.
fn prepare(queue: &AssignmentQueue, mut assignment: Assignment) -> Dispatch {
    let mut upstream = Vec::new();
    let mut missing = Vec::new();
    let mut degraded = Vec::new();

    for dep in &assignment.depends_on {
        let Some(result) = queue.get(*dep) else {
            continue;
        };
        if result.is_success() {
            upstream.push(serde_json::json!({
                "stage": result.stage,
                "subtask_id": result.subtask_id,
                "capability": result.capability,
                "output": result.output,
            }));
        } else {
            missing.push(serde_json::json!({
                "stage": result.stage,
                "subtask_id": result.subtask_id,
                "status": result.status,
                "code": result.error_code(),
            }));
            degraded.push(
                Issue::warning(format!(
                    "stage '{}' degraded: upstream stage '{}' (subtask {}) ended {}",
                    assignment.stage, result.stage, result.subtask_id, result.status
                ))
                .with_source(result.capability)
                .with_subtask(assignment.subtask_id),
            );
        }
    }

    if !assignment.depends_on.is_empty() {
        if !assignment.payload.context.is_object() {
            assignment.payload.context = serde_json::json!({});
        }
        if let Some(map) = assignment.payload.context.as_object_mut() {
            map.insert("upstream".into(), serde_json::Value::Array(upstream));
            if !missing.is_empty() {
                map.insert("missing_upstream".into(), serde_json::Value::Array(missing));
            }
        }
    }

    Dispatch {
        assignment,
        degraded,
    }
}
