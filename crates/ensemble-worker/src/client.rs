use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::protocol::{
    CancelRequest, PushUpdate, SpawnRequest, SpawnResponse, SpawnStatus, SynthesizeRequest,
    SynthesizeResponse,
};
use crate::retry::RetryPolicy;
use crate::transport::WorkerTransport;
use async_trait::async_trait;
use ensemble_core::{Assignment, AssignmentResult, EnsembleError, EnsembleResult, ResultStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle notification for one remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// An attempt is about to be sent.
    Started {
        task_id: Uuid,
        assignment_id: Option<Uuid>,
        call: String,
        attempt: u32,
    },
    /// An attempt failed with a transient error and will be retried.
    Retrying {
        task_id: Uuid,
        assignment_id: Option<Uuid>,
        call: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// The call succeeded.
    Succeeded {
        task_id: Uuid,
        assignment_id: Option<Uuid>,
        call: String,
        attempts: u32,
        duration_ms: u64,
    },
    /// The call failed for good.
    Failed {
        task_id: Uuid,
        assignment_id: Option<Uuid>,
        call: String,
        code: String,
        error: String,
    },
}

impl WorkerEvent {
    /// Task the call belongs to.
    pub fn task_id(&self) -> Uuid {
        match self {
            WorkerEvent::Started { task_id, .. }
            | WorkerEvent::Retrying { task_id, .. }
            | WorkerEvent::Succeeded { task_id, .. }
            | WorkerEvent::Failed { task_id, .. } => *task_id,
        }
    }
}

/// Snapshot returned by [`WorkerClient::health`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub healthy: bool,
    pub latency_ms: u64,
    pub version: Option<String>,
    pub breaker_state: BreakerState,
}

/// Anything that can run one assignment to a terminal result.
///
/// Implementations never return an error: every failure is folded into
/// the returned [`AssignmentResult`].
#[async_trait]
pub trait AssignmentExecutor: Send + Sync {
    /// Run `assignment`, aborting when `cancel` fires.
    async fn execute(
        &self,
        assignment: &Assignment,
        cancel: &CancellationToken,
    ) -> AssignmentResult;
}

struct CallLabel {
    task_id: Uuid,
    assignment_id: Option<Uuid>,
    call: String,
}

/// Resilient client for one remote worker endpoint.
///
/// Owns the circuit breaker and retry policy shared by every call to the
/// endpoint, the registry of in-flight cancellation tokens, and the
/// lifecycle and push-update broadcast channels.
pub struct WorkerClient {
    transport: Arc<dyn WorkerTransport>,
    breaker: CircuitBreaker,
    policy: RetryPolicy,
    synthesis_timeout: Duration,
    in_flight: Mutex<HashMap<Uuid, CancellationToken>>,
    events: broadcast::Sender<WorkerEvent>,
    updates: broadcast::Sender<PushUpdate>,
}

impl WorkerClient {
    /// Create a client over `transport`.
    pub fn new(
        transport: Arc<dyn WorkerTransport>,
        breaker: BreakerConfig,
        policy: RetryPolicy,
    ) -> Self {
        let breaker = CircuitBreaker::new(transport.endpoint().to_string(), breaker);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (updates, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            breaker,
            policy,
            synthesis_timeout: Duration::from_secs(180),
            in_flight: Mutex::new(HashMap::new()),
            events,
            updates,
        }
    }

    /// Override the per-attempt timeout of synthesize calls.
    pub fn with_synthesis_timeout(mut self, timeout: Duration) -> Self {
        self.synthesis_timeout = timeout;
        self
    }

    /// Invoke the capability named by `assignment`.
    ///
    /// The call is registered under the assignment id so that
    /// [`cancel`](Self::cancel) can abort it; `parent` cancels it as well.
    ///
    /// `assignment.timeout_ms` bounds each attempt, not the call as a whole:
    /// with transport retries one invocation may run for up to
    /// `(max_retries + 1) * timeout` plus backoff delays. Callers that need a
    /// hard deadline should cancel through `parent`.
    pub async fn invoke(
        &self,
        assignment: &Assignment,
        parent: &CancellationToken,
    ) -> AssignmentResult {
        let token = parent.child_token();
        self.in_flight.lock().insert(assignment.id, token.clone());

        let started = Instant::now();
        let mut result = AssignmentResult::pending(
            assignment.id,
            assignment.subtask_id,
            assignment.capability,
            assignment.stage.clone(),
        );
        result.transition(ResultStatus::Running);

        let label = CallLabel {
            task_id: assignment.task_id,
            assignment_id: Some(assignment.id),
            call: assignment.capability.as_str().to_string(),
        };
        let request = SpawnRequest::from(assignment);
        let transport = &self.transport;
        let req = &request;
        let (outcome, attempts) = self
            .call_with_resilience(&label, &token, assignment.timeout(), move || {
                transport.spawn(req)
            })
            .await;

        self.in_flight.lock().remove(&assignment.id);

        let mut result = match outcome {
            Ok(resp) => Self::convert_response(result, resp),
            Err(err) => result.fail(&err),
        };
        result.metrics.attempts = attempts;
        result.metrics.duration_ms = started.elapsed().as_millis() as u64;
        result
    }

    fn convert_response(pending: AssignmentResult, resp: SpawnResponse) -> AssignmentResult {
        let SpawnResponse {
            status,
            output,
            confidence,
            issues,
            memory_updates,
            error,
            ..
        } = resp;
        let mut result = match status {
            SpawnStatus::Completed => {
                let mut done = pending.complete(output.unwrap_or_default(), confidence);
                done.memory_updates = memory_updates;
                done
            }
            SpawnStatus::Failed => pending.fail(&EnsembleError::Worker(
                error.unwrap_or_else(|| "worker reported failure".to_string()),
            )),
        };
        result.issues = issues;
        result
    }

    /// Abort the in-flight call for `assignment_id`. Returns `false` when no
    /// such call is running.
    pub fn cancel(&self, assignment_id: Uuid) -> bool {
        match self.in_flight.lock().get(&assignment_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of calls currently registered as in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Merge contributing results through the same breaker and retry path
    /// as capability calls.
    pub async fn synthesize(
        &self,
        request: &SynthesizeRequest,
        cancel: &CancellationToken,
    ) -> EnsembleResult<SynthesizeResponse> {
        let label = CallLabel {
            task_id: request.task_id,
            assignment_id: None,
            call: "synthesize".to_string(),
        };
        let transport = &self.transport;
        let (outcome, _) = self
            .call_with_resilience(&label, cancel, self.synthesis_timeout, move || {
                transport.synthesize(request)
            })
            .await;
        outcome
    }

    /// Check worker health. Never fails; an unreachable worker is reported
    /// as unhealthy.
    pub async fn health(&self) -> WorkerHealth {
        let started = Instant::now();
        let outcome = tokio::time::timeout(HEALTH_TIMEOUT, self.transport.health()).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let breaker_state = self.breaker.state();
        match outcome {
            Ok(Ok(resp)) => WorkerHealth {
                healthy: resp.healthy,
                latency_ms,
                version: Some(resp.version).filter(|v| !v.is_empty()),
                breaker_state,
            },
            Ok(Err(e)) => {
                warn!(error = %e, "Worker health check failed");
                WorkerHealth {
                    healthy: false,
                    latency_ms,
                    version: None,
                    breaker_state,
                }
            }
            Err(_) => {
                warn!("Worker health check timed out");
                WorkerHealth {
                    healthy: false,
                    latency_ms,
                    version: None,
                    breaker_state,
                }
            }
        }
    }

    /// Tell the worker to stop work for `task_id`. Best effort: failures
    /// are logged and reported as `false`.
    pub async fn cancel_remote(&self, task_id: Uuid) -> bool {
        match self.transport.cancel(&CancelRequest { task_id }).await {
            Ok(ack) => ack.acknowledged,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Remote cancel failed");
                false
            }
        }
    }

    /// Re-broadcast a push update received from the worker.
    pub fn deliver_update(&self, update: PushUpdate) {
        let _ = self.updates.send(update);
    }

    /// Receive push updates delivered after this call.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<PushUpdate> {
        self.updates.subscribe()
    }

    /// Receive call lifecycle events emitted after this call.
    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Current breaker state.
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// The breaker guarding this endpoint.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn emit(&self, event: WorkerEvent) {
        let _ = self.events.send(event);
    }

    /// Run `op` under the breaker, the per-attempt timeout, cancellation
    /// and the retry policy. Returns the outcome and the number of attempts
    /// actually sent.
    async fn call_with_resilience<T, F, Fut>(
        &self,
        label: &CallLabel,
        token: &CancellationToken,
        timeout: Duration,
        op: F,
    ) -> (EnsembleResult<T>, u32)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = EnsembleResult<T>>,
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        let outcome = loop {
            if token.is_cancelled() {
                break Err(EnsembleError::Cancelled(label.call.clone()));
            }
            let permit = match self.breaker.try_acquire() {
                Ok(permit) => permit,
                Err(e) => break Err(e),
            };
            attempt += 1;
            self.emit(WorkerEvent::Started {
                task_id: label.task_id,
                assignment_id: label.assignment_id,
                call: label.call.clone(),
                attempt,
            });

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    self.breaker.release_trial(permit);
                    break Err(EnsembleError::Cancelled(label.call.clone()));
                }
                res = tokio::time::timeout(timeout, op()) => match res {
                    Ok(r) => r,
                    Err(_) => Err(EnsembleError::Timeout(format!(
                        "{} exceeded {}ms",
                        label.call,
                        timeout.as_millis()
                    ))),
                },
            };

            let err = match result {
                Ok(value) => {
                    self.breaker.record_success(permit);
                    break Ok(value);
                }
                Err(err) => err,
            };

            if err.is_transport() {
                self.breaker.record_failure(permit);
            } else {
                self.breaker.record_success(permit);
            }

            if !err.is_retryable() || attempt > self.policy.max_retries || self.breaker.is_open() {
                break Err(err);
            }

            let delay = self.policy.delay_for(attempt - 1);
            warn!(
                call = %label.call,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Worker call failed, retrying"
            );
            self.emit(WorkerEvent::Retrying {
                task_id: label.task_id,
                assignment_id: label.assignment_id,
                call: label.call.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                error: err.to_string(),
            });

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    break Err(EnsembleError::Cancelled(label.call.clone()));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        };

        match &outcome {
            Ok(_) => {
                info!(call = %label.call, attempts = attempt, "Worker call succeeded");
                self.emit(WorkerEvent::Succeeded {
                    task_id: label.task_id,
                    assignment_id: label.assignment_id,
                    call: label.call.clone(),
                    attempts: attempt,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
            Err(err) => {
                warn!(call = %label.call, code = err.code(), error = %err, "Worker call failed");
                self.emit(WorkerEvent::Failed {
                    task_id: label.task_id,
                    assignment_id: label.assignment_id,
                    call: label.call.clone(),
                    code: err.code().to_string(),
                    error: err.to_string(),
                });
            }
        }
        (outcome, attempt)
    }
}

#[async_trait]
impl AssignmentExecutor for WorkerClient {
    async fn execute(
        &self,
        assignment: &Assignment,
        cancel: &CancellationToken,
    ) -> AssignmentResult {
        self.invoke(assignment, cancel).await
    }
}
