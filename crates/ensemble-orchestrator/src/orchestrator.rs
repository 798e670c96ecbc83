use crate::config::EnsembleConfig;
use crate::decomposer::{critical_path, TaskDecomposer};
use crate::engine::{EngineConfig, ExecutionEngine};
use crate::events::{EventBus, ProgressEvent};
use crate::monitor::CapabilityMonitor;
use crate::quality::QualityGate;
use crate::registry::CapabilityRegistry;
use crate::router::SpecialistRouter;
use crate::session::{ExecutionReport, Session, SessionStatus};
use crate::synthesizer::Synthesizer;
use crate::task_queue::AssignmentQueue;
use chrono::Utc;
use ensemble_core::{Assignment, EnsembleError, EnsembleResult, Subtask, SynthesizedOutput, Task};
use ensemble_worker::{BreakerState, HttpTransport, WorkerClient};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-call knobs for [`Orchestrator::orchestrate`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrateOptions {
    /// Overrides the configured concurrency bound.
    pub max_concurrency: Option<usize>,
    /// Upper bound on every per-assignment timeout.
    pub timeout: Option<Duration>,
    /// `false` forces sequential execution.
    pub parallel: bool,
    /// Publish per-assignment events and worker updates.
    pub stream_progress: bool,
}

impl Default for OrchestrateOptions {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            timeout: None,
            parallel: true,
            stream_progress: false,
        }
    }
}

/// Result of [`Orchestrator::health`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub active_sessions: usize,
    pub worker_healthy: bool,
    pub worker_latency_ms: u64,
    pub worker_version: Option<String>,
    pub breaker_state: BreakerState,
}

/// Decomposition and routing of a task, without execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub task_id: Uuid,
    pub subtasks: Vec<Subtask>,
    pub assignments: Vec<Assignment>,
    pub critical_path_ms: u64,
}

/// Entry point: decompose, route, execute, synthesize and gate one task
/// per session, with any number of sessions running concurrently.
pub struct Orchestrator {
    config: EnsembleConfig,
    registry: Arc<CapabilityRegistry>,
    decomposer: TaskDecomposer,
    router: SpecialistRouter,
    client: Arc<WorkerClient>,
    synthesizer: Synthesizer,
    quality: QualityGate,
    monitor: Arc<CapabilityMonitor>,
    events: EventBus,
    active: Mutex<HashMap<Uuid, Arc<Session>>>,
    archive: Mutex<VecDeque<ExecutionReport>>,
}

impl Orchestrator {
    /// Create an orchestrator over an explicitly constructed worker client.
    pub fn new(config: EnsembleConfig, client: Arc<WorkerClient>) -> EnsembleResult<Self> {
        config.validate()?;
        let registry = Arc::new(CapabilityRegistry::builtin());
        let router = SpecialistRouter::new(registry.clone(), config.router.fallback)
            .with_timeout_buffer(config.engine.timeout_buffer());
        registry.require(config.router.fallback)?;

        Ok(Self {
            decomposer: TaskDecomposer::new(registry.clone()),
            router,
            synthesizer: Synthesizer::new(client.clone()),
            quality: QualityGate::new(config.quality.clone()),
            monitor: Arc::new(CapabilityMonitor::new()),
            events: EventBus::new(config.engine.event_capacity),
            active: Mutex::new(HashMap::new()),
            archive: Mutex::new(VecDeque::new()),
            registry,
            client,
            config,
        })
    }

    /// Create an orchestrator talking HTTP to the configured worker.
    pub fn from_config(config: EnsembleConfig) -> EnsembleResult<Self> {
        let transport = HttpTransport::new(
            config.worker.base_url.clone(),
            config.worker.bearer_token(),
            config.worker.connect_timeout(),
        )?;
        let client = WorkerClient::new(
            Arc::new(transport),
            config.breaker.clone(),
            config.retry.clone(),
        );
        Self::new(config, Arc::new(client))
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn client(&self) -> &Arc<WorkerClient> {
        &self.client
    }

    pub fn monitor(&self) -> &Arc<CapabilityMonitor> {
        &self.monitor
    }

    pub fn active_sessions(&self) -> usize {
        self.active.lock().len()
    }

    /// Receive progress events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Run `task` end to end.
    ///
    /// Assignment failures never surface here; they end up as issues on the
    /// output and as results in the execution report. Only session-level
    /// failures (decomposition, routing, deadlock, synthesis, cancellation)
    /// are returned as errors.
    pub async fn orchestrate(
        &self,
        task: Task,
        options: OrchestrateOptions,
    ) -> EnsembleResult<SynthesizedOutput> {
        let task_id = task.id;
        let session = Arc::new(Session::new(task_id, CancellationToken::new()));
        {
            let mut active = self.active.lock();
            if active.contains_key(&task_id) {
                return Err(EnsembleError::Session(format!(
                    "session {task_id} is already running"
                )));
            }
            active.insert(task_id, session.clone());
        }

        info!(task_id = %task_id, task_type = %task.task_type, "Session started");
        self.events.publish(ProgressEvent::SessionStarted {
            task_id,
            at: Utc::now(),
        });

        let forwarder = options
            .stream_progress
            .then(|| self.forward_worker_updates(task_id));
        let outcome = self.drive(&task, &session, &options).await;
        if let Some(handle) = forwarder {
            handle.abort();
        }

        let report = session.report().await;
        self.archive_report(report);
        self.active.lock().remove(&task_id);

        match &outcome {
            Ok(output) => {
                info!(
                    task_id = %task_id,
                    duration_ms = output.metadata.duration_ms,
                    word_count = output.word_count,
                    issues = output.issues.len(),
                    "Session completed"
                );
                self.events.publish(ProgressEvent::SessionCompleted {
                    task_id,
                    duration_ms: output.metadata.duration_ms,
                });
            }
            Err(EnsembleError::Cancelled(_)) => {
                info!(task_id = %task_id, "Session cancelled");
                self.events.publish(ProgressEvent::SessionCancelled { task_id });
            }
            Err(e) => {
                warn!(task_id = %task_id, code = e.code(), error = %e, "Session failed");
                self.events.publish(ProgressEvent::SessionFailed {
                    task_id,
                    code: e.code().to_string(),
                    error: e.to_string(),
                });
            }
        }
        outcome
    }

    /// Settle the session status from the outcome of the pipeline.
    async fn drive(
        &self,
        task: &Task,
        session: &Session,
        options: &OrchestrateOptions,
    ) -> EnsembleResult<SynthesizedOutput> {
        match self.run_pipeline(task, session, options).await {
            Ok(output) => {
                session.transition(SessionStatus::Completed)?;
                Ok(output)
            }
            Err(err @ EnsembleError::Cancelled(_)) => {
                if session.transition(SessionStatus::Cancelled).is_err() {
                    session.transition(SessionStatus::Failed)?;
                }
                Err(err)
            }
            Err(err) => {
                if !session.status().is_terminal() {
                    session.transition(SessionStatus::Failed)?;
                }
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        task: &Task,
        session: &Session,
        options: &OrchestrateOptions,
    ) -> EnsembleResult<SynthesizedOutput> {
        let task_id = task.id;
        let cancel = session.cancel_token();

        let subtasks = self.decomposer.decompose(task)?;
        let critical_path_ms = critical_path(&subtasks).as_millis() as u64;
        session.set_plan(subtasks.clone(), critical_path_ms);
        session.transition(SessionStatus::Decomposed)?;
        self.events.publish(ProgressEvent::Decomposed {
            task_id,
            subtasks: subtasks.len(),
            critical_path_ms,
        });

        let assignments = self.router.route(task, &subtasks, options.timeout)?;
        let routed = assignments.len();
        *session.queue().write().await = AssignmentQueue::from_assignments(assignments);
        session.transition(SessionStatus::Routed)?;
        self.events.publish(ProgressEvent::Routed {
            task_id,
            assignments: routed,
        });

        session.transition(SessionStatus::Executing)?;
        let engine = ExecutionEngine::new(
            self.client.clone(),
            self.engine_config(options),
            self.events.clone(),
            self.monitor.clone(),
        );
        engine
            .run(session.queue(), cancel, options.stream_progress)
            .await?;

        session.transition(SessionStatus::Synthesizing)?;
        let results = session.report().await.results;
        let contributing = results.iter().filter(|r| r.is_success()).count();
        self.events.publish(ProgressEvent::SynthesisStarted {
            task_id,
            contributing,
        });
        let mut output = self.synthesizer.synthesize(task, &results, cancel).await?;
        if cancel.is_cancelled() {
            return Err(EnsembleError::Cancelled(
                "session cancelled during synthesis".to_string(),
            ));
        }
        self.events.publish(ProgressEvent::SynthesisCompleted {
            task_id,
            word_count: output.word_count,
        });

        output.metadata.duration_ms = session.elapsed_ms();
        output.metadata.critical_path_ms = critical_path_ms;
        output.warnings = self.quality.evaluate(&output, &task.constraints);
        for warning in &output.warnings {
            warn!(task_id = %task_id, check = %warning.check, "{}", warning.message);
            self.events.publish(ProgressEvent::QualityWarning {
                task_id,
                warning: warning.clone(),
            });
        }
        Ok(output)
    }

    fn engine_config(&self, options: &OrchestrateOptions) -> EngineConfig {
        let mut config = self.config.engine.engine_config();
        if let Some(max) = options.max_concurrency {
            config.max_concurrency = max.max(1);
        }
        config.parallel = config.parallel && options.parallel;
        config
    }

    /// Re-publish worker call events and push updates for `task_id` as
    /// [`ProgressEvent::WorkerUpdate`] until aborted.
    fn forward_worker_updates(&self, task_id: Uuid) -> JoinHandle<()> {
        let mut calls = self.client.subscribe_events();
        let mut pushes = self.client.subscribe_updates();
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                let update = tokio::select! {
                    call = calls.recv() => match call {
                        Ok(call) if call.task_id() == task_id => serde_json::to_value(&call).ok(),
                        Ok(_) | Err(RecvError::Lagged(_)) => None,
                        Err(RecvError::Closed) => break,
                    },
                    push = pushes.recv() => match push {
                        Ok(push) if push.task_id == task_id => Some(push.update),
                        Ok(_) | Err(RecvError::Lagged(_)) => None,
                        Err(RecvError::Closed) => break,
                    },
                };
                if let Some(update) = update {
                    events.publish(ProgressEvent::WorkerUpdate { task_id, update });
                }
            }
        })
    }

    fn archive_report(&self, report: ExecutionReport) {
        let capacity = self.config.engine.report_archive;
        if capacity == 0 {
            return;
        }
        let mut archive = self.archive.lock();
        archive.retain(|r| r.task_id != report.task_id);
        archive.push_back(report);
        while archive.len() > capacity {
            archive.pop_front();
        }
    }

    /// Abort a running session: in-flight calls are cancelled, queued
    /// assignments are marked cancelled and the worker is notified.
    pub async fn cancel(&self, task_id: Uuid) -> EnsembleResult<()> {
        let session = self
            .active
            .lock()
            .get(&task_id)
            .cloned()
            .ok_or_else(|| EnsembleError::Session(format!("no active session {task_id}")))?;

        info!(task_id = %task_id, status = %session.status(), "Cancelling session");
        session.cancel_token().cancel();
        if !self.client.cancel_remote(task_id).await {
            debug!(task_id = %task_id, "Worker did not acknowledge cancellation");
        }
        Ok(())
    }

    /// Live report for a running session, otherwise the archived final one.
    pub async fn report(&self, task_id: Uuid) -> EnsembleResult<ExecutionReport> {
        let live = self.active.lock().get(&task_id).cloned();
        if let Some(session) = live {
            return Ok(session.report().await);
        }
        self.archive
            .lock()
            .iter()
            .find(|r| r.task_id == task_id)
            .cloned()
            .ok_or_else(|| EnsembleError::Session(format!("unknown session {task_id}")))
    }

    pub async fn health(&self) -> HealthReport {
        let worker = self.client.health().await;
        HealthReport {
            healthy: worker.healthy && worker.breaker_state != BreakerState::Open,
            active_sessions: self.active_sessions(),
            worker_healthy: worker.healthy,
            worker_latency_ms: worker.latency_ms,
            worker_version: worker.version,
            breaker_state: worker.breaker_state,
        }
    }

    /// Decompose and route `task` without executing it.
    pub fn plan(&self, task: &Task) -> EnsembleResult<Plan> {
        let subtasks = self.decomposer.decompose(task)?;
        let assignments = self.router.route(task, &subtasks, None)?;
        let critical_path_ms = critical_path(&subtasks).as_millis() as u64;
        Ok(Plan {
            task_id: task.id,
            subtasks,
            assignments,
            critical_path_ms,
        })
    }
}
