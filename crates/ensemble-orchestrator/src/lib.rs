//! Multi-worker orchestration engine for content generation.
//!
//! Decomposes a request into a dependency graph of subtasks, routes each
//! subtask to a specialist capability, executes the graph concurrently
//! against a remote worker service, merges the results and checks the
//! merged output against quality thresholds.
//!
//! # Main types
//!
//! - [`Orchestrator`]: facade running sessions end to end (`orchestrate`,
//!   `cancel`, `report`, `health`, `plan`).
//! - [`TaskDecomposer`]: Builds the subtask graph for each task type.
//! - [`SpecialistRouter`]: Binds subtasks to capabilities and computes timeouts.
//! - [`ExecutionEngine`]: Bounded, dependency-aware scheduler.
//! - [`Synthesizer`] / [`QualityGate`]: Merge and post-merge checks.
//! - [`EventBus`]: Broadcast channel of [`ProgressEvent`]s.
//! - [`EnsembleConfig`]: TOML configuration.

/// TOML configuration.
pub mod config;
/// Task decomposition strategies and graph checks.
pub mod decomposer;
/// Dependency-aware execution engine.
pub mod engine;
/// Progress events and their broadcast bus.
pub mod events;
/// Per-capability activity and metrics.
pub mod monitor;
/// The orchestrator facade.
pub mod orchestrator;
/// Post-synthesis quality checks.
pub mod quality;
/// Built-in capability catalog.
pub mod registry;
/// Subtask to capability routing.
pub mod router;
/// Session state machine and execution reports.
pub mod session;
/// Merging of assignment results.
pub mod synthesizer;
/// Per-session assignment queue.
pub mod task_queue;

pub use config::{EngineSettings, EnsembleConfig, RouterSettings, WorkerSettings};
pub use decomposer::{critical_path, validate_graph, TaskDecomposer};
pub use engine::{DependencyFailurePolicy, EngineConfig, ExecutionEngine, DEPENDENCY_FAILED};
pub use events::{EventBus, ProgressEvent};
pub use monitor::{CapabilityMetrics, CapabilityMonitor, CapabilityState};
pub use orchestrator::{HealthReport, OrchestrateOptions, Orchestrator, Plan};
pub use quality::QualityGate;
pub use registry::{builtin_definitions, CapabilityRegistry};
pub use router::{SpecialistRouter, DEFAULT_TIMEOUT_BUFFER};
pub use session::{ExecutionReport, Session, SessionStatus};
pub use synthesizer::Synthesizer;
pub use task_queue::{AssignmentQueue, StatusCounts};
