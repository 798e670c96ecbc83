//! Wire types for the remote worker service.
//!
//! Top-level fields use camelCase to match the worker's JSON contract.

use ensemble_core::{Assignment, CapabilityId, Contribution, Issue, MemoryUpdate, QualityMetrics};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `POST /v1/spawn` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRequest {
    pub task_id: Uuid,
    pub assignment_id: Uuid,
    pub capability_id: CapabilityId,
    pub instruction: String,
    pub context: serde_json::Value,
    pub timeout_ms: u64,
}

impl From<&Assignment> for SpawnRequest {
    fn from(assignment: &Assignment) -> Self {
        Self {
            task_id: assignment.task_id,
            assignment_id: assignment.id,
            capability_id: assignment.capability,
            instruction: assignment.payload.instruction.clone(),
            context: assignment.payload.context.clone(),
            timeout_ms: assignment.timeout_ms,
        }
    }
}

/// Outcome reported by the worker for a spawn call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnStatus {
    Completed,
    Failed,
}

/// `POST /v1/spawn` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnResponse {
    pub status: SpawnStatus,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub memory_updates: Vec<MemoryUpdate>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Worker-side failure description when `status` is `failed`.
    #[serde(default)]
    pub error: Option<String>,
}

impl SpawnResponse {
    /// A completed response, mostly useful for mocks.
    pub fn completed(output: impl Into<String>, confidence: f64) -> Self {
        Self {
            status: SpawnStatus::Completed,
            output: Some(output.into()),
            confidence,
            issues: Vec::new(),
            memory_updates: Vec::new(),
            metadata: serde_json::Value::Null,
            error: None,
        }
    }
}

/// One successful result handed to the merge capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributingResult {
    pub subtask_id: Uuid,
    pub stage: String,
    pub capability: CapabilityId,
    pub output: String,
    pub confidence: f64,
}

/// `POST /v1/synthesize` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizeRequest {
    pub task_id: Uuid,
    /// Merge capability the worker should run.
    pub capability_id: CapabilityId,
    pub contributing_results: Vec<ContributingResult>,
    pub context: serde_json::Value,
}

/// `POST /v1/synthesize` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizeResponse {
    pub content: String,
    #[serde(default)]
    pub word_count: Option<usize>,
    #[serde(default)]
    pub quality_metrics: QualityMetrics,
    #[serde(default)]
    pub contribution_weights: Vec<Contribution>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub memory_updates: Vec<MemoryUpdate>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// `GET /v1/health` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub version: String,
}

/// `POST /v1/cancel` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub task_id: Uuid,
}

/// `POST /v1/cancel` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAck {
    #[serde(default)]
    pub acknowledged: bool,
}

/// A push notification about a long-running invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushUpdate {
    pub task_id: Uuid,
    pub update: serde_json::Value,
}
