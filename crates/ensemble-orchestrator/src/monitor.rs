use ensemble_core::{CapabilityId, ResultStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Invocation counters for one capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMetrics {
    pub invocations: u32,
    pub completed: u32,
    pub failures: u32,
    pub timeouts: u32,
    pub cancellations: u32,
    pub reexecutions: u32,
    pub duration_ms: u64,
}

/// Live state of one capability across all sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityState {
    pub capability: CapabilityId,
    /// Calls currently in flight.
    pub active: u32,
    pub metrics: CapabilityMetrics,
}

/// Tracks activity and metrics for every capability the engine dispatches to.
pub struct CapabilityMonitor {
    states: Arc<RwLock<HashMap<CapabilityId, CapabilityState>>>,
}

impl CapabilityMonitor {
    pub fn new() -> Self {
        let states = CapabilityId::ALL
            .iter()
            .map(|id| {
                (
                    *id,
                    CapabilityState {
                        capability: *id,
                        active: 0,
                        metrics: CapabilityMetrics::default(),
                    },
                )
            })
            .collect();
        Self {
            states: Arc::new(RwLock::new(states)),
        }
    }

    /// Mark a call as dispatched.
    pub async fn start_call(&self, capability: CapabilityId) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&capability) {
            state.active += 1;
            state.metrics.invocations += 1;
        }
    }

    /// Record the terminal status of a call.
    pub async fn finish_call(
        &self,
        capability: CapabilityId,
        status: ResultStatus,
        duration_ms: u64,
    ) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&capability) {
            state.active = state.active.saturating_sub(1);
            state.metrics.duration_ms += duration_ms;
            match status {
                ResultStatus::Completed => state.metrics.completed += 1,
                ResultStatus::Timeout => state.metrics.timeouts += 1,
                ResultStatus::Cancelled => state.metrics.cancellations += 1,
                _ => state.metrics.failures += 1,
            }
        }
    }

    /// Record an engine-level re-execution.
    pub async fn record_reexecution(&self, capability: CapabilityId) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&capability) {
            state.metrics.reexecutions += 1;
        }
    }

    /// Snapshot of every capability, in [`CapabilityId`] order.
    pub async fn snapshot(&self) -> Vec<CapabilityState> {
        let states = self.states.read().await;
        let mut all: Vec<CapabilityState> = states.values().cloned().collect();
        all.sort_by_key(|s| s.capability);
        all
    }

    pub async fn get_state(&self, capability: CapabilityId) -> Option<CapabilityState> {
        let states = self.states.read().await;
        states.get(&capability).cloned()
    }

    /// Total calls currently in flight.
    pub async fn active_calls(&self) -> u32 {
        let states = self.states.read().await;
        states.values().map(|s| s.active).sum()
    }

    /// Aggregate metrics across all capabilities.
    pub async fn aggregate_metrics(&self) -> CapabilityMetrics {
        let states = self.states.read().await;
        let mut total = CapabilityMetrics::default();
        for state in states.values() {
            total.invocations += state.metrics.invocations;
            total.completed += state.metrics.completed;
            total.failures += state.metrics.failures;
            total.timeouts += state.metrics.timeouts;
            total.cancellations += state.metrics.cancellations;
            total.reexecutions += state.metrics.reexecutions;
            total.duration_ms += state.metrics.duration_ms;
        }
        total
    }

    /// Serialize the current state as JSON.
    pub async fn to_json(&self) -> serde_json::Value {
        let states = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "capabilities": states,
            "aggregate": aggregate,
        })
    }
}

impl Default for CapabilityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
