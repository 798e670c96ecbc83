use chrono::{DateTime, Utc};
use ensemble_core::{CapabilityId, QualityWarning, ResultStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// A fire-and-forget progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    SessionStarted {
        task_id: Uuid,
        at: DateTime<Utc>,
    },
    Decomposed {
        task_id: Uuid,
        subtasks: usize,
        critical_path_ms: u64,
    },
    Routed {
        task_id: Uuid,
        assignments: usize,
    },
    AssignmentStarted {
        task_id: Uuid,
        assignment_id: Uuid,
        stage: String,
        capability: CapabilityId,
    },
    AssignmentRetrying {
        task_id: Uuid,
        assignment_id: Uuid,
        stage: String,
        reexecution: u32,
        error: String,
    },
    AssignmentCompleted {
        task_id: Uuid,
        assignment_id: Uuid,
        stage: String,
        duration_ms: u64,
    },
    AssignmentFailed {
        task_id: Uuid,
        assignment_id: Uuid,
        stage: String,
        status: ResultStatus,
        code: Option<String>,
    },
    SynthesisStarted {
        task_id: Uuid,
        contributing: usize,
    },
    SynthesisCompleted {
        task_id: Uuid,
        word_count: usize,
    },
    QualityWarning {
        task_id: Uuid,
        warning: QualityWarning,
    },
    SessionCompleted {
        task_id: Uuid,
        duration_ms: u64,
    },
    SessionCancelled {
        task_id: Uuid,
    },
    SessionFailed {
        task_id: Uuid,
        code: String,
        error: String,
    },
    /// A worker call lifecycle event or push update, forwarded verbatim.
    WorkerUpdate {
        task_id: Uuid,
        update: serde_json::Value,
    },
}

impl ProgressEvent {
    pub fn task_id(&self) -> Uuid {
        match self {
            ProgressEvent::SessionStarted { task_id, .. }
            | ProgressEvent::Decomposed { task_id, .. }
            | ProgressEvent::Routed { task_id, .. }
            | ProgressEvent::AssignmentStarted { task_id, .. }
            | ProgressEvent::AssignmentRetrying { task_id, .. }
            | ProgressEvent::AssignmentCompleted { task_id, .. }
            | ProgressEvent::AssignmentFailed { task_id, .. }
            | ProgressEvent::SynthesisStarted { task_id, .. }
            | ProgressEvent::SynthesisCompleted { task_id, .. }
            | ProgressEvent::QualityWarning { task_id, .. }
            | ProgressEvent::SessionCompleted { task_id, .. }
            | ProgressEvent::SessionCancelled { task_id }
            | ProgressEvent::SessionFailed { task_id, .. }
            | ProgressEvent::WorkerUpdate { task_id, .. } => *task_id,
        }
    }

    /// Whether the event concerns a single assignment or worker call.
    pub fn is_fine_grained(&self) -> bool {
        matches!(
            self,
            ProgressEvent::AssignmentStarted { .. }
                | ProgressEvent::AssignmentRetrying { .. }
                | ProgressEvent::AssignmentCompleted { .. }
                | ProgressEvent::AssignmentFailed { .. }
                | ProgressEvent::WorkerUpdate { .. }
        )
    }
}

/// Typed broadcast channel of [`ProgressEvent`]s.
///
/// Publishing never blocks and never fails; events sent while nobody is
/// subscribed are dropped, and slow subscribers observe `Lagged`.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
