use ensemble_core::{Assignment, AssignmentResult, EnsembleError, ResultStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

struct Entry {
    assignment: Assignment,
    result: AssignmentResult,
    seq: usize,
}

/// Per-status tallies of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timeout: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    /// Everything that ended without completing.
    pub fn unsuccessful(&self) -> usize {
        self.failed + self.timeout + self.cancelled
    }
}

/// Assignments of one session with dependency resolution, keyed by subtask id.
///
/// Holds exactly one result per assignment; results only move forward
/// through the status machine.
pub struct AssignmentQueue {
    entries: HashMap<Uuid, Entry>,
    next_seq: usize,
}

impl AssignmentQueue {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Build a queue holding `assignments`, in the given order.
    pub fn from_assignments(assignments: Vec<Assignment>) -> Self {
        let mut queue = Self::new();
        for assignment in assignments {
            queue.add(assignment);
        }
        queue
    }

    /// Add an assignment with a fresh pending result. Returns its subtask id.
    pub fn add(&mut self, assignment: Assignment) -> Uuid {
        let subtask_id = assignment.subtask_id;
        let result = AssignmentResult::pending(
            assignment.id,
            subtask_id,
            assignment.capability,
            assignment.stage.clone(),
        );
        self.entries.insert(
            subtask_id,
            Entry {
                assignment,
                result,
                seq: self.next_seq,
            },
        );
        self.next_seq += 1;
        subtask_id
    }

    fn dependencies_terminal(&self, assignment: &Assignment) -> bool {
        assignment.depends_on.iter().all(|dep| {
            self.entries
                .get(dep)
                .map_or(true, |e| e.result.status.is_terminal())
        })
    }

    /// Pending assignments whose dependencies are all terminal, highest
    /// priority first, ties in insertion order.
    pub fn all_ready(&self) -> Vec<&Assignment> {
        let mut ready: Vec<&Entry> = self
            .entries
            .values()
            .filter(|e| e.result.status == ResultStatus::Pending)
            .filter(|e| self.dependencies_terminal(&e.assignment))
            .collect();
        ready.sort_by(|a, b| {
            b.assignment
                .priority
                .cmp(&a.assignment.priority)
                .then(a.seq.cmp(&b.seq))
        });
        ready.into_iter().map(|e| &e.assignment).collect()
    }

    /// Mark an assignment as dispatched.
    pub fn mark_running(&mut self, subtask_id: Uuid) -> bool {
        self.entries
            .get_mut(&subtask_id)
            .is_some_and(|e| e.result.transition(ResultStatus::Running))
    }

    /// Store a terminal result. Ignored (returns `false`) when the stored
    /// result is already terminal or the subtask is unknown.
    pub fn record(&mut self, result: AssignmentResult) -> bool {
        match self.entries.get_mut(&result.subtask_id) {
            Some(entry) if !entry.result.status.is_terminal() => {
                entry.result = result;
                true
            }
            _ => false,
        }
    }

    /// Cancel every assignment that has not been dispatched. Returns the
    /// affected subtask ids.
    pub fn cancel_pending(&mut self) -> Vec<Uuid> {
        let mut cancelled = Vec::new();
        for (id, entry) in &mut self.entries {
            if entry.result.status == ResultStatus::Pending {
                let err = EnsembleError::Cancelled("session cancelled before dispatch".to_string());
                entry.result = entry.result.clone().fail(&err);
                cancelled.push(*id);
            }
        }
        cancelled
    }

    pub fn get(&self, subtask_id: Uuid) -> Option<&AssignmentResult> {
        self.entries.get(&subtask_id).map(|e| &e.result)
    }

    /// All results in insertion order.
    pub fn results(&self) -> Vec<&AssignmentResult> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| &e.result).collect()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in self.entries.values() {
            match entry.result.status {
                ResultStatus::Pending => counts.pending += 1,
                ResultStatus::Running => counts.running += 1,
                ResultStatus::Completed => counts.completed += 1,
                ResultStatus::Failed => counts.failed += 1,
                ResultStatus::Timeout => counts.timeout += 1,
                ResultStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn pending_count(&self) -> usize {
        self.counts().pending
    }

    /// Whether every assignment has reached a terminal status.
    pub fn is_done(&self) -> bool {
        self.entries.values().all(|e| e.result.status.is_terminal())
    }
}

impl Default for AssignmentQueue {
    fn default() -> Self {
        Self::new()
    }
}
