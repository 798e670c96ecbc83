use crate::registry::CapabilityRegistry;
use ensemble_core::{
    Assignment, CapabilityId, EnsembleError, EnsembleResult, InvocationPayload, Subtask, Task,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Extra time granted on top of a subtask's estimated duration.
pub const DEFAULT_TIMEOUT_BUFFER: Duration = Duration::from_secs(30);

/// Binds subtasks to capabilities and builds dispatchable assignments.
pub struct SpecialistRouter {
    registry: Arc<CapabilityRegistry>,
    fallback: CapabilityId,
    timeout_buffer: Duration,
}

impl SpecialistRouter {
    pub fn new(registry: Arc<CapabilityRegistry>, fallback: CapabilityId) -> Self {
        Self {
            registry,
            fallback,
            timeout_buffer: DEFAULT_TIMEOUT_BUFFER,
        }
    }

    pub fn with_timeout_buffer(mut self, buffer: Duration) -> Self {
        self.timeout_buffer = buffer;
        self
    }

    /// The capability `subtask` will run on: its preset capability when the
    /// registry knows it, otherwise the fallback.
    pub fn resolve(&self, subtask: &Subtask) -> EnsembleResult<CapabilityId> {
        if let Some(preset) = subtask.capability {
            if self.registry.contains(preset) {
                return Ok(preset);
            }
        }
        if self.registry.contains(self.fallback) {
            return Ok(self.fallback);
        }
        Err(EnsembleError::Configuration(format!(
            "no capability for stage '{}' and fallback '{}' is not registered",
            subtask.stage, self.fallback
        )))
    }

    /// Route every subtask. Assignments come back sorted by descending
    /// priority; ties keep decomposition order. `timeout_cap` bounds each
    /// computed per-assignment timeout.
    pub fn route(
        &self,
        task: &Task,
        subtasks: &[Subtask],
        timeout_cap: Option<Duration>,
    ) -> EnsembleResult<Vec<Assignment>> {
        if subtasks.is_empty() {
            return Err(EnsembleError::Configuration(
                "no subtasks to route".to_string(),
            ));
        }

        let mut assignments = subtasks
            .iter()
            .map(|subtask| self.assign(task, subtask, timeout_cap))
            .collect::<EnsembleResult<Vec<_>>>()?;
        assignments.sort_by(|a, b| b.priority.cmp(&a.priority));

        debug!(task_id = %task.id, assignments = assignments.len(), "Subtasks routed");
        Ok(assignments)
    }

    fn assign(
        &self,
        task: &Task,
        subtask: &Subtask,
        timeout_cap: Option<Duration>,
    ) -> EnsembleResult<Assignment> {
        let capability = self.resolve(subtask)?;

        let mut timeout = subtask.estimated_duration() + self.timeout_buffer;
        if let Some(cap) = timeout_cap {
            timeout = timeout.min(cap);
        }

        let mut context = serde_json::to_value(&subtask.context)?;
        if let Some(map) = context.as_object_mut() {
            map.insert("task_type".into(), serde_json::json!(task.task_type));
            map.insert("stage".into(), serde_json::json!(subtask.stage));
            map.insert("kind".into(), serde_json::json!(subtask.kind));
            map.insert("target_ids".into(), serde_json::json!(task.target_ids));
            if let Some(words) = task.requirements.target_word_count {
                map.insert("target_word_count".into(), serde_json::json!(words));
            }
            if !task.context.notes.is_null() {
                map.insert("notes".into(), task.context.notes.clone());
            }
        }

        Ok(Assignment {
            id: Uuid::new_v4(),
            task_id: task.id,
            subtask_id: subtask.id,
            stage: subtask.stage.clone(),
            capability,
            payload: InvocationPayload {
                instruction: subtask.description.clone(),
                context,
            },
            timeout_ms: timeout.as_millis() as u64,
            priority: subtask.priority,
            depends_on: subtask.dependencies.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ensemble_core::{CapabilityCategory, CapabilityDefinition, DurationBucket, SubtaskKind};

    fn subtask(task: &Task, stage: &str, cap: Option<CapabilityId>, priority: u8) -> Subtask {
        let mut s = Subtask::new(task.id, SubtaskKind::Generation, stage, format!("do {stage}"))
            .with_priority(priority)
            .with_estimated_duration(Duration::from_secs(90));
        s.capability = cap;
        s
    }

    #[test]
    fn test_preset_and_fallback_resolution() {
        let task = Task::new(ensemble_core::TaskType::Generic, "x");
        let router = SpecialistRouter::new(
            Arc::new(CapabilityRegistry::builtin()),
            CapabilityId::Generalist,
        );
        let preset = subtask(&task, "a", Some(CapabilityId::Editor), 5);
        let none = subtask(&task, "b", None, 5);
        assert_eq!(router.resolve(&preset).unwrap(), CapabilityId::Editor);
        assert_eq!(router.resolve(&none).unwrap(), CapabilityId::Generalist);
    }

    #[test]
    fn test_unknown_preset_falls_back() {
        let task = Task::new(ensemble_core::TaskType::Generic, "x");
        let registry = CapabilityRegistry::from_definitions(vec![CapabilityDefinition::new(
            CapabilityId::Generalist,
            CapabilityCategory::Generation,
            "fallback",
            DurationBucket::Medium,
        )]);
        let router = SpecialistRouter::new(Arc::new(registry), CapabilityId::Generalist);
        let s = subtask(&task, "a", Some(CapabilityId::Editor), 5);
        assert_eq!(router.resolve(&s).unwrap(), CapabilityId::Generalist);
    }

    #[test]
    fn test_missing_fallback_is_configuration_error() {
        let task = Task::new(ensemble_core::TaskType::Generic, "x");
        let router = SpecialistRouter::new(
            Arc::new(CapabilityRegistry::from_definitions(vec![])),
            CapabilityId::Generalist,
        );
        let err = router
            .route(&task, &[subtask(&task, "a", None, 5)], None)
            .unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
        let err = router.route(&task, &[], None).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_timeout_and_priority_order() {
        let task = Task::new(ensemble_core::TaskType::Generic, "x");
        let router = SpecialistRouter::new(
            Arc::new(CapabilityRegistry::builtin()),
            CapabilityId::Generalist,
        );
        let subtasks = vec![
            subtask(&task, "low", None, 2),
            subtask(&task, "high", None, 9),
            subtask(&task, "mid-a", None, 5),
            subtask(&task, "mid-b", None, 5),
        ];
        let assignments = router.route(&task, &subtasks, None).unwrap();
        let order: Vec<&str> = assignments.iter().map(|a| a.stage.as_str()).collect();
        assert_eq!(order, vec!["high", "mid-a", "mid-b", "low"]);
        assert_eq!(assignments[0].timeout_ms, 120_000);
        assert_eq!(assignments[0].payload.instruction, "do high");
        assert_eq!(assignments[0].payload.context["stage"], "high");

        let capped = router
            .route(&task, &subtasks, Some(Duration::from_secs(10)))
            .unwrap();
        assert!(capped.iter().all(|a| a.timeout_ms == 10_000));
    }
}
