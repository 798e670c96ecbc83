use crate::capability::CapabilityId;
use crate::output::QualityOverrides;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Kind of content a request asks for. Selects the decomposition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Chapter,
    Scene,
    Character,
    Worldbuilding,
    Outline,
    Revision,
    /// Any type the engine has no dedicated strategy for.
    #[serde(other)]
    Generic,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Chapter => write!(f, "chapter"),
            TaskType::Scene => write!(f, "scene"),
            TaskType::Character => write!(f, "character"),
            TaskType::Worldbuilding => write!(f, "worldbuilding"),
            TaskType::Outline => write!(f, "outline"),
            TaskType::Revision => write!(f, "revision"),
            TaskType::Generic => write!(f, "generic"),
        }
    }
}

/// Kind of entity a request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Character,
    Location,
    Item,
    Lore,
    Event,
}

/// A reference to an entity from the surrounding project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    /// Free-form facts about the entity supplied by the caller.
    #[serde(default)]
    pub summary: Option<String>,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
            summary: None,
        }
    }
}

/// Context the request is made in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    #[serde(default)]
    pub entities: Vec<EntityRef>,
    /// Content already written (previous chapter, draft under revision, ...).
    #[serde(default)]
    pub prior_content: Option<String>,
    /// Topics that require a research stage.
    #[serde(default)]
    pub research_topics: Vec<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

/// What the caller asks to be produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRequirements {
    pub instruction: String,
    #[serde(default)]
    pub section_count: Option<u32>,
    #[serde(default)]
    pub target_word_count: Option<u32>,
    #[serde(default)]
    pub include_dialogue: bool,
    #[serde(default)]
    pub style: Option<String>,
}

/// Constraints the produced artifact must honor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConstraints {
    #[serde(default)]
    pub quality: QualityOverrides,
    #[serde(default)]
    pub must_include: Vec<String>,
    #[serde(default)]
    pub must_avoid: Vec<String>,
}

/// A high-level content-generation request. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub target_ids: Vec<String>,
    #[serde(default)]
    pub context: TaskContext,
    pub requirements: TaskRequirements,
    #[serde(default)]
    pub constraints: TaskConstraints,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(task_type: TaskType, instruction: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type,
            target_ids: Vec::new(),
            context: TaskContext::default(),
            requirements: TaskRequirements {
                instruction: instruction.into(),
                ..TaskRequirements::default()
            },
            constraints: TaskConstraints::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_requirements(mut self, requirements: TaskRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_constraints(mut self, constraints: TaskConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.target_ids = targets;
        self
    }
}

/// Type tag of a subtask, following the pipeline shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskKind {
    Planning,
    Research,
    Generation,
    Validation,
    Finalization,
}

/// The slice of the task context a single subtask needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtaskContext {
    #[serde(default)]
    pub entities: Vec<EntityRef>,
    #[serde(default)]
    pub prior_content: Option<String>,
    #[serde(default)]
    pub research_topics: Vec<String>,
    #[serde(default)]
    pub section_index: Option<u32>,
    #[serde(default)]
    pub must_include: Vec<String>,
    #[serde(default)]
    pub must_avoid: Vec<String>,
    #[serde(default)]
    pub style: Option<String>,
}

/// An atomic unit of work derived from a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub kind: SubtaskKind,
    /// Pipeline stage name, unique within one decomposition.
    pub stage: String,
    pub description: String,
    /// Preset capability; `None` lets the router pick the fallback.
    pub capability: Option<CapabilityId>,
    /// 1 (lowest) to 10 (highest).
    pub priority: u8,
    pub dependencies: Vec<Uuid>,
    pub estimated_duration_ms: u64,
    pub context: SubtaskContext,
}

impl Subtask {
    pub fn new(
        parent_id: Uuid,
        kind: SubtaskKind,
        stage: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id,
            kind,
            stage: stage.into(),
            description: description.into(),
            capability: None,
            priority: 5,
            dependencies: Vec::new(),
            estimated_duration_ms: 0,
            context: SubtaskContext::default(),
        }
    }

    pub fn with_capability(mut self, capability: CapabilityId) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Set the priority, clamped to 1..=10.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_context(mut self, context: SubtaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn estimated_duration(&self) -> Duration {
        Duration::from_millis(self.estimated_duration_ms)
    }
}

/// What gets sent to the remote worker for one assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationPayload {
    pub instruction: String,
    pub context: serde_json::Value,
}

/// A subtask bound to a resolved capability, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub subtask_id: Uuid,
    pub stage: String,
    pub capability: CapabilityId,
    pub payload: InvocationPayload,
    pub timeout_ms: u64,
    pub priority: u8,
    /// Subtask ids this assignment waits on.
    pub depends_on: Vec<Uuid>,
}

impl Assignment {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new(TaskType::Chapter, "Write chapter three");
        assert_eq!(task.task_type, TaskType::Chapter);
        assert_eq!(task.requirements.instruction, "Write chapter three");
        assert!(task.context.entities.is_empty());
    }

    #[test]
    fn test_unknown_task_type_is_generic() {
        let json = r#"{"type": "limerick", "requirements": {"instruction": "A poem"}}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.task_type, TaskType::Generic);
        assert_eq!(task.requirements.instruction, "A poem");
    }

    #[test]
    fn test_subtask_priority_clamped() {
        let parent = Uuid::new_v4();
        let high = Subtask::new(parent, SubtaskKind::Planning, "plan", "Plan").with_priority(42);
        let low = Subtask::new(parent, SubtaskKind::Planning, "plan", "Plan").with_priority(0);
        assert_eq!(high.priority, 10);
        assert_eq!(low.priority, 1);
    }

    #[test]
    fn test_subtask_duration() {
        let sub = Subtask::new(Uuid::new_v4(), SubtaskKind::Generation, "draft", "Draft")
            .with_estimated_duration(Duration::from_secs(90));
        assert_eq!(sub.estimated_duration_ms, 90_000);
        assert_eq!(sub.estimated_duration(), Duration::from_secs(90));
    }

    #[test]
    fn test_task_type_display() {
        assert_eq!(TaskType::Worldbuilding.to_string(), "worldbuilding");
        assert_eq!(TaskType::Generic.to_string(), "generic");
    }
}
