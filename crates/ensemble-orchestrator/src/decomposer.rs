use crate::registry::CapabilityRegistry;
use ensemble_core::{
    CapabilityId, EnsembleError, EnsembleResult, EntityKind, Subtask, SubtaskContext, SubtaskKind,
    Task, TaskType,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Default number of sections for a chapter.
pub const DEFAULT_SECTION_COUNT: u32 = 3;
/// Upper bound on chapter sections.
pub const MAX_SECTION_COUNT: u32 = 12;

/// Which entities a stage gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Every referenced entity.
    Narrative,
    /// Character entities only.
    Characters,
    /// Locations and lore.
    World,
}

/// Turns a [`Task`] into a validated dependency graph of [`Subtask`]s.
///
/// Decomposition is a pure function of the task and the registry: the task
/// type selects a strategy, and each strategy wires every stage to the
/// specific upstream stages whose output it consumes.
pub struct TaskDecomposer {
    registry: Arc<CapabilityRegistry>,
}

impl TaskDecomposer {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    /// Decompose `task`. The result is non-empty, acyclic and closed over
    /// its own dependency ids.
    pub fn decompose(&self, task: &Task) -> EnsembleResult<Vec<Subtask>> {
        let instruction = task.requirements.instruction.trim();
        if instruction.is_empty() {
            return Err(EnsembleError::Decomposition(
                "task instruction is empty".to_string(),
            ));
        }

        let mut pipeline = Pipeline::new(task, &self.registry);
        match task.task_type {
            TaskType::Chapter => chapter(&mut pipeline),
            TaskType::Scene => scene(&mut pipeline),
            TaskType::Character => character(&mut pipeline),
            TaskType::Worldbuilding => worldbuilding(&mut pipeline),
            TaskType::Outline => outline(&mut pipeline),
            TaskType::Revision => revision(&mut pipeline)?,
            TaskType::Generic => generic(&mut pipeline),
        }
        let subtasks = pipeline.finish();

        validate_graph(&subtasks)?;
        debug!(
            task_id = %task.id,
            task_type = %task.task_type,
            subtasks = subtasks.len(),
            "Task decomposed"
        );
        Ok(subtasks)
    }
}

/// Accumulates stages for one decomposition.
struct Pipeline<'a> {
    task: &'a Task,
    registry: &'a CapabilityRegistry,
    subtasks: Vec<Subtask>,
    stages: HashMap<String, Uuid>,
}

impl<'a> Pipeline<'a> {
    fn new(task: &'a Task, registry: &'a CapabilityRegistry) -> Self {
        Self {
            task,
            registry,
            subtasks: Vec::new(),
            stages: HashMap::new(),
        }
    }

    fn instruction(&self) -> &str {
        self.task.requirements.instruction.trim()
    }

    fn has_research(&self) -> bool {
        !self.task.context.research_topics.is_empty()
    }

    /// Add a stage depending on the named stages. Names of stages that were
    /// not added (optional stages) are skipped.
    fn add(
        &mut self,
        stage: &str,
        kind: SubtaskKind,
        capability: Option<CapabilityId>,
        description: String,
        after: &[&str],
    ) -> &mut Subtask {
        let duration = self
            .registry
            .default_duration(capability.unwrap_or(CapabilityId::Generalist));
        let deps: Vec<Uuid> = after
            .iter()
            .filter_map(|name| self.stages.get(*name).copied())
            .collect();

        let mut subtask = Subtask::new(self.task.id, kind, stage, description)
            .with_priority(default_priority(kind))
            .with_dependencies(deps)
            .with_estimated_duration(duration)
            .with_context(self.scoped(kind, Scope::Narrative));
        if let Some(cap) = capability {
            subtask = subtask.with_capability(cap);
        }

        self.stages.insert(stage.to_string(), subtask.id);
        self.subtasks.push(subtask);
        let last = self.subtasks.len() - 1;
        &mut self.subtasks[last]
    }

    /// Stage names for the optional research stage, if present.
    fn plan_and_research(&self) -> Vec<&'static str> {
        if self.has_research() {
            vec!["plan", "research"]
        } else {
            vec!["plan"]
        }
    }

    fn add_plan(&mut self, what: &str) {
        let description = format!("Plan the {what}: {}", self.instruction());
        self.add(
            "plan",
            SubtaskKind::Planning,
            Some(CapabilityId::Outliner),
            description,
            &[],
        );
    }

    fn add_research(&mut self) {
        if !self.has_research() {
            return;
        }
        let description = format!(
            "Research {} for: {}",
            self.task.context.research_topics.join(", "),
            self.instruction()
        );
        self.add(
            "research",
            SubtaskKind::Research,
            Some(CapabilityId::Researcher),
            description,
            &[],
        );
    }

    fn scoped(&self, kind: SubtaskKind, scope: Scope) -> SubtaskContext {
        let ctx = &self.task.context;
        let entities = ctx
            .entities
            .iter()
            .filter(|e| match scope {
                Scope::Narrative => true,
                Scope::Characters => e.kind == EntityKind::Character,
                Scope::World => matches!(e.kind, EntityKind::Location | EntityKind::Lore),
            })
            .cloned()
            .collect();

        let reads_prior = matches!(kind, SubtaskKind::Planning | SubtaskKind::Validation)
            || self.task.task_type == TaskType::Revision;
        let generates = kind == SubtaskKind::Generation;

        SubtaskContext {
            entities,
            prior_content: if reads_prior {
                ctx.prior_content.clone()
            } else {
                None
            },
            research_topics: if kind == SubtaskKind::Research {
                ctx.research_topics.clone()
            } else {
                Vec::new()
            },
            section_index: None,
            must_include: if generates {
                self.task.constraints.must_include.clone()
            } else {
                Vec::new()
            },
            must_avoid: if generates {
                self.task.constraints.must_avoid.clone()
            } else {
                Vec::new()
            },
            style: if kind == SubtaskKind::Research {
                None
            } else {
                self.task.requirements.style.clone()
            },
        }
    }

    fn rescope(&mut self, stage: &str, scope: Scope) {
        let Some(id) = self.stages.get(stage).copied() else {
            return;
        };
        if let Some(pos) = self.subtasks.iter().position(|s| s.id == id) {
            let kind = self.subtasks[pos].kind;
            let context = self.scoped(kind, scope);
            self.subtasks[pos].context = context;
        }
    }

    fn finish(self) -> Vec<Subtask> {
        self.subtasks
    }
}

fn default_priority(kind: SubtaskKind) -> u8 {
    match kind {
        SubtaskKind::Planning => 10,
        SubtaskKind::Research => 9,
        SubtaskKind::Generation => 7,
        SubtaskKind::Validation => 5,
        SubtaskKind::Finalization => 3,
    }
}

fn chapter(p: &mut Pipeline<'_>) {
    p.add_plan("chapter");
    p.add_research();

    let sections = p
        .task
        .requirements
        .section_count
        .unwrap_or(DEFAULT_SECTION_COUNT)
        .clamp(1, MAX_SECTION_COUNT);
    let upstream = p.plan_and_research();
    let mut written: Vec<String> = Vec::new();
    for index in 1..=sections {
        let stage = format!("section-{index}");
        let description = format!(
            "Write section {index} of {sections} for: {}",
            p.instruction()
        );
        p.add(
            &stage,
            SubtaskKind::Generation,
            Some(CapabilityId::SectionWriter),
            description,
            &upstream,
        )
        .context
        .section_index = Some(index);
        written.push(stage);
    }

    if p.task.requirements.include_dialogue {
        let description = format!("Write the chapter's dialogue for: {}", p.instruction());
        p.add(
            "dialogue",
            SubtaskKind::Generation,
            Some(CapabilityId::DialogueWriter),
            description,
            &["plan"],
        )
        .priority = 6;
    }

    let mut checked: Vec<&str> = written.iter().map(String::as_str).collect();
    checked.push("dialogue");
    let description = format!("Check continuity across all sections of: {}", p.instruction());
    p.add(
        "continuity",
        SubtaskKind::Validation,
        Some(CapabilityId::ContinuityChecker),
        description,
        &checked,
    );

    let mut styled: Vec<&str> = written.iter().map(String::as_str).collect();
    styled.push("continuity");
    let description = format!("Harmonize tone and voice for: {}", p.instruction());
    p.add(
        "style",
        SubtaskKind::Validation,
        Some(CapabilityId::StyleEditor),
        description,
        &styled,
    )
    .priority = 4;

    let description = format!("Assemble and polish the chapter: {}", p.instruction());
    p.add(
        "finalize",
        SubtaskKind::Finalization,
        Some(CapabilityId::Editor),
        description,
        &["continuity", "style"],
    );
}

fn scene(p: &mut Pipeline<'_>) {
    p.add_plan("scene");
    p.add_research();
    let upstream = p.plan_and_research();

    let description = format!("Draft the scene: {}", p.instruction());
    p.add(
        "draft",
        SubtaskKind::Generation,
        Some(CapabilityId::SectionWriter),
        description,
        &upstream,
    );
    let description = format!("Write the scene's dialogue: {}", p.instruction());
    p.add(
        "dialogue",
        SubtaskKind::Generation,
        Some(CapabilityId::DialogueWriter),
        description,
        &["plan"],
    )
    .priority = 6;
    let description = format!("Check the scene for continuity: {}", p.instruction());
    p.add(
        "continuity",
        SubtaskKind::Validation,
        Some(CapabilityId::ContinuityChecker),
        description,
        &["draft", "dialogue"],
    );
    let description = format!("Finalize the scene: {}", p.instruction());
    p.add(
        "finalize",
        SubtaskKind::Finalization,
        Some(CapabilityId::Editor),
        description,
        &["draft", "continuity"],
    );
}

fn character(p: &mut Pipeline<'_>) {
    p.add_plan("character");
    p.add_research();
    let upstream = p.plan_and_research();

    for (stage, capability, what) in [
        ("traits", CapabilityId::CharacterDesigner, "Define traits and motivations"),
        ("backstory", CapabilityId::CharacterDesigner, "Write the backstory"),
        ("voice", CapabilityId::DialogueWriter, "Establish the speaking voice"),
    ] {
        let description = format!("{what} for: {}", p.instruction());
        p.add(stage, SubtaskKind::Generation, Some(capability), description, &upstream);
    }
    let description = format!("Check the character for consistency: {}", p.instruction());
    p.add(
        "consistency",
        SubtaskKind::Validation,
        Some(CapabilityId::ContinuityChecker),
        description,
        &["traits", "backstory", "voice"],
    );
    let description = format!("Assemble the character profile: {}", p.instruction());
    p.add(
        "finalize",
        SubtaskKind::Finalization,
        Some(CapabilityId::Editor),
        description,
        &["consistency", "traits", "backstory", "voice"],
    );

    for stage in ["plan", "traits", "backstory", "voice", "consistency", "finalize"] {
        p.rescope(stage, Scope::Characters);
    }
}

fn worldbuilding(p: &mut Pipeline<'_>) {
    p.add_plan("setting");
    p.add_research();
    let upstream = p.plan_and_research();

    for (stage, what) in [
        ("geography", "Describe the geography"),
        ("culture", "Describe the cultures"),
        ("history", "Write the history"),
    ] {
        let description = format!("{what} for: {}", p.instruction());
        p.add(
            stage,
            SubtaskKind::Generation,
            Some(CapabilityId::WorldBuilder),
            description,
            &upstream,
        );
    }
    let description = format!("Check the setting for consistency: {}", p.instruction());
    p.add(
        "consistency",
        SubtaskKind::Validation,
        Some(CapabilityId::ContinuityChecker),
        description,
        &["geography", "culture", "history"],
    );
    let description = format!("Assemble the setting document: {}", p.instruction());
    p.add(
        "finalize",
        SubtaskKind::Finalization,
        Some(CapabilityId::Editor),
        description,
        &["consistency", "geography", "culture", "history"],
    );

    for stage in ["plan", "geography", "culture", "history", "consistency", "finalize"] {
        p.rescope(stage, Scope::World);
    }
}

fn outline(p: &mut Pipeline<'_>) {
    p.add_plan("outline");
    p.add_research();
    let upstream = p.plan_and_research();

    let description = format!("Lay out the story beats: {}", p.instruction());
    p.add(
        "beats",
        SubtaskKind::Generation,
        Some(CapabilityId::Outliner),
        description,
        &upstream,
    );
    let description = format!("Validate the beats against prior content: {}", p.instruction());
    p.add(
        "validate",
        SubtaskKind::Validation,
        Some(CapabilityId::ContinuityChecker),
        description,
        &["beats"],
    );
    let description = format!("Finalize the outline: {}", p.instruction());
    p.add(
        "finalize",
        SubtaskKind::Finalization,
        Some(CapabilityId::Editor),
        description,
        &["beats", "validate"],
    );
}

fn revision(p: &mut Pipeline<'_>) -> EnsembleResult<()> {
    let has_prior = p
        .task
        .context
        .prior_content
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());
    if !has_prior {
        return Err(EnsembleError::Decomposition(
            "revision requires prior content".to_string(),
        ));
    }

    let description = format!("Audit the existing content: {}", p.instruction());
    p.add(
        "audit",
        SubtaskKind::Validation,
        Some(CapabilityId::ContinuityChecker),
        description,
        &[],
    )
    .priority = 10;
    let description = format!("Revise style and voice: {}", p.instruction());
    p.add(
        "style",
        SubtaskKind::Generation,
        Some(CapabilityId::StyleEditor),
        description,
        &["audit"],
    );
    let description = format!("Fix continuity problems found in the audit: {}", p.instruction());
    p.add(
        "continuity-fixes",
        SubtaskKind::Generation,
        Some(CapabilityId::ContinuityChecker),
        description,
        &["audit"],
    );
    let description = format!("Produce the revised text: {}", p.instruction());
    p.add(
        "finalize",
        SubtaskKind::Finalization,
        Some(CapabilityId::Editor),
        description,
        &["style", "continuity-fixes"],
    );
    Ok(())
}

fn generic(p: &mut Pipeline<'_>) {
    let description = p.instruction().to_string();
    p.add("generate", SubtaskKind::Generation, None, description, &[]);
}

/// Check that `subtasks` form a non-empty DAG whose dependencies all point
/// inside the set, with unique ids and stage names.
pub fn validate_graph(subtasks: &[Subtask]) -> EnsembleResult<()> {
    if subtasks.is_empty() {
        return Err(EnsembleError::Decomposition(
            "decomposition produced no subtasks".to_string(),
        ));
    }

    let mut ids = HashSet::new();
    let mut stages = HashSet::new();
    for s in subtasks {
        if !ids.insert(s.id) {
            return Err(EnsembleError::Decomposition(format!(
                "duplicate subtask id {}",
                s.id
            )));
        }
        if !stages.insert(s.stage.as_str()) {
            return Err(EnsembleError::Decomposition(format!(
                "duplicate stage '{}'",
                s.stage
            )));
        }
    }

    let mut indegree: HashMap<Uuid, usize> = HashMap::new();
    let mut dependents: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for s in subtasks {
        for dep in &s.dependencies {
            if *dep == s.id {
                return Err(EnsembleError::Decomposition(format!(
                    "stage '{}' depends on itself",
                    s.stage
                )));
            }
            if !ids.contains(dep) {
                return Err(EnsembleError::Decomposition(format!(
                    "stage '{}' depends on unknown subtask {dep}",
                    s.stage
                )));
            }
            dependents.entry(*dep).or_default().push(s.id);
        }
        indegree.insert(s.id, s.dependencies.len());
    }

    // Kahn's algorithm: every node must drain.
    let mut queue: VecDeque<Uuid> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0usize;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        for next in dependents.get(&id).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }
    if visited != subtasks.len() {
        return Err(EnsembleError::Decomposition(
            "dependency cycle detected in subtask graph".to_string(),
        ));
    }
    Ok(())
}

/// Longest dependency chain by summed estimated duration.
pub fn critical_path(subtasks: &[Subtask]) -> Duration {
    let by_id: HashMap<Uuid, &Subtask> = subtasks.iter().map(|s| (s.id, s)).collect();
    let mut memo: HashMap<Uuid, u64> = HashMap::new();
    let mut visiting: HashSet<Uuid> = HashSet::new();
    let longest = subtasks
        .iter()
        .map(|s| finish_time(s.id, &by_id, &mut memo, &mut visiting))
        .max()
        .unwrap_or(0);
    Duration::from_millis(longest)
}

fn finish_time(
    id: Uuid,
    by_id: &HashMap<Uuid, &Subtask>,
    memo: &mut HashMap<Uuid, u64>,
    visiting: &mut HashSet<Uuid>,
) -> u64 {
    if let Some(&ms) = memo.get(&id) {
        return ms;
    }
    let Some(subtask) = by_id.get(&id) else {
        return 0;
    };
    if !visiting.insert(id) {
        return 0; // cycle; validate_graph reports it
    }
    let upstream = subtask
        .dependencies
        .iter()
        .map(|dep| finish_time(*dep, by_id, memo, visiting))
        .max()
        .unwrap_or(0);
    visiting.remove(&id);
    let total = upstream + subtask.estimated_duration_ms;
    memo.insert(id, total);
    total
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ensemble_core::{EntityRef, TaskContext, TaskRequirements};

    fn decomposer() -> TaskDecomposer {
        TaskDecomposer::new(Arc::new(CapabilityRegistry::builtin()))
    }

    fn by_stage<'a>(subtasks: &'a [Subtask], stage: &str) -> &'a Subtask {
        subtasks.iter().find(|s| s.stage == stage).unwrap()
    }

    fn chapter_task(sections: Option<u32>, dialogue: bool, topics: &[&str]) -> Task {
        Task::new(TaskType::Chapter, "Write chapter seven")
            .with_requirements(TaskRequirements {
                instruction: "Write chapter seven".into(),
                section_count: sections,
                target_word_count: None,
                include_dialogue: dialogue,
                style: Some("noir".into()),
            })
            .with_context(TaskContext {
                entities: vec![
                    EntityRef::new(EntityKind::Character, "c1", "Mira"),
                    EntityRef::new(EntityKind::Location, "l1", "Harbor"),
                ],
                prior_content: Some("Chapter six text".into()),
                research_topics: topics.iter().map(|t| t.to_string()).collect(),
                notes: serde_json::Value::Null,
            })
    }

    #[test]
    fn test_chapter_sections_share_dependencies() {
        let subtasks = decomposer()
            .decompose(&chapter_task(Some(4), false, &[]))
            .unwrap();
        let stages: Vec<&str> = subtasks.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(
            stages,
            vec![
                "plan",
                "section-1",
                "section-2",
                "section-3",
                "section-4",
                "continuity",
                "style",
                "finalize"
            ]
        );

        let plan = by_stage(&subtasks, "plan");
        for i in 1..=4 {
            let section = by_stage(&subtasks, &format!("section-{i}"));
            assert_eq!(section.dependencies, vec![plan.id]);
            assert_eq!(section.context.section_index, Some(i));
            assert!(section.context.prior_content.is_none());
        }
        let continuity = by_stage(&subtasks, "continuity");
        assert_eq!(continuity.dependencies.len(), 4);
        assert_eq!(continuity.context.prior_content.as_deref(), Some("Chapter six text"));
    }

    #[test]
    fn test_chapter_optional_stages() {
        let subtasks = decomposer()
            .decompose(&chapter_task(None, true, &["tall ships"]))
            .unwrap();
        let research = by_stage(&subtasks, "research");
        assert!(research.dependencies.is_empty());
        assert_eq!(research.context.research_topics, vec!["tall ships"]);

        let section = by_stage(&subtasks, "section-1");
        assert_eq!(section.dependencies.len(), 2);
        assert!(section.dependencies.contains(&research.id));

        let dialogue = by_stage(&subtasks, "dialogue");
        assert_eq!(dialogue.capability, Some(CapabilityId::DialogueWriter));
        assert!(by_stage(&subtasks, "continuity")
            .dependencies
            .contains(&dialogue.id));
        assert_eq!(
            subtasks.iter().filter(|s| s.stage.starts_with("section-")).count(),
            DEFAULT_SECTION_COUNT as usize
        );
    }

    #[test]
    fn test_section_count_is_clamped() {
        let subtasks = decomposer()
            .decompose(&chapter_task(Some(40), false, &[]))
            .unwrap();
        assert_eq!(
            subtasks.iter().filter(|s| s.stage.starts_with("section-")).count(),
            MAX_SECTION_COUNT as usize
        );
        let one = decomposer()
            .decompose(&chapter_task(Some(0), false, &[]))
            .unwrap();
        assert!(one.iter().any(|s| s.stage == "section-1"));
        assert!(!one.iter().any(|s| s.stage == "section-2"));
    }

    #[test]
    fn test_character_scope_filters_entities() {
        let mut task = chapter_task(None, false, &[]);
        task.task_type = TaskType::Character;
        let subtasks = decomposer().decompose(&task).unwrap();
        let traits = by_stage(&subtasks, "traits");
        assert_eq!(traits.context.entities.len(), 1);
        assert_eq!(traits.context.entities[0].kind, EntityKind::Character);
        assert_eq!(by_stage(&subtasks, "finalize").dependencies.len(), 4);
    }

    #[test]
    fn test_worldbuilding_scope_filters_entities() {
        let mut task = chapter_task(None, false, &[]);
        task.task_type = TaskType::Worldbuilding;
        let subtasks = decomposer().decompose(&task).unwrap();
        let culture = by_stage(&subtasks, "culture");
        assert_eq!(culture.capability, Some(CapabilityId::WorldBuilder));
        assert_eq!(culture.context.entities.len(), 1);
        assert_eq!(culture.context.entities[0].kind, EntityKind::Location);
    }

    #[test]
    fn test_revision_requires_prior_content() {
        let task = Task::new(TaskType::Revision, "Tighten the prose");
        let err = decomposer().decompose(&task).unwrap_err();
        assert_eq!(err.code(), "DECOMPOSITION_ERROR");

        let mut task = chapter_task(None, false, &[]);
        task.task_type = TaskType::Revision;
        let subtasks = decomposer().decompose(&task).unwrap();
        let audit = by_stage(&subtasks, "audit");
        assert!(audit.dependencies.is_empty());
        assert!(subtasks
            .iter()
            .all(|s| s.context.prior_content.is_some()));
    }

    #[test]
    fn test_generic_is_single_unrouted_subtask() {
        let task = Task::new(TaskType::Generic, "Write a limerick");
        let subtasks = decomposer().decompose(&task).unwrap();
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].stage, "generate");
        assert!(subtasks[0].capability.is_none());
        assert!(subtasks[0].dependencies.is_empty());
    }

    #[test]
    fn test_empty_instruction_rejected() {
        let task = Task::new(TaskType::Scene, "   ");
        assert!(decomposer().decompose(&task).is_err());
    }

    #[test]
    fn test_every_strategy_yields_valid_graph() {
        for task_type in [
            TaskType::Chapter,
            TaskType::Scene,
            TaskType::Character,
            TaskType::Worldbuilding,
            TaskType::Outline,
            TaskType::Revision,
            TaskType::Generic,
        ] {
            let mut task = chapter_task(Some(5), true, &["ports"]);
            task.task_type = task_type;
            let subtasks = decomposer().decompose(&task).unwrap();
            assert!(!subtasks.is_empty());
            validate_graph(&subtasks).unwrap();
            let ids: HashSet<Uuid> = subtasks.iter().map(|s| s.id).collect();
            assert!(subtasks
                .iter()
                .all(|s| s.dependencies.iter().all(|d| ids.contains(d))));
            assert!(subtasks.iter().all(|s| s.parent_id == task.id));
        }
    }

    #[test]
    fn test_validate_graph_rejects_cycle_and_dangling() {
        let parent = Uuid::new_v4();
        let mut a = Subtask::new(parent, SubtaskKind::Generation, "a", "a");
        let b = Subtask::new(parent, SubtaskKind::Generation, "b", "b")
            .with_dependencies(vec![a.id]);
        a.dependencies = vec![b.id];
        let err = validate_graph(&[a.clone(), b]).unwrap_err();
        assert!(err.to_string().contains("cycle"));

        a.dependencies = vec![Uuid::new_v4()];
        assert!(validate_graph(&[a]).is_err());
        assert!(validate_graph(&[]).is_err());
    }

    #[test]
    fn test_critical_path_does_not_double_count() {
        let parent = Uuid::new_v4();
        let secs = Duration::from_secs;
        let root = Subtask::new(parent, SubtaskKind::Planning, "root", "")
            .with_estimated_duration(secs(10));
        let left = Subtask::new(parent, SubtaskKind::Generation, "left", "")
            .with_dependencies(vec![root.id])
            .with_estimated_duration(secs(30));
        let right = Subtask::new(parent, SubtaskKind::Generation, "right", "")
            .with_dependencies(vec![root.id])
            .with_estimated_duration(secs(50));
        let join = Subtask::new(parent, SubtaskKind::Finalization, "join", "")
            .with_dependencies(vec![left.id, right.id])
            .with_estimated_duration(secs(5));

        assert_eq!(critical_path(&[root, left, right, join]), secs(65));
        assert_eq!(critical_path(&[]), Duration::ZERO);
    }
}
