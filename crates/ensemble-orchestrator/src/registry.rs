use ensemble_core::{
    CapabilityCategory, CapabilityDefinition, CapabilityId, DurationBucket, EnsembleError,
    EnsembleResult,
};
use std::collections::BTreeMap;
use std::time::Duration;

/// The built-in capability catalog.
pub fn builtin_definitions() -> Vec<CapabilityDefinition> {
    vec![
        outliner(),
        researcher(),
        section_writer(),
        dialogue_writer(),
        character_designer(),
        world_builder(),
        continuity_checker(),
        style_editor(),
        editor(),
        synthesizer(),
        generalist(),
    ]
}

fn outliner() -> CapabilityDefinition {
    CapabilityDefinition::new(
        CapabilityId::Outliner,
        CapabilityCategory::Planning,
        "Plans structure, beats and goals for a piece of content",
        DurationBucket::Short,
    )
    .with_strengths(&["structure", "pacing", "beat planning"])
}

fn researcher() -> CapabilityDefinition {
    CapabilityDefinition::new(
        CapabilityId::Researcher,
        CapabilityCategory::Research,
        "Collects reference material on required topics",
        DurationBucket::Medium,
    )
    .with_strengths(&["fact gathering", "period detail"])
}

fn section_writer() -> CapabilityDefinition {
    CapabilityDefinition::new(
        CapabilityId::SectionWriter,
        CapabilityCategory::Generation,
        "Writes prose for one section or scene",
        DurationBucket::Long,
    )
    .with_strengths(&["prose", "description", "scene building"])
}

fn dialogue_writer() -> CapabilityDefinition {
    CapabilityDefinition::new(
        CapabilityId::DialogueWriter,
        CapabilityCategory::Generation,
        "Writes dialogue and character voice",
        DurationBucket::Medium,
    )
    .with_strengths(&["dialogue", "voice"])
}

fn character_designer() -> CapabilityDefinition {
    CapabilityDefinition::new(
        CapabilityId::CharacterDesigner,
        CapabilityCategory::Generation,
        "Designs character traits, motivations and backstories",
        DurationBucket::Medium,
    )
    .with_strengths(&["motivation", "backstory", "traits"])
}

fn world_builder() -> CapabilityDefinition {
    CapabilityDefinition::new(
        CapabilityId::WorldBuilder,
        CapabilityCategory::Generation,
        "Builds geography, cultures and histories",
        DurationBucket::Medium,
    )
    .with_strengths(&["geography", "culture", "history"])
}

fn continuity_checker() -> CapabilityDefinition {
    CapabilityDefinition::new(
        CapabilityId::ContinuityChecker,
        CapabilityCategory::Validation,
        "Checks content against known entities and prior content",
        DurationBucket::Short,
    )
    .with_strengths(&["consistency", "fact checking"])
}

fn style_editor() -> CapabilityDefinition {
    CapabilityDefinition::new(
        CapabilityId::StyleEditor,
        CapabilityCategory::Editing,
        "Adjusts tone, rhythm and voice",
        DurationBucket::Medium,
    )
    .with_strengths(&["tone", "rhythm"])
}

fn editor() -> CapabilityDefinition {
    CapabilityDefinition::new(
        CapabilityId::Editor,
        CapabilityCategory::Editing,
        "Final editorial pass over assembled content",
        DurationBucket::Medium,
    )
    .with_strengths(&["polish", "clarity"])
}

fn synthesizer() -> CapabilityDefinition {
    CapabilityDefinition::new(
        CapabilityId::Synthesizer,
        CapabilityCategory::Synthesis,
        "Merges contributions into one coherent artifact",
        DurationBucket::Long,
    )
    .with_strengths(&["merging", "transitions"])
}

fn generalist() -> CapabilityDefinition {
    CapabilityDefinition::new(
        CapabilityId::Generalist,
        CapabilityCategory::Generation,
        "General-purpose fallback for unspecialized work",
        DurationBucket::Medium,
    )
}

/// Read-only lookup of capability metadata.
///
/// Built once at startup and shared behind an `Arc`; there is no mutation
/// API.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    definitions: BTreeMap<CapabilityId, CapabilityDefinition>,
}

impl CapabilityRegistry {
    /// Registry holding the built-in catalog.
    pub fn builtin() -> Self {
        Self::from_definitions(builtin_definitions())
    }

    /// Registry holding exactly `definitions`. Later duplicates replace
    /// earlier ones.
    pub fn from_definitions(definitions: Vec<CapabilityDefinition>) -> Self {
        Self {
            definitions: definitions.into_iter().map(|d| (d.id, d)).collect(),
        }
    }

    /// Look up one capability.
    pub fn get(&self, id: CapabilityId) -> Option<&CapabilityDefinition> {
        self.definitions.get(&id)
    }

    /// Look up one capability, failing with a configuration error.
    pub fn require(&self, id: CapabilityId) -> EnsembleResult<&CapabilityDefinition> {
        self.get(id)
            .ok_or_else(|| EnsembleError::Configuration(format!("unknown capability: {id}")))
    }

    pub fn contains(&self, id: CapabilityId) -> bool {
        self.definitions.contains_key(&id)
    }

    /// Nominal duration of `id`, falling back to the medium bucket.
    pub fn default_duration(&self, id: CapabilityId) -> Duration {
        self.get(id)
            .map(|d| d.default_duration)
            .unwrap_or(DurationBucket::Medium)
            .as_duration()
    }

    /// All definitions, in declaration order of [`CapabilityId`].
    pub fn list(&self) -> Vec<&CapabilityDefinition> {
        self.definitions.values().collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
