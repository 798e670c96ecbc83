use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A specialist skill that a remote worker can perform.
///
/// The set is closed: routing and decomposition match on these variants, and
/// the registry only carries metadata about them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityId {
    /// Breaks a request into beats, structure and goals.
    Outliner,
    /// Gathers reference material on required topics.
    Researcher,
    /// Writes prose for one section or scene.
    SectionWriter,
    /// Writes character dialogue and voice samples.
    DialogueWriter,
    /// Designs character traits and backstories.
    CharacterDesigner,
    /// Builds settings, cultures and histories.
    WorldBuilder,
    /// Checks content against established facts and prior content.
    ContinuityChecker,
    /// Adjusts tone, rhythm and voice.
    StyleEditor,
    /// Final editorial pass.
    Editor,
    /// Merges contributions into one artifact.
    Synthesizer,
    /// General-purpose fallback.
    Generalist,
}

impl CapabilityId {
    /// Every capability, in declaration order.
    pub const ALL: [CapabilityId; 11] = [
        CapabilityId::Outliner,
        CapabilityId::Researcher,
        CapabilityId::SectionWriter,
        CapabilityId::DialogueWriter,
        CapabilityId::CharacterDesigner,
        CapabilityId::WorldBuilder,
        CapabilityId::ContinuityChecker,
        CapabilityId::StyleEditor,
        CapabilityId::Editor,
        CapabilityId::Synthesizer,
        CapabilityId::Generalist,
    ];

    /// The wire name used by the remote worker service.
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityId::Outliner => "outliner",
            CapabilityId::Researcher => "researcher",
            CapabilityId::SectionWriter => "section_writer",
            CapabilityId::DialogueWriter => "dialogue_writer",
            CapabilityId::CharacterDesigner => "character_designer",
            CapabilityId::WorldBuilder => "world_builder",
            CapabilityId::ContinuityChecker => "continuity_checker",
            CapabilityId::StyleEditor => "style_editor",
            CapabilityId::Editor => "editor",
            CapabilityId::Synthesizer => "synthesizer",
            CapabilityId::Generalist => "generalist",
        }
    }
}

impl std::fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad grouping of capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityCategory {
    Planning,
    Research,
    Generation,
    Validation,
    Editing,
    Synthesis,
}

/// Coarse duration estimate for a capability invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationBucket {
    Short,
    Medium,
    Long,
}

impl DurationBucket {
    /// The nominal duration of the bucket.
    pub fn as_duration(&self) -> Duration {
        match self {
            DurationBucket::Short => Duration::from_secs(30),
            DurationBucket::Medium => Duration::from_secs(90),
            DurationBucket::Long => Duration::from_secs(180),
        }
    }
}

/// Static metadata describing one capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    pub id: CapabilityId,
    pub category: CapabilityCategory,
    pub description: String,
    /// Declared strengths, used for display and diagnostics only.
    #[serde(default)]
    pub strengths: Vec<String>,
    pub default_duration: DurationBucket,
}

impl CapabilityDefinition {
    pub fn new(
        id: CapabilityId,
        category: CapabilityCategory,
        description: impl Into<String>,
        default_duration: DurationBucket,
    ) -> Self {
        Self {
            id,
            category,
            description: description.into(),
            strengths: Vec::new(),
            default_duration,
        }
    }

    pub fn with_strengths(mut self, strengths: &[&str]) -> Self {
        self.strengths = strengths.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_display_matches_serde() {
        for id in CapabilityId::ALL {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{id}\""));
        }
    }

    #[test]
    fn test_unknown_capability_rejected() {
        let parsed: Result<CapabilityId, _> = serde_json::from_str("\"poet\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_duration_buckets_ordered() {
        assert!(DurationBucket::Short.as_duration() < DurationBucket::Medium.as_duration());
        assert!(DurationBucket::Medium.as_duration() < DurationBucket::Long.as_duration());
    }
}
