use crate::capability::CapabilityId;
use crate::result::{Issue, MemoryUpdate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quality scores reported by the merge capability, each in `0.0..=1.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    #[serde(default)]
    pub overall: f64,
    #[serde(default)]
    pub coherence: f64,
    #[serde(default)]
    pub consistency: f64,
    #[serde(default)]
    pub style: f64,
}

/// Minimum acceptable quality and maximum tolerated critical issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    #[serde(default = "default_min_overall")]
    pub min_overall: f64,
    #[serde(default = "default_min_coherence")]
    pub min_coherence: f64,
    #[serde(default = "default_min_consistency")]
    pub min_consistency: f64,
    #[serde(default = "default_min_style")]
    pub min_style: f64,
    #[serde(default)]
    pub max_critical_issues: usize,
}

fn default_min_overall() -> f64 {
    0.7
}

fn default_min_coherence() -> f64 {
    0.6
}

fn default_min_consistency() -> f64 {
    0.6
}

fn default_min_style() -> f64 {
    0.5
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_overall: default_min_overall(),
            min_coherence: default_min_coherence(),
            min_consistency: default_min_consistency(),
            min_style: default_min_style(),
            max_critical_issues: 0,
        }
    }
}

impl QualityThresholds {
    /// Apply per-task overrides field by field.
    pub fn merged(&self, overrides: &QualityOverrides) -> Self {
        Self {
            min_overall: overrides.min_overall.unwrap_or(self.min_overall),
            min_coherence: overrides.min_coherence.unwrap_or(self.min_coherence),
            min_consistency: overrides.min_consistency.unwrap_or(self.min_consistency),
            min_style: overrides.min_style.unwrap_or(self.min_style),
            max_critical_issues: overrides
                .max_critical_issues
                .unwrap_or(self.max_critical_issues),
        }
    }
}

/// Per-task threshold overrides; unset fields fall back to configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityOverrides {
    #[serde(default)]
    pub min_overall: Option<f64>,
    #[serde(default)]
    pub min_coherence: Option<f64>,
    #[serde(default)]
    pub min_consistency: Option<f64>,
    #[serde(default)]
    pub min_style: Option<f64>,
    #[serde(default)]
    pub max_critical_issues: Option<usize>,
}

/// A non-blocking finding of the quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityWarning {
    /// What was checked (`overall`, `critical_issues`, `must_include`, ...).
    pub check: String,
    pub message: String,
    #[serde(default)]
    pub actual: Option<f64>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// Share of the final artifact attributed to one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub capability: CapabilityId,
    pub weight: f64,
}

/// Aggregate facts about the session that produced an output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputMetadata {
    pub subtasks_total: usize,
    pub subtasks_completed: usize,
    pub subtasks_failed: usize,
    pub duration_ms: u64,
    pub critical_path_ms: u64,
    /// Extra metadata returned by the merge capability.
    #[serde(default)]
    pub worker: serde_json::Value,
}

/// The merged artifact returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedOutput {
    pub task_id: Uuid,
    pub content: String,
    pub word_count: usize,
    pub quality: QualityMetrics,
    pub contributions: Vec<Contribution>,
    pub issues: Vec<Issue>,
    pub memory_updates: Vec<MemoryUpdate>,
    #[serde(default)]
    pub warnings: Vec<QualityWarning>,
    pub metadata: OutputMetadata,
}

impl SynthesizedOutput {
    /// Whether the quality gate raised any warning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
