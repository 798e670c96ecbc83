use ensemble_core::{
    QualityThresholds, QualityWarning, Severity, SynthesizedOutput, TaskConstraints,
};

/// Compares a synthesized output against quality thresholds and content
/// constraints. Only ever produces warnings.
pub struct QualityGate {
    thresholds: QualityThresholds,
}

impl QualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Evaluate `output`, with per-task overrides from `constraints` taking
    /// precedence field by field.
    pub fn evaluate(
        &self,
        output: &SynthesizedOutput,
        constraints: &TaskConstraints,
    ) -> Vec<QualityWarning> {
        let thresholds = self.thresholds.merged(&constraints.quality);
        let quality = &output.quality;
        let mut warnings = Vec::new();

        for (check, actual, minimum) in [
            ("overall", quality.overall, thresholds.min_overall),
            ("coherence", quality.coherence, thresholds.min_coherence),
            ("consistency", quality.consistency, thresholds.min_consistency),
            ("style", quality.style, thresholds.min_style),
        ] {
            if actual < minimum {
                warnings.push(QualityWarning {
                    check: check.to_string(),
                    message: format!("{check} score {actual:.2} below minimum {minimum:.2}"),
                    actual: Some(actual),
                    threshold: Some(minimum),
                });
            }
        }

        let critical = output
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .count();
        if critical > thresholds.max_critical_issues {
            warnings.push(QualityWarning {
                check: "critical_issues".to_string(),
                message: format!(
                    "{critical} critical issues exceed the maximum of {}",
                    thresholds.max_critical_issues
                ),
                actual: Some(critical as f64),
                threshold: Some(thresholds.max_critical_issues as f64),
            });
        }

        let content = output.content.to_lowercase();
        for term in &constraints.must_include {
            if !term.trim().is_empty() && !content.contains(&term.to_lowercase()) {
                warnings.push(QualityWarning {
                    check: "must_include".to_string(),
                    message: format!("required term '{term}' is missing"),
                    actual: None,
                    threshold: None,
                });
            }
        }
        for term in &constraints.must_avoid {
            if !term.trim().is_empty() && content.contains(&term.to_lowercase()) {
                warnings.push(QualityWarning {
                    check: "must_avoid".to_string(),
                    message: format!("forbidden term '{term}' is present"),
                    actual: None,
                    threshold: None,
                });
            }
        }

        warnings
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(QualityThresholds::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ensemble_core::{Issue, OutputMetadata, QualityMetrics, QualityOverrides};
    use uuid::Uuid;

    fn output(content: &str, quality: QualityMetrics) -> SynthesizedOutput {
        SynthesizedOutput {
            task_id: Uuid::nil(),
            content: content.to_string(),
            word_count: content.split_whitespace().count(),
            quality,
            contributions: vec![],
            issues: vec![],
            memory_updates: vec![],
            warnings: vec![],
            metadata: OutputMetadata::default(),
        }
    }

    fn good() -> QualityMetrics {
        QualityMetrics {
            overall: 0.9,
            coherence: 0.9,
            consistency: 0.9,
            style: 0.9,
        }
    }

    #[test]
    fn test_passing_output_has_no_warnings() {
        let gate = QualityGate::default();
        let out = output("The tide turned.", good());
        let warnings = gate.evaluate(&out, &TaskConstraints::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_low_scores_warn() {
        let gate = QualityGate::default();
        let quality = QualityMetrics {
            overall: 0.5,
            style: 0.1,
            ..good()
        };
        let warnings = gate.evaluate(&output("text", quality), &TaskConstraints::default());
        let checks: Vec<&str> = warnings.iter().map(|w| w.check.as_str()).collect();
        assert_eq!(checks, vec!["overall", "style"]);
        assert_eq!(warnings[0].threshold, Some(0.7));
    }

    #[test]
    fn test_task_overrides_take_precedence() {
        let gate = QualityGate::default();
        let constraints = TaskConstraints {
            quality: QualityOverrides {
                min_overall: Some(0.4),
                ..QualityOverrides::default()
            },
            ..TaskConstraints::default()
        };
        let quality = QualityMetrics {
            overall: 0.5,
            ..good()
        };
        assert!(gate.evaluate(&output("text", quality), &constraints).is_empty());
    }

    #[test]
    fn test_critical_issues_counted() {
        let gate = QualityGate::default();
        let mut out = output("text", good());
        out.issues.push(Issue::new(Severity::Critical, "timeline contradiction"));
        out.issues.push(Issue::warning("minor"));
        let warnings = gate.evaluate(&out, &TaskConstraints::default());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].check, "critical_issues");
        assert_eq!(warnings[0].actual, Some(1.0));
    }

    #[test]
    fn test_term_constraints_case_insensitive() {
        let gate = QualityGate::default();
        let constraints = TaskConstraints {
            must_include: vec!["Lighthouse".into(), "storm".into()],
            must_avoid: vec!["DRAGON".into()],
            ..TaskConstraints::default()
        };
        let out = output("The lighthouse keeper feared the dragon.", good());
        let warnings = gate.evaluate(&out, &constraints);
        let checks: Vec<&str> = warnings.iter().map(|w| w.check.as_str()).collect();
        assert_eq!(checks, vec!["must_include", "must_avoid"]);
        assert!(warnings[0].message.contains("storm"));
    }
}
