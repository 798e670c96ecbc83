use crate::session::collect_issues;
use ensemble_core::{
    AssignmentResult, CapabilityId, Contribution, EnsembleError, EnsembleResult, MemoryUpdate,
    OutputMetadata, SynthesizedOutput, Task,
};
use ensemble_worker::{ContributingResult, SynthesizeRequest, WorkerClient};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Merges successful assignment results through the worker's merge capability.
pub struct Synthesizer {
    client: Arc<WorkerClient>,
}

impl Synthesizer {
    pub fn new(client: Arc<WorkerClient>) -> Self {
        Self { client }
    }

    /// Synthesize `results` (in decomposition order) into one output.
    ///
    /// Fails with `Synthesis` when no result completed. Only successful
    /// results are sent to the worker; every other result contributes an
    /// issue to the output.
    pub async fn synthesize(
        &self,
        task: &Task,
        results: &[AssignmentResult],
        cancel: &CancellationToken,
    ) -> EnsembleResult<SynthesizedOutput> {
        let successful: Vec<&AssignmentResult> =
            results.iter().filter(|r| r.is_success()).collect();
        if successful.is_empty() {
            return Err(EnsembleError::Synthesis(format!(
                "no successful results among {} subtasks",
                results.len()
            )));
        }

        let request = SynthesizeRequest {
            task_id: task.id,
            capability_id: CapabilityId::Synthesizer,
            contributing_results: successful
                .iter()
                .map(|r| ContributingResult {
                    subtask_id: r.subtask_id,
                    stage: r.stage.clone(),
                    capability: r.capability,
                    output: r.output.clone().unwrap_or_default(),
                    confidence: r.confidence,
                })
                .collect(),
            context: synthesis_context(task),
        };

        let response = self.client.synthesize(&request, cancel).await?;

        let contributions = normalize_weights(response.contribution_weights, &successful);
        let mut issues = collect_issues(results);
        issues.extend(response.issues);
        let memory_updates = merge_memory_updates(
            results
                .iter()
                .flat_map(|r| r.memory_updates.iter().cloned())
                .chain(response.memory_updates),
        );
        let word_count = response
            .word_count
            .unwrap_or_else(|| response.content.split_whitespace().count());

        info!(
            task_id = %task.id,
            contributing = successful.len(),
            word_count,
            "Synthesis complete"
        );

        Ok(SynthesizedOutput {
            task_id: task.id,
            content: response.content,
            word_count,
            quality: response.quality_metrics,
            contributions,
            issues,
            memory_updates,
            warnings: Vec::new(),
            metadata: OutputMetadata {
                subtasks_total: results.len(),
                subtasks_completed: successful.len(),
                subtasks_failed: results.len() - successful.len(),
                duration_ms: 0,
                critical_path_ms: 0,
                worker: response.metadata,
            },
        })
    }
}

fn synthesis_context(task: &Task) -> serde_json::Value {
    serde_json::json!({
        "task_type": task.task_type,
        "target_ids": task.target_ids,
        "requirements": task.requirements,
        "constraints": task.constraints,
        "context": task.context,
    })
}

/// Scale worker-provided weights to sum to 1. Without usable weights, derive
/// them from result confidence per capability, falling back to equal shares.
pub fn normalize_weights(
    weights: Vec<Contribution>,
    successful: &[&AssignmentResult],
) -> Vec<Contribution> {
    let weights: Vec<Contribution> = weights
        .into_iter()
        .map(|c| Contribution {
            weight: c.weight.max(0.0),
            ..c
        })
        .collect();
    let total: f64 = weights.iter().map(|c| c.weight).sum();
    if total > 0.0 {
        return weights
            .into_iter()
            .map(|c| Contribution {
                weight: c.weight / total,
                ..c
            })
            .collect();
    }

    let mut order: Vec<CapabilityId> = Vec::new();
    let mut sums: HashMap<CapabilityId, f64> = HashMap::new();
    for result in successful {
        if !sums.contains_key(&result.capability) {
            order.push(result.capability);
        }
        *sums.entry(result.capability).or_insert(0.0) += result.confidence;
    }
    let total: f64 = sums.values().sum();
    let equal = 1.0 / order.len().max(1) as f64;
    order
        .into_iter()
        .map(|capability| Contribution {
            capability,
            weight: if total > 0.0 {
                sums[&capability] / total
            } else {
                equal
            },
        })
        .collect()
}

/// Merge updates in order; a later update to the same `(entity, field)`
/// replaces the earlier one in place.
pub fn merge_memory_updates(
    updates: impl IntoIterator<Item = MemoryUpdate>,
) -> Vec<MemoryUpdate> {
    let mut merged: Vec<MemoryUpdate> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    for update in updates {
        let key = (update.entity_id.clone(), update.field.clone());
        match index.get(&key) {
            Some(&i) => merged[i] = update,
            None => {
                index.insert(key, merged.len());
                merged.push(update);
            }
        }
    }
    merged
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ensemble_core::{Issue, TaskType};
    use ensemble_worker::{
        BreakerConfig, CancelAck, CancelRequest, HealthResponse, RetryPolicy, SpawnRequest,
        SpawnResponse, SynthesizeResponse, WorkerTransport,
    };
    use parking_lot::Mutex;
    use uuid::Uuid;

    struct MergeTransport {
        requests: Mutex<Vec<SynthesizeRequest>>,
        weights: Vec<Contribution>,
    }

    #[async_trait]
    impl WorkerTransport for MergeTransport {
        fn endpoint(&self) -> &str {
            "mock"
        }

        async fn spawn(&self, _request: &SpawnRequest) -> EnsembleResult<SpawnResponse> {
            Ok(SpawnResponse::completed("unused", 1.0))
        }

        async fn synthesize(
            &self,
            request: &SynthesizeRequest,
        ) -> EnsembleResult<SynthesizeResponse> {
            self.requests.lock().push(request.clone());
            let content = request
                .contributing_results
                .iter()
                .map(|r| r.output.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            Ok(SynthesizeResponse {
                content,
                word_count: None,
                quality_metrics: Default::default(),
                contribution_weights: self.weights.clone(),
                issues: vec![Issue::warning("pacing drags in the middle")],
                memory_updates: vec![MemoryUpdate {
                    entity_id: "mara".into(),
                    field: "mood".into(),
                    value: serde_json::json!("resolved"),
                    rationale: None,
                }],
                metadata: serde_json::json!({"model": "mock"}),
            })
        }

        async fn health(&self) -> EnsembleResult<HealthResponse> {
            Ok(HealthResponse {
                healthy: true,
                latency_ms: 1,
                version: "test".into(),
            })
        }

        async fn cancel(&self, _request: &CancelRequest) -> EnsembleResult<CancelAck> {
            Ok(CancelAck { acknowledged: true })
        }
    }

    fn synthesizer(weights: Vec<Contribution>) -> (Synthesizer, Arc<MergeTransport>) {
        let transport = Arc::new(MergeTransport {
            requests: Mutex::new(Vec::new()),
            weights,
        });
        let client = WorkerClient::new(
            transport.clone(),
            BreakerConfig::default(),
            RetryPolicy::none(),
        );
        (Synthesizer::new(Arc::new(client)), transport)
    }

    fn result(stage: &str, capability: CapabilityId, output: Option<&str>) -> AssignmentResult {
        let pending =
            AssignmentResult::pending(Uuid::new_v4(), Uuid::new_v4(), capability, stage);
        match output {
            Some(text) => pending.complete(text, 0.8),
            None => pending.fail(&EnsembleError::Worker("refused".into())),
        }
    }

    #[tokio::test]
    async fn test_no_successful_results_is_fatal() {
        let (synth, transport) = synthesizer(vec![]);
        let task = Task::new(TaskType::Chapter, "write");
        let results = vec![result("plan", CapabilityId::Outliner, None)];
        let err = synth
            .synthesize(&task, &results, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SYNTHESIS_ERROR");
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_merges_successful_results_in_order() {
        let (synth, transport) = synthesizer(vec![]);
        let task = Task::new(TaskType::Chapter, "write");
        let mut first = result("section-1", CapabilityId::SectionWriter, Some("It began."));
        first.memory_updates.push(MemoryUpdate {
            entity_id: "mara".into(),
            field: "mood".into(),
            value: serde_json::json!("anxious"),
            rationale: None,
        });
        let results = vec![
            first,
            result("section-2", CapabilityId::SectionWriter, None),
            result("section-3", CapabilityId::DialogueWriter, Some("It ended.")),
        ];

        let output = synth
            .synthesize(&task, &results, &CancellationToken::new())
            .await
            .unwrap();

        let sent = transport.requests.lock()[0].clone();
        let stages: Vec<&str> = sent
            .contributing_results
            .iter()
            .map(|r| r.stage.as_str())
            .collect();
        assert_eq!(stages, vec!["section-1", "section-3"]);
        assert_eq!(sent.capability_id, CapabilityId::Synthesizer);

        assert_eq!(output.content, "It began.\n\nIt ended.");
        assert_eq!(output.word_count, 4);
        assert_eq!(output.metadata.subtasks_total, 3);
        assert_eq!(output.metadata.subtasks_failed, 1);
        assert!(output.issues.iter().any(|i| i.message.contains("section-2")));
        assert_eq!(output.memory_updates.len(), 1);
        assert_eq!(output.memory_updates[0].value, "resolved");

        let total: f64 = output.contributions.iter().map(|c| c.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(output.contributions.len(), 2);
    }

    #[tokio::test]
    async fn test_same_inputs_synthesize_identically() {
        let (synth, transport) = synthesizer(vec![]);
        let task = Task::new(TaskType::Chapter, "write");
        let mut first = result("section-1", CapabilityId::SectionWriter, Some("It began."));
        first.issues.push(Issue::warning("tense shifts"));
        first.memory_updates.push(MemoryUpdate {
            entity_id: "tobin".into(),
            field: "location".into(),
            value: serde_json::json!("harbor"),
            rationale: None,
        });
        let results = vec![
            first,
            result("section-2", CapabilityId::SectionWriter, None),
            result("style", CapabilityId::StyleEditor, Some("It ended.")),
        ];

        let cancel = CancellationToken::new();
        let a = synth.synthesize(&task, &results, &cancel).await.unwrap();
        let b = synth.synthesize(&task, &results, &cancel).await.unwrap();

        let requests = transport.requests.lock().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(a.content, b.content);
        assert_eq!(a.contributions, b.contributions);
        assert_eq!(a.memory_updates, b.memory_updates);
        assert_eq!(a.issues, b.issues);
        assert_eq!(a.metadata, b.metadata);
    }

    #[tokio::test]
    async fn test_worker_weights_are_normalized() {
        let (synth, _) = synthesizer(vec![
            Contribution {
                capability: CapabilityId::SectionWriter,
                weight: 3.0,
            },
            Contribution {
                capability: CapabilityId::Editor,
                weight: 1.0,
            },
        ]);
        let task = Task::new(TaskType::Chapter, "write");
        let results = vec![result("section-1", CapabilityId::SectionWriter, Some("text"))];
        let output = synth
            .synthesize(&task, &results, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.contributions[0].weight, 0.75);
        assert_eq!(output.contributions[1].weight, 0.25);
    }

    #[test]
    fn test_zero_confidence_gives_equal_weights() {
        let mut a = result("a", CapabilityId::Outliner, Some("x"));
        let mut b = result("b", CapabilityId::Editor, Some("y"));
        a.confidence = 0.0;
        b.confidence = 0.0;
        let weights = normalize_weights(vec![], &[&a, &b]);
        assert_eq!(weights.len(), 2);
        assert!(weights.iter().all(|w| w.weight == 0.5));
    }

    #[test]
    fn test_memory_updates_last_wins_in_place() {
        let update = |entity: &str, field: &str, value: &str| MemoryUpdate {
            entity_id: entity.into(),
            field: field.into(),
            value: serde_json::json!(value),
            rationale: None,
        };
        let merged = merge_memory_updates(vec![
            update("mara", "mood", "calm"),
            update("tobin", "location", "harbor"),
            update("mara", "mood", "furious"),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].entity_id, "mara");
        assert_eq!(merged[0].value, "furious");
        assert_eq!(merged[1].entity_id, "tobin");
    }
}
