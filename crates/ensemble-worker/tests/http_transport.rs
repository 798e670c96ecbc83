#![allow(clippy::unwrap_used, clippy::expect_used)]
//! HTTP transport tests against a local mock worker service.

use ensemble_core::{Assignment, CapabilityId, InvocationPayload, ResultStatus};
use ensemble_worker::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer, api_key: Option<&str>) -> HttpTransport {
    HttpTransport::new(
        server.uri(),
        api_key.map(str::to_string),
        Duration::from_secs(2),
    )
    .unwrap()
}

fn assignment() -> Assignment {
    Assignment {
        id: Uuid::new_v4(),
        task_id: Uuid::new_v4(),
        subtask_id: Uuid::new_v4(),
        stage: "section-1".into(),
        capability: CapabilityId::SectionWriter,
        payload: InvocationPayload {
            instruction: "Write the opening section".into(),
            context: json!({"section_index": 1}),
        },
        timeout_ms: 5_000,
        priority: 5,
        depends_on: vec![],
    }
}

// ---------------------------------------------------------------------------
// 1. Spawn round trip with bearer auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn spawn_sends_camel_case_and_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/spawn"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "capabilityId": "section_writer",
            "timeoutMs": 5000
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "output": "The tide came in early.",
            "confidence": 0.85,
            "memoryUpdates": [{"entity_id": "c1", "field": "mood", "value": "uneasy"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = WorkerClient::new(
        Arc::new(transport(&server, Some("secret"))),
        BreakerConfig::default(),
        RetryPolicy::none(),
    );
    let result = client
        .invoke(&assignment(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, ResultStatus::Completed);
    assert_eq!(result.output.as_deref(), Some("The tide came in early."));
    assert_eq!(result.memory_updates.len(), 1);
}

// ---------------------------------------------------------------------------
// 2. Status classification through the real client
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unprocessable_entity_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/spawn"))
        .respond_with(ResponseTemplate::new(422).set_body_string("missing instruction"))
        .expect(1)
        .mount(&server)
        .await;

    let client = WorkerClient::new(
        Arc::new(transport(&server, None)),
        BreakerConfig::default(),
        RetryPolicy {
            max_retries: 3,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
        },
    );
    let result = client
        .invoke(&assignment(), &CancellationToken::new())
        .await;

    assert_eq!(result.error_code(), Some("VALIDATION_ERROR"));
    assert_eq!(client.breaker_state(), BreakerState::Closed);
}

#[tokio::test]
async fn server_errors_are_retried_then_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/spawn"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/spawn"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "output": "third time lucky",
            "confidence": 0.7
        })))
        .mount(&server)
        .await;

    let client = WorkerClient::new(
        Arc::new(transport(&server, None)),
        BreakerConfig::default(),
        RetryPolicy {
            max_retries: 3,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
        },
    );
    let result = client
        .invoke(&assignment(), &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert_eq!(result.metrics.attempts, 3);
}

#[tokio::test]
async fn slow_worker_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/spawn"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "completed", "output": "late"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = WorkerClient::new(
        Arc::new(transport(&server, None)),
        BreakerConfig::default(),
        RetryPolicy::none(),
    );
    let mut a = assignment();
    a.timeout_ms = 50;
    let result = client.invoke(&a, &CancellationToken::new()).await;

    assert_eq!(result.status, ResultStatus::Timeout);
}

// ---------------------------------------------------------------------------
// 3. Synthesize, health and cancel routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn synthesize_health_and_cancel_routes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/synthesize"))
        .and(body_partial_json(json!({"capabilityId": "synthesizer"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "Merged chapter",
            "wordCount": 2,
            "qualityMetrics": {"overall": 0.9, "coherence": 0.8, "consistency": 0.85, "style": 0.7}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"healthy": true, "latencyMs": 3, "version": "2.1.0"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
        .mount(&server)
        .await;

    let client = WorkerClient::new(
        Arc::new(transport(&server, None)),
        BreakerConfig::default(),
        RetryPolicy::none(),
    );

    let merged = client
        .synthesize(
            &SynthesizeRequest {
                task_id: Uuid::new_v4(),
                capability_id: CapabilityId::Synthesizer,
                contributing_results: vec![],
                context: json!({}),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(merged.content, "Merged chapter");
    assert_eq!(merged.quality_metrics.overall, 0.9);

    let health = client.health().await;
    assert!(health.healthy);
    assert_eq!(health.version.as_deref(), Some("2.1.0"));

    assert!(client.cancel_remote(Uuid::new_v4()).await);
}

#[tokio::test]
async fn unreachable_worker_is_unhealthy() {
    let transport =
        HttpTransport::new("http://127.0.0.1:9", None, Duration::from_millis(200)).unwrap();
    let client = WorkerClient::new(
        Arc::new(transport),
        BreakerConfig::default(),
        RetryPolicy::none(),
    );
    let health = client.health().await;
    assert!(!health.healthy);
    assert!(!client.cancel_remote(Uuid::new_v4()).await);
}
