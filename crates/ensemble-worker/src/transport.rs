use crate::protocol::{
    CancelAck, CancelRequest, HealthResponse, SpawnRequest, SpawnResponse, SynthesizeRequest,
    SynthesizeResponse,
};
use async_trait::async_trait;
use ensemble_core::{EnsembleError, EnsembleResult};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Raw request/response access to a remote worker service.
///
/// Implementations perform exactly one attempt per call; retry, timeouts
/// and circuit breaking live in [`crate::WorkerClient`].
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// Human-readable endpoint identifier, used to name the circuit breaker.
    fn endpoint(&self) -> &str;

    /// Invoke one capability.
    async fn spawn(&self, request: &SpawnRequest) -> EnsembleResult<SpawnResponse>;

    /// Merge contributing results into one artifact.
    async fn synthesize(&self, request: &SynthesizeRequest) -> EnsembleResult<SynthesizeResponse>;

    /// Report worker health.
    async fn health(&self) -> EnsembleResult<HealthResponse>;

    /// Ask the worker to stop work for a task (best effort).
    async fn cancel(&self, request: &CancelRequest) -> EnsembleResult<CancelAck>;
}

/// JSON-over-HTTP transport for the worker service.
pub struct HttpTransport {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for `base_url` (e.g. `http://localhost:8700`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        connect_timeout: Duration,
    ) -> EnsembleResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| EnsembleError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> EnsembleResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let resp = self
            .authorize(self.http.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;
        decode(resp).await
    }

    async fn get<R>(&self, path: &str) -> EnsembleResult<R>
    where
        R: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let resp = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;
        decode(resp).await
    }
}

#[async_trait]
impl WorkerTransport for HttpTransport {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn spawn(&self, request: &SpawnRequest) -> EnsembleResult<SpawnResponse> {
        self.post("/v1/spawn", request).await
    }

    async fn synthesize(&self, request: &SynthesizeRequest) -> EnsembleResult<SynthesizeResponse> {
        self.post("/v1/synthesize", request).await
    }

    async fn health(&self) -> EnsembleResult<HealthResponse> {
        self.get("/v1/health").await
    }

    async fn cancel(&self, request: &CancelRequest) -> EnsembleResult<CancelAck> {
        self.post("/v1/cancel", request).await
    }
}

async fn decode<R: DeserializeOwned>(resp: reqwest::Response) -> EnsembleResult<R> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(classify_status(status, &body));
    }
    resp.json::<R>()
        .await
        .map_err(|e| EnsembleError::Transport(format!("invalid response body: {e}")))
}

/// Map a non-success HTTP status to the error taxonomy.
///
/// 408, 429 and 5xx are transient; every other client error means the
/// request itself was rejected.
pub fn classify_status(status: StatusCode, body: &str) -> EnsembleError {
    let message = format!("worker returned {status}: {body}");
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        EnsembleError::Transport(message)
    } else {
        EnsembleError::Validation(message)
    }
}

fn classify_reqwest(err: &reqwest::Error) -> EnsembleError {
    if err.is_timeout() {
        EnsembleError::Timeout(err.to_string())
    } else {
        EnsembleError::Transport(err.to_string())
    }
}
