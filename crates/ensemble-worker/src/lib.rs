//! Resilient client for the remote Ensemble worker service.
//!
//! Every capability invocation and every synthesis call goes through one
//! [`WorkerClient`] per endpoint, which layers a circuit breaker, bounded
//! exponential-backoff retries, per-call timeouts and hierarchical
//! cancellation over a pluggable [`WorkerTransport`].
//!
//! # Main types
//!
//! - [`WorkerClient`]: Breaker + retry + cancellation around a transport.
//! - [`WorkerTransport`]: One-attempt request/response seam; [`HttpTransport`]
//!   is the JSON/HTTP implementation.
//! - [`CircuitBreaker`]: Closed / open / half-open guard for one endpoint.
//! - [`RetryPolicy`]: Exponential backoff configuration.
//! - [`AssignmentExecutor`]: What the execution engine drives.

/// Circuit breaker.
pub mod breaker;
/// Resilient worker client and lifecycle events.
pub mod client;
/// Worker wire types.
pub mod protocol;
/// Retry policy and backoff computation.
pub mod retry;
/// Transport trait and HTTP implementation.
pub mod transport;

pub use breaker::{BreakerConfig, BreakerPermit, BreakerState, CircuitBreaker};
pub use client::{AssignmentExecutor, WorkerClient, WorkerEvent, WorkerHealth};
pub use protocol::{
    CancelAck, CancelRequest, ContributingResult, HealthResponse, PushUpdate, SpawnRequest,
    SpawnResponse, SpawnStatus, SynthesizeRequest, SynthesizeResponse,
};
pub use retry::{compute_backoff, RetryPolicy};
pub use transport::{classify_status, HttpTransport, WorkerTransport};
