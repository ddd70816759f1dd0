//! API interaction layer: the model-client seam and retry with backoff.
//!
//! - [`model`]: the [`ModelClient`] trait the orchestrator and the model-backed
//!   classifier call through. [`OpenRouterClient`](crate::OpenRouterClient)
//!   implements it; tests substitute scripted clients.
//! - [`retry`]: transient error detection (429, 5xx, network timeouts) with
//!   exponential backoff and jitter. Never retries 400/401 errors.

pub mod model;
pub mod retry;

pub use model::{ModelClient, ModelFuture};
pub use retry::{RetryConfig, retry_api_call};
