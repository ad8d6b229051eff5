use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Single-attempt calls to the remote AI service.
///
/// Implementations classify every failure into the crate's error taxonomy before returning;
/// retries, breaker checks and rate limiting are layered on by the orchestrator. Both calls are
/// treated as idempotent, so a failed attempt may simply be repeated.
#[async_trait]
pub trait RemoteAiClient: Send + Sync {
    /// Describe the image content. `timeout` bounds this one attempt.
    async fn analyze(&self, image: &Bytes, timeout: Duration) -> Result<String>;

    /// Produce an edited image for `prompt`, optionally restricted to `mask`.
    async fn generate(
        &self,
        image: &Bytes,
        mask: Option<&Bytes>,
        prompt: &str,
        timeout: Duration,
    ) -> Result<Bytes>;
}
