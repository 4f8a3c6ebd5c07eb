//! Caller-side retry of ambiguous outcomes.

use crate::domain::{RetryPolicy, WriteResult, WriteSpec};
use crate::ports::inbound::WriteSubmitterApi;
use shared_crypto::Ed25519KeyPair;
use tracing::debug;

/// Re-submit `spec` with exponential backoff while the outcome is ambiguous.
///
/// Confirmed and rejected outcomes return at once. After `max_attempts` the
/// last ambiguous result is returned; its cached payload stays in place.
pub async fn submit_with_retry<A>(
    api: &A,
    spec: &WriteSpec,
    key: &Ed25519KeyPair,
    policy: &RetryPolicy,
) -> WriteResult
where
    A: WriteSubmitterApi + ?Sized,
{
    let mut attempt = 1;
    loop {
        let result = api.submit_write(spec, key).await;
        if !result.is_retryable() || attempt >= policy.max_attempts {
            return result;
        }

        let delay = policy.backoff_for(attempt);
        debug!(
            "[pw-submitter] Attempt {}/{} ambiguous, retrying in {:?}",
            attempt, policy.max_attempts, delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
