//! # Inbound Ports
//!
//! API trait defining what the write submitter can do.

use crate::domain::{OperationId, PendingWriteSummary, RetryPolicy, WriteResult, WriteSpec};
use async_trait::async_trait;
use shared_crypto::Ed25519KeyPair;
use tokio_util::sync::CancellationToken;

/// Write submitter API - inbound port.
///
/// Every method is safe to call concurrently. Calls for the same operation id
/// are serialized; calls for different ids proceed in parallel.
#[async_trait]
pub trait WriteSubmitterApi: Send + Sync {
    /// Submit a write at most once, replaying cached signed bytes if a
    /// previous attempt ended ambiguously.
    async fn submit_write(&self, spec: &WriteSpec, key: &Ed25519KeyPair) -> WriteResult;

    /// As `submit_write`, but network waits end early when `cancel` fires.
    ///
    /// Cancellation after persistence leaves the entry cached.
    async fn submit_write_cancellable(
        &self,
        spec: &WriteSpec,
        key: &Ed25519KeyPair,
        cancel: &CancellationToken,
    ) -> WriteResult;

    /// Repeat `submit_write` with backoff while the outcome is ambiguous.
    async fn submit_with_retry(
        &self,
        spec: &WriteSpec,
        key: &Ed25519KeyPair,
        policy: &RetryPolicy,
    ) -> WriteResult;

    /// Writes currently signed but not known to be final.
    fn pending_writes(&self) -> Vec<PendingWriteSummary>;

    /// Apply retention and count limits. Returns the number of entries removed.
    fn purge_expired(&self) -> usize;

    /// Drop the cached payload for `operation_id`. Returns whether one existed.
    fn forget(&self, operation_id: &OperationId) -> bool;
}
