//! # Idempotent Write Submitter
//!
//! ## Submission Flow
//!
//! ```text
//! validate ─→ lock(operation_id) ─→ cached? ──yes──→ replay cached bytes ──┐
//!                                     │ no                                  │
//!                                     ▼                                     │
//!                              already on platform? ──yes──→ Confirmed      │
//!                                     │ no                                  │
//!                                     ▼                                     │
//!                    fetch sequence → sign → persist → broadcast ───────────┤
//!                                                                           ▼
//!                                                  await confirmation (bounded)
//! ```
//!
//! | Outcome | Cache entry |
//! |---------|-------------|
//! | `Confirmed` | removed |
//! | `Rejected` | removed |
//! | `Ambiguous` | kept, replayed verbatim on the next call |
//!
//! Signed bytes are always persisted before they leave the device, so a
//! retry after an ambiguous outcome can never consume a second sequence for
//! the same logical write.

use super::locks::OperationLocks;
use super::retry;
use crate::adapters::infra::SystemTimeSource;
use crate::algorithms::{decode_pending, encode_pending};
use crate::domain::{
    AmbiguityReason, ChannelError, ConfirmationSource, ConfirmedWrite, ExpiryPolicy, OperationId,
    PendingWrite, PendingWriteSummary, RetryPolicy, SignedPayload, StoreError, SubmissionState,
    SubmitterConfig, WriteResult, WriteSpec, PENDING_KEY_PREFIX,
};
use crate::ports::inbound::WriteSubmitterApi;
use crate::ports::outbound::{
    BroadcastAck, PendingWriteStore, SequencedWriteChannel, StoredBlob, TimeSource,
};
use async_trait::async_trait;
use shared_crypto::Ed25519KeyPair;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a network step did not produce a value.
enum Interrupted {
    Cancelled,
    Failed(ChannelError),
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, Interrupted>
where
    F: Future<Output = Result<T, ChannelError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        result = fut => result.map_err(Interrupted::Failed),
    }
}

/// Move `state` to `next`, logging the step.
fn advance(operation_id: &OperationId, state: &mut SubmissionState, next: SubmissionState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal transition {:?} -> {:?}",
        state,
        next
    );
    debug!("[pw-submitter] {} {:?} → {:?}", operation_id, state, next);
    *state = next;
}

/// Submits document writes at most once per logical operation.
pub struct IdempotentWriteSubmitter {
    channel: Arc<dyn SequencedWriteChannel>,
    store: Arc<dyn PendingWriteStore>,
    time: Arc<dyn TimeSource>,
    config: SubmitterConfig,
    expiry: ExpiryPolicy,
    locks: OperationLocks,
}

impl IdempotentWriteSubmitter {
    /// Create a submitter using the system clock.
    pub fn new(
        channel: Arc<dyn SequencedWriteChannel>,
        store: Arc<dyn PendingWriteStore>,
        config: SubmitterConfig,
    ) -> Self {
        Self::with_time_source(channel, store, Arc::new(SystemTimeSource), config)
    }

    /// Create a submitter with an injected clock.
    pub fn with_time_source(
        channel: Arc<dyn SequencedWriteChannel>,
        store: Arc<dyn PendingWriteStore>,
        time: Arc<dyn TimeSource>,
        config: SubmitterConfig,
    ) -> Self {
        let expiry = ExpiryPolicy::from_config(&config);
        Self {
            channel,
            store,
            time,
            config,
            expiry,
            locks: OperationLocks::new(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// Submit `spec`, aborting network waits when `cancel` fires.
    pub async fn submit(
        &self,
        spec: &WriteSpec,
        key: &Ed25519KeyPair,
        cancel: &CancellationToken,
    ) -> WriteResult {
        let mut state = SubmissionState::Unstarted;
        let result = self.run(spec, key, cancel, &mut state).await;
        advance(&spec.operation_id(), &mut state, result.state());
        result
    }

    async fn run(
        &self,
        spec: &WriteSpec,
        key: &Ed25519KeyPair,
        cancel: &CancellationToken,
        state: &mut SubmissionState,
    ) -> WriteResult {
        if let Err(reason) = spec.validate() {
            warn!("[pw-submitter] ❌ Write refused locally: {}", reason);
            return WriteResult::Rejected(reason);
        }

        let operation_id = spec.operation_id();
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return WriteResult::Ambiguous(AmbiguityReason::Cancelled),
            guard = self.locks.acquire(operation_id) => guard,
        };

        if let Some(pending) = self.load_pending(&operation_id) {
            info!(
                "[pw-submitter] 🔁 Replaying cached write {} (sequence {})",
                operation_id, pending.sequence
            );
            // An earlier call never learned the outcome of these bytes
            *state = SubmissionState::Ambiguous;
            advance(&operation_id, state, SubmissionState::SignedAndCached);
            return self.transmit(pending.to_signed_payload(), cancel).await;
        }

        let document_id = spec.document_id();
        match cancellable(cancel, self.channel.lookup_write(&operation_id, &document_id)).await {
            Ok(Some(confirmed)) => {
                info!(
                    "[pw-submitter] ✅ Write {} already on platform, nothing to sign",
                    operation_id
                );
                // An entry we failed to read may still be on disk
                self.discard(&operation_id.storage_key());
                return WriteResult::Confirmed(confirmed);
            }
            Ok(None) => {}
            Err(Interrupted::Cancelled) => {
                return WriteResult::Ambiguous(AmbiguityReason::Cancelled)
            }
            Err(Interrupted::Failed(e)) => {
                warn!(
                    "[pw-submitter] ⚠️ Existence check for {} failed: {}",
                    operation_id, e
                );
                return WriteResult::Ambiguous(AmbiguityReason::ExistenceCheckFailed(
                    e.to_string(),
                ));
            }
        }

        let sequence = match cancellable(cancel, self.channel.fetch_next_sequence(&spec.owner)).await
        {
            Ok(sequence) => sequence,
            Err(Interrupted::Cancelled) => {
                return WriteResult::Ambiguous(AmbiguityReason::Cancelled)
            }
            Err(Interrupted::Failed(e)) => {
                warn!(
                    "[pw-submitter] ⚠️ Could not fetch sequence for {}: {}",
                    spec.owner, e
                );
                return e.classify();
            }
        };

        let payload = match self.channel.sign(&spec.build_operation(), key, sequence) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("[pw-submitter] ❌ Signing {} failed: {}", operation_id, e);
                return e.classify();
            }
        };

        let pending = PendingWrite::new(&payload, self.time.now());
        if let Err(e) = self.persist(&pending) {
            warn!(
                "[pw-submitter] ⚠️ Could not cache {} before broadcast, not sending: {}",
                operation_id, e
            );
            return WriteResult::Ambiguous(AmbiguityReason::LocalStoreUnavailable(e.to_string()));
        }
        info!(
            "[pw-submitter] 💾 Cached signed write {} (sequence {})",
            operation_id, sequence
        );
        advance(&operation_id, state, SubmissionState::SignedAndCached);

        self.transmit(payload, cancel).await
    }

    /// Broadcast cached bytes and wait for the outcome.
    async fn transmit(&self, payload: SignedPayload, cancel: &CancellationToken) -> WriteResult {
        let ack = match cancellable(cancel, self.channel.broadcast(&payload)).await {
            Ok(ack) => ack,
            Err(interrupted) => return self.settle_failure(&payload, interrupted),
        };

        let confirmed = match ack {
            BroadcastAck::AlreadyProcessed => ConfirmedWrite {
                operation_id: payload.operation_id,
                document_id: payload.document_id,
                sequence: Some(payload.sequence),
                block_height: None,
                source: ConfirmationSource::AlreadyProcessed,
            },
            BroadcastAck::Accepted => {
                let timeout = self.config.confirmation_timeout();
                let wait = async {
                    tokio::time::timeout(timeout, self.channel.await_confirmation(&payload, timeout))
                        .await
                        .unwrap_or(Err(ChannelError::Timeout))
                };
                match cancellable(cancel, wait).await {
                    Ok(confirmed) => confirmed,
                    Err(interrupted) => return self.settle_failure(&payload, interrupted),
                }
            }
        };

        self.discard(&payload.operation_id.storage_key());
        info!(
            "[pw-submitter] ✅ Write {} confirmed ({:?})",
            payload.operation_id, confirmed.source
        );
        self.purge_expired_entries();
        WriteResult::Confirmed(confirmed)
    }

    /// Classify a failed network step and apply its cache rule.
    fn settle_failure(&self, payload: &SignedPayload, interrupted: Interrupted) -> WriteResult {
        let result = match interrupted {
            Interrupted::Cancelled => WriteResult::Ambiguous(AmbiguityReason::Cancelled),
            Interrupted::Failed(e) => e.classify(),
        };

        match &result {
            WriteResult::Rejected(reason) => {
                self.discard(&payload.operation_id.storage_key());
                info!(
                    "[pw-submitter] ❌ Write {} rejected: {}",
                    payload.operation_id, reason
                );
            }
            WriteResult::Ambiguous(reason) => {
                warn!(
                    "[pw-submitter] ⏳ Write {} outcome unknown ({}), keeping cached bytes",
                    payload.operation_id, reason
                );
            }
            WriteResult::Confirmed(_) => {}
        }
        result
    }

    /// Cached entry for `operation_id`, if usable.
    ///
    /// Unreadable, mismatched and expired entries are misses; the latter two
    /// are removed.
    fn load_pending(&self, operation_id: &OperationId) -> Option<PendingWrite> {
        let key = operation_id.storage_key();
        let blob = match self.store.load(&key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                warn!(
                    "[pw-submitter] ⚠️ Pending store read failed for {}: {}",
                    operation_id, e
                );
                return None;
            }
        };

        let pending = match decode_pending(&blob.bytes) {
            Ok(pending) => pending,
            Err(e) => {
                warn!("[pw-submitter] ⚠️ Discarding unreadable entry {}: {}", key, e);
                self.discard(&key);
                return None;
            }
        };

        if pending.operation_id != *operation_id {
            warn!(
                "[pw-submitter] ⚠️ Entry {} holds operation {}, discarding",
                key, pending.operation_id
            );
            self.discard(&key);
            return None;
        }

        if self.expiry.is_expired(pending.cached_at, self.time.now()) {
            info!(
                "[pw-submitter] 🗑️ Cached write {} expired, signing afresh",
                operation_id
            );
            self.discard(&key);
            return None;
        }

        Some(pending)
    }

    fn persist(&self, pending: &PendingWrite) -> Result<(), StoreError> {
        let bytes = encode_pending(pending)?;
        self.store.save(
            &pending.operation_id.storage_key(),
            StoredBlob {
                bytes,
                cached_at: pending.cached_at,
            },
        )
    }

    /// Best-effort removal.
    fn discard(&self, key: &str) -> bool {
        match self.store.remove(key) {
            Ok(existed) => existed,
            Err(e) => {
                warn!("[pw-submitter] ⚠️ Could not remove {}: {}", key, e);
                false
            }
        }
    }

    /// Apply the expiry policy, skipping entries with a submission in flight.
    fn purge_expired_entries(&self) -> usize {
        let entries = match self.store.list() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("[pw-submitter] ⚠️ Could not list pending writes: {}", e);
                return 0;
            }
        };
        let entries: Vec<_> = entries
            .into_iter()
            .filter(|entry| entry.key.starts_with(PENDING_KEY_PREFIX))
            .collect();

        let mut removed = 0;
        for key in self.expiry.select_evictions(&entries, self.time.now()) {
            let in_flight = OperationId::from_storage_key(&key)
                .map(|id| self.locks.is_held(&id))
                .unwrap_or(false);
            if in_flight {
                debug!("[pw-submitter] Skipping eviction of in-flight {}", key);
                continue;
            }
            if self.discard(&key) {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("[pw-submitter] 🗑️ Evicted {} cached writes", removed);
        }
        removed
    }
}

#[async_trait]
impl WriteSubmitterApi for IdempotentWriteSubmitter {
    async fn submit_write(&self, spec: &WriteSpec, key: &Ed25519KeyPair) -> WriteResult {
        self.submit(spec, key, &CancellationToken::new()).await
    }

    async fn submit_write_cancellable(
        &self,
        spec: &WriteSpec,
        key: &Ed25519KeyPair,
        cancel: &CancellationToken,
    ) -> WriteResult {
        self.submit(spec, key, cancel).await
    }

    async fn submit_with_retry(
        &self,
        spec: &WriteSpec,
        key: &Ed25519KeyPair,
        policy: &RetryPolicy,
    ) -> WriteResult {
        retry::submit_with_retry(self, spec, key, policy).await
    }

    fn pending_writes(&self) -> Vec<PendingWriteSummary> {
        let entries = match self.store.list() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("[pw-submitter] ⚠️ Could not list pending writes: {}", e);
                return Vec::new();
            }
        };

        let mut summaries: Vec<PendingWriteSummary> = entries
            .iter()
            .filter(|entry| entry.key.starts_with(PENDING_KEY_PREFIX))
            .filter_map(|entry| match self.store.load(&entry.key) {
                Ok(Some(blob)) => decode_pending(&blob.bytes).ok(),
                _ => None,
            })
            .map(|pending| pending.summary())
            .collect();
        summaries.sort_by(|a, b| {
            a.cached_at
                .cmp(&b.cached_at)
                .then_with(|| a.operation_id.cmp(&b.operation_id))
        });
        summaries
    }

    fn purge_expired(&self) -> usize {
        self.purge_expired_entries()
    }

    fn forget(&self, operation_id: &OperationId) -> bool {
        let forgotten = self.discard(&operation_id.storage_key());
        if forgotten {
            info!("[pw-submitter] 🗑️ Forgot cached write {}", operation_id);
        }
        forgotten
    }
}
