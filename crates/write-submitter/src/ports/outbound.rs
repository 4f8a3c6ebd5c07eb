//! # Outbound Ports
//!
//! Dependencies the submitter needs from its host: the remote
//! write-acceptance service, a local persistent byte store, and a clock.

use crate::domain::{
    ChannelError, ConfirmedWrite, DocumentId, IdentityId, OperationId, SignedPayload,
    StateTransition, StoreError, Timestamp, WriteOperation,
};
use async_trait::async_trait;
use shared_crypto::Ed25519KeyPair;
use std::time::Duration;

/// Positive answer to a broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BroadcastAck {
    /// Payload accepted for processing; await confirmation.
    Accepted,
    /// This exact write is already final.
    AlreadyProcessed,
}

/// Narrow interface over a consensus-backed write service that orders writes
/// by a strictly increasing per-identity sequence.
///
/// Production: `JsonRpcWriteChannel`
/// Testing: `SimulatedPlatform`
#[async_trait]
pub trait SequencedWriteChannel: Send + Sync {
    /// Look up a previously accepted write by its derived ids.
    async fn lookup_write(
        &self,
        operation_id: &OperationId,
        document_id: &DocumentId,
    ) -> Result<Option<ConfirmedWrite>, ChannelError>;

    /// Next unused sequence for `identity`.
    async fn fetch_next_sequence(&self, identity: &IdentityId) -> Result<u64, ChannelError>;

    /// Sign `operation` at `sequence`.
    fn sign(
        &self,
        operation: &WriteOperation,
        key: &Ed25519KeyPair,
        sequence: u64,
    ) -> Result<SignedPayload, ChannelError> {
        sign_operation(operation, key, sequence)
    }

    /// Transmit signed bytes.
    async fn broadcast(&self, payload: &SignedPayload) -> Result<BroadcastAck, ChannelError>;

    /// Wait until the broadcast payload is final or refused.
    async fn await_confirmation(
        &self,
        payload: &SignedPayload,
        timeout: Duration,
    ) -> Result<ConfirmedWrite, ChannelError>;
}

/// Ed25519 signing of the canonical payload, wrapped as a `StateTransition`.
pub fn sign_operation(
    operation: &WriteOperation,
    key: &Ed25519KeyPair,
    sequence: u64,
) -> Result<SignedPayload, ChannelError> {
    let transition = StateTransition::sign(operation.clone(), sequence, key);
    let bytes = transition
        .encode()
        .map_err(|e| ChannelError::Signing(e.to_string()))?;

    Ok(SignedPayload {
        operation_id: operation.operation_id,
        document_id: operation.document_id,
        identity: operation.owner,
        sequence,
        bytes,
    })
}

/// A stored blob with the time it was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlob {
    /// Opaque bytes.
    pub bytes: Vec<u8>,
    /// When the blob was cached.
    pub cached_at: Timestamp,
}

/// Key and timestamp of a stored blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredEntry {
    /// Store key.
    pub key: String,
    /// When the blob was cached.
    pub cached_at: Timestamp,
}

/// String-keyed byte-blob store with timestamps, local to the device.
///
/// Production: `FileBackedPendingStore`
/// Testing: `InMemoryPendingStore`
pub trait PendingWriteStore: Send + Sync {
    /// Read a blob.
    fn load(&self, key: &str) -> Result<Option<StoredBlob>, StoreError>;

    /// Write a blob, replacing any previous value. Must be durable on return.
    fn save(&self, key: &str, blob: StoredBlob) -> Result<(), StoreError>;

    /// Delete a blob. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// All keys with their timestamps.
    fn list(&self) -> Result<Vec<StoredEntry>, StoreError>;
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Returns the current timestamp in milliseconds.
    fn now(&self) -> Timestamp;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContractId, IdentityId, WriteSpec};

    fn _assert_object_safe(_: &dyn SequencedWriteChannel, _: &dyn PendingWriteStore) {}

    #[test]
    fn test_sign_operation_carries_metadata() {
        let key = Ed25519KeyPair::from_seed([8; 32]);
        let owner = IdentityId::from_public_key(&key.public_key());
        let spec = WriteSpec::create(ContractId::from_bytes([1; 32]), "note", owner).field("text", "hi");
        let operation = spec.build_operation();

        let payload = sign_operation(&operation, &key, 3).unwrap();
        assert_eq!(payload.operation_id, spec.operation_id());
        assert_eq!(payload.identity, owner);
        assert_eq!(payload.sequence, 3);

        let transition = StateTransition::decode(&payload.bytes).unwrap();
        assert!(transition.verify().is_ok());
        assert_eq!(transition.sequence, 3);
    }

    #[test]
    fn test_signing_is_deterministic_per_sequence() {
        let key = Ed25519KeyPair::from_seed([8; 32]);
        let spec = WriteSpec::create(ContractId::from_bytes([1; 32]), "note", IdentityId::from_bytes([2; 32]));
        let operation = spec.build_operation();

        let a = sign_operation(&operation, &key, 1).unwrap();
        let b = sign_operation(&operation, &key, 1).unwrap();
        let c = sign_operation(&operation, &key, 2).unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_ne!(a.bytes, c.bytes);
    }
}
