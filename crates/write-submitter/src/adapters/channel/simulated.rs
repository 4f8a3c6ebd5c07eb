//! In-process write-acceptance service.
//!
//! Enforces what a real platform enforces for the submitter's purposes:
//! strictly increasing per-identity sequences, Ed25519 signatures from the
//! registered key, and document existence rules. Faults can be scripted to
//! reproduce every ambiguous path.

use crate::domain::{
    ChannelError, ConfirmationSource, ConfirmedWrite, DocumentId, IdentityId, OperationId,
    RejectionReason, SignedPayload, StateTransition, WriteAction, WriteOperation,
};
use crate::ports::outbound::{sign_operation, BroadcastAck, SequencedWriteChannel};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_crypto::{Ed25519KeyPair, Ed25519PublicKey};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Scripted failure, consumed by the first call it applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Existence lookup fails with a transport error.
    FailLookup,
    /// Sequence fetch fails with a transport error.
    FailSequenceFetch,
    /// Broadcast never reaches the platform.
    LoseBroadcast,
    /// Broadcast is accepted but the response is lost.
    DropBroadcastResponse,
    /// Broadcast is refused with the given reason.
    RejectBroadcast(RejectionReason),
    /// Confirmation wait reports a timeout although the write may be accepted.
    DropConfirmation,
    /// Confirmation wait never returns.
    StallConfirmation,
}

impl Fault {
    fn stage(&self) -> Stage {
        match self {
            Self::FailLookup => Stage::Lookup,
            Self::FailSequenceFetch => Stage::Sequence,
            Self::LoseBroadcast | Self::DropBroadcastResponse | Self::RejectBroadcast(_) => {
                Stage::Broadcast
            }
            Self::DropConfirmation | Self::StallConfirmation => Stage::Confirmation,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    Lookup,
    Sequence,
    Broadcast,
    Confirmation,
}

struct IdentityRecord {
    public_key: [u8; 32],
    last_sequence: u64,
}

#[derive(Clone)]
struct AcceptedWrite {
    document_id: DocumentId,
    sequence: u64,
    block_height: u64,
}

#[derive(Default)]
struct PlatformState {
    identities: HashMap<IdentityId, IdentityRecord>,
    /// Accepted writes by operation id.
    accepted: HashMap<OperationId, AcceptedWrite>,
    /// Payload digest to operation id.
    digests: HashMap<[u8; 32], OperationId>,
    /// Live documents with their current revision.
    documents: HashMap<DocumentId, u64>,
    faults: VecDeque<Fault>,
    height: u64,
}

impl PlatformState {
    fn take_fault(&mut self, stage: Stage) -> Option<Fault> {
        let index = self.faults.iter().position(|f| f.stage() == stage)?;
        self.faults.remove(index)
    }

    fn confirmed(&self, operation_id: &OperationId, source: ConfirmationSource) -> Option<ConfirmedWrite> {
        self.accepted.get(operation_id).map(|write| ConfirmedWrite {
            operation_id: *operation_id,
            document_id: write.document_id,
            sequence: Some(write.sequence),
            block_height: Some(write.block_height),
            source,
        })
    }

    /// Validate and apply a transition, or refuse it.
    fn apply(&mut self, transition: &StateTransition, digest: [u8; 32]) -> Result<(), RejectionReason> {
        let operation = &transition.operation;

        let record = self
            .identities
            .get(&operation.owner)
            .ok_or_else(|| RejectionReason::Unauthorized("unknown identity".to_string()))?;

        if record.public_key != transition.public_key || transition.verify().is_err() {
            return Err(RejectionReason::InvalidSignature);
        }

        let expected = record.last_sequence + 1;
        if transition.sequence != expected {
            return Err(RejectionReason::InvalidSequence {
                expected,
                actual: transition.sequence,
            });
        }

        self.apply_document(operation)?;

        if let Some(record) = self.identities.get_mut(&operation.owner) {
            record.last_sequence = transition.sequence;
        }
        self.height += 1;
        self.accepted.insert(
            operation.operation_id,
            AcceptedWrite {
                document_id: operation.document_id,
                sequence: transition.sequence,
                block_height: self.height,
            },
        );
        self.digests.insert(digest, operation.operation_id);
        Ok(())
    }

    fn apply_document(&mut self, operation: &WriteOperation) -> Result<(), RejectionReason> {
        match &operation.action {
            WriteAction::Create => {
                if self.documents.contains_key(&operation.document_id) {
                    return Err(RejectionReason::DocumentConflict(format!(
                        "document {} already exists",
                        operation.document_id
                    )));
                }
                self.documents.insert(operation.document_id, 1);
            }
            WriteAction::Replace {
                document_id,
                revision,
            } => {
                let current = self
                    .documents
                    .get_mut(document_id)
                    .ok_or_else(|| RejectionReason::Other(format!("document {} not found", document_id)))?;
                if *current != *revision {
                    return Err(RejectionReason::DocumentConflict(format!(
                        "document {} is at revision {}, not {}",
                        document_id, current, revision
                    )));
                }
                *current += 1;
            }
            WriteAction::Delete { document_id } => {
                if self.documents.remove(document_id).is_none() {
                    return Err(RejectionReason::Other(format!(
                        "document {} not found",
                        document_id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Simulated platform implementing `SequencedWriteChannel`.
#[derive(Default)]
pub struct SimulatedPlatform {
    state: Mutex<PlatformState>,
    lookups: AtomicUsize,
    sequence_fetches: AtomicUsize,
    sign_calls: AtomicUsize,
    broadcasts: AtomicUsize,
}

impl SimulatedPlatform {
    /// Empty platform with no identities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity for `public_key`, returning its id.
    pub fn register_identity(&self, public_key: &Ed25519PublicKey) -> IdentityId {
        let identity = IdentityId::from_public_key(public_key);
        self.state.lock().identities.insert(
            identity,
            IdentityRecord {
                public_key: *public_key.as_bytes(),
                last_sequence: 0,
            },
        );
        identity
    }

    /// Queue a fault.
    pub fn inject(&self, fault: Fault) {
        self.state.lock().faults.push_back(fault);
    }

    /// Faults not yet consumed.
    pub fn pending_faults(&self) -> usize {
        self.state.lock().faults.len()
    }

    /// Consume a sequence number as if another device had written.
    pub fn consume_sequence(&self, identity: &IdentityId) {
        if let Some(record) = self.state.lock().identities.get_mut(identity) {
            record.last_sequence += 1;
        }
    }

    /// Last sequence accepted for `identity`.
    pub fn last_sequence(&self, identity: &IdentityId) -> Option<u64> {
        self.state
            .lock()
            .identities
            .get(identity)
            .map(|r| r.last_sequence)
    }

    /// Whether `operation_id` has been accepted.
    pub fn has_accepted(&self, operation_id: &OperationId) -> bool {
        self.state.lock().accepted.contains_key(operation_id)
    }

    /// Number of accepted writes.
    pub fn accepted_count(&self) -> usize {
        self.state.lock().accepted.len()
    }

    /// Whether a live document exists.
    pub fn document_exists(&self, document_id: &DocumentId) -> bool {
        self.state.lock().documents.contains_key(document_id)
    }

    /// Existence lookups served.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Sequence fetches served.
    pub fn sequence_fetches(&self) -> usize {
        self.sequence_fetches.load(Ordering::SeqCst)
    }

    /// Payloads signed.
    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    /// Broadcasts received, including faulted ones.
    pub fn broadcasts(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SequencedWriteChannel for SimulatedPlatform {
    async fn lookup_write(
        &self,
        operation_id: &OperationId,
        _document_id: &DocumentId,
    ) -> Result<Option<ConfirmedWrite>, ChannelError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.take_fault(Stage::Lookup).is_some() {
            return Err(ChannelError::Transport("lookup failed".to_string()));
        }
        Ok(state.confirmed(operation_id, ConfirmationSource::ExistenceCheck))
    }

    async fn fetch_next_sequence(&self, identity: &IdentityId) -> Result<u64, ChannelError> {
        self.sequence_fetches.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.take_fault(Stage::Sequence).is_some() {
            return Err(ChannelError::Transport("sequence fetch failed".to_string()));
        }
        state
            .identities
            .get(identity)
            .map(|r| r.last_sequence + 1)
            .ok_or_else(|| {
                ChannelError::Rejected(RejectionReason::Unauthorized(
                    "unknown identity".to_string(),
                ))
            })
    }

    fn sign(
        &self,
        operation: &WriteOperation,
        key: &Ed25519KeyPair,
        sequence: u64,
    ) -> Result<SignedPayload, ChannelError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        sign_operation(operation, key, sequence)
    }

    async fn broadcast(&self, payload: &SignedPayload) -> Result<BroadcastAck, ChannelError> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        let digest = payload.transition_hash();
        let mut state = self.state.lock();

        let fault = state.take_fault(Stage::Broadcast);
        match &fault {
            Some(Fault::LoseBroadcast) => {
                return Err(ChannelError::Transport("connection reset".to_string()))
            }
            Some(Fault::RejectBroadcast(reason)) => {
                return Err(ChannelError::Rejected(reason.clone()))
            }
            _ => {}
        }

        if state.digests.contains_key(&digest) {
            debug!("[pw-submitter] simulated platform saw payload before");
            return Ok(BroadcastAck::AlreadyProcessed);
        }

        let transition = StateTransition::decode(&payload.bytes)
            .map_err(|e| ChannelError::Rejected(RejectionReason::Other(format!("undecodable payload: {}", e))))?;
        state
            .apply(&transition, digest)
            .map_err(ChannelError::Rejected)?;

        if fault == Some(Fault::DropBroadcastResponse) {
            return Err(ChannelError::Timeout);
        }
        Ok(BroadcastAck::Accepted)
    }

    async fn await_confirmation(
        &self,
        payload: &SignedPayload,
        _timeout: Duration,
    ) -> Result<ConfirmedWrite, ChannelError> {
        let fault = self.state.lock().take_fault(Stage::Confirmation);
        match fault {
            Some(Fault::StallConfirmation) => return std::future::pending().await,
            Some(_) => return Err(ChannelError::Timeout),
            None => {}
        }

        let state = self.state.lock();
        let operation_id = state.digests.get(&payload.transition_hash()).copied();
        // An unseen payload never confirms; a real wait would run out
        operation_id
            .and_then(|id| state.confirmed(&id, ConfirmationSource::Broadcast))
            .ok_or(ChannelError::Timeout)
    }
}
