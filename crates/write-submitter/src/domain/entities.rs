//! # Domain Entities
//!
//! The write a caller asks for (`WriteSpec`), the unsigned operation built from
//! it (`WriteOperation`), the signed wire form (`StateTransition` /
//! `SignedPayload`), and the locally cached `PendingWrite`.

use super::outcome::RejectionReason;
use super::value_objects::{
    ContractId, DocumentId, FieldValue, IdentityId, OperationId, Timestamp,
};
use crate::algorithms::{canonical, derive_document_id, derive_operation_id};
use serde::{Deserialize, Serialize};
use shared_crypto::{sha256, CryptoError, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use std::collections::BTreeMap;

/// Longest accepted collection (document type) name.
pub const MAX_COLLECTION_NAME_LEN: usize = 64;

/// What kind of document write this is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteAction {
    /// Create a new document; its id is derived from the write content.
    Create,
    /// Replace an existing document at a known revision.
    Replace {
        /// Document being replaced
        document_id: DocumentId,
        /// Revision the replacement is based on
        revision: u64,
    },
    /// Delete an existing document.
    Delete {
        /// Document being deleted
        document_id: DocumentId,
    },
}

/// The fully specified content of one logical write.
///
/// Two specs with equal content always yield the same [`OperationId`], which is
/// what lets a retry be recognised as "the same write".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSpec {
    /// Create, replace or delete.
    pub action: WriteAction,
    /// Data contract defining the collection.
    pub contract_id: ContractId,
    /// Document type within the contract.
    pub collection: String,
    /// Identity that owns the document and signs the write.
    pub owner: IdentityId,
    /// Document fields, ordered by name.
    pub fields: BTreeMap<String, FieldValue>,
}

impl WriteSpec {
    /// Start a create in `collection`.
    pub fn create(contract_id: ContractId, collection: impl Into<String>, owner: IdentityId) -> Self {
        Self {
            action: WriteAction::Create,
            contract_id,
            collection: collection.into(),
            owner,
            fields: BTreeMap::new(),
        }
    }

    /// Start a replace of `document_id` based on `revision`.
    pub fn replace(
        contract_id: ContractId,
        collection: impl Into<String>,
        owner: IdentityId,
        document_id: DocumentId,
        revision: u64,
    ) -> Self {
        Self {
            action: WriteAction::Replace {
                document_id,
                revision,
            },
            ..Self::create(contract_id, collection, owner)
        }
    }

    /// Start a delete of `document_id`.
    pub fn delete(
        contract_id: ContractId,
        collection: impl Into<String>,
        owner: IdentityId,
        document_id: DocumentId,
    ) -> Self {
        Self {
            action: WriteAction::Delete { document_id },
            ..Self::create(contract_id, collection, owner)
        }
    }

    /// Set a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Deterministic id of this write.
    pub fn operation_id(&self) -> OperationId {
        derive_operation_id(self)
    }

    /// Document this write targets.
    pub fn document_id(&self) -> DocumentId {
        match &self.action {
            WriteAction::Create => derive_document_id(
                &self.contract_id,
                &self.owner,
                &self.collection,
                &self.operation_id(),
            ),
            WriteAction::Replace { document_id, .. } | WriteAction::Delete { document_id } => {
                *document_id
            }
        }
    }

    /// Local checks that would make the platform reject the write anyway.
    pub fn validate(&self) -> Result<(), RejectionReason> {
        if self.collection.is_empty() {
            return Err(RejectionReason::SchemaViolation(
                "collection name is empty".to_string(),
            ));
        }
        if self.collection.len() > MAX_COLLECTION_NAME_LEN {
            return Err(RejectionReason::SchemaViolation(format!(
                "collection name exceeds {} characters",
                MAX_COLLECTION_NAME_LEN
            )));
        }
        if self.collection.chars().any(char::is_whitespace) {
            return Err(RejectionReason::SchemaViolation(
                "collection name contains whitespace".to_string(),
            ));
        }
        for name in self.fields.keys() {
            if name.is_empty() {
                return Err(RejectionReason::SchemaViolation(
                    "field name is empty".to_string(),
                ));
            }
            // `$`-prefixed names are system fields set by the platform
            if name.starts_with('$') {
                return Err(RejectionReason::SchemaViolation(format!(
                    "field `{}` is reserved",
                    name
                )));
            }
        }
        if matches!(self.action, WriteAction::Delete { .. }) && !self.fields.is_empty() {
            return Err(RejectionReason::SchemaViolation(
                "delete carries no fields".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the unsigned operation.
    pub fn build_operation(&self) -> WriteOperation {
        WriteOperation {
            operation_id: self.operation_id(),
            document_id: self.document_id(),
            action: self.action.clone(),
            contract_id: self.contract_id,
            collection: self.collection.clone(),
            owner: self.owner,
            fields: self.fields.clone(),
        }
    }
}

/// An unsigned, fully resolved write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOperation {
    /// Deterministic operation id.
    pub operation_id: OperationId,
    /// Target document.
    pub document_id: DocumentId,
    /// Create, replace or delete.
    pub action: WriteAction,
    /// Data contract.
    pub contract_id: ContractId,
    /// Document type.
    pub collection: String,
    /// Owning identity.
    pub owner: IdentityId,
    /// Document fields.
    pub fields: BTreeMap<String, FieldValue>,
}

/// Signed write as transmitted to the platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    /// The operation being authorised.
    pub operation: WriteOperation,
    /// Per-identity sequence this write consumes.
    pub sequence: u64,
    /// Key that produced `signature`.
    pub public_key: [u8; 32],
    /// Ed25519 signature over the canonical signable bytes.
    pub signature: Vec<u8>,
}

impl StateTransition {
    /// Sign `operation` at `sequence` with `key`.
    pub fn sign(operation: WriteOperation, sequence: u64, key: &Ed25519KeyPair) -> Self {
        let public_key = *key.public_key().as_bytes();
        let message = canonical::signable_bytes(&operation, sequence, &public_key);
        let signature = key.sign(&message).as_bytes().to_vec();
        Self {
            operation,
            sequence,
            public_key,
            signature,
        }
    }

    /// Verify the embedded signature.
    pub fn verify(&self) -> Result<(), CryptoError> {
        let public_key = Ed25519PublicKey::from_bytes(self.public_key)?;
        let signature = Ed25519Signature::from_slice(&self.signature)?;
        let message = canonical::signable_bytes(&self.operation, self.sequence, &self.public_key);
        public_key.verify(&message, &signature)
    }

    /// Wire encoding.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Opaque signed bytes ready for transmission, with the metadata needed to
/// track them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedPayload {
    /// Operation the bytes authorise.
    pub operation_id: OperationId,
    /// Target document.
    pub document_id: DocumentId,
    /// Signing identity.
    pub identity: IdentityId,
    /// Sequence consumed by the bytes.
    pub sequence: u64,
    /// Encoded `StateTransition`.
    pub bytes: Vec<u8>,
}

impl SignedPayload {
    /// Hash the platform uses to refer to this exact payload.
    pub fn transition_hash(&self) -> [u8; 32] {
        sha256(&self.bytes)
    }
}

/// A signed write that has not been confirmed yet.
///
/// At most one exists per `operation_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    /// Operation the payload authorises.
    pub operation_id: OperationId,
    /// Target document.
    pub document_id: DocumentId,
    /// Signing identity.
    pub identity: IdentityId,
    /// Sequence the payload consumed.
    pub sequence: u64,
    /// Opaque signed bytes, replayed verbatim on retry.
    pub signed_payload: Vec<u8>,
    /// When the payload was cached.
    pub cached_at: Timestamp,
}

impl PendingWrite {
    /// Cache record for a freshly signed payload.
    pub fn new(payload: &SignedPayload, cached_at: Timestamp) -> Self {
        Self {
            operation_id: payload.operation_id,
            document_id: payload.document_id,
            identity: payload.identity,
            sequence: payload.sequence,
            signed_payload: payload.bytes.clone(),
            cached_at,
        }
    }

    /// The payload to replay.
    pub fn to_signed_payload(&self) -> SignedPayload {
        SignedPayload {
            operation_id: self.operation_id,
            document_id: self.document_id,
            identity: self.identity,
            sequence: self.sequence,
            bytes: self.signed_payload.clone(),
        }
    }

    /// Display-friendly view without the payload bytes.
    pub fn summary(&self) -> PendingWriteSummary {
        PendingWriteSummary {
            operation_id: self.operation_id,
            document_id: self.document_id,
            identity: self.identity,
            sequence: self.sequence,
            cached_at: self.cached_at,
        }
    }
}

/// What UIs show for a submission still in progress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWriteSummary {
    /// Operation id.
    pub operation_id: OperationId,
    /// Target document.
    pub document_id: DocumentId,
    /// Signing identity.
    pub identity: IdentityId,
    /// Sequence consumed.
    pub sequence: u64,
    /// When it was cached.
    pub cached_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_spec(text: &str) -> WriteSpec {
        WriteSpec::create(
            ContractId::from_bytes([9; 32]),
            "note",
            IdentityId::from_bytes([0xAA; 32]),
        )
        .field("text", text)
    }

    #[test]
    fn test_create_document_id_is_derived() {
        let spec = note_spec("hello");
        assert_eq!(spec.document_id(), note_spec("hello").document_id());
        assert_ne!(spec.document_id(), note_spec("bye").document_id());
    }

    #[test]
    fn test_replace_uses_given_document_id() {
        let doc = DocumentId::from_bytes([5; 32]);
        let spec = WriteSpec::replace(
            ContractId::from_bytes([9; 32]),
            "note",
            IdentityId::from_bytes([0xAA; 32]),
            doc,
            2,
        )
        .field("text", "edited");
        assert_eq!(spec.document_id(), doc);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_reserved_field() {
        let spec = note_spec("x").field("$ownerId", "me");
        assert!(matches!(
            spec.validate(),
            Err(RejectionReason::SchemaViolation(msg)) if msg.contains("reserved")
        ));
    }

    #[test]
    fn test_validate_rejects_bad_collection() {
        let mut spec = note_spec("x");
        spec.collection = String::new();
        assert!(spec.validate().is_err());
        spec.collection = "my notes".into();
        assert!(spec.validate().is_err());
        spec.collection = "n".repeat(MAX_COLLECTION_NAME_LEN + 1);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_delete_with_fields() {
        let spec = WriteSpec::delete(
            ContractId::from_bytes([9; 32]),
            "note",
            IdentityId::from_bytes([0xAA; 32]),
            DocumentId::from_bytes([1; 32]),
        );
        assert!(spec.validate().is_ok());
        assert!(spec.field("text", "x").validate().is_err());
    }

    #[test]
    fn test_state_transition_sign_verify() {
        let key = Ed25519KeyPair::from_seed([4; 32]);
        let transition = StateTransition::sign(note_spec("hello").build_operation(), 1, &key);
        assert!(transition.verify().is_ok());

        let mut tampered = transition.clone();
        tampered.sequence = 2;
        assert!(tampered.verify().is_err());
    }

    #[test]
    fn test_state_transition_wire_roundtrip() {
        let key = Ed25519KeyPair::from_seed([4; 32]);
        let transition = StateTransition::sign(note_spec("hello").build_operation(), 7, &key);
        let decoded = StateTransition::decode(&transition.encode().unwrap()).unwrap();
        assert_eq!(decoded, transition);
        assert!(StateTransition::decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_pending_write_replays_identical_bytes() {
        let payload = SignedPayload {
            operation_id: OperationId::from_bytes([1; 32]),
            document_id: DocumentId::from_bytes([2; 32]),
            identity: IdentityId::from_bytes([3; 32]),
            sequence: 4,
            bytes: vec![1, 2, 3, 4],
        };
        let pending = PendingWrite::new(&payload, 1_000);
        assert_eq!(pending.to_signed_payload(), payload);
        assert_eq!(pending.summary().sequence, 4);
    }
}
