//! # Domain Value Objects
//!
//! Immutable identifiers, field values and the per-operation state machine.

use serde::{Deserialize, Serialize};
use shared_crypto::{tagged_hash, Ed25519PublicKey, Hash};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp in milliseconds since UNIX epoch.
pub type Timestamp = u64;

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Hash);

        impl $name {
            /// Wrap raw bytes.
            pub const fn from_bytes(bytes: Hash) -> Self {
                Self(bytes)
            }

            /// Raw bytes.
            pub fn as_bytes(&self) -> &Hash {
                &self.0
            }

            /// Parse from 64 hex characters.
            pub fn from_hex(value: &str) -> Option<Self> {
                let bytes = hex::decode(value.trim()).ok()?;
                let array: Hash = bytes.try_into().ok()?;
                Some(Self(array))
            }

            /// Lowercase hex rendering.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}..)", stringify!($name), &self.to_hex()[..12])
            }
        }
    };
}

hash_id!(
    /// Deterministic id of one logical write, derived from its content.
    OperationId
);

hash_id!(
    /// Identity that owns and signs a write.
    IdentityId
);

hash_id!(
    /// Data contract the target collection belongs to.
    ContractId
);

hash_id!(
    /// Platform document id.
    DocumentId
);

/// Prefix of every pending-write key in the local store.
pub const PENDING_KEY_PREFIX: &str = "pending/";

impl OperationId {
    /// Key under which the pending write for this operation is cached.
    pub fn storage_key(&self) -> String {
        format!("{}{}", PENDING_KEY_PREFIX, self.to_hex())
    }

    /// Inverse of [`OperationId::storage_key`].
    pub fn from_storage_key(key: &str) -> Option<Self> {
        key.strip_prefix(PENDING_KEY_PREFIX).and_then(Self::from_hex)
    }
}

impl IdentityId {
    /// Derive an identity id from the key that controls it.
    pub fn from_public_key(public_key: &Ed25519PublicKey) -> Self {
        Self(tagged_hash("pw/identity/v1", public_key.as_bytes()))
    }
}

/// A document field value.
///
/// No floats: every value has exactly one canonical encoding, so operation
/// ids stay stable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// 32-byte identifier (identity, document or contract).
    Identifier(Hash),
    /// Ordered list.
    Array(Vec<FieldValue>),
    /// Nested map, ordered by key.
    Map(BTreeMap<String, FieldValue>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// Per-operation submission state.
///
/// ```text
/// [Unstarted] ──sign+cache──→ [SignedAndCached] ──→ [Confirmed]  (purge)
///                                   │  ↑        └──→ [Rejected]   (purge)
///                                   ↓  │
///                               [Ambiguous] (entry kept, replay same bytes)
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionState {
    /// Nothing built or cached yet.
    #[default]
    Unstarted,
    /// Signed bytes persisted locally, not yet known to be final.
    SignedAndCached,
    /// Outcome unknown; cached bytes must be replayed.
    Ambiguous,
    /// Write is final on the platform.
    Confirmed,
    /// Write was refused; cached bytes are useless.
    Rejected,
}

impl SubmissionState {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: SubmissionState) -> bool {
        match (self, next) {
            (Self::Unstarted, Self::SignedAndCached) => true,
            // existence check found the write, or a cached entry was lost
            (Self::Unstarted, Self::Confirmed) => true,
            (Self::Unstarted, Self::Ambiguous) => true,
            (Self::Unstarted, Self::Rejected) => true,
            (Self::SignedAndCached, Self::Confirmed) => true,
            (Self::SignedAndCached, Self::Rejected) => true,
            (Self::SignedAndCached, Self::Ambiguous) => true,
            (Self::Ambiguous, Self::SignedAndCached) => true,
            _ => false,
        }
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_hex_roundtrip() {
        let id = OperationId::from_bytes([0xAB; 32]);
        assert_eq!(OperationId::from_hex(&id.to_hex()), Some(id));
        assert_eq!(id.to_string().len(), 64);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(OperationId::from_hex("abcd").is_none());
        assert!(OperationId::from_hex(&"zz".repeat(32)).is_none());
    }

    #[test]
    fn test_storage_key() {
        let id = OperationId::from_bytes([1; 32]);
        let key = id.storage_key();
        assert!(key.starts_with(PENDING_KEY_PREFIX));
        assert_eq!(OperationId::from_storage_key(&key), Some(id));
        assert_eq!(OperationId::from_storage_key("other/abc"), None);
    }

    #[test]
    fn test_debug_is_abbreviated() {
        let id = DocumentId::from_bytes([0xCD; 32]);
        assert_eq!(format!("{:?}", id), "DocumentId(cdcdcdcdcdcd..)");
    }

    #[test]
    fn test_identity_from_public_key_is_stable() {
        let key = shared_crypto::Ed25519KeyPair::from_seed([3; 32]);
        let a = IdentityId::from_public_key(&key.public_key());
        let b = IdentityId::from_public_key(&key.public_key());
        assert_eq!(a, b);
        assert_ne!(a.as_bytes(), key.public_key().as_bytes());
    }

    #[test]
    fn test_field_value_conversions() {
        assert_eq!(FieldValue::from("hi"), FieldValue::Text("hi".into()));
        assert_eq!(FieldValue::from(7i64), FieldValue::Integer(7));
        assert_eq!(FieldValue::from(true), FieldValue::Bool(true));
    }

    #[test]
    fn test_state_happy_path() {
        assert!(SubmissionState::Unstarted.can_transition_to(SubmissionState::SignedAndCached));
        assert!(SubmissionState::SignedAndCached.can_transition_to(SubmissionState::Confirmed));
    }

    #[test]
    fn test_ambiguous_loops_back_without_new_signature() {
        assert!(SubmissionState::SignedAndCached.can_transition_to(SubmissionState::Ambiguous));
        assert!(SubmissionState::Ambiguous.can_transition_to(SubmissionState::SignedAndCached));
        assert!(!SubmissionState::Ambiguous.can_transition_to(SubmissionState::Unstarted));
    }

    #[test]
    fn test_terminal_states() {
        assert!(SubmissionState::Confirmed.is_terminal());
        assert!(SubmissionState::Rejected.is_terminal());
        assert!(!SubmissionState::Ambiguous.is_terminal());
        assert!(!SubmissionState::Confirmed.can_transition_to(SubmissionState::SignedAndCached));
    }
}
