//! # Canonical Encoding
//!
//! Stable byte encoding of write content, independent of serde or bincode
//! versions. Feeds operation-id derivation and signing.
//!
//! Format: every variable-length item is `[len:u32 LE][bytes]`, integers are
//! little-endian, enum variants are a single tag byte.

use crate::domain::{
    ContractId, FieldValue, IdentityId, WriteAction, WriteOperation,
};
use std::collections::BTreeMap;

/// Domain tag prefixed to every signable payload.
const SIGNING_TAG: &[u8] = b"pw/state-transition/v1";

/// Append-only canonical encoder.
#[derive(Default)]
pub struct CanonicalEncoder {
    buf: Vec<u8>,
}

impl CanonicalEncoder {
    /// New empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Single byte.
    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    /// u64, little-endian.
    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Fixed 32 bytes, no length prefix.
    pub fn put_hash(&mut self, value: &[u8; 32]) -> &mut Self {
        self.buf.extend_from_slice(value);
        self
    }

    /// Length-prefixed bytes.
    pub fn put_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(value);
        self
    }

    /// Length-prefixed UTF-8.
    pub fn put_str(&mut self, value: &str) -> &mut Self {
        self.put_bytes(value.as_bytes())
    }

    /// Write action with its variant payload.
    pub fn put_action(&mut self, action: &WriteAction) -> &mut Self {
        match action {
            WriteAction::Create => self.put_u8(0),
            WriteAction::Replace {
                document_id,
                revision,
            } => self
                .put_u8(1)
                .put_hash(document_id.as_bytes())
                .put_u64(*revision),
            WriteAction::Delete { document_id } => {
                self.put_u8(2).put_hash(document_id.as_bytes())
            }
        }
    }

    /// Field map in key order.
    pub fn put_fields(&mut self, fields: &BTreeMap<String, FieldValue>) -> &mut Self {
        self.buf
            .extend_from_slice(&(fields.len() as u32).to_le_bytes());
        for (name, value) in fields {
            self.put_str(name);
            self.put_field(value);
        }
        self
    }

    /// One field value, recursively.
    pub fn put_field(&mut self, value: &FieldValue) -> &mut Self {
        match value {
            FieldValue::Null => self.put_u8(0),
            FieldValue::Bool(b) => self.put_u8(1).put_u8(u8::from(*b)),
            FieldValue::Integer(i) => self.put_u8(2).put_u64(*i as u64),
            FieldValue::Text(s) => self.put_u8(3).put_str(s),
            FieldValue::Bytes(b) => self.put_u8(4).put_bytes(b),
            FieldValue::Identifier(h) => self.put_u8(5).put_hash(h),
            FieldValue::Array(items) => {
                self.put_u8(6);
                self.buf
                    .extend_from_slice(&(items.len() as u32).to_le_bytes());
                for item in items {
                    self.put_field(item);
                }
                self
            }
            FieldValue::Map(map) => self.put_u8(7).put_fields(map),
        }
    }
}

/// Encode the content that identifies a logical write.
pub fn write_content(
    action: &WriteAction,
    contract_id: &ContractId,
    collection: &str,
    owner: &IdentityId,
    fields: &BTreeMap<String, FieldValue>,
) -> Vec<u8> {
    let mut encoder = CanonicalEncoder::new();
    encoder
        .put_action(action)
        .put_hash(contract_id.as_bytes())
        .put_str(collection)
        .put_hash(owner.as_bytes())
        .put_fields(fields);
    encoder.into_bytes()
}

/// Bytes covered by the signature of a state transition.
pub fn signable_bytes(operation: &WriteOperation, sequence: u64, public_key: &[u8; 32]) -> Vec<u8> {
    let mut encoder = CanonicalEncoder::new();
    encoder
        .put_bytes(SIGNING_TAG)
        .put_hash(operation.operation_id.as_bytes())
        .put_hash(operation.document_id.as_bytes())
        .put_bytes(&write_content(
            &operation.action,
            &operation.contract_id,
            &operation.collection,
            &operation.owner,
            &operation.fields,
        ))
        .put_u64(sequence)
        .put_hash(public_key);
    encoder.into_bytes()
}
