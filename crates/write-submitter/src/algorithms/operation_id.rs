//! # Deterministic Ids
//!
//! Operation ids are hashes of write content, never random, so a retried
//! write is recognised as the same write. Create writes also derive their
//! document id from the operation id, so even a write whose local cache was
//! lost lands on the same document.

use super::canonical;
use crate::domain::{ContractId, DocumentId, IdentityId, OperationId, WriteSpec};
use shared_crypto::{sha256d, tagged_hash};

/// Domain tag for operation ids.
pub const OPERATION_ID_TAG: &str = "pw/operation/v1";

/// `tagged_sha256("pw/operation/v1", canonical(content))`.
pub fn derive_operation_id(spec: &WriteSpec) -> OperationId {
    let content = canonical::write_content(
        &spec.action,
        &spec.contract_id,
        &spec.collection,
        &spec.owner,
        &spec.fields,
    );
    OperationId::from_bytes(tagged_hash(OPERATION_ID_TAG, &content))
}

/// `sha256d(contract || owner || collection || entropy)`.
pub fn derive_document_id(
    contract_id: &ContractId,
    owner: &IdentityId,
    collection: &str,
    entropy: &OperationId,
) -> DocumentId {
    let mut preimage = Vec::with_capacity(96 + collection.len());
    preimage.extend_from_slice(contract_id.as_bytes());
    preimage.extend_from_slice(owner.as_bytes());
    preimage.extend_from_slice(collection.as_bytes());
    preimage.extend_from_slice(entropy.as_bytes());
    DocumentId::from_bytes(sha256d(&preimage))
}
