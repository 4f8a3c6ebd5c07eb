//! # Algorithms Module
//!
//! Canonical encoding, deterministic id derivation and the on-disk codec for
//! pending writes.

pub mod canonical;
pub mod operation_id;
pub mod pending_codec;

pub use operation_id::{derive_document_id, derive_operation_id, OPERATION_ID_TAG};
pub use pending_codec::{decode_pending, encode_pending};
