//! Channel Adapters
//!
//! Implementations of the `SequencedWriteChannel` trait.

mod json_rpc;
mod simulated;

pub use json_rpc::{
    map_rpc_error, JsonRpcError, JsonRpcWriteChannel, WriteStatus, ERR_ALREADY_PROCESSED,
    ERR_DOCUMENT_CONFLICT, ERR_INVALID_NONCE, ERR_INVALID_SIGNATURE, ERR_SCHEMA_VIOLATION,
    ERR_UNAUTHORIZED,
};
pub use simulated::{Fault, SimulatedPlatform};
