//! # Write Submitter
//!
//! Client-side idempotent submission of signed document writes to a
//! consensus-backed platform that orders writes by a per-identity sequence.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! A confirmation timeout does not mean the write failed. Re-signing after a
//! timeout would consume a fresh sequence and risk a duplicate document, so
//! the submitter:
//! - derives a deterministic operation id from write content
//! - persists the signed bytes before they leave the device
//! - replays exactly those bytes when the previous outcome was unknown
//! - checks the platform for the write before signing anything new
//!
//! ## Outcomes
//!
//! | Result | Cache entry | Caller action |
//! |--------|-------------|---------------|
//! | `Confirmed` | removed | done |
//! | `Ambiguous` | kept | retry later with the same `WriteSpec` |
//! | `Rejected` | removed | fix the input and rebuild |
//!
//! ## Module Structure
//!
//! ```text
//! write-submitter/
//! ├── domain/          # WriteSpec, PendingWrite, WriteResult, config, expiry
//! ├── algorithms/      # Canonical encoding, id derivation, cache codec
//! ├── ports/           # WriteSubmitterApi, SequencedWriteChannel, PendingWriteStore
//! ├── adapters/        # JSON-RPC channel, simulated platform, stores, clocks
//! └── service/         # IdempotentWriteSubmitter, operation locks, retry
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{
    FileBackedPendingStore, InMemoryPendingStore, JsonRpcWriteChannel, MockTimeSource,
    SimulatedPlatform, SystemTimeSource,
};
pub use algorithms::{derive_document_id, derive_operation_id};
pub use domain::{
    AmbiguityReason, ChannelError, ConfigError, ConfirmationSource, ConfirmedWrite, ContractId,
    DocumentId, FieldValue, IdentityId, OperationId, PendingWrite, PendingWriteSummary,
    RejectionReason, RetryPolicy, SignedPayload, StoreError, SubmissionState, SubmitterConfig,
    WriteAction, WriteResult, WriteSpec,
};
pub use ports::{
    BroadcastAck, PendingWriteStore, SequencedWriteChannel, TimeSource, WriteSubmitterApi,
};
pub use service::IdempotentWriteSubmitter;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
