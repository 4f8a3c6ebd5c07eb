//! # Service Layer
//!
//! The submitter that ties the ports together.
//!
//! ## Components
//!
//! - `submitter`: `IdempotentWriteSubmitter`, the `WriteSubmitterApi` implementation
//! - `locks`: per-operation-id async mutexes
//! - `retry`: caller-side backoff loop over ambiguous outcomes

pub mod locks;
pub mod retry;
pub mod submitter;

pub use locks::{OperationGuard, OperationLocks};
pub use retry::submit_with_retry;
pub use submitter::IdempotentWriteSubmitter;
