//! # Domain Layer
//!
//! Pure types and rules of idempotent write submission.
//!
//! ## Components
//!
//! - `entities`: WriteSpec, WriteOperation, StateTransition, PendingWrite
//! - `value_objects`: OperationId and friends, FieldValue, SubmissionState
//! - `outcome`: WriteResult, RejectionReason, AmbiguityReason
//! - `config`: SubmitterConfig, RetryPolicy
//! - `expiry`: retention and entry-cap eviction
//! - `errors`: StoreError, ChannelError, ConfigError

pub mod config;
pub mod entities;
pub mod errors;
pub mod expiry;
pub mod outcome;
pub mod value_objects;

pub use config::*;
pub use entities::*;
pub use errors::*;
pub use expiry::*;
pub use outcome::*;
pub use value_objects::*;
