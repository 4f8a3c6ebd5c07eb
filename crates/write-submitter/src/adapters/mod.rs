//! # Adapters Module
//!
//! Concrete implementations of the outbound ports.
//!
//! ## Modules
//!
//! - `channel`: JSON-RPC gateway client and the in-process simulated platform
//! - `store`: in-memory and file-backed pending-write stores
//! - `infra`: system and mock clocks

pub mod channel;
pub mod infra;
pub mod store;

pub use channel::{Fault, JsonRpcWriteChannel, SimulatedPlatform};
pub use infra::{MockTimeSource, SystemTimeSource};
pub use store::{FileBackedPendingStore, InMemoryPendingStore};
