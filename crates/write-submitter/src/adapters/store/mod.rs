//! Store Adapters
//!
//! Implementations of the `PendingWriteStore` trait.

mod file;
mod lock;
mod memory;

pub use file::FileBackedPendingStore;
pub use lock::StoreLock;
pub use memory::InMemoryPendingStore;
