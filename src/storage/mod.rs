//! Durable key-value storage subsystem.
//!
//! # Data Flow
//! ```text
//! Session store / persisted cache entries
//!     → repository.rs (typed, namespaced access with validated stable keys)
//!     → durable.rs (DurableStorage trait: string get/set/remove)
//!     → file.rs (JSON file on disk) | memory.rs (process memory)
//! ```
//!
//! # Design Decisions
//! - The backing store knows nothing about schemas or namespaces
//! - Namespacing happens only in `Repository`, never by hand-built strings
//! - Writes complete before `set` returns; there is no write-behind buffer

pub mod durable;
pub mod file;
pub mod memory;
pub mod repository;

pub use durable::{DurableStorage, StorageError};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use repository::{KeyError, Repository, StableKey};
