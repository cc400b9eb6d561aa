//! Cache subsystem.
//!
//! # Data Flow
//! ```text
//! façade request with a cache key
//!     → layer.rs fetch
//!         fresh entry?      → return it
//!         fetch in flight?  → await the same shared future
//!         otherwise         → run producer, store entry, return value
//!
//! façade failure path
//!     → layer.rs fallback (last value, any age)
//! ```
//!
//! The tier is carried by [`CacheKey`]: `Volatile` entries live in memory,
//! `Persisted` entries are also written under `cache:<stable key>`.

pub mod key;
pub mod layer;

pub use key::{CacheEntry, CacheKey, Cached};
pub use layer::CacheLayer;
