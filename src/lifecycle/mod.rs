//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Open storage → Restore sessions → Build cache,
//!     classifier, orchestrator → Compose façade
//!
//! Running:
//!     ConfigWatcher → AccessLayer::apply_config (classifier hot reload)
//!
//! Shutdown (shutdown.rs):
//!     dispose() → Stop watcher → Drop volatile cache → Flush storage
//! ```
//!
//! # Design Decisions
//! - Explicit construction replaces process-wide singletons; tests build a
//!   fresh layer over `MemoryStorage`
//! - Ordered shutdown: stop background tasks before the final flush

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{AccessLayer, AccessLayerBuilder, StartupError};
