//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AccessConfig (validated, immutable)
//!     → handed to AccessLayer at startup
//!
//! On file change:
//!     watcher.rs detects change (debounced, unchanged content skipped)
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → AccessLayer::apply_config
//!     → classifier rule table swapped atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only classifier tables are hot-reloaded; endpoints and storage need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_or_default, parse_config, ConfigError};
pub use schema::{
    AccessConfig, BackendsConfig, ClassifierConfig, DomainErrorKind, DomainRuleConfig,
    TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::{ConfigUpdates, ConfigWatcher};
