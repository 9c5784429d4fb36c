//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → GateConfig (validated, immutable)
//!     → gate::OperationRegistry::from_config (compiled schemas, role sets)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All sections have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AuditConfig, FieldConfig, GateConfig, IdentityConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, OperationConfig, RateLimitConfig, SchemaConfig, SessionConfig,
    TimeoutConfig,
};
pub use validation::ValidationError;
