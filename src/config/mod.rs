//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (MYAPP_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → handed by value to worker, limiter and probe server
//! ```
//!
//! # Design Decisions
//! - All fields have defaults so a worker runs with no config at all
//! - Environment wins over the file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::AppConfig;
pub use schema::BackoffConfig;
pub use schema::HealthConfig;
pub use schema::ObservabilityConfig;
pub use schema::RateLimitConfig;
pub use schema::WorkerConfig;
