//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RemotingConfig (validated, immutable)
//!     → ServerConfig handed to RemotingServer::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable for the lifetime of a server instance
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ObservabilityConfig;
pub use schema::RemotingConfig;
pub use schema::ServerConfig;
