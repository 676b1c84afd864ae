//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (threads >= 1, buffers > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RemotingConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{ObservabilityConfig, RemotingConfig, ServerConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a whole configuration file.
pub fn validate_config(config: &RemotingConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_server(&config.server, &mut errors);
    check_observability(&config.observability, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate only the server section.
pub fn validate_server_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_server(config, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_server(config: &ServerConfig, errors: &mut Vec<ValidationError>) {
    if config.server_name.trim().is_empty() {
        errors.push(ValidationError::new("server.server_name", "must not be empty"));
    }
    if config.worker_threads == 0 {
        errors.push(ValidationError::new("server.worker_threads", "must be at least 1"));
    }
    if config.so_backlog <= 0 {
        errors.push(ValidationError::new("server.so_backlog", "must be positive"));
    }
    if config.send_buffer_size == 0 {
        errors.push(ValidationError::new("server.send_buffer_size", "must be positive"));
    }
    if config.receive_buffer_size == 0 {
        errors.push(ValidationError::new("server.receive_buffer_size", "must be positive"));
    }
    if config.max_frame_length == 0 {
        errors.push(ValidationError::new("server.max_frame_length", "must be positive"));
    }
}

fn check_observability(config: &ObservabilityConfig, errors: &mut Vec<ValidationError>) {
    if !LOG_LEVELS.contains(&config.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.log_level),
        ));
    }
    if config.metrics_enabled && config.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.metrics_address),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&RemotingConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_violation() {
        let mut config = RemotingConfig::default();
        config.server.server_name = "  ".into();
        config.server.worker_threads = 0;
        config.server.so_backlog = 0;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "server.server_name",
                "server.worker_threads",
                "server.so_backlog",
                "observability.log_level",
            ]
        );
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = RemotingConfig::default();
        config.observability.metrics_address = "not-an-address".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
