//! Error types for the server lifecycle.

use thiserror::Error;

use crate::config::validation::ValidationError;

/// Errors surfaced by [`RemotingServer`](crate::RemotingServer) construction and startup.
#[derive(Debug, Error)]
pub enum RemotingError {
    /// The server configuration failed validation.
    #[error("{server_name} invalid config: {}", join_errors(.errors))]
    InvalidConfig {
        server_name: String,
        errors: Vec<ValidationError>,
    },

    /// The listening socket could not be bound.
    #[error("{server_name} bind {port} fail: {source}")]
    Bind {
        server_name: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The bind task went away before reporting a result.
    #[error("{server_name} interrupted while waiting to bind {port}")]
    InterruptedDuringStart { server_name: String, port: u16 },

    /// An event loop group could not be built.
    #[error("{server_name} failed to create {role} event loop group: {source}")]
    EventLoop {
        server_name: String,
        role: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The invocation executor could not spawn its threads.
    #[error("{server_name} failed to create method invoker executor: {source}")]
    Executor {
        server_name: String,
        #[source]
        source: std::io::Error,
    },
}

impl RemotingError {
    pub fn is_bind(&self) -> bool {
        matches!(self, RemotingError::Bind { .. })
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures inside one teardown step of `close()`. Logged, never returned.
#[derive(Debug, Error)]
pub enum CloseError {
    /// The step lost the party it was waiting on.
    #[error("interrupted while waiting for {0}")]
    Interrupted(&'static str),
}

/// Result type for server lifecycle operations.
pub type RemotingResult<T> = Result<T, RemotingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn bind_error_carries_context() {
        let err = RemotingError::Bind {
            server_name: "master".into(),
            port: 5678,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.is_bind());
        assert_eq!(err.to_string(), "master bind 5678 fail: in use");
        assert!(err.source().is_some());
    }

    #[test]
    fn invalid_config_lists_every_field() {
        let err = RemotingError::InvalidConfig {
            server_name: "master".into(),
            errors: vec![
                ValidationError {
                    field: "server.worker_threads".into(),
                    message: "must be at least 1".into(),
                },
                ValidationError {
                    field: "server.so_backlog".into(),
                    message: "must be positive".into(),
                },
            ],
        };
        assert!(!err.is_bind());
        assert_eq!(
            err.to_string(),
            "master invalid config: server.worker_threads: must be at least 1, server.so_backlog: must be positive"
        );
    }
}
