//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the remoting server binary.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RemotingConfig {
    /// Transport server settings.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Settings for one remoting server instance.
///
/// Read once at construction; the server never mutates it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name used for thread names and log lines.
    pub server_name: String,

    /// TCP port to listen on. Port 0 binds an ephemeral port.
    pub listen_port: u16,

    /// Number of I/O threads servicing established connections.
    pub worker_threads: usize,

    /// Listen backlog (SO_BACKLOG).
    pub so_backlog: i32,

    /// SO_KEEPALIVE for accepted connections.
    pub so_keepalive: bool,

    /// TCP_NODELAY for accepted connections.
    pub tcp_no_delay: bool,

    /// SO_SNDBUF for accepted connections, in bytes.
    pub send_buffer_size: usize,

    /// SO_RCVBUF for accepted connections, in bytes.
    pub receive_buffer_size: usize,

    /// Reader idle window in milliseconds. 0 disables idle detection.
    pub connection_idle_time_millis: u64,

    /// Allow the native epoll transport when the platform supports it.
    pub epoll_enabled: bool,

    /// How long each event loop group may drain during close, in milliseconds.
    pub shutdown_grace_millis: u64,

    /// Largest frame the decoder accepts, in bytes.
    pub max_frame_length: usize,
}

impl ServerConfig {
    /// Config for `server_name` listening on `listen_port`, everything else default.
    pub fn new(server_name: impl Into<String>, listen_port: u16) -> Self {
        Self {
            server_name: server_name.into(),
            listen_port,
            ..Self::default()
        }
    }

    pub fn connection_idle_time(&self) -> Duration {
        Duration::from_millis(self.connection_idle_time_millis)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_millis)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "remoting-server".to_string(),
            listen_port: 12346,
            worker_threads: default_worker_threads(),
            so_backlog: 1024,
            so_keepalive: true,
            tcp_no_delay: true,
            send_buffer_size: 65535,
            receive_buffer_size: 65535,
            connection_idle_time_millis: 60_000,
            epoll_enabled: true,
            shutdown_grace_millis: 2_000,
            max_frame_length: 16 * 1024 * 1024, // 16MB
        }
    }
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_port, 12346);
        assert!(config.worker_threads >= 2);
        assert_eq!(config.so_backlog, 1024);
        assert_eq!(config.connection_idle_time(), Duration::from_secs(60));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: RemotingConfig = toml::from_str(
            r#"
            [server]
            server_name = "master"
            listen_port = 5678
            worker_threads = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.server.server_name, "master");
        assert_eq!(config.server.listen_port, 5678);
        assert_eq!(config.server.worker_threads, 4);
        assert!(config.server.tcp_no_delay);
        assert_eq!(config.observability.log_level, "info");
    }
}
