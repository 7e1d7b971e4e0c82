//! Server configuration.
//!
//! The core only consumes resolved values; where they come from (env,
//! file, flags) is the caller's concern. [`ServerConfig::from_env`] is
//! the resolution the bundled binary uses.

use std::time::Duration;

/// Configuration consumed by the server core.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,

    /// Port to bind. `0` picks an ephemeral port (useful in tests).
    pub port: u16,

    /// Expected client heartbeat cadence. A connection that stays silent
    /// for twice this long is closed by the pipeline.
    pub heartbeat_interval: Duration,

    /// Maximum frame length in bytes. An inbound frame declaring more
    /// closes the connection.
    pub max_message_len: usize,

    /// A session silent for longer than this is evicted by the sweep.
    pub session_idle_timeout: Duration,

    /// How often the idle sweep runs.
    pub sweep_interval: Duration,

    /// Accept-time ceiling: beyond this many live sessions, new
    /// connections are rejected (closed immediately) rather than served.
    pub max_connections: usize,

    /// Whether to set TCP_NODELAY on accepted sockets.
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
            heartbeat_interval: Duration::from_secs(30),
            max_message_len: 1024 * 1024,
            session_idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            max_connections: 10_000,
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Defaults with `GATEHALL_HOST` / `GATEHALL_PORT` overrides.
    ///
    /// Values that fail to parse are ignored and the default kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("GATEHALL_HOST") {
            let host = host.trim();
            if !host.is_empty() {
                config.host = host.to_string();
            }
        }

        if let Ok(port) = std::env::var("GATEHALL_PORT") {
            if let Ok(port) = port.trim().parse() {
                config.port = port;
            }
        }

        config
    }

    /// The `host:port` string the transport binds.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8888);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.max_message_len, 1024 * 1024);
        assert_eq!(config.session_idle_timeout, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_bind_addr_joins_host_and_port() {
        let config = ServerConfig {
            host: "0.0.0.0".into(),
            port: 9000,
            ..ServerConfig::default()
        };
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
    }
}
