//! `GatehallServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → session → handlers.

use std::sync::Arc;

use gatehall_protocol::{FrameCodec, MessageType};
use gatehall_session::{SessionConfig, SessionRegistry};
use gatehall_transport::TcpTransport;

use crate::handlers::{ChatHandler, LoginHandler};
use crate::pipeline::handle_connection;
use crate::{GatehallError, HandlerRegistry, ServerConfig};

/// Shared server state passed to each connection's pipeline task.
///
/// Built once at startup; the handler registry and session registry are
/// plain fields here — nothing in the server is ambient or global.
pub(crate) struct ServerState {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) codec: FrameCodec,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Gatehall server.
///
/// # Example
///
/// ```rust,no_run
/// use gatehall::{GatehallServer, ServerConfig};
///
/// # async fn run() -> Result<(), gatehall::GatehallError> {
/// let server = GatehallServer::builder()
///     .config(ServerConfig::from_env())
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct GatehallServerBuilder {
    config: ServerConfig,
}

impl GatehallServerBuilder {
    /// A builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets only the bind address.
    pub fn bind(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.host = host.into();
        self.config.port = port;
        self
    }

    /// Binds the transport, starts the session sweep, and registers the
    /// built-in handlers (login, chat).
    pub async fn build(self) -> Result<GatehallServer, GatehallError> {
        let config = self.config;

        let transport = TcpTransport::bind(&config.bind_addr(), config.max_message_len)
            .await?
            .nodelay(config.tcp_nodelay);

        let registry = Arc::new(SessionRegistry::new(SessionConfig {
            idle_timeout: config.session_idle_timeout,
            sweep_interval: config.sweep_interval,
        }));
        SessionRegistry::spawn_sweep(&registry);

        let mut handlers = HandlerRegistry::new();
        handlers.register(MessageType::Login, LoginHandler::new(Arc::clone(&registry)));
        handlers.register(MessageType::Chat, ChatHandler::new(Arc::clone(&registry)));
        tracing::info!(types = ?handlers.registered_types(), "message handlers registered");

        Ok(GatehallServer {
            transport,
            state: Arc::new(ServerState {
                registry,
                handlers,
                codec: FrameCodec::json(),
                config,
            }),
        })
    }
}

impl Default for GatehallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Gatehall server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct GatehallServer {
    transport: TcpTransport,
    state: Arc<ServerState>,
}

impl GatehallServer {
    /// Creates a new builder.
    pub fn builder() -> GatehallServerBuilder {
        GatehallServerBuilder::new()
    }

    /// The address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The session registry, for shutdown and introspection.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the accept loop until the process is terminated.
    ///
    /// Each accepted connection gets its own pipeline task. An accept
    /// failure is logged and the loop continues — exhaustion at accept
    /// time degrades to rejecting new connections, never to tearing down
    /// the ones already being served.
    pub async fn run(mut self) -> Result<(), GatehallError> {
        tracing::info!(
            addr = %self.state.config.bind_addr(),
            "gatehall server running"
        );

        loop {
            match self.transport.accept().await {
                Ok((reader, conn)) => {
                    if self.state.registry.session_count() >= self.state.config.max_connections {
                        tracing::warn!(
                            conn = %conn.id(),
                            limit = self.state.config.max_connections,
                            "connection limit reached, rejecting connection"
                        );
                        conn.close();
                        continue;
                    }
                    let state = Arc::clone(&self.state);
                    tokio::spawn(handle_connection(reader, conn, state));
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
