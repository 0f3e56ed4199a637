//! `ParleyServer` builder and accept loop.
//!
//! This is the entry point for running a Parley server. It ties the
//! layers together: transport → protocol → session handler → directory.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parley_directory::Directory;
use parley_transport::{Transport, TcpTransport};
use tokio::sync::Mutex;

use crate::ParleyError;
use crate::config::ServerConfig;
use crate::handler::handle_connection;

/// Shared server state passed to each connection task.
///
/// Wrapped in `Arc` so it can be cloned cheaply across tasks. The
/// directory sits behind one coarse lock: every request takes it once,
/// does its whole read-modify-write, and releases it before any socket
/// I/O.
pub(crate) struct ServerState {
    pub(crate) directory: Mutex<Directory>,
    pub(crate) idle_timeout: Option<Duration>,
}

/// Builder for configuring and starting a Parley server.
///
/// # Example
///
/// ```rust,no_run
/// use parley::prelude::*;
///
/// # async fn run() -> Result<(), ParleyError> {
/// let server = ParleyServer::builder()
///     .bind("0.0.0.0:56789")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct ParleyServerBuilder {
    config: ServerConfig,
}

impl ParleyServerBuilder {
    /// Creates a new builder with default settings.
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

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Closes connections that stay silent for `timeout`.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = Some(timeout);
        self
    }

    /// Binds the listener. A bind failure is the only fatal startup error.
    pub async fn build(self) -> Result<ParleyServer, ParleyError> {
        let transport = TcpTransport::bind(&self.config.bind_addr).await?;

        let state = Arc::new(ServerState {
            directory: Mutex::new(Directory::new()),
            idle_timeout: self.config.idle_timeout,
        });

        Ok(ParleyServer { transport, state })
    }
}

impl Default for ParleyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Parley server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct ParleyServer {
    transport: TcpTransport,
    state: Arc<ServerState>,
}

impl ParleyServer {
    /// Creates a new builder.
    pub fn builder() -> ParleyServerBuilder {
        ParleyServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ParleyError> {
        Ok(self.transport.local_addr()?)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), ParleyError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Stopping only ends accepting. Sessions already running keep going
    /// until their peers disconnect.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), ParleyError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "parley server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting");
                    return Ok(());
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }
    }
}
