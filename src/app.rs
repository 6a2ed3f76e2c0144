//! src/app.rs
//!
//! Defines the main `App` struct, which wires together the process-level
//! `Config` and the node's HTTP surface. `App` itself holds no gossip
//! state: a freshly constructed `App` serves `/hello_world` and the
//! control-plane endpoints, but the clock and gossip engine only start
//! once a caller issues `POST /start_node` — `NodeRegistry` is the owned
//! aggregate that exists only while a session is running, deliberately
//! avoiding a process-wide mutable singleton.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{api::ApiServer, config::Config, error::Result, node::NodeRegistry};

/// Encapsulates the entire process: its configuration and the lifecycle
/// of its one concurrent service, the HTTP surface.
pub struct App {
    config: Config,
    shutdown_token: CancellationToken,
}

impl App {
    /// Creates a new `App` from the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            config,
            shutdown_token: CancellationToken::new(),
        })
    }

    /// The main run loop for the process.
    ///
    /// 1. Builds the (initially session-less) `NodeRegistry`.
    /// 2. Spawns the HTTP surface (`ApiServer`) bound to `config.bind_addr`.
    /// 3. Waits for a shutdown signal (Ctrl+C or an externally cancelled
    ///    token) and gracefully tears the server down. Any running gossip
    ///    session underneath the registry observes the same cancellation
    ///    at its next wakeup.
    pub async fn run(self) -> Result<()> {
        tracing::info!(bind_addr = %self.config.bind_addr, "Starting gossip agent");

        let registry = Arc::new(NodeRegistry::new(self.config.clone()));
        let api_server = ApiServer::new(self.config.bind_addr, registry.clone());
        let api_task = tokio::spawn(api_server.run(self.shutdown_token.clone()));

        let shutdown_token = self.shutdown_token.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
            tracing::info!("Ctrl+C received. Initiating graceful shutdown...");
            shutdown_token.cancel();
        });

        self.shutdown_token.cancelled().await;

        match api_task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(%err, "HTTP surface exited with an error"),
            Err(err) => tracing::error!(%err, "HTTP surface task panicked"),
        }

        tracing::info!("Gossip agent has shut down gracefully");
        Ok(())
    }

    /// The cancellation token driving this `App`'s shutdown, exposed so
    /// callers (tests, an external supervisor) can trigger a graceful
    /// stop without relying on a process signal.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }
}
