//! tests/common/harness.rs
//!
//! A small test harness for spawning real node processes and driving
//! them over real HTTP, in the spirit of a `TestNode`/`wait_for_state`
//! harness, minus the QUIC/TLS/WebSocket specifics that don't apply to
//! this HTTP-based protocol.

use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use anyhow::{Context, Result};
use gossip_fabric::api::protocol::{PeerListEntry, StartNodeRequest};
use gossip_fabric::domain::{PeerKey, Snapshot};
use gossip_fabric::quorum::MetadataResponse;
use gossip_fabric::{App, Config};
use tokio_util::sync::CancellationToken;

/// A handle to a running gossip-fabric node spawned in a background
/// task, plus the HTTP client used to drive its §6 surface.
pub struct TestNode {
    pub addr: SocketAddr,
    http: reqwest::Client,
    shutdown_token: CancellationToken,
}

impl TestNode {
    /// Binds an ephemeral port, spawns `App::new(config).run()` against
    /// it in the background, and returns a handle once the server has
    /// had a moment to start listening.
    pub async fn spawn() -> Result<Self> {
        let addr = get_ephemeral_addr()?;
        let config = Config {
            bind_addr: addr,
            request_timeout_secs: 5,
            ..Config::default()
        };

        let shutdown_token = CancellationToken::new();
        let app = App::new(config).context("failed to construct App")?;
        let app_shutdown = app.shutdown_token();
        let outer_shutdown = shutdown_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = outer_shutdown.cancelled() => app_shutdown.cancel(),
                result = app.run() => {
                    if let Err(err) = result {
                        tracing::error!(%err, "test node exited with an error");
                    }
                }
            }
        });

        // Give the listener a moment to bind before the first request.
        tokio::time::sleep(Duration::from_millis(50)).await;

        Ok(Self {
            addr,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()?,
            shutdown_token,
        })
    }

    /// This node's own `peer_key`.
    pub fn peer_key(&self) -> PeerKey {
        PeerKey::new(self.addr.ip().to_string(), self.addr.port())
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn hello_world(&self) -> Result<String> {
        Ok(self
            .http
            .get(format!("{}/hello_world", self.base_url()))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?)
    }

    /// `POST /start_node` with the given peers (as `ip:port`), target
    /// sample size, and gossip rate in seconds.
    pub async fn start_node(
        &self,
        peers: &[SocketAddr],
        target_count: usize,
        gossip_rate_secs: f64,
    ) -> Result<()> {
        self.start_node_full(peers, target_count, gossip_rate_secs, false, None, None)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn start_node_full(
        &self,
        peers: &[SocketAddr],
        target_count: usize,
        gossip_rate_secs: f64,
        push_mode: bool,
        database_address: Option<String>,
        monitoring_address: Option<String>,
    ) -> Result<()> {
        let request = StartNodeRequest {
            node_list: peers
                .iter()
                .map(|addr| PeerListEntry {
                    ip: addr.ip().to_string(),
                    port: addr.port(),
                })
                .collect(),
            target_count,
            gossip_rate: gossip_rate_secs,
            database_address,
            monitoring_address,
            node_ip: self.addr.ip().to_string(),
            is_send_data_back: true,
            push_mode,
            client_port: self.addr.port(),
        };
        self.http
            .post(format!("{}/start_node", self.base_url()))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn stop_node(&self) -> Result<()> {
        self.http
            .get(format!("{}/stop_node", self.base_url()))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn reset_node(&self) -> Result<()> {
        self.http
            .get(format!("{}/reset_node", self.base_url()))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn metadata(&self) -> Result<MetadataResponse> {
        Ok(self
            .http
            .get(format!("{}/metadata", self.base_url()))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// Issues a raw `GET` and returns the status code, for assertions
    /// that care about a non-2xx response (e.g. `/get_recent_data_from_node`
    /// against a session that was just `/reset_node`-ed).
    pub async fn raw_get_status(&self, path: &str) -> Result<reqwest::StatusCode> {
        Ok(self
            .http
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await?
            .status())
    }

    pub async fn recent_data(&self) -> Result<Snapshot> {
        Ok(self
            .http
            .get(format!("{}/get_recent_data_from_node", self.base_url()))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// Tears down the background task running this node's `App`.
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }
}

fn get_ephemeral_addr() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?)
}

/// Polls `predicate` against the result of `fetch` until it returns
/// `true` or `timeout` elapses, over plain HTTP polling rather than a
/// push subscription.
pub async fn wait_until<T, F, Fut, P>(mut fetch: F, predicate: P, timeout: Duration) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match fetch().await {
                Ok(value) if predicate(&value) => return Ok(value),
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await
    .context("timed out waiting for condition")?
}
