//! src/node.rs
//!
//! Ties together the per-session aggregate a running node needs: the
//! state store, membership view, clock, failure detector, and gossip
//! engine, plus the handle needed to stop or reset them via
//! `/start_node`, `/stop_node`, `/reset_node`.
//!
//! Unlike the original's process-wide singleton, `NodeRegistry` is an
//! owned aggregate behind a lock: no part of this crate reaches for
//! global mutable state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::analytics::{AnalyticsSink, HttpAnalyticsSink, NoopAnalyticsSink};
use crate::clock::Clock;
use crate::config::Config;
use crate::domain::PeerKey;
use crate::engine::protocol::PeerClient;
use crate::engine::{EngineParams, GossipEngine};
use crate::error::{Error, Result};
use crate::failure::FailureDetector;
use crate::membership::Membership;
use crate::sampler::{HostSampler, SysinfoSampler};
use crate::store::Store;

/// Native-typed session parameters, converted from the `POST /start_node`
/// wire request (`crate::api::protocol::StartNodeRequest`) by the HTTP
/// layer before reaching here.
pub struct StartParams {
    pub self_key: PeerKey,
    pub node_list: HashMap<PeerKey, crate::domain::PeerInfo>,
    pub target_count: usize,
    pub gossip_rate: Duration,
    pub database_address: Option<String>,
    pub monitoring_address: Option<String>,
    pub is_send_data_back: bool,
    pub push_mode: bool,
}

/// Cheap-to-clone handles into a running session, used by HTTP handlers
/// so they never hold the registry's lock while doing their own work.
#[derive(Clone)]
pub struct NodeHandles {
    pub self_key: PeerKey,
    pub store: Store,
    pub membership: Membership,
    pub cycle: Arc<AtomicU64>,
}

struct RunningNode {
    self_key: PeerKey,
    store: Store,
    membership: Membership,
    clock: Clock,
    cycle: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl RunningNode {
    fn handles(&self) -> NodeHandles {
        NodeHandles {
            self_key: self.self_key.clone(),
            store: self.store.clone(),
            membership: self.membership.clone(),
            cycle: self.cycle.clone(),
        }
    }

    fn stop(&self) {
        self.clock.stop();
        self.shutdown.cancel();
    }
}

/// Owns at most one running session. `None` means no node has ever been
/// started, or the last session was torn down by `/reset_node`.
pub struct NodeRegistry {
    config: Config,
    inner: RwLock<Option<RunningNode>>,
}

impl NodeRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            inner: RwLock::new(None),
        }
    }

    /// `POST /start_node`: fails with `Error::NodeAlreadyRunning` if a
    /// session already exists — callers must `/reset_node` first (spec
    /// §8 scenario 5 treats reset+start as the canonical restart path).
    pub async fn start(&self, params: StartParams) -> Result<()> {
        let mut guard = self.inner.write().await;
        if guard.is_some() {
            return Err(Error::NodeAlreadyRunning);
        }

        let store = Store::new(params.self_key.clone());
        let membership = Membership::new(params.node_list);
        let clock = Clock::new();
        let failure = FailureDetector::new(store.clone(), membership.clone(), params.self_key.clone());
        let peer_client = PeerClient::new(
            Duration::from_secs(self.config.request_timeout_secs),
            self.config.docker_ip.clone(),
        );
        let sampler: Box<dyn HostSampler> = Box::new(SysinfoSampler::new());
        let analytics: Arc<dyn AnalyticsSink> = if params.database_address.is_some()
            || params.monitoring_address.is_some()
        {
            if params.is_send_data_back {
                Arc::new(HttpAnalyticsSink::new(
                    params.monitoring_address.clone(),
                    params.database_address.clone(),
                    Duration::from_secs(self.config.request_timeout_secs),
                ))
            } else {
                Arc::new(NoopAnalyticsSink)
            }
        } else {
            Arc::new(NoopAnalyticsSink)
        };
        let cycle = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();

        let engine = GossipEngine::new(
            params.self_key.clone(),
            store.clone(),
            membership.clone(),
            clock.clone(),
            failure,
            peer_client,
            sampler,
            analytics,
            EngineParams {
                target_count: params.target_count,
                gossip_rate: params.gossip_rate,
                push_mode: params.push_mode,
            },
            cycle.clone(),
        );

        let clock_task_shutdown = shutdown.clone();
        tokio::spawn(clock.clone().run(clock_task_shutdown));
        let engine_task_shutdown = shutdown.clone();
        tokio::spawn(engine.run(engine_task_shutdown));

        *guard = Some(RunningNode {
            self_key: params.self_key,
            store,
            membership,
            clock,
            cycle,
            shutdown,
        });
        Ok(())
    }

    /// `GET /stop_node`: sets `is_alive=false`; the clock and gossip loop
    /// observe this at their next wakeup and exit cooperatively (spec
    /// §5). The session's store/membership remain queryable afterwards.
    pub async fn stop(&self) -> Result<()> {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(node) => {
                node.stop();
                Ok(())
            }
            None => Err(Error::NodeNotRunning),
        }
    }

    /// `GET /reset_node`: tears down the current session entirely
    /// (cycle=0, empty store, empty failure list) so a subsequent
    /// `/start_node` begins from a clean slate.
    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.inner.write().await;
        if let Some(node) = guard.take() {
            node.stop();
        }
        Ok(())
    }

    pub async fn handles(&self) -> Result<NodeHandles> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(RunningNode::handles)
            .ok_or(Error::NodeNotRunning)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
