//! src/engine/mod.rs
//!
//! The gossip engine: the periodic push/pull cycle against a random peer
//! sample. Owns nothing the HTTP surface needs directly
//! except what it hands out at construction time (`Store`, `Membership`,
//! `Clock` handles are all cheap-to-clone, shared-state types) — the
//! engine itself is only ever driven by its own background task.

pub mod protocol;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use crate::analytics::{AnalyticsSink, CycleTelemetry, FlushPayload};
use crate::clock::Clock;
use crate::digest;
use crate::domain::{AppState, HbState, NodeState, PeerKey, Record};
use crate::failure::FailureDetector;
use crate::membership::Membership;
use crate::sampler::HostSampler;
use crate::store::Store;
use crate::voi::VoiFilter;

use protocol::PeerClient;

/// Parameters a `POST /start_node` call supplies for one gossip session.
/// Distinct from `crate::config::Config`, which is process-wide and set
/// once at startup.
#[derive(Clone, Debug)]
pub struct EngineParams {
    pub target_count: usize,
    pub gossip_rate: Duration,
    pub push_mode: bool,
}

/// The periodic push/pull cycle runner. `run` owns the
/// background task; `cycle()` lets HTTP handlers read the current cycle
/// number for `data_flow_per_round` bookkeeping on the responder side.
pub struct GossipEngine {
    self_key: PeerKey,
    store: Store,
    membership: Membership,
    clock: Clock,
    failure: FailureDetector,
    peer_client: PeerClient,
    sampler: Box<dyn HostSampler>,
    analytics: Arc<dyn AnalyticsSink>,
    params: EngineParams,
    cycle: Arc<AtomicU64>,
}

impl GossipEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_key: PeerKey,
        store: Store,
        membership: Membership,
        clock: Clock,
        failure: FailureDetector,
        peer_client: PeerClient,
        sampler: Box<dyn HostSampler>,
        analytics: Arc<dyn AnalyticsSink>,
        params: EngineParams,
        cycle: Arc<AtomicU64>,
    ) -> Self {
        Self {
            self_key,
            store,
            membership,
            clock,
            failure,
            peer_client,
            sampler,
            analytics,
            params,
            cycle,
        }
    }

    pub fn cycle_handle(&self) -> Arc<AtomicU64> {
        self.cycle.clone()
    }

    /// Runs the gossip loop until `shutdown` fires or the clock stops.
    /// Both are observed at the loop's next wakeup, so shutdown
    /// completes within `max(1s, gossip_rate)`.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(self_key = %self.self_key, rate = ?self.params.gossip_rate, "Gossip engine started");
        let mut ticker = tokio::time::interval(self.params.gossip_rate);
        let mut voi = VoiFilter::new();
        // Seeded from OS entropy on every process start rather than a
        // process-global RNG reused across restarts, so peer samples
        // never correlate across runs.
        let mut rng = StdRng::from_entropy();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Gossip engine received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if !self.clock.is_alive() {
                        tracing::info!("Gossip engine stopping: node no longer alive");
                        break;
                    }
                    self.run_cycle(&mut voi, &mut rng).await;
                }
            }
        }
    }

    async fn run_cycle(&mut self, voi: &mut VoiFilter, rng: &mut StdRng) {
        let cycle = self.cycle.fetch_add(1, Ordering::AcqRel) + 1;

        if self.params.push_mode && cycle != 0 && cycle % 10 == 0 {
            self.flush_to_sink(cycle);
        }

        let k = self.clock.now();
        if let Err(err) = self.store.open_new_time_key(k) {
            tracing::warn!(%err, time_key = k, "failed to open new time_key, skipping cycle");
            return;
        }

        let sampled = self.sampler.sample();
        let (filtered, transmissions, stats) = voi.filter(cycle, &sampled);
        let record = self.build_self_record(cycle, filtered);
        if let Err(err) = self.store.put_self(k, record) {
            tracing::warn!(%err, time_key = k, "failed to write self record, skipping cycle");
            return;
        }

        let self_key_for_telemetry = self.self_key.clone();
        let analytics = self.analytics.clone();
        tokio::spawn(async move {
            analytics
                .record_cycle(CycleTelemetry::new(
                    &self_key_for_telemetry,
                    cycle,
                    stats,
                    transmissions,
                ))
                .await;
        });

        let peers = self
            .membership
            .sample_without_replacement(self.params.target_count, rng);
        if peers.is_empty() {
            tracing::debug!(cycle, "no peers to gossip with this cycle");
            return;
        }

        self.exchange_with_peers(k, cycle, peers).await;
    }

    fn build_self_record(&self, cycle: u64, app_state: AppState) -> Record {
        let (ip, port) = self.self_key.parts().unwrap_or(("", 0));
        let mut record = Record {
            counter: self.clock.now(),
            cycle,
            digest: String::new(),
            node_state: NodeState {
                id: self.self_key.to_string(),
                ip: ip.to_string(),
                port,
            },
            hb_state: HbState {
                timestamp: self.clock.now(),
                failure_count: 0,
                failure_list: Vec::new(),
                node_alive: true,
            },
            app_state,
            nf_state: Default::default(),
        };
        record.digest = digest::digest(&record);
        record
    }

    /// Executes the anti-entropy exchange against every sampled peer
    /// concurrently, bounded by `target_count` in-flight exchanges. One
    /// peer's failure never aborts the cycle for the others.
    async fn exchange_with_peers(&self, k: u64, cycle: u64, peers: Vec<PeerKey>) {
        let metadata = match self.store.metadata(k) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(%err, "failed to read metadata for this cycle");
                return;
            }
        };
        let self_record = match self.store.subset(k, std::slice::from_ref(&self.self_key)) {
            Ok(mut snap) => match snap.remove(&self.self_key) {
                Some(record) => record,
                None => return,
            },
            Err(_) => return,
        };

        let store = self.store.clone();
        let self_key = self.self_key.clone();
        let peer_client = self.peer_client.clone();

        let mut futures = FuturesUnordered::new();
        for peer in peers {
            let store = store.clone();
            let self_key = self_key.clone();
            let metadata = metadata.clone();
            let self_record = self_record.clone();
            let peer_client = peer_client.clone();
            futures.push(async move {
                let subset_store = store.clone();
                let outcome = peer_client
                    .exchange(&peer, &self_key, metadata, self_record, cycle, move |keys| {
                        subset_store.subset(k, keys)
                    })
                    .await;
                (peer, outcome)
            });
        }

        while let Some((peer, outcome)) = futures.next().await {
            match outcome {
                Ok(updates) => {
                    if let Err(err) = self.store.ingest(k, cycle, updates) {
                        tracing::warn!(%err, peer_key = %peer, "failed to ingest peer updates");
                    }
                    if let Err(err) = self.failure.record_success(k, &peer) {
                        tracing::warn!(%err, peer_key = %peer, "failed to record exchange success");
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, peer_key = %peer, "peer exchange failed");
                    if let Err(err) = self.failure.record_failure(k, &peer) {
                        tracing::warn!(%err, peer_key = %peer, "failed to record exchange failure");
                    }
                }
            }
        }
    }

    /// Flushes every snapshot but the latest to the analytics sink and
    /// drops them locally. Runs off the gossip loop's critical path.
    fn flush_to_sink(&self, cycle: u64) {
        let stale = self.store.drain_all_but_latest();
        if stale.is_empty() {
            return;
        }
        let analytics = self.analytics.clone();
        let self_key = self.self_key.clone();
        tokio::spawn(async move {
            analytics
                .flush(&self_key, cycle, FlushPayload { snapshots: stale })
                .await;
        });
    }
}
