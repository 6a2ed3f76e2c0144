//! src/engine/protocol.rs
//!
//! The anti-entropy peer-exchange protocol: pure responder-side
//! logic plus the initiator-side HTTP client. Kept separate from
//! `engine::GossipEngine` so the three-message exchange can be tested
//! without a running event loop or a real HTTP round trip.

use std::time::Duration;

use crate::domain::{Metadata, PeerKey, Record, Snapshot};
use crate::error::{Error, Result};
use crate::store::{DataFlow, Store};

/// What the responder (R) returns from message 1 of the exchange: the
/// keys it wants from the initiator (I) plus the records it is pushing
/// back because it holds a fresher copy than I's metadata reported.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExchangeResult {
    pub requested_keys: Vec<PeerKey>,
    pub updates: Snapshot,
}

/// Responder-side logic for `/receive_metadata`, the first message of
/// the exchange.
///
/// `remote_key`/`remote_metadata` are the initiator's identity and view
/// of its peers (excluding itself); `remote_record` is the initiator's
/// own freshly sampled, VOI-filtered record, ingested here exactly as
/// if it had been pushed unprompted — which is what this message does.
///
/// The responder both requests keys it lacks or holds stale data for,
/// and pushes back any record it holds that is fresher than the
/// initiator's report, in the same pass.
pub fn handle_receive_metadata(
    store: &Store,
    cycle: u64,
    remote_key: &PeerKey,
    remote_metadata: &Metadata,
    remote_record: &Record,
) -> Result<ExchangeResult> {
    store.ingest(
        store
            .latest_time_key()
            .ok_or_else(|| Error::StoreInvariant("no snapshot open".into()))?,
        cycle,
        [(remote_key.clone(), remote_record.clone())].into(),
    )?;

    let k = store
        .latest_time_key()
        .ok_or_else(|| Error::StoreInvariant("no snapshot open".into()))?;
    let snapshot = store
        .subset(k, &remote_metadata.keys().cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    let mut requested_keys = Vec::new();
    let mut updates = Snapshot::new();
    for (peer_key, &remote_counter) in remote_metadata {
        match snapshot.get(peer_key) {
            Some(local_record) if local_record.counter > remote_counter => {
                updates.insert(peer_key.clone(), local_record.clone());
            }
            Some(local_record) if local_record.counter < remote_counter => {
                requested_keys.push(peer_key.clone());
            }
            Some(_) => {
                // Equal counters: tie, no transfer.
            }
            None => requested_keys.push(peer_key.clone()),
        }
    }

    Ok(ExchangeResult {
        requested_keys,
        updates,
    })
}

/// Responder-side logic for `GET /receive_message`, the third and final
/// message of the exchange: ingest the records the initiator is
/// delivering because the responder
/// asked for them. `inc_round` is the initiator's cycle counter, carried
/// only for request tracing/telemetry correlation — the responder's own
/// `data_flow_per_round` bookkeeping is keyed by the responder's own
/// `cycle`, since that is the only counter the responder can account
/// against consistently across many concurrent initiators.
pub fn handle_receive_message(
    store: &Store,
    cycle: u64,
    inc_round: u64,
    updates: Snapshot,
) -> Result<DataFlow> {
    tracing::trace!(inc_round, "ingesting requested records from initiator");
    let k = store
        .latest_time_key()
        .ok_or_else(|| Error::StoreInvariant("no snapshot open".into()))?;
    store.ingest(k, cycle, updates)
}

/// The outbound half of the exchange: the initiator dialing one peer
/// over HTTP. One instance is shared across a node's lifetime so the
/// underlying `reqwest::Client` connection pool is reused.
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    docker_ip: Option<String>,
}

impl PeerClient {
    pub fn new(request_timeout: Duration, docker_ip: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self { http, docker_ip }
    }

    /// Rewrites a peer's host to `docker_ip` if configured, keeping the
    /// port, for container-networking setups where every node is
    /// reachable at one bridge IP but distinct ports.
    fn base_url(&self, peer: &PeerKey) -> Result<String> {
        let (ip, port) = peer.parts()?;
        let host = self.docker_ip.as_deref().unwrap_or(ip);
        Ok(format!("http://{host}:{port}"))
    }

    /// Executes the full three-message exchange against `peer`: push
    /// metadata + our fresh self-record, receive back
    /// `requested_keys`/`updates`, then deliver the requested records.
    /// Returns the `updates` the peer pushed to us, which the caller
    /// merges into its own store.
    pub async fn exchange(
        &self,
        peer: &PeerKey,
        self_key: &PeerKey,
        metadata: Metadata,
        self_record: Record,
        cycle: u64,
        subset: impl Fn(&[PeerKey]) -> Result<Snapshot>,
    ) -> Result<Snapshot> {
        let base = self.base_url(peer)?;

        let push = crate::api::protocol::ReceiveMetadataRequest {
            metadata: metadata.clone(),
            self_key: self_key.clone(),
            record: self_record,
        };

        let response: ExchangeResult = self
            .http
            .post(format!("{base}/receive_metadata"))
            .json(&push)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.requested_keys.is_empty() {
            let payload = subset(&response.requested_keys)?;
            self.http
                .get(format!("{base}/receive_message"))
                .query(&[("inc_round", cycle.to_string())])
                .json(&payload)
                .send()
                .await?
                .error_for_status()?;
        }

        Ok(response.updates)
    }
}
