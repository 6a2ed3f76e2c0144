//! src/api/protocol.rs
//!
//! Wire-level request/response shapes for the HTTP surface.
//! Kept separate from the in-process types (`crate::domain`,
//! `crate::engine::protocol`) so a change to the wire format never has to
//! ripple through the protocol logic itself, and so the handlers in
//! `api::mod` read as thin translation + dispatch.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Metadata, PeerInfo, PeerKey, Record};
use crate::node::StartParams;

/// One entry of the `node_list` a `POST /start_node` caller supplies.
/// The initial peer list is injected at start-up — there is no dynamic
/// membership discovery — so this is the only place peers ever enter
/// a node's membership view besides eviction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerListEntry {
    pub ip: String,
    pub port: u16,
}

/// `POST /start_node` body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartNodeRequest {
    pub node_list: Vec<PeerListEntry>,
    pub target_count: usize,
    /// Seconds between gossip cycles.
    pub gossip_rate: f64,
    #[serde(default)]
    pub database_address: Option<String>,
    #[serde(default)]
    pub monitoring_address: Option<String>,
    pub node_ip: String,
    #[serde(default)]
    pub is_send_data_back: bool,
    #[serde(default)]
    pub push_mode: bool,
    pub client_port: u16,
}

impl StartNodeRequest {
    /// Converts the wire request into the native-typed `StartParams` the
    /// `NodeRegistry` understands, deriving `self_key` from
    /// `node_ip:client_port` and building the initial membership view
    /// from `node_list` (excluding self, should a caller accidentally
    /// include it).
    pub fn into_start_params(self) -> StartParams {
        let self_key = PeerKey::new(self.node_ip.clone(), self.client_port);
        let node_list = self
            .node_list
            .into_iter()
            .map(|entry| {
                let key = PeerKey::new(entry.ip.clone(), entry.port);
                (
                    key,
                    PeerInfo {
                        ip: entry.ip,
                        port: entry.port,
                        is_alive: true,
                    },
                )
            })
            .filter(|(key, _)| *key != self_key)
            .collect();

        StartParams {
            self_key,
            node_list,
            target_count: self.target_count,
            gossip_rate: Duration::from_secs_f64(self.gossip_rate.max(0.0)),
            database_address: self.database_address,
            monitoring_address: self.monitoring_address,
            is_send_data_back: self.is_send_data_back,
            push_mode: self.push_mode,
        }
    }
}

/// `POST /receive_metadata` body: message 1 of the peer-exchange
/// protocol — the initiator's view of its peers plus its own
/// freshest, VOI-filtered record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReceiveMetadataRequest {
    pub metadata: Metadata,
    pub self_key: PeerKey,
    pub record: Record,
}

/// Query string for `GET /receive_message?inc_round=<N>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncRoundQuery {
    pub inc_round: u64,
}
