//! src/domain.rs
//!
//! The Lingua Franca of our system.
//!
//! Defines the core, shared data structures passed between the clock,
//! sampler, state store, VOI filter, failure detector, and gossip engine.
//! Centralizing them here avoids circular dependencies and gives the
//! protocol a single, serializable source of truth for what a "record" is.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A peer's identity on the wire: `ip:port`. Wrapped rather than used as a
/// bare `String` so the state store, membership view, and HTTP handlers all
/// agree on what a key looks like and can't accidentally mix it up with an
/// arbitrary string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerKey(String);

impl PeerKey {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self(format!("{}:{}", ip.into(), port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the key back into its `(ip, port)` parts.
    pub fn parts(&self) -> Result<(&str, u16)> {
        let (ip, port) = self
            .0
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidPeerKey(self.0.clone()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidPeerKey(self.0.clone()))?;
        Ok((ip, port))
    }
}

impl FromStr for PeerKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = Self(s.to_string());
        key.parts()?; // validate shape eagerly
        Ok(key)
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An entry in the membership view (`node_list`). Mutated only by the
/// owning node's failure detector and by start-time initialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub ip: String,
    pub port: u16,
    pub is_alive: bool,
}

impl PeerInfo {
    pub fn key(&self) -> PeerKey {
        PeerKey::new(self.ip.clone(), self.port)
    }
}

/// Stable identity of the authoring peer, embedded in every record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    pub id: String,
    pub ip: String,
    pub port: u16,
}

/// Heartbeat / failure-detector state as reflected in *this node's* copy of
/// a peer's record. Per the data-model invariant, the fields here describe
/// the local node's view of the peer, not the peer's view of itself, and
/// `failure_count` / `failure_list` / `node_alive` are only ever mutated by
/// the local failure detector (`crate::failure`), never copied verbatim off
/// the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HbState {
    pub timestamp: u64,
    pub failure_count: u32,
    pub failure_list: Vec<PeerKey>,
    pub node_alive: bool,
}

/// Host-sampled metric fields. Each is optional: the VOI filter omits a
/// field from an outgoing record rather than resending a stale value,
/// and a host-sampler failure omits a field from the record entirely
/// rather than failing the whole cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

impl AppState {
    /// Field-level merge used by `Store::ingest`: a field present in
    /// `incoming` overwrites; a field absent keeps whatever `self` already
    /// holds, so a VOI-suppressed field never clobbers a previously
    /// stored value with nothing.
    pub fn merge_from(&mut self, incoming: &AppState) {
        if incoming.cpu.is_some() {
            self.cpu = incoming.cpu.clone();
        }
        if incoming.memory.is_some() {
            self.memory = incoming.memory.clone();
        }
        if incoming.network.is_some() {
            self.network = incoming.network.clone();
        }
        if incoming.storage.is_some() {
            self.storage = incoming.storage.clone();
        }
    }

    /// The field names understood by the VOI filter, in priority order.
    pub const FIELDS: [&'static str; 4] = ["cpu", "memory", "network", "storage"];

    pub fn get(&self, field: &str) -> Option<&str> {
        match field {
            "cpu" => self.cpu.as_deref(),
            "memory" => self.memory.as_deref(),
            "network" => self.network.as_deref(),
            "storage" => self.storage.as_deref(),
            _ => None,
        }
    }

    pub fn set(&mut self, field: &str, value: Option<String>) {
        match field {
            "cpu" => self.cpu = value,
            "memory" => self.memory = value,
            "network" => self.network = value,
            "storage" => self.storage = value,
            _ => {}
        }
    }
}

/// Reserved extension map. The protocol never interprets it; it exists so
/// future fields can ride along without a wire-format break.
pub type NfState = HashMap<String, serde_json::Value>;

/// One peer's record at a given `time_key`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub counter: u64,
    pub cycle: u64,
    #[serde(default)]
    pub digest: String,
    pub node_state: NodeState,
    pub hb_state: HbState,
    pub app_state: AppState,
    #[serde(default)]
    pub nf_state: NfState,
}

/// `{peer_key -> counter}` summary of what a node knows, exchanged as
/// message 1 of the peer-exchange protocol.
pub type Metadata = HashMap<PeerKey, u64>;

/// A snapshot at one `time_key`: every peer's record as this node currently
/// knows it.
pub type Snapshot = HashMap<PeerKey, Record>;
