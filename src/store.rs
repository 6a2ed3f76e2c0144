//! src/store.rs
//!
//! The per-node state store: an ordered `time_key -> snapshot` history,
//! where a snapshot is `peer_key -> Record`. This is the only
//! significantly shared mutable resource in the node: the
//! gossip loop opens new time_keys and writes the self record, inbound
//! HTTP handlers read metadata/subsets and ingest updates, and the
//! failure detector mutates `hbState` fields in place. All of that goes
//! through the single lock here so reads and writes of one snapshot stay
//! linearizable.
//!
//! The lock is a plain `std::sync::Mutex`: every critical section below
//! is pure in-memory bookkeeping, never an `.await`, so there is no risk
//! of holding it across an outbound call.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::domain::{Metadata, PeerKey, Record, Snapshot};
use crate::error::{Error, Result};

/// Per-cycle ingest classification counts, exposed to the control plane
/// and analytics sink (`data_flow_per_round[cycle] = {fd, nd}`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataFlow {
    /// Number of ingested updates for a peer_key already present in the
    /// target snapshot ("fresh data").
    pub fresh: u32,
    /// Number of ingested updates for a peer_key previously absent
    /// ("new data").
    pub new: u32,
}

struct Inner {
    self_key: PeerKey,
    history: BTreeMap<u64, Snapshot>,
    data_flow_per_round: BTreeMap<u64, DataFlow>,
}

/// Handle to the shared state store. Cheap to clone; all clones share the
/// same underlying history.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<Inner>>,
}

impl Store {
    pub fn new(self_key: PeerKey) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                self_key,
                history: BTreeMap::new(),
                data_flow_per_round: BTreeMap::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }

    /// Drops all history and ingest bookkeeping. Used by `/reset_node`.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.history.clear();
        inner.data_flow_per_round.clear();
    }

    /// Creates `snapshot[k]` as a shallow copy of the latest existing
    /// snapshot (carry-forward), or empty if this is the first time_key.
    /// Fails if `k` is not strictly greater than every existing key.
    pub fn open_new_time_key(&self, k: u64) -> Result<()> {
        let mut inner = self.lock();
        if let Some((&max_key, _)) = inner.history.iter().next_back() {
            if k <= max_key {
                return Err(Error::StoreInvariant(format!(
                    "time_key {k} is not strictly greater than existing max {max_key}"
                )));
            }
        }
        let carried = inner
            .history
            .iter()
            .next_back()
            .map(|(_, snap)| snap.clone())
            .unwrap_or_default();
        inner.history.insert(k, carried);
        Ok(())
    }

    /// Overwrites `snapshot[k][self_key]`.
    pub fn put_self(&self, k: u64, record: Record) -> Result<()> {
        let mut inner = self.lock();
        let self_key = inner.self_key.clone();
        let snapshot = inner
            .history
            .get_mut(&k)
            .ok_or_else(|| Error::StoreInvariant(format!("no snapshot open at time_key {k}")))?;
        snapshot.insert(self_key, record);
        Ok(())
    }

    /// `{peer_key -> counter}` for every entry in `snapshot[k]` except self.
    pub fn metadata(&self, k: u64) -> Result<Metadata> {
        let inner = self.lock();
        let snapshot = inner
            .history
            .get(&k)
            .ok_or_else(|| Error::StoreInvariant(format!("no snapshot at time_key {k}")))?;
        Ok(snapshot
            .iter()
            .filter(|(key, _)| **key != inner.self_key)
            .map(|(key, record)| (key.clone(), record.counter))
            .collect())
    }

    /// `{peer_key -> {counter, digest}}` for every entry in `snapshot[k]`,
    /// including self. Backs `GET /metadata`, which — unlike the internal
    /// `metadata()` used in the anti-entropy exchange — must expose the
    /// digest too, since the quorum-read protocol needs both to judge
    /// agreement, and must include self so a quorum read can
    /// target any node, including the one answering the request.
    pub fn metadata_with_digest(&self, k: u64) -> Result<crate::quorum::MetadataResponse> {
        let inner = self.lock();
        let snapshot = inner
            .history
            .get(&k)
            .ok_or_else(|| Error::StoreInvariant(format!("no snapshot at time_key {k}")))?;
        Ok(snapshot
            .iter()
            .map(|(key, record)| {
                (
                    key.clone(),
                    crate::quorum::MetadataEntry {
                        counter: record.counter,
                        digest: record.digest.clone(),
                    },
                )
            })
            .collect())
    }

    /// The records held in `snapshot[k]` for the requested keys that exist.
    pub fn subset(&self, k: u64, keys: &[PeerKey]) -> Result<Snapshot> {
        let inner = self.lock();
        let snapshot = inner
            .history
            .get(&k)
            .ok_or_else(|| Error::StoreInvariant(format!("no snapshot at time_key {k}")))?;
        Ok(keys
            .iter()
            .filter_map(|key| snapshot.get(key).map(|record| (key.clone(), record.clone())))
            .collect())
    }

    /// Merges `updates` into `snapshot[k]`, classifying each as fresh or
    /// new data for this `cycle`'s analytics counters. `appState` merges
    /// field-by-field (an absent field keeps the stored value) and
    /// `hbState` failure fields are never overwritten from a
    /// peer-authored record.
    pub fn ingest(&self, k: u64, cycle: u64, updates: Snapshot) -> Result<DataFlow> {
        let mut inner = self.lock();
        let self_key = inner.self_key.clone();
        let snapshot = inner
            .history
            .get_mut(&k)
            .ok_or_else(|| Error::StoreInvariant(format!("no snapshot open at time_key {k}")))?;

        let mut flow = DataFlow::default();
        for (peer_key, incoming) in updates {
            if peer_key == self_key {
                // Never forge our own counter from a remote update (invariant 4).
                continue;
            }
            match snapshot.get_mut(&peer_key) {
                Some(existing) => {
                    if incoming.counter <= existing.counter {
                        // Tie or stale: nothing to apply (§4.8 tie-break).
                        continue;
                    }
                    let preserved_hb = existing.hb_state.clone();
                    existing.counter = incoming.counter;
                    existing.cycle = incoming.cycle;
                    existing.digest = incoming.digest;
                    existing.node_state = incoming.node_state;
                    existing.hb_state.timestamp = incoming.hb_state.timestamp;
                    existing.hb_state.failure_count = preserved_hb.failure_count;
                    existing.hb_state.failure_list = preserved_hb.failure_list;
                    existing.hb_state.node_alive = preserved_hb.node_alive;
                    existing.app_state.merge_from(&incoming.app_state);
                    existing.nf_state = incoming.nf_state;
                    flow.fresh += 1;
                }
                None => {
                    snapshot.insert(peer_key, incoming);
                    flow.new += 1;
                }
            }
        }

        let entry = inner.data_flow_per_round.entry(cycle).or_default();
        entry.fresh += flow.fresh;
        entry.new += flow.new;
        Ok(flow)
    }

    /// Retains only the snapshot at the maximum time_key.
    pub fn prune_all_but_latest(&self) {
        let mut inner = self.lock();
        if let Some((&max_key, _)) = inner.history.iter().next_back() {
            inner.history.retain(|&k, _| k == max_key);
        }
    }

    /// Removes and returns every snapshot except the latest, oldest key
    /// first, for a push-mode flush. Leaves the latest snapshot in place.
    pub fn drain_all_but_latest(&self) -> Vec<(u64, Snapshot)> {
        let mut inner = self.lock();
        let Some((&max_key, _)) = inner.history.iter().next_back() else {
            return Vec::new();
        };
        let stale_keys: Vec<u64> = inner
            .history
            .keys()
            .copied()
            .filter(|&k| k != max_key)
            .collect();
        stale_keys
            .into_iter()
            .filter_map(|k| inner.history.remove(&k).map(|snap| (k, snap)))
            .collect()
    }

    pub fn latest_time_key(&self) -> Option<u64> {
        self.lock().history.iter().next_back().map(|(&k, _)| k)
    }

    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.lock().history.iter().next_back().map(|(_, s)| s.clone())
    }

    pub fn data_flow(&self, cycle: u64) -> DataFlow {
        self.lock().data_flow_per_round.get(&cycle).copied().unwrap_or_default()
    }

    /// Mutates a single peer's stored `hbState` in place. Used by the
    /// failure detector so it never has to re-derive a snapshot.
    pub fn with_hb_state_mut<F>(&self, k: u64, peer: &PeerKey, f: F) -> Result<()>
    where
        F: FnOnce(&mut crate::domain::HbState),
    {
        let mut inner = self.lock();
        let snapshot = inner
            .history
            .get_mut(&k)
            .ok_or_else(|| Error::StoreInvariant(format!("no snapshot open at time_key {k}")))?;
        let record = snapshot
            .get_mut(peer)
            .ok_or_else(|| Error::StoreInvariant(format!("no record for {peer} at time_key {k}")))?;
        f(&mut record.hb_state);
        Ok(())
    }

    /// Like `with_hb_state_mut`, but synthesizes a minimal placeholder
    /// record (identity only, otherwise default) when `peer` has never
    /// been ingested into `snapshot[k]` yet. Needed because the failure
    /// detector can observe a send failure against a peer this node has
    /// never successfully exchanged with, since nothing forbids failing
    /// against a stranger peer from a freshly-opened, otherwise-empty
    /// snapshot.
    pub fn with_hb_state_mut_or_insert<F>(
        &self,
        k: u64,
        peer: &PeerKey,
        ip: &str,
        port: u16,
        f: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut crate::domain::HbState),
    {
        let mut inner = self.lock();
        let snapshot = inner
            .history
            .get_mut(&k)
            .ok_or_else(|| Error::StoreInvariant(format!("no snapshot open at time_key {k}")))?;
        let record = snapshot.entry(peer.clone()).or_insert_with(|| Record {
            node_state: crate::domain::NodeState {
                id: peer.to_string(),
                ip: ip.to_string(),
                port,
            },
            ..Record::default()
        });
        f(&mut record.hb_state);
        Ok(())
    }
}
