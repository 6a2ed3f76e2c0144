//! src/failure.rs
//!
//! The heartbeat/failure detector: a simple accrual counter over
//! consecutive exchange failures per peer, evicting at a fixed
//! threshold. Bookkeeping is not a separate structure — it lives in the
//! `hbState` fields of the peer's own entry in the state store, which is
//! the single source of truth both the failure detector and the
//! membership view derive from.

use crate::domain::PeerKey;
use crate::error::Result;
use crate::membership::Membership;
use crate::store::Store;

/// Consecutive failures at which a peer is evicted. A fixed design
/// constant, not configurable.
pub const EVICTION_THRESHOLD: u32 = 3;

pub struct FailureDetector {
    store: Store,
    membership: Membership,
    self_key: PeerKey,
}

impl FailureDetector {
    pub fn new(store: Store, membership: Membership, self_key: PeerKey) -> Self {
        Self {
            store,
            membership,
            self_key,
        }
    }

    /// Records a failed exchange with `peer` at `time_key`. Appends self
    /// to the peer's `failureList` if absent, increments `failureCount`,
    /// and evicts the peer from the membership view once the threshold
    /// is reached. Synthesizes a placeholder record if this is the
    /// first time `peer` has ever appeared in the store.
    pub fn record_failure(&self, time_key: u64, peer: &PeerKey) -> Result<bool> {
        let self_key = self.self_key.clone();
        let (ip, port) = self
            .membership
            .snapshot()
            .get(peer)
            .map(|info| (info.ip.clone(), info.port))
            .unwrap_or_else(|| peer.parts().map(|(ip, port)| (ip.to_string(), port)).unwrap_or_default());
        let mut evicted = false;
        self.store
            .with_hb_state_mut_or_insert(time_key, peer, &ip, port, |hb| {
                if !hb.failure_list.contains(&self_key) {
                    hb.failure_list.push(self_key);
                }
                hb.failure_count += 1;
                if hb.failure_count >= EVICTION_THRESHOLD {
                    hb.node_alive = false;
                    evicted = true;
                }
            })?;
        if evicted {
            self.membership.evict(peer);
            tracing::warn!(peer_key = %peer, "Peer evicted after repeated failures");
        }
        Ok(evicted)
    }

    /// Records a successful exchange with `peer`: resets `failureCount`
    /// to zero, clears `failureList`, and marks the peer alive.
    pub fn record_success(&self, time_key: u64, peer: &PeerKey) -> Result<()> {
        let (ip, port) = self
            .membership
            .snapshot()
            .get(peer)
            .map(|info| (info.ip.clone(), info.port))
            .unwrap_or_else(|| peer.parts().map(|(ip, port)| (ip.to_string(), port)).unwrap_or_default());
        self.store
            .with_hb_state_mut_or_insert(time_key, peer, &ip, port, |hb| {
                hb.failure_count = 0;
                hb.failure_list.clear();
                hb.node_alive = true;
            })
    }
}
