//! src/membership.rs
//!
//! The `node_list`: this node's view of its peers, keyed by `peer_key`
//! rather than held as a bare list, so lookups and eviction are O(1)
//! instead of a linear scan. Mutated only by the failure detector
//! (eviction) and by `/start_node`-time initialization; read by the
//! gossip engine's peer sampling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;

use crate::domain::{PeerInfo, PeerKey};

#[derive(Clone, Default)]
pub struct Membership {
    peers: Arc<Mutex<HashMap<PeerKey, PeerInfo>>>,
}

impl Membership {
    pub fn new(initial: HashMap<PeerKey, PeerInfo>) -> Self {
        Self {
            peers: Arc::new(Mutex::new(initial)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PeerKey, PeerInfo>> {
        self.peers.lock().expect("membership mutex poisoned")
    }

    pub fn reset(&self, initial: HashMap<PeerKey, PeerInfo>) {
        *self.lock() = initial;
    }

    pub fn snapshot(&self) -> HashMap<PeerKey, PeerInfo> {
        self.lock().clone()
    }

    pub fn contains(&self, key: &PeerKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Removes a peer from the membership view entirely: eviction drops
    /// the peer from `node_list` rather than merely flagging it dead.
    pub fn evict(&self, key: &PeerKey) {
        self.lock().remove(key);
    }

    /// Draws `count` distinct peers (or fewer if the view is smaller)
    /// using the caller-supplied CSPRNG, without replacement. Callers are
    /// expected to pass an RNG seeded from OS entropy.
    pub fn sample_without_replacement<R: rand::Rng + ?Sized>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Vec<PeerKey> {
        let peers = self.lock();
        let mut keys: Vec<PeerKey> = peers.keys().cloned().collect();
        keys.shuffle(rng);
        keys.truncate(count);
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
