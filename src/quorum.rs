//! src/quorum.rs
//!
//! The quorum-read protocol: an external client samples `Q` peers,
//! requires counter+digest agreement across all of them, then fetches
//! the record from any one of them. Implemented as a plain async
//! function over `reqwest` so it can run either inside this crate's
//! CLI (`gossip-fabric query`) or be embedded by a caller that already
//! has a peer list in hand.

use std::collections::HashMap;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::domain::{PeerKey, Record};
use crate::error::{Error, Result};

/// One peer's reported view of the target key: counter + digest, as
/// returned by `GET /metadata` — a richer shape than the plain
/// `{peer_key -> counter}` used internally by the anti-entropy
/// exchange, since quorum agreement needs both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub counter: u64,
    pub digest: String,
}

pub type MetadataResponse = HashMap<PeerKey, MetadataEntry>;

/// Outcome of a successful quorum read: the converged record plus the
/// total number of HTTP messages issued across every attempt (mirrors
/// the original's `(total_messages, result)` return).
#[derive(Clone, Debug, PartialEq)]
pub struct QuorumReadResult {
    pub record: Record,
    pub total_messages: u32,
}

/// Caps the number of sample-and-check rounds so a caller never blocks
/// forever against a membership that will never converge; an otherwise
/// unbounded retry loop is bounded here by a generous default, surfaced
/// via `Error::QuorumNotReached` when exhausted.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;

/// Runs the quorum-read protocol against `node_list` for `target`,
/// requiring agreement from `quorum_size` independently sampled peers.
pub async fn quorum_read(
    http: &reqwest::Client,
    node_list: &[PeerKey],
    quorum_size: usize,
    target: &PeerKey,
    docker_ip: Option<&str>,
    max_attempts: u32,
) -> Result<QuorumReadResult> {
    let mut rng = rand::thread_rng();
    let mut total_messages = 0u32;

    for _attempt in 0..max_attempts {
        let mut sample: Vec<PeerKey> = node_list.to_vec();
        sample.shuffle(&mut rng);
        sample.truncate(quorum_size);
        if sample.len() < quorum_size {
            continue; // membership too small to form a quorum this round
        }

        let mut observed: Vec<(PeerKey, MetadataEntry)> = Vec::with_capacity(sample.len());
        for peer in &sample {
            total_messages += 1;
            let base = base_url(peer, docker_ip)?;
            let response = http.get(format!("{base}/metadata")).send().await;
            let Ok(response) = response else { continue };
            let Ok(metadata) = response.json::<MetadataResponse>().await else {
                continue;
            };
            if let Some(entry) = metadata.get(target) {
                observed.push((peer.clone(), entry.clone()));
            }
        }

        if observed.len() < quorum_size {
            continue; // not every sampled peer answered with the target
        }

        let first = &observed[0].1;
        let agree = observed
            .iter()
            .all(|(_, entry)| entry.counter == first.counter && entry.digest == first.digest);
        if !agree {
            continue;
        }

        let chosen = &observed[0].0;
        total_messages += 1;
        let base = base_url(chosen, docker_ip)?;
        let snapshot: crate::domain::Snapshot = http
            .get(format!("{base}/get_recent_data_from_node"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if let Some(record) = snapshot.get(target) {
            return Ok(QuorumReadResult {
                record: record.clone(),
                total_messages,
            });
        }
        // The chosen peer agreed on counter+digest via /metadata but no
        // longer has the record at /get_recent_data_from_node (raced with
        // a prune); retry.
    }

    Err(Error::QuorumNotReached {
        attempts: max_attempts,
    })
}

pub fn http_client(request_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .build()
        .expect("reqwest client configuration is valid")
}

fn base_url(peer: &PeerKey, docker_ip: Option<&str>) -> Result<String> {
    let (ip, port) = peer.parts()?;
    let host = docker_ip.unwrap_or(ip);
    Ok(format!("http://{host}:{port}"))
}
