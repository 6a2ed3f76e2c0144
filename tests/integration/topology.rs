//! tests/integration/topology.rs
//!
//! Failure detection and eviction when a peer goes offline, and
//! `/reset_node` followed by `/start_node` returning a node to a clean
//! initial state.

use std::time::Duration;

use reqwest::StatusCode;
use test_log::test;

use crate::common::harness::{wait_until, TestNode};

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn peer_going_offline_is_evicted_after_three_failures() {
    let result = tokio::time::timeout(Duration::from_secs(30), async {
        let node_a = TestNode::spawn().await.expect("spawn A");
        let node_b = TestNode::spawn().await.expect("spawn B");

        node_a.start_node(&[node_b.addr], 1, 1.0).await.expect("start A");
        node_b.start_node(&[node_a.addr], 1, 1.0).await.expect("start B");

        // Let them exchange at least once before taking B down.
        wait_until(
            || async { node_a.recent_data().await },
            |snapshot| snapshot.contains_key(&node_b.peer_key()),
            Duration::from_secs(20),
        )
        .await
        .expect("A should learn about B before it goes offline");

        // Kill B's whole process (not just its gossip loop) so A's
        // outbound exchanges actually fail rather than succeeding
        // against a stopped-but-still-listening peer.
        node_b.shutdown();

        let converged = wait_until(
            || async { node_a.recent_data().await },
            |snapshot| {
                snapshot
                    .get(&node_b.peer_key())
                    .map(|record| !record.hb_state.node_alive)
                    .unwrap_or(false)
            },
            Duration::from_secs(20),
        )
        .await
        .expect("A should mark B as not alive after repeated failures");

        let b_record = converged.get(&node_b.peer_key()).unwrap();
        assert!(!b_record.hb_state.node_alive);
        assert!(b_record.hb_state.failure_count >= 3);

        node_a.shutdown();
    })
    .await;

    assert!(result.is_ok(), "test timed out");
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn reset_then_start_returns_to_a_clean_state() {
    let result = tokio::time::timeout(Duration::from_secs(30), async {
        let node_a = TestNode::spawn().await.expect("spawn A");
        let node_b = TestNode::spawn().await.expect("spawn B");

        node_a.start_node(&[node_b.addr], 1, 1.0).await.expect("start A");
        node_b.start_node(&[node_a.addr], 1, 1.0).await.expect("start B");

        wait_until(
            || async { node_a.recent_data().await },
            |snapshot| snapshot.contains_key(&node_b.peer_key()),
            Duration::from_secs(20),
        )
        .await
        .expect("A should learn about B");

        node_a.reset_node().await.expect("reset A");

        // Immediately after reset, there is no running session: the
        // store is gone, so the read endpoint reports "not running".
        let status = node_a
            .raw_get_status("/get_recent_data_from_node")
            .await
            .expect("status check");
        assert_eq!(status, StatusCode::CONFLICT);

        // Restarting with the original parameters begins from a clean
        // slate: A has to re-learn about B from scratch.
        node_a.start_node(&[node_b.addr], 1, 1.0).await.expect("restart A");
        wait_until(
            || async { node_a.recent_data().await },
            |snapshot| snapshot.contains_key(&node_b.peer_key()),
            Duration::from_secs(20),
        )
        .await
        .expect("A should re-converge with B after restart");

        node_a.shutdown();
        node_b.shutdown();
    })
    .await;

    assert!(result.is_ok(), "test timed out");
}
