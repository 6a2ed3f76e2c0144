//! tests/integration/network.rs
//!
//! Bootstrap convergence across a small, static, failure-free
//! membership, and the quorum-read protocol once a membership has
//! converged.

use std::time::Duration;

use gossip_fabric::quorum;
use test_log::test;

use crate::common::harness::{wait_until, TestNode};

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn three_nodes_converge_on_each_others_records() {
    let result = tokio::time::timeout(Duration::from_secs(30), async {
        let node_a = TestNode::spawn().await.expect("spawn A");
        let node_b = TestNode::spawn().await.expect("spawn B");
        let node_c = TestNode::spawn().await.expect("spawn C");

        let addrs = [node_a.addr, node_b.addr, node_c.addr];
        for node in [&node_a, &node_b, &node_c] {
            let peers: Vec<_> = addrs.iter().copied().filter(|a| *a != node.addr).collect();
            node.start_node(&peers, 2, 1.0).await.expect("start_node");
        }

        for node in [&node_a, &node_b, &node_c] {
            wait_until(
                || async { node.recent_data().await },
                |snapshot| snapshot.len() == 3,
                Duration::from_secs(20),
            )
            .await
            .expect("node should eventually know about all three peers");
        }

        node_a.shutdown();
        node_b.shutdown();
        node_c.shutdown();
    })
    .await;

    assert!(result.is_ok(), "test timed out");
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn quorum_read_returns_converged_record() {
    let result = tokio::time::timeout(Duration::from_secs(30), async {
        let node_a = TestNode::spawn().await.expect("spawn A");
        let node_b = TestNode::spawn().await.expect("spawn B");
        let node_c = TestNode::spawn().await.expect("spawn C");

        let addrs = [node_a.addr, node_b.addr, node_c.addr];
        for node in [&node_a, &node_b, &node_c] {
            let peers: Vec<_> = addrs.iter().copied().filter(|a| *a != node.addr).collect();
            node.start_node(&peers, 2, 1.0).await.expect("start_node");
        }

        // Wait until every node has converged on node_a's record.
        for node in [&node_a, &node_b, &node_c] {
            wait_until(
                || async { node.recent_data().await },
                |snapshot| snapshot.contains_key(&node_a.peer_key()),
                Duration::from_secs(20),
            )
            .await
            .expect("every node should learn about A");
        }

        let http = quorum::http_client(Duration::from_secs(5));
        let node_list = vec![node_a.peer_key(), node_b.peer_key(), node_c.peer_key()];

        let outcome = tokio::time::timeout(
            Duration::from_secs(20),
            quorum::quorum_read(&http, &node_list, 3, &node_a.peer_key(), None, 200),
        )
        .await
        .expect("quorum read should not time out")
        .expect("quorum read should eventually converge");

        assert_eq!(outcome.record.node_state.ip, node_a.addr.ip().to_string());
        assert!(outcome.total_messages > 0);

        node_a.shutdown();
        node_b.shutdown();
        node_c.shutdown();
    })
    .await;

    assert!(result.is_ok(), "test timed out");
}
