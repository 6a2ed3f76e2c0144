//! tests/integration/adversarial.rs
//!
//! Robustness scenarios that only show up with real HTTP round trips:
//! the analytics sink is a best-effort external collaborator that must
//! never block or derail the gossip loop, whether it is healthy,
//! unreachable, or simply configured with push-mode enabled.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::Router;
use test_log::test;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::common::harness::{wait_until, TestNode};

/// A minimal stand-in for the external analytics sink: counts POSTs to
/// `/record_cycle` and `/push_data_to_database` without
/// inspecting their bodies, matching this crate's "write-only from the
/// node's perspective" contract for that collaborator.
struct MockSink {
    addr: SocketAddr,
    cycle_posts: Arc<AtomicU32>,
    flush_posts: Arc<AtomicU32>,
    shutdown: CancellationToken,
}

impl MockSink {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cycle_posts = Arc::new(AtomicU32::new(0));
        let flush_posts = Arc::new(AtomicU32::new(0));

        #[derive(Clone)]
        struct SinkState {
            cycle_posts: Arc<AtomicU32>,
            flush_posts: Arc<AtomicU32>,
        }

        async fn record_cycle(State(state): State<SinkState>) {
            state.cycle_posts.fetch_add(1, Ordering::SeqCst);
        }

        async fn push_to_database(State(state): State<SinkState>) {
            state.flush_posts.fetch_add(1, Ordering::SeqCst);
        }

        let router = Router::new()
            .route("/record_cycle", post(record_cycle))
            .route("/push_data_to_database", post(push_to_database))
            .with_state(SinkState {
                cycle_posts: cycle_posts.clone(),
                flush_posts: flush_posts.clone(),
            });

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .ok();
        });

        Self {
            addr,
            cycle_posts,
            flush_posts,
            shutdown,
        }
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn cycle_post_count(&self) -> u32 {
        self.cycle_posts.load(Ordering::SeqCst)
    }

    fn flush_post_count(&self) -> u32 {
        self.flush_posts.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn analytics_sink_receives_per_cycle_telemetry_and_push_mode_flush() {
    let result = tokio::time::timeout(Duration::from_secs(30), async {
        let sink = MockSink::spawn().await;
        let node_a = TestNode::spawn().await.expect("spawn A");

        node_a
            .start_node_full(&[], 1, 1.0, true, Some(sink.base_url()), Some(sink.base_url()))
            .await
            .expect("start with analytics sink configured");

        // Wait long enough for at least 10 cycles (push-mode flushes
        // every 10th cycle) at a 1s gossip rate, the clock's own tick
        // granularity — a faster gossip rate would just repeatedly
        // contend for the same still-open time_key.
        tokio::time::sleep(Duration::from_millis(11_500)).await;

        assert!(
            sink.cycle_post_count() >= 10,
            "expected at least 10 cycle telemetry posts, saw {}",
            sink.cycle_post_count()
        );
        assert!(
            sink.flush_post_count() >= 1,
            "expected at least one push-mode flush, saw {}",
            sink.flush_post_count()
        );

        node_a.shutdown();
        sink.shutdown();
    })
    .await;

    assert!(result.is_ok(), "test timed out");
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn unreachable_analytics_sink_never_blocks_gossip() {
    let result = tokio::time::timeout(Duration::from_secs(30), async {
        let node_a = TestNode::spawn().await.expect("spawn A");
        let node_b = TestNode::spawn().await.expect("spawn B");

        // Point both nodes at a monitoring address nothing is listening
        // on. Convergence must still happen.
        let dead_sink = "http://127.0.0.1:1".to_string();
        node_a
            .start_node_full(&[node_b.addr], 1, 1.0, false, None, Some(dead_sink.clone()))
            .await
            .expect("start A with an unreachable sink");
        node_b
            .start_node_full(&[node_a.addr], 1, 1.0, false, None, Some(dead_sink))
            .await
            .expect("start B with an unreachable sink");

        wait_until(
            || async { node_a.recent_data().await },
            |snapshot| snapshot.contains_key(&node_b.peer_key()),
            Duration::from_secs(20),
        )
        .await
        .expect("gossip should converge even with a dead analytics sink");

        node_a.shutdown();
        node_b.shutdown();
    })
    .await;

    assert!(result.is_ok(), "test timed out");
}
