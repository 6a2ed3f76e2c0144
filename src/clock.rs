//! src/clock.rs
//!
//! The node's only source of freshness: a monotonic counter incremented
//! once a second while the node is alive. Every `time_key` and every
//! self-authored `Record.counter` value is read from this clock, never
//! from wall-clock time, so freshness comparisons stay correct even across
//! nodes with skewed system clocks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A shared, monotonically non-decreasing counter ticked by a background
/// task. Cheap to clone: all clones observe the same underlying counter.
#[derive(Clone, Default)]
pub struct Clock {
    counter: Arc<AtomicU64>,
    alive: Arc<AtomicBool>,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(0)),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Current counter reading. Used both as the `time_key` a gossip cycle
    /// opens and as the `counter` embedded in the node's own record.
    pub fn now(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Resets the counter to zero. Used by `/reset_node`.
    pub fn reset(&self) {
        self.counter.store(0, Ordering::Release);
        self.alive.store(true, Ordering::Release);
    }

    /// Runs the 1 Hz tick loop until `stop()` is called or `shutdown` fires.
    pub async fn run(self, shutdown: tokio_util::sync::CancellationToken) {
        tracing::info!("Clock/counter activity started");
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Clock activity received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if !self.is_alive() {
                        tracing::info!("Clock activity stopping: node no longer alive");
                        break;
                    }
                    let new_value = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
                    tracing::trace!(gossip_counter = new_value, "Clock tick");
                }
            }
        }
    }
}
