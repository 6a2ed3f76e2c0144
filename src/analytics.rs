//! src/analytics.rs
//!
//! The analytics sink is an external collaborator: a relational store
//! that ingests flushed snapshots and per-cycle VOI telemetry for
//! offline analysis. This node never opens that database; it only
//! POSTs JSON to `monitoring_address`/`database_address` and forgets —
//! a failed delivery is logged and dropped, never blocking gossip.
//!
//! `AnalyticsSink` is a trait so the gossip engine depends on an
//! interface, not the concrete `round_metrics_stats`/`metric_transmissions`
//! schema the HTTP sink posts against — tests substitute a no-op or
//! in-memory recorder.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{PeerKey, Snapshot};
use crate::voi::{FieldTransmission, RoundStats};

/// One cycle's worth of telemetry, mirroring the
/// `round_metrics_stats`/`metric_transmissions` schema the HTTP sink posts.
#[derive(Clone, Debug, Serialize)]
pub struct CycleTelemetry {
    pub node_ip: String,
    pub node_port: u16,
    pub cycle: u64,
    pub sent_count: u32,
    pub filtered_count: u32,
    pub transmissions: Vec<FieldTransmission>,
}

impl CycleTelemetry {
    pub fn new(
        self_key: &PeerKey,
        cycle: u64,
        stats: RoundStats,
        transmissions: Vec<FieldTransmission>,
    ) -> Self {
        let (ip, port) = self_key.parts().unwrap_or(("", 0));
        Self {
            node_ip: ip.to_string(),
            node_port: port,
            cycle,
            sent_count: stats.sent_count,
            filtered_count: stats.filtered_count,
            transmissions,
        }
    }
}

#[derive(Serialize)]
struct FieldTransmissionWire {
    round: u64,
    field: &'static str,
    was_sent: bool,
}

impl Serialize for FieldTransmission {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        FieldTransmissionWire {
            round: self.round,
            field: self.field,
            was_sent: self.was_sent,
        }
        .serialize(serializer)
    }
}

/// A flush payload for push-mode: everything in the store except the
/// latest snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct FlushPayload {
    pub snapshots: Vec<(u64, Snapshot)>,
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record_cycle(&self, telemetry: CycleTelemetry);
    async fn flush(&self, self_key: &PeerKey, round: u64, payload: FlushPayload);
}

/// Never contacts anything; used in tests and whenever no
/// `monitoring_address`/`database_address` was supplied to `/start_node`.
pub struct NoopAnalyticsSink;

#[async_trait]
impl AnalyticsSink for NoopAnalyticsSink {
    async fn record_cycle(&self, _telemetry: CycleTelemetry) {}
    async fn flush(&self, _self_key: &PeerKey, _round: u64, _payload: FlushPayload) {}
}

/// POSTs telemetry and flush payloads to the configured external
/// addresses. A failed POST is logged and dropped; it never propagates
/// to the gossip loop's critical path, so callers should invoke these
/// methods from a `tokio::spawn`ed task.
pub struct HttpAnalyticsSink {
    http: reqwest::Client,
    monitoring_address: Option<String>,
    database_address: Option<String>,
}

impl HttpAnalyticsSink {
    pub fn new(
        monitoring_address: Option<String>,
        database_address: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("reqwest client configuration is valid"),
            monitoring_address,
            database_address,
        }
    }
}

#[async_trait]
impl AnalyticsSink for HttpAnalyticsSink {
    async fn record_cycle(&self, telemetry: CycleTelemetry) {
        let Some(addr) = &self.monitoring_address else {
            return;
        };
        let url = format!("{addr}/record_cycle");
        if let Err(err) = self.http.post(&url).json(&telemetry).send().await {
            tracing::warn!(%err, url, "analytics sink unreachable, dropping cycle telemetry");
        }
    }

    async fn flush(&self, self_key: &PeerKey, round: u64, payload: FlushPayload) {
        let Some(addr) = &self.database_address else {
            return;
        };
        let (ip, port) = self_key.parts().unwrap_or(("", 0));
        let url = format!("{addr}/push_data_to_database?ip={ip}&port={port}&round={round}");
        if let Err(err) = self.http.post(&url).json(&payload).send().await {
            tracing::warn!(%err, url, "analytics sink unreachable, dropping flush payload");
        }
    }
}
