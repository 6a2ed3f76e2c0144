//! src/voi.rs
//!
//! Value-of-Information filter: decides per `appState` field whether this
//! cycle's sampled value is worth transmitting, so a gossip cycle's
//! outbound record only carries fields that changed meaningfully and
//! whose priority period has elapsed.

use std::collections::HashMap;

use crate::domain::AppState;

/// Priority period (rounds) and delta threshold for one field. Default
/// values are the authoritative per-field constants for this filter.
#[derive(Clone, Copy, Debug)]
pub struct FieldConfig {
    pub priority_rounds: u64,
    pub delta: f64,
}

/// `(priority_rounds, delta)` per field, indexed by `AppState::FIELDS` order.
pub const DEFAULT_FIELDS: [FieldConfig; 4] = [
    FieldConfig { priority_rounds: 1, delta: 5.0 },   // cpu
    FieldConfig { priority_rounds: 5, delta: 7.0 },   // memory
    FieldConfig { priority_rounds: 5, delta: 15.0 },  // network
    FieldConfig { priority_rounds: 10, delta: 10.0 }, // storage
];

#[derive(Clone, Debug, Default)]
struct FieldMemory {
    last_sent_value: Option<String>,
    last_sent_round: Option<u64>,
}

/// Telemetry event emitted for a single field decision, consumed only by
/// the analytics sink; never influences protocol behavior.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldTransmission {
    pub round: u64,
    pub field: &'static str,
    pub was_sent: bool,
}

/// Per-round aggregate counts, also telemetry-only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundStats {
    pub sent_count: u32,
    pub filtered_count: u32,
}

/// One process-local VOI filter instance, keyed by field name. Not
/// gossiped: every node tracks its own last-sent bookkeeping independently.
pub struct VoiFilter {
    config: HashMap<&'static str, FieldConfig>,
    memory: HashMap<&'static str, FieldMemory>,
}

impl VoiFilter {
    pub fn new() -> Self {
        let mut config = HashMap::new();
        for (field, cfg) in AppState::FIELDS.iter().zip(DEFAULT_FIELDS.iter()) {
            config.insert(*field, *cfg);
        }
        Self {
            config,
            memory: HashMap::new(),
        }
    }

    /// Applies the filter to a freshly sampled `AppState`, returning the
    /// record to actually transmit (fields failing INCLUDE are omitted,
    /// not replaced with a stale value) plus the telemetry events for
    /// this round.
    pub fn filter(&mut self, round: u64, sampled: &AppState) -> (AppState, Vec<FieldTransmission>, RoundStats) {
        let mut out = AppState::default();
        let mut events = Vec::with_capacity(AppState::FIELDS.len());
        let mut stats = RoundStats::default();

        for field in AppState::FIELDS {
            let Some(new_value) = sampled.get(field) else {
                continue;
            };
            let include = self.should_include(field, round, new_value);
            events.push(FieldTransmission {
                round,
                field,
                was_sent: include,
            });
            if include {
                out.set(field, Some(new_value.to_string()));
                self.record_sent(field, round, new_value);
                stats.sent_count += 1;
            } else {
                stats.filtered_count += 1;
            }
        }

        (out, events, stats)
    }

    fn should_include(&self, field: &'static str, round: u64, new_value: &str) -> bool {
        let mem = match self.memory.get(field) {
            Some(mem) => mem,
            None => return true, // first emission
        };
        let Some(last_round) = mem.last_sent_round else {
            return true;
        };
        let period_elapsed = round.saturating_sub(last_round) >= self.period(field);
        let delta_cleared = match (&mem.last_sent_value, new_value.parse::<f64>()) {
            (Some(last), Ok(new_numeric)) => match last.parse::<f64>() {
                Ok(last_numeric) => (new_numeric - last_numeric).abs() >= self.delta(field),
                Err(_) => last != new_value,
            },
            (Some(last), Err(_)) => last != new_value,
            (None, _) => true,
        };
        period_elapsed && delta_cleared
    }

    fn record_sent(&mut self, field: &'static str, round: u64, value: &str) {
        self.memory.insert(
            field,
            FieldMemory {
                last_sent_value: Some(value.to_string()),
                last_sent_round: Some(round),
            },
        );
    }

    fn period(&self, field: &'static str) -> u64 {
        self.config.get(field).map(|c| c.priority_rounds).unwrap_or(1)
    }

    fn delta(&self, field: &'static str) -> f64 {
        self.config.get(field).map(|c| c.delta).unwrap_or(0.0)
    }
}

impl Default for VoiFilter {
    fn default() -> Self {
        Self::new()
    }
}
