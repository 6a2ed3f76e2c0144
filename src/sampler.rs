//! src/sampler.rs
//!
//! Produces one `AppState` snapshot on demand, standing in for the
//! original's `psutil`-based sampler.
//!
//! A failed individual reading omits that field rather than failing the
//! whole sample: `HostSampler::sample` never returns an error.

use sysinfo::{CpuExt, DiskExt, NetworkExt, System, SystemExt};

use crate::domain::AppState;

/// Abstraction over host metric sampling so the gossip engine and its
/// tests don't depend on a real system probe.
pub trait HostSampler: Send + Sync {
    fn sample(&mut self) -> AppState;
}

/// `sysinfo`-backed sampler. CPU usage needs two refreshes spaced apart
/// to be meaningful (sysinfo reports 0% on the very first read), so this
/// keeps a long-lived `System` rather than constructing one per call.
pub struct SysinfoSampler {
    system: System,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        system.refresh_networks_list();
        system.refresh_disks_list();
        Self { system }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler for SysinfoSampler {
    fn sample(&mut self) -> AppState {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.system.refresh_networks();
        self.system.refresh_disks();

        let cpu = {
            let cpus = self.system.cpus();
            if cpus.is_empty() {
                None
            } else {
                let average =
                    cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32;
                Some(format!("{average:.2}"))
            }
        };

        let memory = {
            let total = self.system.total_memory();
            if total == 0 {
                None
            } else {
                let used_pct = self.system.used_memory() as f64 / total as f64 * 100.0;
                Some(format!("{used_pct:.2}"))
            }
        };

        let network = {
            let total_bytes: u64 = self
                .system
                .networks()
                .iter()
                .map(|(_, data)| data.total_received() + data.total_transmitted())
                .sum();
            Some(total_bytes.to_string())
        };

        let storage = {
            let disks = self.system.disks();
            if disks.is_empty() {
                None
            } else {
                let total: u64 = disks.iter().map(|d| d.total_space()).sum();
                let available: u64 = disks.iter().map(|d| d.available_space()).sum();
                if total == 0 {
                    None
                } else {
                    let used_pct = (total - available) as f64 / total as f64 * 100.0;
                    Some(format!("{used_pct:.2}"))
                }
            }
        };

        AppState {
            cpu,
            memory,
            network,
            storage,
        }
    }
}
