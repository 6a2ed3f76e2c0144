//! src/config.rs
//!
//! Defines the strongly-typed `Config` struct for process-level runtime
//! parameters, loaded from a TOML file and environment variables via
//! `figment`. This is the process's static configuration, distinct from
//! the per-session parameters a caller supplies to `POST /start_node`
//! (see `crate::api::protocol::StartNodeRequest`), which configure one
//! gossip run and can change across a `/reset_node` + `/start_node`
//! cycle without restarting the process.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Top-level struct holding all process-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP surface binds to.
    pub bind_addr: SocketAddr,
    /// Per-request timeout for outbound peer-exchange and quorum calls.
    pub request_timeout_secs: u64,
    /// `config.ini`'s `[system_setting] docker_ip` in the original: when
    /// set, every outbound peer URL is rewritten to this host, keeping
    /// the port, matching container-networking setups where every node
    /// is reachable at one Docker bridge IP.
    pub docker_ip: Option<String>,
    /// `config.ini`'s `[database] db_file`: referenced for parity with
    /// the original's configuration story even though this crate never
    /// opens the analytics database itself.
    pub analytics_db_file: String,
}

impl Config {
    /// Loads configuration from `config.toml` and environment variables
    /// prefixed `GOSSIP_`, layered over `Config::default()`.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("GOSSIP_"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 5000),
            request_timeout_secs: 30,
            docker_ip: None,
            analytics_db_file: "gossip_analytics.db".to_string(),
        }
    }
}
