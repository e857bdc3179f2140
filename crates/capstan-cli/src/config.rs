use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use capstan_engine::RetryPolicy;
use capstan_link::LinkConfig;
use capstan_server::ServerConfig;

/// Top-level service configuration, loaded from a TOML file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Durable store location.
    pub store_path: PathBuf,
    /// Re-seed watchers from surviving pending records after startup.
    pub restart_pending: bool,
    pub server: ServerConfig,
    pub link: LinkSection,
    pub retry: RetryPolicy,
    /// Contracts to track. At least one is required to serve.
    pub contracts: Vec<ContractSection>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("capstan.db"),
            restart_pending: true,
            server: ServerConfig::default(),
            link: LinkSection::default(),
            retry: RetryPolicy::default(),
            contracts: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    /// `host:port` of the ledger node's RPC socket.
    pub address: String,
    pub reconnect_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:10006".into(),
            reconnect_interval_ms: 5_000,
            read_timeout_ms: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractSection {
    /// Contract id (hex digest) on the ledger.
    pub cid: String,
    /// Label used in logs and the status report.
    pub title: String,
    /// Optional contract binary sent along with queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_file: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            address: self.link.address.clone(),
            reconnect_interval: Duration::from_millis(self.link.reconnect_interval_ms),
            read_timeout: self.link.read_timeout_ms.map(Duration::from_millis),
            ..LinkConfig::default()
        }
    }

    /// A starter configuration with one example contract entry.
    pub fn sample() -> Self {
        Self {
            contracts: vec![ContractSection {
                cid: "17885447b4c5f78b65ac01bfa5d63d6bc2dd7b239c6cd7ef57a918adba2071d3".into(),
                title: "MAIN".into(),
                contract_file: None,
            }],
            ..Default::default()
        }
    }
}
