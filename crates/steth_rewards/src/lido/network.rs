//! Per-network Lido deployments and their JSON overrides.
//!
//! Overrides load from: env `STETH_REWARDS_CONFIG_PATH`, or `./config/steth_rewards.json`,
//! or `./steth_rewards.json`. Missing or malformed files fall back to the built-in table.

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::error::RewardsError;

pub const CONFIG_PATH_ENV: &str = "STETH_REWARDS_CONFIG_PATH";

/// Blocks per `eth_getLogs` chunk when the caller gives none.
pub const DEFAULT_CHAIN_STEP: u64 = 50_000;
/// Entities per subgraph page when the caller gives none.
pub const DEFAULT_SUBGRAPH_PAGE: u64 = 1_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Holesky,
    Sepolia,
}

impl Network {
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            1 => Some(Network::Mainnet),
            17000 => Some(Network::Holesky),
            11_155_111 => Some(Network::Sepolia),
            _ => None,
        }
    }

    pub fn chain_id(self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::Holesky => 17000,
            Network::Sepolia => 11_155_111,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Holesky => "holesky",
            Network::Sepolia => "sepolia",
        }
    }
}

/// Contract addresses and bounds for one network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub chain_id: u64,
    pub steth: Address,
    pub withdrawal_queue: Address,
    /// First block carrying a `TokenRebased` event; chain queries may not start earlier.
    pub earliest_rebase_block: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph_url: Option<String>,
}

pub const MAINNET: Deployment = Deployment {
    chain_id: 1,
    steth: address!("0xae7ab96520DE3A18E5e111B5EaAb095312D7fE84"),
    withdrawal_queue: address!("0x889edC2eDab5f40e902b864aD4d7AdE8E412F9B1"),
    earliest_rebase_block: 17_272_708,
    subgraph_url: None,
};

pub const HOLESKY: Deployment = Deployment {
    chain_id: 17000,
    steth: address!("0x3F1c547b21f65e10480dE3ad8E19fAAC46C95034"),
    withdrawal_queue: address!("0xc7cc160b58F8Bb0baC94b80847E2CF2800565C50"),
    earliest_rebase_block: 52_174,
    subgraph_url: None,
};

pub const SEPOLIA: Deployment = Deployment {
    chain_id: 11_155_111,
    steth: address!("0x3e3FE7dBc6B4C189E7128855dD526361c49b40Af"),
    withdrawal_queue: address!("0x1583C7b3f4C3B008720E6BcE5726336b0aB25fdd"),
    earliest_rebase_block: 5_434_668,
    subgraph_url: None,
};

/// Partial override for one network; unset fields keep the built-in value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steth: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_queue: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_rebase_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mainnet: Option<DeploymentOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holesky: Option<DeploymentOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sepolia: Option<DeploymentOverride>,
    /// Deployments for chains with no built-in entry, e.g. a local fork.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<Deployment>,
}

impl NetworkConfig {
    /// Load config from path. Returns default (empty) on error or missing file.
    pub fn load_from_path(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring malformed network config");
            Self::default()
        })
    }

    /// Load config: env STETH_REWARDS_CONFIG_PATH, then ./config/steth_rewards.json,
    /// then ./steth_rewards.json.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let p = Path::new(&path);
            if p.exists() {
                return Self::load_from_path(p);
            }
        }
        for candidate in [
            Path::new("./config/steth_rewards.json"),
            Path::new("./steth_rewards.json"),
        ] {
            if candidate.exists() {
                return Self::load_from_path(candidate);
            }
        }
        Self::default()
    }

    fn override_for(&self, network: Network) -> Option<&DeploymentOverride> {
        match network {
            Network::Mainnet => self.mainnet.as_ref(),
            Network::Holesky => self.holesky.as_ref(),
            Network::Sepolia => self.sepolia.as_ref(),
        }
    }

    /// Deployment for `chain_id`: built-in merged with overrides, or a custom entry.
    pub fn deployment(&self, chain_id: u64) -> Result<Deployment, RewardsError> {
        if let Some(custom) = self.custom.iter().find(|d| d.chain_id == chain_id) {
            return Ok(custom.clone());
        }
        let network = Network::from_chain_id(chain_id).ok_or_else(|| {
            RewardsError::NotSupported(format!("no stETH deployment known for chain id {chain_id}"))
        })?;
        let mut deployment = builtin(network);
        if let Some(o) = self.override_for(network) {
            if let Some(steth) = o.steth {
                deployment.steth = steth;
            }
            if let Some(wq) = o.withdrawal_queue {
                deployment.withdrawal_queue = wq;
            }
            if let Some(b) = o.earliest_rebase_block {
                deployment.earliest_rebase_block = b;
            }
            if o.subgraph_url.is_some() {
                deployment.subgraph_url.clone_from(&o.subgraph_url);
            }
        }
        Ok(deployment)
    }
}

pub fn builtin(network: Network) -> Deployment {
    match network {
        Network::Mainnet => MAINNET,
        Network::Holesky => HOLESKY,
        Network::Sepolia => SEPOLIA,
    }
}
