//! Coordinator configuration
//!
//! [`CoordinatorConfig`] is the off-chain plugin configuration shared by every
//! committee member and can be replaced at runtime. [`CoordinatorSettings`]
//! holds the deployment specific values of the local node.

use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::errors::CoordinatorError;
use crate::stores::DEFAULT_LOG_SCAN_BLOCKS;

pub const BEACON_ADDRESS_ENV: &str = "VRF_BEACON_ADDRESS";
pub const COORDINATOR_ADDRESS_ENV: &str = "VRF_COORDINATOR_ADDRESS";
pub const DKG_ADDRESS_ENV: &str = "VRF_DKG_ADDRESS";
pub const FINALITY_DEPTH_ENV: &str = "VRF_FINALITY_DEPTH";
pub const RPC_TIMEOUT_ENV: &str = "VRF_RPC_TIMEOUT_SECS";
pub const OFFCHAIN_CONFIG_PATH_ENV: &str = "VRF_OFFCHAIN_CONFIG_PATH";
pub const LOG_SCAN_BLOCKS_ENV: &str = "VRF_LOG_SCAN_BLOCKS";

/// Recent block hashes carried in a report never exceed this many entries.
pub const MAX_BLOCKHASH_LOOKBACK: u64 = 256;

/// Off-chain plugin configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// How long accepted blocks and callbacks are considered in flight
    pub cache_eviction_window_seconds: u64,
    /// Gas available to one report
    pub batch_gas_limit: u64,
    /// Fixed gas charged once per report
    pub coordinator_overhead: u64,
    /// Gas charged per beacon block
    pub block_gas_overhead: u64,
    /// Gas charged per callback on top of its allowance
    pub callback_overhead: u64,
    /// Depth of the log scan behind the current height
    pub lookback_blocks: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cache_eviction_window_seconds: 60,
            batch_gas_limit: 5_000_000,
            coordinator_overhead: 50_000,
            block_gas_overhead: 50_000,
            callback_overhead: 50_000,
            lookback_blocks: 1_000,
        }
    }
}

impl CoordinatorConfig {
    /// Parse the JSON encoded off-chain config. Missing fields keep their defaults.
    pub fn from_offchain_bytes(bytes: &[u8]) -> Result<Self, CoordinatorError> {
        let config: Self = serde_json::from_slice(bytes)
            .map_err(|e| CoordinatorError::Config(format!("offchain config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_offchain_bytes(&self) -> Result<Vec<u8>, CoordinatorError> {
        serde_json::to_vec(self)
            .map_err(|e| CoordinatorError::Config(format!("encode offchain config: {}", e)))
    }

    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.lookback_blocks == 0 {
            return Err(CoordinatorError::Config(
                "lookback_blocks must be positive".to_string(),
            ));
        }
        for (field, overhead) in [
            ("coordinator_overhead", self.coordinator_overhead),
            ("block_gas_overhead", self.block_gas_overhead),
            ("callback_overhead", self.callback_overhead),
        ] {
            if overhead > self.batch_gas_limit {
                return Err(CoordinatorError::Config(format!(
                    "{} {} exceeds batch_gas_limit {}",
                    field, overhead, self.batch_gas_limit
                )));
            }
        }
        Ok(())
    }

    pub fn cache_eviction_window(&self) -> Duration {
        Duration::from_secs(self.cache_eviction_window_seconds)
    }

    /// Number of recent block hashes reported alongside each report
    pub fn blockhash_lookback(&self) -> u64 {
        self.lookback_blocks.min(MAX_BLOCKHASH_LOOKBACK)
    }
}

/// Deployment settings of the local node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    pub beacon_address: Address,
    pub coordinator_address: Address,
    pub dkg_address: Address,
    /// Confirmations required before a `ConfigSet` is trusted
    pub finality_depth: u64,
    /// Deadline applied to every store and contract call
    pub rpc_timeout_secs: u64,
    /// Widest block range of a single log query against an RPC node
    #[serde(default = "default_log_scan_blocks")]
    pub log_scan_blocks: u64,
    #[serde(default)]
    pub offchain: CoordinatorConfig,
}

impl CoordinatorSettings {
    pub fn new(beacon_address: Address, coordinator_address: Address, dkg_address: Address) -> Self {
        Self {
            beacon_address,
            coordinator_address,
            dkg_address,
            finality_depth: 10,
            rpc_timeout_secs: 30,
            log_scan_blocks: default_log_scan_blocks(),
            offchain: CoordinatorConfig::default(),
        }
    }

    pub fn with_log_scan_blocks(mut self, blocks: u64) -> Self {
        self.log_scan_blocks = blocks.max(1);
        self
    }

    pub fn with_finality_depth(mut self, depth: u64) -> Self {
        self.finality_depth = depth;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_offchain(mut self, offchain: CoordinatorConfig) -> Self {
        self.offchain = offchain;
        self
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub async fn load_from_file(path: &Path) -> eyre::Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let settings: Self = serde_json::from_str(&contents)?;
        settings
            .offchain
            .validate()
            .map_err(|e| eyre::eyre!("{}: {}", path.display(), e))?;
        Ok(settings)
    }

    /// Build settings from environment variables.
    ///
    /// The three contract addresses are required; everything else falls back
    /// to defaults. `VRF_OFFCHAIN_CONFIG_PATH` points at a JSON off-chain config.
    pub fn from_env() -> eyre::Result<Self> {
        let beacon_address = address_from_env(BEACON_ADDRESS_ENV)?;
        let coordinator_address = address_from_env(COORDINATOR_ADDRESS_ENV)?;
        let dkg_address = address_from_env(DKG_ADDRESS_ENV)?;

        let mut settings = Self::new(beacon_address, coordinator_address, dkg_address);

        if let Ok(depth) = std::env::var(FINALITY_DEPTH_ENV) {
            settings.finality_depth = depth
                .parse()
                .map_err(|e| eyre::eyre!("{} invalid: {}", FINALITY_DEPTH_ENV, e))?;
        }
        if let Ok(secs) = std::env::var(RPC_TIMEOUT_ENV) {
            settings.rpc_timeout_secs = secs
                .parse()
                .map_err(|e| eyre::eyre!("{} invalid: {}", RPC_TIMEOUT_ENV, e))?;
        }
        if let Ok(blocks) = std::env::var(LOG_SCAN_BLOCKS_ENV) {
            let blocks: u64 = blocks
                .parse()
                .map_err(|e| eyre::eyre!("{} invalid: {}", LOG_SCAN_BLOCKS_ENV, e))?;
            settings = settings.with_log_scan_blocks(blocks);
        }
        if let Ok(path) = std::env::var(OFFCHAIN_CONFIG_PATH_ENV) {
            let bytes = std::fs::read(&path)?;
            settings.offchain = CoordinatorConfig::from_offchain_bytes(&bytes)
                .map_err(|e| eyre::eyre!("{}: {}", path, e))?;
        }

        Ok(settings)
    }
}

fn default_log_scan_blocks() -> u64 {
    DEFAULT_LOG_SCAN_BLOCKS
}

fn address_from_env(var: &str) -> eyre::Result<Address> {
    let raw = std::env::var(var).map_err(|_| eyre::eyre!("{} not set", var))?;
    raw.parse()
        .map_err(|e| eyre::eyre!("{} is not an address: {}", var, e))
}
