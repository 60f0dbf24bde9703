//! Per-network deployment parameters.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_core::primitives::{Address, B256, b256};
use derive_more::{Deref, Display};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{barrier::ConfirmationPolicy, error::DeployError};

/// keccak256 of the QuackSwapPair creation bytecode the factory deploys.
pub const DEFAULT_PAIR_INIT_CODE_HASH: B256 =
    b256!("40231f6b438bce0797c9ada29b718a87ea0a5cea3fe9a771abdd76bd41a3e545");

/// Default number of pools per `addPools` / `setPools` call.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Environment prefix overriding network file values, e.g. `QUACK_CONFIG_BATCH_SIZE`.
const ENV_PREFIX: &str = "QUACK_CONFIG_";

/// Name of a target network. Keys both the config file and the address file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Deref)]
pub struct Network(String);

impl FromStr for Network {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(DeployError::invalid(format!(
                "network name {s:?} must be non-empty and only use [A-Za-z0-9_-]"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

/// A farm registered with MasterChef at deployment: the pair of `token_a` and
/// `token_b`, created if needed, with allocation `weight`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmConfig {
    pub token_a: Address,
    pub token_b: Address,
    pub weight: u64,
}

/// Parameters of one network, loaded from `<networks_dir>/<network>.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub token_symbol: String,
    pub token_name: String,
    /// Total QUACK supply, in whole tokens.
    pub total_supply: u64,
    /// Part of the supply reserved for the airdrop, in whole tokens.
    pub airdrop_supply: u64,
    /// Existing wrapped native token. A fresh `WBTT` is deployed when absent.
    #[serde(default)]
    pub wrapped_native_token: Option<Address>,
    /// Existing treasury. A fresh `CommunityTreasury` is deployed when absent.
    #[serde(default)]
    pub treasury: Option<Address>,
    #[serde(default)]
    pub initial_farms: Vec<FarmConfig>,
    /// Allocation of the pool the fee collector stakes the dummy token in.
    pub fee_collector_allocation: u64,
    /// Allocation of the QUACK / wrapped native token pair.
    pub native_pair_allocation: u64,
    #[serde(default = "default_pair_init_code_hash")]
    pub pair_init_code_hash: B256,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub confirmation: ConfirmationPolicy,
}

fn default_pair_init_code_hash() -> B256 {
    DEFAULT_PAIR_INIT_CODE_HASH
}

const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl NetworkConfig {
    /// Path of the config file of `network` inside `dir`.
    pub fn path_for(dir: &Path, network: &Network) -> PathBuf {
        dir.join(format!("{network}.toml"))
    }

    /// Load and validate the config of `network`.
    ///
    /// Values from the file can be overridden with `QUACK_CONFIG_*` environment
    /// variables.
    pub fn load(dir: &Path, network: &Network) -> Result<Self, DeployError> {
        let path = Self::path_for(dir, network);
        if !path.is_file() {
            return Err(DeployError::invalid(format!(
                "no config for network {network} at {}",
                path.display()
            )));
        }

        let config: Self = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| DeployError::invalid(format!("{}: {e}", path.display())))?;

        config.validate()?;
        tracing::debug!(network = %network, path = %path.display(), "Loaded network config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        if self.token_symbol.is_empty() || self.token_name.is_empty() {
            return Err(DeployError::invalid("token_symbol and token_name must be set"));
        }
        if self.airdrop_supply > self.total_supply {
            return Err(DeployError::invalid(format!(
                "airdrop_supply ({}) exceeds total_supply ({})",
                self.airdrop_supply, self.total_supply
            )));
        }
        if self.batch_size == 0 {
            return Err(DeployError::invalid("batch_size must be at least 1"));
        }
        for (index, farm) in self.initial_farms.iter().enumerate() {
            if farm.token_a == farm.token_b {
                return Err(DeployError::invalid(format!(
                    "initial_farms[{index}] pairs {} with itself",
                    farm.token_a
                )));
            }
        }
        self.confirmation.validate()
    }
}
