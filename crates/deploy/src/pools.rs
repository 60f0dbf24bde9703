//! MasterChef pool registration and updates, applied in bounded batches.

use std::path::Path;

use alloy_core::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};

use crate::{
    barrier::ConfirmationBarrier,
    batch::{BatchPipeline, split_batches},
    calls::IMasterChef,
    chain::{ChainClient, ContractCall},
    config::DEFAULT_BATCH_SIZE,
    error::DeployError,
};

/// A pool to register: rewards `allocation_weight` to stakers of `token`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub allocation_weight: u64,
    pub token: Address,
    pub rewarder: Address,
}

impl PoolConfig {
    /// A pool without an extra rewarder.
    pub fn new(allocation_weight: u64, token: Address) -> Self {
        Self {
            allocation_weight,
            token,
            rewarder: Address::ZERO,
        }
    }
}

/// A change to the allocation of an existing pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolUpdate {
    pub pid: u64,
    pub allocation_weight: u64,
    pub rewarder: Address,
    /// Replace the pool's rewarder with `rewarder` instead of keeping it.
    pub overwrite: bool,
}

impl PoolUpdate {
    /// A weight change that keeps the pool's rewarder.
    pub fn new(pid: u64, allocation_weight: u64) -> Self {
        Self {
            pid,
            allocation_weight,
            rewarder: Address::ZERO,
            overwrite: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PoolEntry {
    alloc: u64,
    address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PoolUpdateEntry {
    pid: u64,
    alloc: u64,
}

/// `poolConfig.json`: pools to add to an existing MasterChef.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfigFile {
    pub master_chef_address: Address,
    pools: Vec<PoolEntry>,
}

impl PoolConfigFile {
    pub fn load(path: &Path) -> Result<Self, DeployError> {
        read_json(path)
    }

    pub fn pools(&self) -> Vec<PoolConfig> {
        self.pools
            .iter()
            .map(|entry| PoolConfig::new(entry.alloc, entry.address))
            .collect()
    }
}

/// `updatePoolConfig.json`: new weights for pools of an existing MasterChef.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePoolConfigFile {
    pub master_chef_address: Address,
    pools: Vec<PoolUpdateEntry>,
}

impl UpdatePoolConfigFile {
    pub fn load(path: &Path) -> Result<Self, DeployError> {
        read_json(path)
    }

    pub fn updates(&self) -> Vec<PoolUpdate> {
        self.pools
            .iter()
            .map(|entry| PoolUpdate::new(entry.pid, entry.alloc))
            .collect()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, DeployError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DeployError::invalid(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| DeployError::invalid(format!("cannot parse {}: {e}", path.display())))
}

/// Pool management on one MasterChef, one confirmed call per batch.
pub struct MasterChefPools<'b, 'a, C> {
    barrier: &'b ConfirmationBarrier<'a, C>,
    master_chef: Address,
    batch_size: usize,
    skip: usize,
}

impl<'b, 'a, C: ChainClient> MasterChefPools<'b, 'a, C> {
    pub fn new(barrier: &'b ConfirmationBarrier<'a, C>, master_chef: Address) -> Self {
        Self {
            barrier,
            master_chef,
            batch_size: DEFAULT_BATCH_SIZE,
            skip: 0,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Skip batches confirmed by an earlier, interrupted invocation.
    pub fn skip_batches(mut self, batches: usize) -> Self {
        self.skip = batches;
        self
    }

    /// Register `pools` through `addPools`, in order. Pool ids are assigned by the
    /// contract in registration order.
    pub async fn register_pools(&self, pools: Vec<PoolConfig>) -> Result<usize, DeployError> {
        let batches = split_batches(pools, self.batch_size)?;
        tracing::info!(
            master_chef = %self.master_chef,
            batch_size = self.batch_size,
            batches = batches.len(),
            "Registering pools"
        );

        let client = self.barrier.client();
        let master_chef = self.master_chef;
        BatchPipeline::new(self.barrier)
            .skip(self.skip)
            .apply("MasterChef.addPools", batches, |_, batch| async move {
                let call = IMasterChef::addPoolsCall {
                    allocPoints: batch
                        .iter()
                        .map(|p| U256::from(p.allocation_weight))
                        .collect(),
                    lpTokens: batch.iter().map(|p| p.token).collect(),
                    rewarders: batch.iter().map(|p| p.rewarder).collect(),
                };
                client
                    .send(&ContractCall::new(master_chef, call, "MasterChef.addPools"))
                    .await
            })
            .await
    }

    /// Apply `updates` through `setPools`, in order.
    pub async fn update_pools(&self, updates: Vec<PoolUpdate>) -> Result<usize, DeployError> {
        let batches = split_batches(updates, self.batch_size)?;
        tracing::info!(
            master_chef = %self.master_chef,
            batch_size = self.batch_size,
            batches = batches.len(),
            "Updating pools"
        );

        let client = self.barrier.client();
        let master_chef = self.master_chef;
        BatchPipeline::new(self.barrier)
            .skip(self.skip)
            .apply("MasterChef.setPools", batches, |_, batch| async move {
                let call = IMasterChef::setPoolsCall {
                    pids: batch.iter().map(|u| U256::from(u.pid)).collect(),
                    allocPoints: batch
                        .iter()
                        .map(|u| U256::from(u.allocation_weight))
                        .collect(),
                    rewarders: batch.iter().map(|u| u.rewarder).collect(),
                    overwrites: batch.iter().map(|u| u.overwrite).collect(),
                };
                client
                    .send(&ContractCall::new(master_chef, call, "MasterChef.setPools"))
                    .await
            })
            .await
    }

    /// Register a single pool through `addPool`.
    pub async fn add_pool(&self, pool: PoolConfig) -> Result<TxHash, DeployError> {
        let call = IMasterChef::addPoolCall {
            allocPoint: U256::from(pool.allocation_weight),
            lpToken: pool.token,
            rewarder: pool.rewarder,
        };
        let call = ContractCall::new(self.master_chef, call, "MasterChef.addPool");
        let client = self.barrier.client();
        self.barrier
            .submit(&call.description, || client.send(&call))
            .await
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::sol_types::SolCall;
    use tempdir::TempDir;

    use super::*;
    use crate::{barrier::ConfirmationPolicy, simulated::SimulatedChain};

    fn policy() -> ConfirmationPolicy {
        ConfirmationPolicy {
            min_delay_ms: 1,
            max_delay_ms: 2,
            max_attempts: 20,
            timeout_secs: 5,
        }
    }

    fn chef() -> Address {
        Address::repeat_byte(0xcc)
    }

    #[test]
    fn test_pool_config_file() {
        let tmp = TempDir::new("pools").unwrap();
        let path = tmp.path().join("poolConfig.json");
        std::fs::write(
            &path,
            r#"{
                "masterChefAddress": "0xcccccccccccccccccccccccccccccccccccccccc",
                "pools": [
                    {"alloc": 100, "address": "0x1111111111111111111111111111111111111111"},
                    {"alloc": 250, "address": "0x2222222222222222222222222222222222222222"}
                ]
            }"#,
        )
        .unwrap();

        let file = PoolConfigFile::load(&path).unwrap();
        assert_eq!(file.master_chef_address, chef());
        assert_eq!(
            file.pools(),
            vec![
                PoolConfig::new(100, Address::repeat_byte(0x11)),
                PoolConfig::new(250, Address::repeat_byte(0x22)),
            ]
        );
    }

    #[test]
    fn test_update_file_rejects_missing_alloc() {
        let tmp = TempDir::new("pools").unwrap();
        let path = tmp.path().join("updatePoolConfig.json");
        std::fs::write(
            &path,
            r#"{"masterChefAddress": "0xcccccccccccccccccccccccccccccccccccccccc", "pools": [{"pid": 3}]}"#,
        )
        .unwrap();

        let err = UpdatePoolConfigFile::load(&path).unwrap_err();
        assert!(matches!(err, DeployError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_register_pools_in_batches() {
        let chain = SimulatedChain::new(Address::repeat_byte(1)).with_confirmation_lag(1);
        let barrier = ConfirmationBarrier::new(&chain, policy());

        let pools: Vec<_> = (0..7u8)
            .map(|i| PoolConfig::new(u64::from(i) * 10, Address::repeat_byte(i + 1)))
            .collect();
        let applied = MasterChefPools::new(&barrier, chef())
            .batch_size(3)
            .register_pools(pools)
            .await
            .unwrap();
        assert_eq!(applied, 3);

        let calls = chain.calls();
        assert!(calls.iter().all(|c| c.to == chef()));
        let sizes: Vec<_> = calls
            .iter()
            .map(|c| {
                IMasterChef::addPoolsCall::abi_decode(&c.input, true)
                    .unwrap()
                    .lpTokens
                    .len()
            })
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let last = IMasterChef::addPoolsCall::abi_decode(&calls[2].input, true).unwrap();
        assert_eq!(last.lpTokens, vec![Address::repeat_byte(7)]);
        assert_eq!(last.allocPoints, vec![U256::from(60)]);
        assert_eq!(last.rewarders, vec![Address::ZERO]);
    }

    #[tokio::test]
    async fn test_update_pools_resumes_after_partial_run() {
        let updates: Vec<_> = (0..5).map(|pid| PoolUpdate::new(pid, 1)).collect();

        let chain = SimulatedChain::new(Address::repeat_byte(1)).fail_on_attempt(1);
        let barrier = ConfirmationBarrier::new(&chain, policy());
        let err = MasterChefPools::new(&barrier, chef())
            .batch_size(2)
            .update_pools(updates.clone())
            .await
            .unwrap_err();
        let DeployError::BatchApply { applied, total, .. } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!((applied, total), (1, 3));

        let chain = SimulatedChain::new(Address::repeat_byte(1));
        let barrier = ConfirmationBarrier::new(&chain, policy());
        let applied = MasterChefPools::new(&barrier, chef())
            .batch_size(2)
            .skip_batches(applied)
            .update_pools(updates)
            .await
            .unwrap();
        assert_eq!(applied, 3);

        let pids: Vec<_> = chain
            .calls()
            .iter()
            .flat_map(|c| {
                IMasterChef::setPoolsCall::abi_decode(&c.input, true)
                    .unwrap()
                    .pids
            })
            .collect();
        assert_eq!(pids, vec![U256::from(2), U256::from(3), U256::from(4)]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let chain = SimulatedChain::new(Address::repeat_byte(1));
        let barrier = ConfirmationBarrier::new(&chain, policy());
        let err = MasterChefPools::new(&barrier, chef())
            .batch_size(0)
            .register_pools(vec![PoolConfig::new(1, Address::repeat_byte(2))])
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidArgument(_)));
        assert_eq!(chain.attempts(), 0);
    }
}
