//! The QuackSwap deployment: contract plan, post-deployment configuration and
//! initial farms.

use alloy_core::{
    primitives::{Address, Bytes, TxHash, U256},
    sol_types::SolCall,
};

use crate::{
    barrier::ConfirmationBarrier,
    calls::{IDummyErc20, IMasterChef, IQuack, IQuackSwapFactory},
    chain::{ArgValue, ChainClient, ContractCall},
    config::NetworkConfig,
    error::{DeployError, RunAborted},
    ledger::Ledger,
    pools::{MasterChefPools, PoolConfig},
    sequencer::{DeploymentSequencer, DeploymentStep, StepArg},
};

pub const WRAPPED_NATIVE: &str = "WBTT";
pub const QUACK: &str = "QUACK";
pub const FACTORY: &str = "QuackSwapFactory";
pub const ROUTER: &str = "QuackSwapRouter";
pub const MASTER_CHEF: &str = "MasterChef";
pub const TREASURY: &str = "CommunityTreasury";
pub const STAKING_REWARDS: &str = "StakingRewards";
pub const FEE_COLLECTOR: &str = "FeeCollector";
pub const DUMMY_ERC20: &str = "DummyERC20";

/// Units of the dummy token minted to the deployer and staked for the fee collector.
const DUMMY_SUPPLY: u64 = 100;

/// MasterChef pool the fee collector harvests from. It is the first pool registered.
const FEE_COLLECTOR_PID: u64 = 0;

/// Deployment step of a `DummyERC20` minting `supply` base units to `owner`.
pub fn dummy_erc20_step(
    name: &str,
    symbol: &str,
    owner: Address,
    supply: ArgValue,
) -> DeploymentStep {
    DeploymentStep::new(DUMMY_ERC20)
        .arg(name)
        .arg(symbol)
        .arg(owner)
        .arg(supply)
}

/// The contracts of a QuackSwap deployment, in dependency order.
///
/// `WBTT` and `CommunityTreasury` are only deployed when the config does not name
/// existing ones.
pub fn deployment_plan(config: &NetworkConfig, deployer: Address) -> Vec<DeploymentStep> {
    let mut steps = Vec::with_capacity(9);

    let native = match config.wrapped_native_token {
        Some(token) => StepArg::from(token),
        None => {
            steps.push(DeploymentStep::new(WRAPPED_NATIVE));
            StepArg::address_of(WRAPPED_NATIVE)
        }
    };

    steps.push(
        DeploymentStep::new(QUACK)
            .arg(ArgValue::token_amount(config.total_supply))
            .arg(ArgValue::token_amount(config.airdrop_supply))
            .arg(config.token_symbol.as_str())
            .arg(config.token_name.as_str()),
    );
    steps.push(DeploymentStep::new(FACTORY).arg(deployer));
    steps.push(
        DeploymentStep::new(ROUTER)
            .address_of(FACTORY)
            .arg(native.clone()),
    );
    steps.push(
        DeploymentStep::new(MASTER_CHEF)
            .address_of(QUACK)
            .arg(deployer),
    );

    let treasury = match config.treasury {
        Some(treasury) => StepArg::from(treasury),
        None => {
            steps.push(DeploymentStep::new(TREASURY).address_of(QUACK));
            StepArg::address_of(TREASURY)
        }
    };

    steps.push(
        DeploymentStep::new(STAKING_REWARDS)
            .address_of(QUACK)
            .address_of(QUACK),
    );
    steps.push(
        DeploymentStep::new(FEE_COLLECTOR)
            .arg(native)
            .address_of(FACTORY)
            .arg(config.pair_init_code_hash)
            .address_of(STAKING_REWARDS)
            .address_of(MASTER_CHEF)
            .arg(FEE_COLLECTOR_PID)
            .arg(treasury)
            // governor, admin
            .arg(deployer)
            .arg(deployer),
    );
    steps.push(dummy_erc20_step(
        "Dummy ERC20",
        "PGL",
        deployer,
        DUMMY_SUPPLY.into(),
    ));

    steps
}

/// A swap pair created (or found) during the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairRecord {
    pub token_a: Address,
    pub token_b: Address,
    pub pair: Address,
}

/// Outcome of a complete protocol deployment.
#[derive(Debug, Clone)]
pub struct DeploymentReport {
    pub ledger: Ledger,
    pub pairs: Vec<PairRecord>,
    /// Farms registered with MasterChef after the fee collector pool.
    pub farms_registered: usize,
    /// Native balance spent by the deployer, when both balance reads succeeded.
    pub cost: Option<U256>,
}

/// Look up the pair of `token_a` and `token_b` on `factory`; zero when none exists.
pub async fn get_pair<C: ChainClient>(
    client: &C,
    factory: Address,
    token_a: Address,
    token_b: Address,
) -> Result<Address, DeployError> {
    let input = IQuackSwapFactory::getPairCall {
        tokenA: token_a,
        tokenB: token_b,
    }
    .abi_encode();
    let query = || format!("{FACTORY}.getPair({token_a}, {token_b})");

    let output = client
        .call(factory, Bytes::from(input))
        .await
        .map_err(|source| DeployError::Query {
            query: query(),
            source,
        })?;
    let decoded = IQuackSwapFactory::getPairCall::abi_decode_returns(&output, true).map_err(
        |e| DeployError::Query {
            query: query(),
            source: e.into(),
        },
    )?;
    Ok(decoded.pair)
}

/// Contract addresses the configuration phase works with.
struct Deployed {
    quack: Address,
    native: Address,
    factory: Address,
    master_chef: Address,
    fee_collector: Address,
    dummy: Address,
}

impl Deployed {
    fn from_ledger(ledger: &Ledger, config: &NetworkConfig) -> Result<Self, DeployError> {
        let lookup = |contract: &str| {
            ledger
                .address_of(contract)
                .ok_or_else(|| DeployError::UnresolvedReference {
                    step: "configuration".to_string(),
                    reference: contract.to_string(),
                })
        };
        Ok(Self {
            quack: lookup(QUACK)?,
            native: match config.wrapped_native_token {
                Some(token) => token,
                None => lookup(WRAPPED_NATIVE)?,
            },
            factory: lookup(FACTORY)?,
            master_chef: lookup(MASTER_CHEF)?,
            fee_collector: lookup(FEE_COLLECTOR)?,
            dummy: lookup(DUMMY_ERC20)?,
        })
    }
}

/// Deploys and configures the full protocol from one account.
pub struct ProtocolDeployer<'a, C> {
    client: &'a C,
    config: &'a NetworkConfig,
}

impl<'a, C: ChainClient> ProtocolDeployer<'a, C> {
    pub fn new(client: &'a C, config: &'a NetworkConfig) -> Self {
        Self { client, config }
    }

    /// Deploy every contract of the plan, configure them, then register the
    /// initial farms.
    ///
    /// A failure at any point aborts the run. The returned [`RunAborted`] carries
    /// every contract deployed so far.
    pub async fn run(&self) -> Result<DeploymentReport, RunAborted> {
        let deployer = self.client.account();
        let barrier = ConfirmationBarrier::new(self.client, self.config.confirmation);

        tracing::info!(deployer = %deployer, "Starting QuackSwap deployment");
        if self.config.wrapped_native_token.is_none() {
            tracing::warn!("No wrapped native token configured, deploying {}", WRAPPED_NATIVE);
        }
        if self.config.initial_farms.is_empty() {
            tracing::warn!("No initial farms configured");
        }
        let initial_balance = self.balance(deployer).await;

        let plan = deployment_plan(self.config, deployer);
        let ledger = DeploymentSequencer::new(&barrier).run(&plan).await?;

        let (pairs, farms_registered) = match self.configure(&barrier, &ledger).await {
            Ok(configured) => configured,
            Err(err) => return Err(RunAborted::new(ledger, err)),
        };

        let cost = match (initial_balance, self.balance(deployer).await) {
            (Some(before), Some(after)) => Some(before.saturating_sub(after)),
            _ => None,
        };
        if let Some(cost) = cost {
            tracing::info!(cost_wei = %cost, "Deployment complete");
        }

        Ok(DeploymentReport {
            ledger,
            pairs,
            farms_registered,
            cost,
        })
    }

    async fn balance(&self, account: Address) -> Option<U256> {
        self.client
            .balance(account)
            .await
            .inspect_err(|err| tracing::warn!(error = %err, "Failed to read deployer balance"))
            .ok()
    }

    async fn send<T: SolCall>(
        &self,
        barrier: &ConfirmationBarrier<'a, C>,
        to: Address,
        call: T,
        description: &str,
    ) -> Result<TxHash, DeployError> {
        let call = ContractCall::new(to, call, description);
        barrier
            .submit(description, || self.client.send(&call))
            .await
    }

    async fn configure(
        &self,
        barrier: &ConfirmationBarrier<'a, C>,
        ledger: &Ledger,
    ) -> Result<(Vec<PairRecord>, usize), DeployError> {
        let deployed = Deployed::from_ledger(ledger, self.config)?;
        let chef = MasterChefPools::new(barrier, deployed.master_chef)
            .batch_size(self.config.batch_size);

        self.send(
            barrier,
            deployed.quack,
            IQuack::setMinterCall {
                minter: deployed.master_chef,
            },
            "QUACK.setMinter",
        )
        .await?;
        tracing::info!("Transferred QUACK minter role to MasterChef");

        self.send(
            barrier,
            deployed.dummy,
            IDummyErc20::renounceOwnershipCall {},
            "DummyERC20.renounceOwnership",
        )
        .await?;
        tracing::info!("Renounced DummyERC20 ownership");

        chef.add_pool(PoolConfig::new(
            self.config.fee_collector_allocation,
            deployed.dummy,
        ))
        .await?;
        tracing::info!(pid = FEE_COLLECTOR_PID, "Added MasterChef pool for FeeCollector");

        self.send(
            barrier,
            deployed.dummy,
            IDummyErc20::approveCall {
                spender: deployed.master_chef,
                amount: U256::from(DUMMY_SUPPLY),
            },
            "DummyERC20.approve",
        )
        .await?;
        self.send(
            barrier,
            deployed.master_chef,
            IMasterChef::depositCall {
                pid: U256::from(FEE_COLLECTOR_PID),
                amount: U256::from(DUMMY_SUPPLY),
                to: deployed.fee_collector,
            },
            "MasterChef.deposit",
        )
        .await?;
        tracing::info!(pid = FEE_COLLECTOR_PID, "Deposited DummyERC20 for FeeCollector");

        self.send(
            barrier,
            deployed.factory,
            IQuackSwapFactory::setFeeToCall {
                feeTo: deployed.fee_collector,
            },
            "QuackSwapFactory.setFeeTo",
        )
        .await?;
        tracing::info!("Set FeeCollector as the swap fee recipient");

        let mut pairs = Vec::with_capacity(1 + self.config.initial_farms.len());
        let mut farms = Vec::with_capacity(pairs.capacity());

        let native_pair = self
            .ensure_pair(barrier, deployed.factory, deployed.quack, deployed.native)
            .await?;
        pairs.push(native_pair);
        farms.push(PoolConfig::new(
            self.config.native_pair_allocation,
            native_pair.pair,
        ));

        for farm in &self.config.initial_farms {
            let pair = self
                .ensure_pair(barrier, deployed.factory, farm.token_a, farm.token_b)
                .await?;
            pairs.push(pair);
            farms.push(PoolConfig::new(farm.weight, pair.pair));
        }

        let farm_count = farms.len();
        chef.register_pools(farms).await?;
        tracing::info!(farms = farm_count, "Registered MasterChef farms");

        Ok((pairs, farm_count))
    }

    /// Create the pair of `token_a` and `token_b` unless the factory already has it.
    async fn ensure_pair(
        &self,
        barrier: &ConfirmationBarrier<'a, C>,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<PairRecord, DeployError> {
        let existing = get_pair(self.client, factory, token_a, token_b).await?;
        let pair = if existing != Address::ZERO {
            tracing::info!(pair = %existing, %token_a, %token_b, "Pair already exists");
            existing
        } else {
            self.send(
                barrier,
                factory,
                IQuackSwapFactory::createPairCall {
                    tokenA: token_a,
                    tokenB: token_b,
                },
                "QuackSwapFactory.createPair",
            )
            .await?;

            let created = get_pair(self.client, factory, token_a, token_b).await?;
            if created == Address::ZERO {
                return Err(DeployError::Query {
                    query: format!("{FACTORY}.getPair({token_a}, {token_b})"),
                    source: anyhow::anyhow!("pair not found after createPair was confirmed"),
                });
            }
            tracing::info!(pair = %created, %token_a, %token_b, "Created pair");
            created
        };

        Ok(PairRecord {
            token_a,
            token_b,
            pair,
        })
    }
}
