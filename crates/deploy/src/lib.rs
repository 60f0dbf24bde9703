//! quackswap-deploy - Deployment orchestrator for the QuackSwap protocol.
//!
//! This crate deploys the QuackSwap contracts in dependency order, waits for every
//! transaction to be confirmed before sending the next one, applies bulk MasterChef
//! configuration in bounded batches and records the resulting addresses.

mod error;
pub use error::{DeployError, RunAborted};

mod chain;
pub use chain::{ArgValue, ChainClient, ContractCall, encode_constructor_args};

pub mod calls;

mod artifacts;
pub use artifacts::{ArtifactStore, PAIR_CONTRACT};

mod rpc;
pub use rpc::{RpcChainClient, create_client, json_rpc_call};

mod simulated;
pub use simulated::{SimulatedChain, Submission};

mod barrier;
pub use barrier::{ConfirmationBarrier, ConfirmationPolicy, TransactionHandle};

mod batch;
pub use batch::{BatchPipeline, split_batches};

mod ledger;
pub use ledger::{DeploymentRecord, Ledger};

mod sequencer;
pub use sequencer::{DeploymentSequencer, DeploymentStep, StepArg, validate_plan};

mod config;
pub use config::{
    DEFAULT_BATCH_SIZE, DEFAULT_PAIR_INIT_CODE_HASH, FarmConfig, Network, NetworkConfig,
};

mod pools;
pub use pools::{MasterChefPools, PoolConfig, PoolConfigFile, PoolUpdate, UpdatePoolConfigFile};

pub mod protocol;
pub use protocol::{DeploymentReport, PairRecord, ProtocolDeployer, deployment_plan, get_pair};
