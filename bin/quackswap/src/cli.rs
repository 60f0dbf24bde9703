use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Parser, Subcommand};
use quackswap_deploy::{
    ConfirmationPolicy, DEFAULT_BATCH_SIZE, DeployError, Network, PAIR_CONTRACT,
};
use tracing::level_filters::LevelFilter;
use url::Url;

/// The default RPC endpoint (a local Hardhat or Anvil node).
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// First account of the default Hardhat and Anvil mnemonic, used by dry runs
/// when no sender is given.
pub const DEFAULT_DRY_RUN_ACCOUNT: Address =
    alloy_core::primitives::address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

/// How results are printed to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "quack")]
#[command(author, version, about = "Deploy and configure the QuackSwap contracts")]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "QUACK_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// The URL of the JSON-RPC endpoint. The sender must be unlocked on this node.
    #[arg(long, alias = "rpc", env = "QUACK_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: Url,

    /// The account transactions are sent from.
    ///
    /// If not provided, the first account managed by the node is used.
    #[arg(long, env = "QUACK_FROM")]
    pub from: Option<Address>,

    /// Directory of compiled Hardhat artifacts, one `<Contract>.json` per contract.
    #[arg(long, env = "QUACK_ARTIFACTS", default_value = "artifacts")]
    pub artifacts: PathBuf,

    /// Simulate the run in memory instead of sending transactions.
    ///
    /// Addresses are derived the same way the chain derives them, so a dry run
    /// predicts the addresses of a live run from a fresh account.
    #[arg(long, env = "QUACK_DRY_RUN")]
    pub dry_run: bool,

    /// How to print results.
    #[arg(long, env = "QUACK_OUTPUT", default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy and configure the full protocol, then record the contract addresses.
    Deploy {
        /// The target network. Selects `<networks-dir>/<network>.toml`.
        #[arg(short, long, env = "QUACK_NETWORK")]
        network: Network,

        /// Directory of per-network config files.
        #[arg(long, env = "QUACK_NETWORKS_DIR", default_value = "networks")]
        networks_dir: PathBuf,

        /// Directory the address files are written to.
        #[arg(long, env = "QUACK_ADDRESSES_DIR", default_value = "addresses")]
        addresses_dir: PathBuf,
    },

    /// Register pools with an existing MasterChef.
    AddPools {
        /// Pool file: `{"masterChefAddress": .., "pools": [{"alloc": .., "address": ..}]}`.
        #[arg(long, default_value = "poolConfig.json")]
        file: PathBuf,

        #[command(flatten)]
        batching: Batching,

        #[command(flatten)]
        confirmation: Confirmation,
    },

    /// Change the allocation of existing MasterChef pools.
    SetPools {
        /// Update file: `{"masterChefAddress": .., "pools": [{"pid": .., "alloc": ..}]}`.
        #[arg(long, default_value = "updatePoolConfig.json")]
        file: PathBuf,

        #[command(flatten)]
        batching: Batching,

        #[command(flatten)]
        confirmation: Confirmation,
    },

    /// Deploy a standalone DummyERC20 owned by the sender.
    DeployDummyErc20 {
        #[arg(long, default_value = "Dummy ERC20")]
        name: String,

        #[arg(long, default_value = "PGL")]
        symbol: String,

        /// Minted supply, in whole tokens.
        #[arg(long, default_value_t = 100_000_000)]
        supply: u64,

        #[command(flatten)]
        confirmation: Confirmation,
    },

    /// Print the creation code hash of the pair contract.
    InitCodeHash {
        #[arg(long, default_value = PAIR_CONTRACT)]
        contract: String,
    },
}

#[derive(Debug, Clone, Copy, clap::Args)]
pub struct Batching {
    /// Maximum number of pools per transaction.
    #[arg(long, env = "QUACK_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Number of leading batches already applied by an interrupted run.
    #[arg(long, default_value_t = 0)]
    pub skip_batches: usize,
}

/// Bounds on waiting for each transaction, for commands without a network file.
/// Unset values keep the defaults.
#[derive(Debug, Clone, Copy, clap::Args)]
pub struct Confirmation {
    /// Delay before the first re-poll of the transaction count, in milliseconds.
    #[arg(long, env = "QUACK_CONFIRM_MIN_DELAY_MS")]
    pub confirm_min_delay_ms: Option<u64>,

    /// Upper bound of the delay between re-polls, in milliseconds.
    #[arg(long, env = "QUACK_CONFIRM_MAX_DELAY_MS")]
    pub confirm_max_delay_ms: Option<u64>,

    /// Number of re-polls before giving up on a transaction.
    #[arg(long, env = "QUACK_CONFIRM_MAX_ATTEMPTS")]
    pub confirm_max_attempts: Option<usize>,

    /// Overall limit for one confirmation, in seconds.
    #[arg(long, env = "QUACK_CONFIRM_TIMEOUT_SECS")]
    pub confirm_timeout_secs: Option<u64>,
}

impl Confirmation {
    pub fn policy(&self) -> Result<ConfirmationPolicy, DeployError> {
        let defaults = ConfirmationPolicy::default();
        let policy = ConfirmationPolicy {
            min_delay_ms: self.confirm_min_delay_ms.unwrap_or(defaults.min_delay_ms),
            max_delay_ms: self.confirm_max_delay_ms.unwrap_or(defaults.max_delay_ms),
            max_attempts: self.confirm_max_attempts.unwrap_or(defaults.max_attempts),
            timeout_secs: self.confirm_timeout_secs.unwrap_or(defaults.timeout_secs),
        };
        policy.validate()?;
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmation(args: &[&str]) -> Confirmation {
        let cli = Cli::try_parse_from(["quack", "add-pools"].iter().chain(args)).unwrap();
        match cli.command {
            Command::AddPools { confirmation, .. } => confirmation,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_confirmation_defaults() {
        assert_eq!(
            confirmation(&[]).policy().unwrap(),
            ConfirmationPolicy::default()
        );
    }

    #[test]
    fn test_confirmation_overrides() {
        let policy = confirmation(&["--confirm-timeout-secs", "60", "--confirm-max-attempts", "9"])
            .policy()
            .unwrap();
        assert_eq!(policy.timeout_secs, 60);
        assert_eq!(policy.max_attempts, 9);
        assert_eq!(policy.min_delay_ms, ConfirmationPolicy::default().min_delay_ms);
    }

    #[test]
    fn test_confirmation_is_validated() {
        let err = confirmation(&["--confirm-min-delay-ms", "9000", "--confirm-max-delay-ms", "10"])
            .policy()
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidArgument(_)));
    }

    #[test]
    fn test_dummy_erc20_takes_confirmation_bounds() {
        let cli = Cli::try_parse_from([
            "quack",
            "deploy-dummy-erc20",
            "--symbol",
            "2024",
            "--confirm-timeout-secs",
            "5",
        ])
        .unwrap();
        let Command::DeployDummyErc20 {
            symbol,
            confirmation,
            ..
        } = cli.command
        else {
            panic!("unexpected command");
        };
        assert_eq!(symbol, "2024");
        assert_eq!(confirmation.policy().unwrap().timeout_secs, 5);
    }
}
