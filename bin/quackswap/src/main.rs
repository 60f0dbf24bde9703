//! quack deploys the QuackSwap protocol and manages its MasterChef pools.

mod cli;

use std::path::Path;

use alloy_core::primitives::utils::format_ether;
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;

use cli::{Batching, Cli, Command, DEFAULT_DRY_RUN_ACCOUNT, OutputFormat};
use quackswap_deploy::{
    ArgValue, ArtifactStore, ChainClient, ConfirmationBarrier, DeployError,
    DeploymentReport, DeploymentSequencer, Ledger, MasterChefPools, Network, NetworkConfig,
    PoolConfigFile, ProtocolDeployer, RpcChainClient, SimulatedChain, UpdatePoolConfigFile,
    protocol::dummy_erc20_step,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let artifacts = ArtifactStore::new(&cli.artifacts);

    // Only the hash computation works without a chain.
    if let Command::InitCodeHash { contract } = &cli.command {
        return print_init_code_hash(&artifacts, contract);
    }

    let config = match &cli.command {
        Command::Deploy {
            network,
            networks_dir,
            ..
        } => Some(NetworkConfig::load(networks_dir, network)?),
        _ => None,
    };

    if cli.dry_run {
        let account = cli.from.unwrap_or(DEFAULT_DRY_RUN_ACCOUNT);
        tracing::warn!(account = %account, "Dry run, no transaction will be sent");

        let mut chain = SimulatedChain::new(account);
        if let Some(config) = &config {
            chain = chain.with_pair_init_code_hash(config.pair_init_code_hash);
        }
        execute(&cli, &chain, &artifacts, config.as_ref()).await
    } else {
        let client = RpcChainClient::connect(cli.rpc_url.clone(), cli.from, artifacts.clone())
            .await
            .context("Failed to connect to the node")?;
        tracing::info!(rpc_url = %cli.rpc_url, deployer = %client.account(), "Using node");
        execute(&cli, &client, &artifacts, config.as_ref()).await
    }
}

async fn execute<C: ChainClient>(
    cli: &Cli,
    client: &C,
    artifacts: &ArtifactStore,
    config: Option<&NetworkConfig>,
) -> Result<()> {
    match &cli.command {
        Command::Deploy {
            network,
            addresses_dir,
            ..
        } => {
            let config = config.context("Network config not loaded")?;
            deploy(cli, client, config, network, addresses_dir).await
        }
        Command::AddPools {
            file,
            batching,
            confirmation,
        } => {
            let file = PoolConfigFile::load(file)?;
            let barrier = ConfirmationBarrier::new(client, confirmation.policy()?);
            let applied = pools(&barrier, file.master_chef_address, batching)
                .register_pools(file.pools())
                .await
                .inspect_err(resume_hint)?;
            tracing::info!(batches = applied, "All pools registered");
            Ok(())
        }
        Command::SetPools {
            file,
            batching,
            confirmation,
        } => {
            let file = UpdatePoolConfigFile::load(file)?;
            let barrier = ConfirmationBarrier::new(client, confirmation.policy()?);
            let applied = pools(&barrier, file.master_chef_address, batching)
                .update_pools(file.updates())
                .await
                .inspect_err(resume_hint)?;
            tracing::info!(batches = applied, "All pools updated");
            Ok(())
        }
        Command::DeployDummyErc20 {
            name,
            symbol,
            supply,
            confirmation,
        } => {
            let barrier = ConfirmationBarrier::new(client, confirmation.policy()?);
            let step = dummy_erc20_step(
                name,
                symbol,
                client.account(),
                ArgValue::token_amount(*supply),
            );
            let ledger = DeploymentSequencer::new(&barrier).run(&[step]).await?;
            print_ledger(&ledger, cli.output)
        }
        Command::InitCodeHash { contract } => print_init_code_hash(artifacts, contract),
    }
}

fn pools<'b, 'a, C: ChainClient>(
    barrier: &'b ConfirmationBarrier<'a, C>,
    master_chef: alloy_core::primitives::Address,
    batching: &Batching,
) -> MasterChefPools<'b, 'a, C> {
    tracing::info!(master_chef = %master_chef, "Using MasterChef");
    MasterChefPools::new(barrier, master_chef)
        .batch_size(batching.batch_size)
        .skip_batches(batching.skip_batches)
}

fn resume_hint(err: &DeployError) {
    if let DeployError::BatchApply { applied, .. } = err {
        tracing::error!("Rerun with --skip-batches {} to resume", applied);
    }
}

async fn deploy<C: ChainClient>(
    cli: &Cli,
    client: &C,
    config: &NetworkConfig,
    network: &Network,
    addresses_dir: &Path,
) -> Result<()> {
    tracing::info!(network = %network, "Deploying QuackSwap");

    match ProtocolDeployer::new(client, config).run().await {
        Ok(report) => {
            print_report(&report, cli.output)?;
            if cli.dry_run {
                tracing::info!("Dry run, addresses not recorded");
            } else {
                report.ledger.persist(addresses_dir, network)?;
            }
            Ok(())
        }
        Err(aborted) => {
            print_ledger(&aborted.ledger, cli.output)?;
            if !cli.dry_run && !aborted.ledger.is_empty() {
                if let Err(err) = aborted.ledger.persist_partial(addresses_dir, network) {
                    tracing::error!(error = %err, "Failed to record partial deployment");
                }
            }
            Err(aborted.into())
        }
    }
}

fn print_init_code_hash(artifacts: &ArtifactStore, contract: &str) -> Result<()> {
    let hash = artifacts.init_code_hash(contract)?;
    tracing::debug!(contract, artifacts = %artifacts.dir().display(), "Computed init code hash");
    println!("{hash}");
    Ok(())
}

fn print_ledger(ledger: &Ledger, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(ledger)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(vec!["Contract", "Address"]);
            for record in ledger.iter() {
                table.add_row(vec![record.contract.clone(), record.address.to_string()]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

fn print_report(report: &DeploymentReport, output: OutputFormat) -> Result<()> {
    print_ledger(&report.ledger, output)?;
    if output == OutputFormat::Json {
        return Ok(());
    }

    if !report.pairs.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Token A", "Token B", "Pair"]);
        for pair in &report.pairs {
            table.add_row(vec![
                pair.token_a.to_string(),
                pair.token_b.to_string(),
                pair.pair.to_string(),
            ]);
        }
        println!("{table}");
    }

    println!("Farms registered: {}", report.farms_registered);
    if let Some(cost) = report.cost {
        println!("Deploy cost: {}", format_ether(cost));
    }
    Ok(())
}
