//! Ethereum JSON-RPC implementation of [`ChainClient`].

use std::time::Duration;

use alloy_core::primitives::{Address, Bytes, TxHash, U64, U256};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{
    artifacts::ArtifactStore,
    chain::{ArgValue, ChainClient, ContractCall, encode_constructor_args},
};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between receipt polls after a deployment was submitted.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Number of receipt polls before a deployment is reported as lost.
const RECEIPT_POLL_ATTEMPTS: usize = 300;

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Error object of a JSON-RPC response.
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Envelope of a JSON-RPC response. `result` is absent when `error` is set and
/// may be `null` for lookups that found nothing.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    #[serde(default = "Option::default")]
    result: Option<T>,
    error: Option<RpcError>,
}

/// Send `method` to the node at `url` and deserialize its result.
///
/// A `null` result deserializes into `T` itself, so lookups that may find nothing
/// should ask for an `Option`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response: RpcResponse<Value> = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {method} request"))?
        .json()
        .await
        .with_context(|| format!("Failed to parse {method} response"))?;

    if let Some(error) = response.error {
        anyhow::bail!("{} failed with RPC error {}: {}", method, error.code, error.message);
    }

    serde_json::from_value(response.result.unwrap_or(Value::Null))
        .with_context(|| format!("Failed to deserialize {method} result"))
}

/// Fields of a transaction receipt the deployer looks at.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    contract_address: Option<Address>,
    status: Option<U64>,
}

impl TransactionReceipt {
    /// Fail if the transaction was mined but reverted. Receipts from before
    /// Byzantium carry no status and pass.
    fn ensure_success(self, tx_hash: TxHash) -> anyhow::Result<Self> {
        if self.status.is_some_and(|status| status.is_zero()) {
            anyhow::bail!("Transaction {} reverted", tx_hash);
        }
        Ok(self)
    }
}

/// [`ChainClient`] talking to a node that holds the deployer account unlocked
/// (Hardhat node, Anvil, or a Geth with a personal account).
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    http: reqwest::Client,
    url: Url,
    account: Address,
    artifacts: ArtifactStore,
}

impl RpcChainClient {
    pub fn new(url: Url, account: Address, artifacts: ArtifactStore) -> anyhow::Result<Self> {
        Ok(Self {
            http: create_client()?,
            url,
            account,
            artifacts,
        })
    }

    /// Connect to `url`, sending from `account` or, when `None`, from the first
    /// account the node manages.
    pub async fn connect(
        url: Url,
        account: Option<Address>,
        artifacts: ArtifactStore,
    ) -> anyhow::Result<Self> {
        let http = create_client()?;
        let account = match account {
            Some(account) => account,
            None => {
                let accounts: Vec<Address> =
                    json_rpc_call(&http, &url, "eth_accounts", vec![]).await?;
                accounts
                    .first()
                    .copied()
                    .with_context(|| format!("Node at {url} manages no accounts"))?
            }
        };
        tracing::debug!(url = %url, account = %account, "Connected to node");

        Ok(Self {
            http,
            url,
            account,
            artifacts,
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> anyhow::Result<T> {
        json_rpc_call(&self.http, &self.url, method, params).await
    }

    /// Poll for the receipt of `tx_hash` until it is available, and fail if the
    /// transaction reverted.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> anyhow::Result<TransactionReceipt> {
        let receipt = (|| async {
            let receipt: Option<TransactionReceipt> = self
                .request("eth_getTransactionReceipt", vec![serde_json::json!(tx_hash)])
                .await?;
            receipt.context("Receipt not available yet")
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(RECEIPT_POLL_INTERVAL)
                .with_max_times(RECEIPT_POLL_ATTEMPTS),
        )
        .notify(|err: &anyhow::Error, dur: Duration| {
            tracing::trace!(error = %err, tx_hash = %tx_hash, "Waiting {:?} for receipt", dur);
        })
        .await
        .with_context(|| format!("No receipt for transaction {tx_hash}"))?;

        receipt.ensure_success(tx_hash)
    }
}

impl ChainClient for RpcChainClient {
    fn account(&self) -> Address {
        self.account
    }

    async fn transaction_count(&self, account: Address) -> anyhow::Result<u64> {
        let count: U64 = self
            .request(
                "eth_getTransactionCount",
                vec![serde_json::json!(account), serde_json::json!("latest")],
            )
            .await?;
        Ok(count.to::<u64>())
    }

    async fn deploy(&self, contract: &str, args: &[ArgValue]) -> anyhow::Result<Address> {
        let mut data = self.artifacts.bytecode(contract)?.to_vec();
        data.extend(encode_constructor_args(args));

        let tx_hash: TxHash = self
            .request(
                "eth_sendTransaction",
                vec![serde_json::json!({
                    "from": self.account,
                    "data": Bytes::from(data),
                })],
            )
            .await
            .with_context(|| format!("Failed to send deployment of {contract}"))?;

        tracing::debug!(contract, tx_hash = %tx_hash, "Deployment transaction sent");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        receipt
            .contract_address
            .with_context(|| format!("Receipt of {tx_hash} has no contract address"))
    }

    async fn send(&self, call: &ContractCall) -> anyhow::Result<TxHash> {
        let tx_hash: TxHash = self
            .request(
                "eth_sendTransaction",
                vec![serde_json::json!({
                    "from": self.account,
                    "to": call.to,
                    "data": call.input,
                })],
            )
            .await
            .with_context(|| format!("Failed to send {}", call.description))?;

        tracing::debug!(call = %call.description, tx_hash = %tx_hash, "Transaction sent");

        // A reverted call still uses up its nonce, so the receipt is what tells it
        // apart from an applied one.
        self.wait_for_receipt(tx_hash)
            .await
            .with_context(|| format!("{} was not applied", call.description))?;
        Ok(tx_hash)
    }

    async fn call(&self, to: Address, input: Bytes) -> anyhow::Result<Bytes> {
        self.request(
            "eth_call",
            vec![
                serde_json::json!({ "to": to, "data": input }),
                serde_json::json!("latest"),
            ],
        )
        .await
    }

    async fn balance(&self, account: Address) -> anyhow::Result<U256> {
        self.request(
            "eth_getBalance",
            vec![serde_json::json!(account), serde_json::json!("latest")],
        )
        .await
    }
}
