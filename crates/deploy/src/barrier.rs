//! Serializes transactions from one account by watching its transaction count.
//!
//! The node accepts a new transaction from an account before the previous one is
//! included, and may then reorder or drop them. Every submission therefore goes
//! through [`ConfirmationBarrier::submit`], which only returns once the account's
//! confirmed transaction count moved by exactly one.

use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use alloy_core::primitives::Address;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};

use crate::{chain::ChainClient, error::DeployError};

/// How long and how often the barrier polls before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationPolicy {
    /// Delay before the first re-poll, in milliseconds.
    pub min_delay_ms: u64,
    /// Upper bound of the exponential delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Number of re-polls after the first sample.
    pub max_attempts: usize,
    /// Overall limit for one confirmation, in seconds.
    pub timeout_secs: u64,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            min_delay_ms: 250,
            max_delay_ms: 4_000,
            max_attempts: 150,
            timeout_secs: 300,
        }
    }
}

impl ConfirmationPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_attempts)
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(DeployError::invalid(format!(
                "confirmation min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        if self.timeout_secs == 0 {
            return Err(DeployError::invalid("confirmation timeout_secs must be positive"));
        }
        Ok(())
    }
}

/// Sequence number the account must reach once the pending transaction is included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHandle {
    expected: u64,
}

impl TransactionHandle {
    pub fn expected(&self) -> u64 {
        self.expected
    }
}

/// Outcome of one sample of the transaction count.
enum Sample {
    /// Not included yet; poll again.
    Pending,
    Fatal(DeployError),
}

/// Blocks the calling flow until each submitted transaction is confirmed.
pub struct ConfirmationBarrier<'a, C> {
    client: &'a C,
    account: Address,
    policy: ConfirmationPolicy,
}

impl<'a, C: ChainClient> ConfirmationBarrier<'a, C> {
    pub fn new(client: &'a C, policy: ConfirmationPolicy) -> Self {
        Self {
            client,
            account: client.account(),
            policy,
        }
    }

    pub fn client(&self) -> &'a C {
        self.client
    }

    pub fn account(&self) -> Address {
        self.account
    }

    async fn sample(&self) -> Result<u64, DeployError> {
        self.client
            .transaction_count(self.account)
            .await
            .map_err(|source| {
                tracing::error!(
                    account = %self.account,
                    error = %source,
                    "Failed to read transaction count"
                );
                DeployError::Sampling {
                    account: self.account,
                    source,
                }
            })
    }

    async fn poll_once(&self, expected: u64, last: &AtomicU64) -> Result<u64, Sample> {
        let observed = self.sample().await.map_err(Sample::Fatal)?;
        last.store(observed, Ordering::Relaxed);
        match observed.cmp(&expected) {
            std::cmp::Ordering::Equal => Ok(observed),
            std::cmp::Ordering::Less => Err(Sample::Pending),
            std::cmp::Ordering::Greater => Err(Sample::Fatal(DeployError::SequenceSkipped {
                account: self.account,
                expected,
                observed,
            })),
        }
    }

    /// Record the transaction count before a submission.
    pub async fn prepare(&self) -> Result<TransactionHandle, DeployError> {
        let before = self.sample().await?;
        Ok(TransactionHandle {
            expected: before + 1,
        })
    }

    /// Wait until the transaction count equals `handle.expected()`.
    ///
    /// A count below the expected value is polled with exponential backoff until
    /// the policy's attempts or timeout run out. A count above it means another
    /// transaction from the same account slipped in, which is reported at once.
    pub async fn confirm(&self, handle: TransactionHandle) -> Result<u64, DeployError> {
        let expected = handle.expected;
        let account = self.account;
        let last_observed = AtomicU64::new(expected - 1);
        let started = Instant::now();

        let last = &last_observed;
        let polling = (move || self.poll_once(expected, last))
            .retry(self.policy.backoff())
            .when(|sample: &Sample| matches!(sample, Sample::Pending))
            .notify(|_: &Sample, delay: Duration| {
                tracing::trace!(
                    account = %account,
                    expected,
                    observed = last.load(Ordering::Relaxed),
                    "Transaction not confirmed yet, polling again in {:?}",
                    delay
                );
            });

        let stall = || DeployError::ConfirmationStall {
            account,
            expected,
            observed: last_observed.load(Ordering::Relaxed),
            waited: started.elapsed(),
        };

        match tokio::time::timeout(self.policy.timeout(), polling).await {
            Ok(Ok(observed)) => Ok(observed),
            Ok(Err(Sample::Fatal(err))) => Err(err),
            Ok(Err(Sample::Pending)) | Err(_) => {
                let err = stall();
                tracing::error!(error = %err, "Gave up waiting for confirmation");
                Err(err)
            }
        }
    }

    /// Submit one state-changing call and wait for its confirmation.
    ///
    /// `description` names the call in logs and errors. A failed submission is
    /// returned as [`DeployError::Submission`] without waiting.
    pub async fn submit<T, F, Fut>(&self, description: &str, submit: F) -> Result<T, DeployError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let handle = self.prepare().await?;
        let output = submit().await.map_err(|source| {
            tracing::error!(call = %description, error = %source, "Submission failed");
            DeployError::Submission {
                call: description.to_string(),
                source,
            }
        })?;
        self.confirm(handle).await?;
        tracing::debug!(call = %description, nonce = handle.expected, "Transaction confirmed");
        Ok(output)
    }
}
