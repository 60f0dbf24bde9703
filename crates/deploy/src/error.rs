//! Error taxonomy of the orchestrator.
//!
//! Collaborators (RPC client, artifact store, config files) report failures as
//! [`anyhow::Error`]. The orchestrator wraps them into [`DeployError`] at the point
//! where it knows which call or step was affected.

use std::{path::PathBuf, time::Duration};

use alloy_core::primitives::Address;

use crate::ledger::Ledger;

/// Errors surfaced by the orchestrator. Every variant is terminal for the run.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Malformed input detected before any remote call was attempted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The chain rejected or could not accept a call.
    #[error("failed to submit {call}")]
    Submission {
        call: String,
        #[source]
        source: anyhow::Error,
    },

    /// The transaction count of the deployer could not be read.
    #[error("failed to read transaction count of {account}")]
    Sampling {
        account: Address,
        #[source]
        source: anyhow::Error,
    },

    /// The transaction count never reached the expected value.
    #[error(
        "transaction count of {account} stalled at {observed} (expected {expected}) after {waited:?}"
    )]
    ConfirmationStall {
        account: Address,
        expected: u64,
        observed: u64,
        waited: Duration,
    },

    /// The transaction count moved past the expected value, so some other
    /// transaction from the same account was included.
    #[error("transaction count of {account} jumped to {observed} (expected {expected})")]
    SequenceSkipped {
        account: Address,
        expected: u64,
        observed: u64,
    },

    /// A batch failed after `applied` earlier batches were confirmed.
    #[error("{applied} of {total} batches applied")]
    BatchApply {
        applied: usize,
        total: usize,
        #[source]
        source: Box<DeployError>,
    },

    /// A step referenced a contract that has no deployment record.
    #[error("step {step} references {reference}, which has not been deployed")]
    UnresolvedReference { step: String, reference: String },

    /// A read-only query against the chain failed.
    #[error("query {query} failed")]
    Query {
        query: String,
        #[source]
        source: anyhow::Error,
    },

    /// The ledger could not be written.
    #[error("failed to persist deployments to {}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DeployError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// A run that stopped early, along with everything it deployed before stopping.
///
/// Contracts in `ledger` stay on chain; the operator decides whether to persist
/// them and how to resume.
#[derive(Debug, thiserror::Error)]
#[error("run aborted after {} deployment(s)", .ledger.len())]
pub struct RunAborted {
    pub ledger: Ledger,
    #[source]
    pub error: DeployError,
}

impl RunAborted {
    pub fn new(ledger: Ledger, error: DeployError) -> Self {
        Self { ledger, error }
    }
}
