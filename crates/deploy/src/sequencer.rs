//! Dependency-ordered contract deployment.

use std::collections::HashSet;

use alloy_core::primitives::{Address, B256};

use crate::{
    barrier::ConfirmationBarrier,
    chain::{ArgValue, ChainClient},
    error::{DeployError, RunAborted},
    ledger::{DeploymentRecord, Ledger},
};

/// A constructor argument, either literal or the address of an earlier step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepArg {
    Value(ArgValue),
    AddressOf(String),
}

impl StepArg {
    pub fn address_of(contract: impl Into<String>) -> Self {
        Self::AddressOf(contract.into())
    }
}

impl From<ArgValue> for StepArg {
    fn from(value: ArgValue) -> Self {
        Self::Value(value)
    }
}

impl From<Address> for StepArg {
    fn from(address: Address) -> Self {
        Self::Value(address.into())
    }
}

impl From<u64> for StepArg {
    fn from(value: u64) -> Self {
        Self::Value(value.into())
    }
}

impl From<&str> for StepArg {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<B256> for StepArg {
    fn from(word: B256) -> Self {
        Self::Value(word.into())
    }
}

/// One contract deployment. The contract name identifies the step within a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStep {
    pub contract: String,
    pub args: Vec<StepArg>,
}

impl DeploymentStep {
    pub fn new(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<StepArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn address_of(self, contract: impl Into<String>) -> Self {
        self.arg(StepArg::address_of(contract))
    }

    /// Substitute references with addresses recorded in `ledger`.
    fn resolve(&self, ledger: &Ledger) -> Result<Vec<ArgValue>, DeployError> {
        self.args
            .iter()
            .map(|arg| match arg {
                StepArg::Value(value) => Ok(value.clone()),
                StepArg::AddressOf(reference) => ledger
                    .address_of(reference)
                    .map(ArgValue::Address)
                    .ok_or_else(|| DeployError::UnresolvedReference {
                        step: self.contract.clone(),
                        reference: reference.clone(),
                    }),
            })
            .collect()
    }
}

/// Check that step names are unique and every reference names a contract that
/// is deployed before the referencing step, either earlier in `steps` or
/// already present in `ledger`.
pub fn validate_plan(steps: &[DeploymentStep], ledger: &Ledger) -> Result<(), DeployError> {
    let mut known: HashSet<&str> = ledger.iter().map(|r| r.contract.as_str()).collect();
    let mut seen = HashSet::new();

    for step in steps {
        if !seen.insert(step.contract.as_str()) {
            return Err(DeployError::invalid(format!(
                "contract {} appears twice in the deployment plan",
                step.contract
            )));
        }
        for arg in &step.args {
            let StepArg::AddressOf(reference) = arg else {
                continue;
            };
            if !known.contains(reference.as_str()) {
                return Err(DeployError::UnresolvedReference {
                    step: step.contract.clone(),
                    reference: reference.clone(),
                });
            }
        }
        known.insert(step.contract.as_str());
    }
    Ok(())
}

/// Runs deployment steps strictly in order, each one confirmed before the next.
pub struct DeploymentSequencer<'b, 'a, C> {
    barrier: &'b ConfirmationBarrier<'a, C>,
}

impl<'b, 'a, C: ChainClient> DeploymentSequencer<'b, 'a, C> {
    pub fn new(barrier: &'b ConfirmationBarrier<'a, C>) -> Self {
        Self { barrier }
    }

    /// Deploy `steps` into a fresh ledger.
    pub async fn run(&self, steps: &[DeploymentStep]) -> Result<Ledger, RunAborted> {
        self.continue_run(steps, Ledger::new()).await
    }

    /// Deploy `steps` on top of `ledger`, whose records may be referenced.
    ///
    /// The first failing step aborts the run. Contracts deployed before it stay in
    /// the ledger carried by [`RunAborted`].
    pub async fn continue_run(
        &self,
        steps: &[DeploymentStep],
        mut ledger: Ledger,
    ) -> Result<Ledger, RunAborted> {
        if let Err(err) = validate_plan(steps, &ledger) {
            return Err(RunAborted::new(ledger, err));
        }

        let client = self.barrier.client();
        for (index, step) in steps.iter().enumerate() {
            let args = match step.resolve(&ledger) {
                Ok(args) => args,
                Err(err) => return Err(RunAborted::new(ledger, err)),
            };

            tracing::debug!(
                contract = %step.contract,
                step = index + 1,
                total = steps.len(),
                "Deploying"
            );
            let deployed = self
                .barrier
                .submit(&step.contract, || client.deploy(&step.contract, &args))
                .await;
            let address = match deployed {
                Ok(address) => address,
                Err(err) => {
                    tracing::error!(contract = %step.contract, "Deployment failed, aborting run");
                    return Err(RunAborted::new(ledger, err));
                }
            };

            tracing::info!(address = %address, contract = %step.contract, "Deployed");
            ledger.record(DeploymentRecord {
                contract: step.contract.clone(),
                address,
                args,
            });
        }

        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{barrier::ConfirmationPolicy, simulated::SimulatedChain};

    fn deployer() -> Address {
        Address::repeat_byte(0xde)
    }

    fn policy() -> ConfirmationPolicy {
        ConfirmationPolicy {
            min_delay_ms: 1,
            max_delay_ms: 2,
            max_attempts: 20,
            timeout_secs: 5,
        }
    }

    fn chain_of_three() -> Vec<DeploymentStep> {
        vec![
            DeploymentStep::new("A").arg(42u64),
            DeploymentStep::new("B").address_of("A"),
            DeploymentStep::new("C").address_of("B").arg("label"),
        ]
    }

    #[tokio::test]
    async fn test_references_resolve_to_earlier_addresses() {
        let chain = SimulatedChain::new(deployer()).with_confirmation_lag(1);
        let barrier = ConfirmationBarrier::new(&chain, policy());

        let ledger = DeploymentSequencer::new(&barrier)
            .run(&chain_of_three())
            .await
            .unwrap();

        let names: Vec<_> = ledger.iter().map(|r| r.contract.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(ledger[0].address, deployer().create(0));
        assert_eq!(ledger[1].args, vec![ArgValue::Address(ledger[0].address)]);
        assert_eq!(
            ledger[2].args,
            vec![ArgValue::Address(ledger[1].address), ArgValue::from("label")]
        );
    }

    #[tokio::test]
    async fn test_failed_step_keeps_prefix() {
        let chain = SimulatedChain::new(deployer()).fail_on_attempt(1);
        let barrier = ConfirmationBarrier::new(&chain, policy());

        let aborted = DeploymentSequencer::new(&barrier)
            .run(&chain_of_three())
            .await
            .unwrap_err();

        assert_eq!(aborted.ledger.len(), 1);
        assert_eq!(aborted.ledger[0].contract, "A");
        assert!(matches!(aborted.error, DeployError::Submission { ref call, .. } if call == "B"));
        // C is never attempted.
        assert_eq!(chain.attempts(), 2);
    }

    #[tokio::test]
    async fn test_invalid_plans_are_rejected_before_submission() {
        let chain = SimulatedChain::new(deployer());
        let barrier = ConfirmationBarrier::new(&chain, policy());
        let sequencer = DeploymentSequencer::new(&barrier);

        let forward = vec![
            DeploymentStep::new("B").address_of("A"),
            DeploymentStep::new("A"),
        ];
        let aborted = sequencer.run(&forward).await.unwrap_err();
        assert!(matches!(aborted.error, DeployError::UnresolvedReference { .. }));

        let duplicate = vec![DeploymentStep::new("A"), DeploymentStep::new("A")];
        let aborted = sequencer.run(&duplicate).await.unwrap_err();
        assert!(matches!(aborted.error, DeployError::InvalidArgument(_)));

        assert_eq!(chain.attempts(), 0);
    }

    #[tokio::test]
    async fn test_continue_run_references_existing_ledger() {
        let chain = SimulatedChain::new(deployer());
        let barrier = ConfirmationBarrier::new(&chain, policy());
        let sequencer = DeploymentSequencer::new(&barrier);

        let ledger = sequencer.run(&[DeploymentStep::new("A")]).await.unwrap();
        let ledger = sequencer
            .continue_run(&[DeploymentStep::new("B").address_of("A")], ledger)
            .await
            .unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[1].args, vec![ArgValue::Address(deployer().create(0))]);
    }
}
