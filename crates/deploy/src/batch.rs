//! Bounded batches of bulk configuration, applied one confirmed call at a time.

use std::future::Future;

use alloy_core::primitives::TxHash;

use crate::{barrier::ConfirmationBarrier, chain::ChainClient, error::DeployError};

/// Split `items` into consecutive batches of at most `max_size` elements.
///
/// Every batch but the last holds exactly `max_size` elements, and concatenating
/// the batches gives back `items` in order.
pub fn split_batches<T>(items: Vec<T>, max_size: usize) -> Result<Vec<Vec<T>>, DeployError> {
    if max_size == 0 {
        return Err(DeployError::invalid("batch size must be at least 1"));
    }

    let mut batches = Vec::with_capacity(items.len().div_ceil(max_size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        batches.push(items.by_ref().take(max_size).collect());
    }
    Ok(batches)
}

/// Applies batches of a single configuration call in order, each confirmed
/// through the [`ConfirmationBarrier`] before the next one is submitted.
pub struct BatchPipeline<'b, 'a, C> {
    barrier: &'b ConfirmationBarrier<'a, C>,
    skip: usize,
}

impl<'b, 'a, C: ChainClient> BatchPipeline<'b, 'a, C> {
    pub fn new(barrier: &'b ConfirmationBarrier<'a, C>) -> Self {
        Self { barrier, skip: 0 }
    }

    /// Treat the first `batches` batches as already applied by an earlier run.
    pub fn skip(mut self, batches: usize) -> Self {
        self.skip = batches;
        self
    }

    /// Submit one call per batch through `submit`, which receives the batch index
    /// and its elements.
    ///
    /// Returns the number of batches applied, skipped ones included. When batch `k`
    /// fails, batches before it stay applied and the rest are never attempted; the
    /// error reports how many were applied so the caller can resume with
    /// [`BatchPipeline::skip`].
    pub async fn apply<T, F, Fut>(
        &self,
        description: &str,
        batches: Vec<Vec<T>>,
        mut submit: F,
    ) -> Result<usize, DeployError>
    where
        F: FnMut(usize, Vec<T>) -> Fut,
        Fut: Future<Output = anyhow::Result<TxHash>>,
    {
        let total = batches.len();
        if self.skip > total {
            return Err(DeployError::invalid(format!(
                "cannot skip {} of {} batches",
                self.skip, total
            )));
        }
        if self.skip > 0 {
            tracing::info!(skipped = self.skip, total, "Resuming {}", description);
        }

        let mut applied = self.skip;
        for (index, batch) in batches.into_iter().enumerate().skip(self.skip) {
            let size = batch.len();
            let label = format!("{description} (batch {} of {total})", index + 1);

            if let Err(err) = self.barrier.submit(&label, || submit(index, batch)).await {
                tracing::error!(applied, total, "{} stopped at batch {}", description, index + 1);
                return Err(DeployError::BatchApply {
                    applied,
                    total,
                    source: Box::new(err),
                });
            }

            applied += 1;
            tracing::info!(batch = index + 1, total, size, "{} applied", description);
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::{
        primitives::{Address, U256},
        sol_types::SolCall,
    };

    use super::*;
    use crate::{
        barrier::ConfirmationPolicy, calls::IMasterChef, chain::ContractCall,
        simulated::SimulatedChain,
    };

    fn policy() -> ConfirmationPolicy {
        ConfirmationPolicy {
            min_delay_ms: 1,
            max_delay_ms: 2,
            max_attempts: 20,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_split_preserves_order_and_bounds() {
        for len in 0..40usize {
            for max_size in 1..12usize {
                let items: Vec<usize> = (0..len).collect();
                let batches = split_batches(items.clone(), max_size).unwrap();

                assert_eq!(batches.len(), len.div_ceil(max_size));
                assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= max_size));
                assert!(
                    batches
                        .iter()
                        .rev()
                        .skip(1)
                        .all(|b| b.len() == max_size)
                );
                assert_eq!(batches.concat(), items);
            }
        }
    }

    #[test]
    fn test_split_empty_input() {
        assert!(split_batches(Vec::<u8>::new(), 50).unwrap().is_empty());
    }

    #[test]
    fn test_split_rejects_zero_size() {
        let err = split_batches(vec![1, 2, 3], 0).unwrap_err();
        assert!(matches!(err, DeployError::InvalidArgument(_)));
    }

    /// Submit an `addPools` call for `pools` to the MasterChef at `chef`.
    async fn add_pools(
        chain: &SimulatedChain,
        chef: Address,
        pools: Vec<u64>,
    ) -> anyhow::Result<TxHash> {
        let call = IMasterChef::addPoolsCall {
            allocPoints: pools.iter().map(|w| U256::from(*w)).collect(),
            lpTokens: vec![Address::ZERO; pools.len()],
            rewarders: vec![Address::ZERO; pools.len()],
        };
        chain
            .send(&ContractCall::new(chef, call, "MasterChef.addPools"))
            .await
    }

    fn batch_sizes(chain: &SimulatedChain) -> Vec<usize> {
        chain
            .calls()
            .iter()
            .map(|call| {
                IMasterChef::addPoolsCall::abi_decode(&call.input, true)
                    .unwrap()
                    .allocPoints
                    .len()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_pipeline_applies_batches_in_order() {
        let chain = SimulatedChain::new(Address::repeat_byte(1)).with_confirmation_lag(2);
        let barrier = ConfirmationBarrier::new(&chain, policy());
        let chef = Address::repeat_byte(0xcc);

        let batches = split_batches((0..120).collect(), 50).unwrap();
        let applied = BatchPipeline::new(&barrier)
            .apply("MasterChef.addPools", batches, |_, batch| add_pools(&chain, chef, batch))
            .await
            .unwrap();

        assert_eq!(applied, 3);
        assert_eq!(batch_sizes(&chain), vec![50, 50, 20]);

        let last = IMasterChef::addPoolsCall::abi_decode(&chain.calls()[2].input, true).unwrap();
        assert_eq!(last.allocPoints[0], U256::from(100));
        assert_eq!(last.allocPoints[19], U256::from(119));
    }

    #[tokio::test]
    async fn test_pipeline_stops_at_failed_batch() {
        let chain = SimulatedChain::new(Address::repeat_byte(1)).fail_on_attempt(1);
        let barrier = ConfirmationBarrier::new(&chain, policy());
        let chef = Address::repeat_byte(0xcc);

        let batches = split_batches((0..120).collect(), 50).unwrap();
        let err = BatchPipeline::new(&barrier)
            .apply("MasterChef.addPools", batches, |_, batch| add_pools(&chain, chef, batch))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "1 of 3 batches applied");
        assert!(matches!(err, DeployError::BatchApply { applied: 1, total: 3, .. }));
        // The third batch is never attempted.
        assert_eq!(chain.attempts(), 2);
        assert_eq!(batch_sizes(&chain), vec![50]);
    }

    #[tokio::test]
    async fn test_reverted_batch_is_not_counted() {
        let chain = SimulatedChain::new(Address::repeat_byte(1)).revert_on_attempt(1);
        let barrier = ConfirmationBarrier::new(&chain, policy());
        let chef = Address::repeat_byte(0xcc);

        let batches = split_batches((0..120).collect(), 50).unwrap();
        let err = BatchPipeline::new(&barrier)
            .apply("MasterChef.addPools", batches, |_, batch| add_pools(&chain, chef, batch))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::BatchApply { applied: 1, total: 3, .. }));
        // The reverted batch was mined, so the account moved on by two.
        assert_eq!(chain.transaction_count(chain.account()).await.unwrap(), 2);
        assert_eq!(batch_sizes(&chain), vec![50]);
    }

    #[tokio::test]
    async fn test_pipeline_resumes_after_skipped_batches() {
        let chain = SimulatedChain::new(Address::repeat_byte(1));
        let barrier = ConfirmationBarrier::new(&chain, policy());
        let chef = Address::repeat_byte(0xcc);

        let mut seen = Vec::new();
        let batches = split_batches((0..120).collect(), 50).unwrap();
        let applied = BatchPipeline::new(&barrier)
            .skip(1)
            .apply("MasterChef.addPools", batches, |index, batch| {
                seen.push(index);
                add_pools(&chain, chef, batch)
            })
            .await
            .unwrap();

        assert_eq!(applied, 3);
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(batch_sizes(&chain), vec![50, 20]);

        let err = BatchPipeline::new(&barrier)
            .skip(4)
            .apply("MasterChef.addPools", vec![vec![1u64]], |_, batch| {
                add_pools(&chain, chef, batch)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidArgument(_)));
    }
}
