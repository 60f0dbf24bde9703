//! In-memory chain used for dry runs and tests.
//!
//! Contract addresses follow the same CREATE and CREATE2 rules as a real chain, so a
//! dry run from the same account and nonce predicts the addresses of a live run.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use alloy_core::{
    primitives::{Address, B256, Bytes, TxHash, U256, keccak256},
    sol_types::SolCall,
};
use anyhow::Result;

use crate::{
    calls::IQuackSwapFactory,
    chain::{ArgValue, ChainClient, ContractCall},
};

/// Balance the simulated deployer starts with (1000 ETH).
const INITIAL_BALANCE_WEI: u128 = 1_000_000_000_000_000_000_000;

/// A transaction accepted by the simulated chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Deploy {
        contract: String,
        address: Address,
        args: Vec<ArgValue>,
    },
    Call(ContractCall),
}

#[derive(Debug, Default)]
struct State {
    /// Nonce the next submission will use.
    next_nonce: u64,
    /// Nonce visible through `transaction_count`.
    confirmed_nonce: u64,
    /// Samples left before `confirmed_nonce` catches up with `next_nonce`.
    lag_remaining: u32,
    submissions: Vec<Submission>,
    /// Number of submission attempts, failed ones included.
    attempts: usize,
    /// Pair address keyed by (factory, token0, token1), tokens sorted.
    pairs: HashMap<(Address, Address, Address), Address>,
}

/// Deterministic in-memory [`ChainClient`].
#[derive(Debug)]
pub struct SimulatedChain {
    account: Address,
    pair_init_code_hash: B256,
    confirmation_lag: u32,
    fail_on_attempt: Option<usize>,
    revert_on_attempt: Option<usize>,
    state: Mutex<State>,
}

impl SimulatedChain {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            pair_init_code_hash: B256::ZERO,
            confirmation_lag: 0,
            fail_on_attempt: None,
            revert_on_attempt: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Start the account at `nonce`, as if it had already sent transactions.
    pub fn with_nonce(self, nonce: u64) -> Self {
        {
            let mut state = self.lock();
            state.next_nonce = nonce;
            state.confirmed_nonce = nonce;
        }
        self
    }

    /// Init code hash used to derive pair addresses on `createPair`.
    pub fn with_pair_init_code_hash(mut self, hash: B256) -> Self {
        self.pair_init_code_hash = hash;
        self
    }

    /// Number of `transaction_count` samples a submission stays invisible for.
    pub fn with_confirmation_lag(mut self, samples: u32) -> Self {
        self.confirmation_lag = samples;
        self
    }

    /// Reject the submission attempt with the given zero-based index.
    pub fn fail_on_attempt(mut self, attempt: usize) -> Self {
        self.fail_on_attempt = Some(attempt);
        self
    }

    /// Mine the submission attempt with the given zero-based index as reverted.
    /// It uses up a nonce but has no other effect.
    pub fn revert_on_attempt(mut self, attempt: usize) -> Self {
        self.revert_on_attempt = Some(attempt);
        self
    }

    /// Every accepted submission, in order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().submissions.clone()
    }

    /// Accepted method calls, in order.
    pub fn calls(&self) -> Vec<ContractCall> {
        self.lock()
            .submissions
            .iter()
            .filter_map(|submission| match submission {
                Submission::Call(call) => Some(call.clone()),
                Submission::Deploy { .. } => None,
            })
            .collect()
    }

    /// Number of submission attempts, including rejected ones.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panic in a test thread.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count a submission attempt, rejecting it if a failure was injected for it.
    /// A reverted attempt is mined and consumes its nonce.
    fn admit(&self, state: &mut State, what: &str) -> Result<()> {
        let attempt = state.attempts;
        state.attempts += 1;
        if self.fail_on_attempt == Some(attempt) {
            anyhow::bail!("simulated rejection of {} (attempt {})", what, attempt);
        }
        if self.revert_on_attempt == Some(attempt) {
            self.allocate_nonce(state);
            anyhow::bail!("{} reverted (attempt {})", what, attempt);
        }
        Ok(())
    }

    fn allocate_nonce(&self, state: &mut State) -> u64 {
        let nonce = state.next_nonce;
        state.next_nonce += 1;
        state.lag_remaining = self.confirmation_lag;
        nonce
    }

    fn pair_key(
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> (Address, Address, Address) {
        if token_a < token_b {
            (factory, token_a, token_b)
        } else {
            (factory, token_b, token_a)
        }
    }

    fn create_pair(&self, state: &mut State, factory: Address, input: &[u8]) -> Result<()> {
        let call = IQuackSwapFactory::createPairCall::abi_decode(input, true)?;
        if call.tokenA == call.tokenB {
            anyhow::bail!("QuackSwap: IDENTICAL_ADDRESSES");
        }
        let key = Self::pair_key(factory, call.tokenA, call.tokenB);
        if state.pairs.contains_key(&key) {
            anyhow::bail!("QuackSwap: PAIR_EXISTS");
        }

        let mut packed = Vec::with_capacity(40);
        packed.extend_from_slice(key.1.as_slice());
        packed.extend_from_slice(key.2.as_slice());
        let pair = factory.create2(keccak256(packed), self.pair_init_code_hash);
        state.pairs.insert(key, pair);
        Ok(())
    }
}

impl ChainClient for SimulatedChain {
    fn account(&self) -> Address {
        self.account
    }

    async fn transaction_count(&self, account: Address) -> Result<u64> {
        if account != self.account {
            return Ok(0);
        }
        let mut state = self.lock();
        if state.lag_remaining > 0 {
            state.lag_remaining -= 1;
        } else {
            state.confirmed_nonce = state.next_nonce;
        }
        Ok(state.confirmed_nonce)
    }

    async fn deploy(&self, contract: &str, args: &[ArgValue]) -> Result<Address> {
        let mut state = self.lock();
        self.admit(&mut state, contract)?;
        let nonce = self.allocate_nonce(&mut state);
        let address = self.account.create(nonce);
        state.submissions.push(Submission::Deploy {
            contract: contract.to_string(),
            address,
            args: args.to_vec(),
        });
        Ok(address)
    }

    async fn send(&self, call: &ContractCall) -> Result<TxHash> {
        let mut state = self.lock();
        self.admit(&mut state, &call.description)?;
        if call.selector() == IQuackSwapFactory::createPairCall::SELECTOR {
            self.create_pair(&mut state, call.to, &call.input)?;
        }
        let nonce = self.allocate_nonce(&mut state);
        state.submissions.push(Submission::Call(call.clone()));

        let mut preimage = self.account.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        Ok(keccak256(preimage))
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes> {
        let call = IQuackSwapFactory::getPairCall::abi_decode(&input, true)?;
        let pair = self
            .lock()
            .pairs
            .get(&Self::pair_key(to, call.tokenA, call.tokenB))
            .copied()
            .unwrap_or(Address::ZERO);
        Ok(IQuackSwapFactory::getPairCall::abi_encode_returns(&(pair,)).into())
    }

    async fn balance(&self, _account: Address) -> Result<U256> {
        Ok(U256::from(INITIAL_BALANCE_WEI))
    }
}
