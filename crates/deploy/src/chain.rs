//! The chain collaborator as seen by the orchestrator.

use std::{fmt, future::Future};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, TxHash, U256},
    sol_types::SolCall,
};
use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// A literal constructor argument.
///
/// Addresses, words and plain strings are written as JSON strings. Integers are
/// written as `{"type": "BigNumber", "hex": ..}`, and a string that reads as an
/// address or a word as `{"type": "String", "value": ..}`, so every value reads
/// back as the variant it was written from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Address(Address),
    Bytes32(B256),
    Uint(U256),
    String(String),
}

impl ArgValue {
    /// Amount of a token with 18 decimals, from a whole-token count.
    pub fn token_amount(whole: u64) -> Self {
        Self::Uint(U256::from(whole) * U256::from(10u64).pow(U256::from(18u64)))
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(address) => Some(*address),
            _ => None,
        }
    }

    fn to_sol(&self) -> DynSolValue {
        match self {
            Self::Address(address) => DynSolValue::Address(*address),
            Self::Bytes32(word) => DynSolValue::FixedBytes(*word, 32),
            Self::Uint(value) => DynSolValue::Uint(*value, 256),
            Self::String(value) => DynSolValue::String(value.clone()),
        }
    }
}

/// Byte length of `text` when it is a `0x`-prefixed hex string.
fn hex_len(text: &str) -> Option<usize> {
    let digits = text.strip_prefix("0x")?;
    (digits.len() % 2 == 0 && digits.bytes().all(|b| b.is_ascii_hexdigit()))
        .then_some(digits.len() / 2)
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum TaggedArg {
    BigNumber { hex: U256 },
    String { value: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawArg {
    Text(String),
    Tagged(TaggedArg),
}

impl Serialize for ArgValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Address(address) => address.serialize(serializer),
            Self::Bytes32(word) => word.serialize(serializer),
            Self::String(value) if !matches!(hex_len(value), Some(20 | 32)) => {
                value.serialize(serializer)
            }
            Self::String(value) => TaggedArg::String {
                value: value.clone(),
            }
            .serialize(serializer),
            Self::Uint(value) => TaggedArg::BigNumber { hex: *value }.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawArg::deserialize(deserializer)? {
            RawArg::Text(text) => match hex_len(&text) {
                Some(20) => Self::Address(text.parse().map_err(de::Error::custom)?),
                Some(32) => Self::Bytes32(text.parse().map_err(de::Error::custom)?),
                _ => Self::String(text),
            },
            RawArg::Tagged(TaggedArg::BigNumber { hex }) => Self::Uint(hex),
            RawArg::Tagged(TaggedArg::String { value }) => Self::String(value),
        })
    }
}

impl From<Address> for ArgValue {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

impl From<u64> for ArgValue {
    fn from(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<B256> for ArgValue {
    fn from(word: B256) -> Self {
        Self::Bytes32(word)
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => write!(f, "{address}"),
            Self::Bytes32(word) => write!(f, "{word}"),
            Self::Uint(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value:?}"),
        }
    }
}

/// ABI-encode constructor arguments, to be appended to the creation bytecode.
pub fn encode_constructor_args(args: &[ArgValue]) -> Vec<u8> {
    if args.is_empty() {
        return Vec::new();
    }
    DynSolValue::Tuple(args.iter().map(ArgValue::to_sol).collect()).abi_encode_params()
}

/// A state-changing method call on a deployed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub input: Bytes,
    /// Human-readable name used in logs and errors, e.g. `MasterChef.addPools`.
    pub description: String,
}

impl ContractCall {
    pub fn new<C: SolCall>(to: Address, call: C, description: impl Into<String>) -> Self {
        Self {
            to,
            input: call.abi_encode().into(),
            description: description.into(),
        }
    }

    /// The 4-byte function selector of the call.
    pub fn selector(&self) -> [u8; 4] {
        let mut selector = [0u8; 4];
        let len = self.input.len().min(4);
        selector[..len].copy_from_slice(&self.input[..len]);
        selector
    }
}

/// The capabilities the orchestrator needs from the chain.
///
/// A submission fails when the chain rejects it or the transaction reverts. The
/// ordering of submissions is the job of [`crate::ConfirmationBarrier`], which
/// watches [`ChainClient::transaction_count`].
pub trait ChainClient: Send + Sync {
    /// The account all transactions are sent from.
    fn account(&self) -> Address;

    /// Number of confirmed transactions sent by `account`.
    fn transaction_count(&self, account: Address) -> impl Future<Output = Result<u64>> + Send;

    /// Deploy `contract` with the given constructor arguments and return its address.
    fn deploy(
        &self,
        contract: &str,
        args: &[ArgValue],
    ) -> impl Future<Output = Result<Address>> + Send;

    /// Submit a state-changing method call. A call that is mined but reverts is an error.
    fn send(&self, call: &ContractCall) -> impl Future<Output = Result<TxHash>> + Send;

    /// Execute a read-only call and return the raw output.
    fn call(&self, to: Address, input: Bytes) -> impl Future<Output = Result<Bytes>> + Send;

    /// Native balance of `account`, in wei.
    fn balance(&self, account: Address) -> impl Future<Output = Result<U256>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::IQuackSwapFactory;

    #[test]
    fn test_token_amount_scales_to_18_decimals() {
        assert_eq!(
            ArgValue::token_amount(3),
            ArgValue::Uint(U256::from(3_000_000_000_000_000_000u128))
        );
    }

    #[test]
    fn test_constructor_args_are_word_aligned() {
        assert!(encode_constructor_args(&[]).is_empty());

        let encoded = encode_constructor_args(&[Address::repeat_byte(0x11).into(), 7u64.into()]);
        assert_eq!(encoded.len(), 64);
        assert_eq!(&encoded[12..32], Address::repeat_byte(0x11).as_slice());
        assert_eq!(encoded[63], 7);
    }

    #[test]
    fn test_plain_serialization() {
        let args = vec![
            ArgValue::Address(Address::repeat_byte(0xaa)),
            ArgValue::String("QUACK".to_string()),
            ArgValue::from(100u64),
        ];
        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(
            json,
            r#"["0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa","QUACK",{"type":"BigNumber","hex":"0x64"}]"#
        );
        let back: Vec<ArgValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, args);
    }

    #[test]
    fn test_ambiguous_values_keep_their_variant() {
        let args = vec![
            ArgValue::String("2024".to_string()),
            ArgValue::String("0x64".to_string()),
            ArgValue::String(format!("0x{}", "11".repeat(20))),
            ArgValue::String(format!("0x{}", "22".repeat(32))),
            // 40 hex digits, the width of an address.
            ArgValue::Uint(U256::from(16u64).pow(U256::from(39u64))),
            // 64 hex digits, the width of a word.
            ArgValue::Uint(U256::MAX),
            ArgValue::Bytes32(B256::repeat_byte(0x22)),
        ];
        let json = serde_json::to_string(&args).unwrap();
        let back: Vec<ArgValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, args);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0], "2024");
        assert_eq!(value[2]["type"], "String");
    }

    #[test]
    fn test_hex_len() {
        assert_eq!(hex_len("0x"), Some(0));
        assert_eq!(hex_len("0xdead"), Some(2));
        assert_eq!(hex_len("0xabc"), None);
        assert_eq!(hex_len("dead"), None);
        assert_eq!(hex_len("0xzz"), None);
    }

    #[test]
    fn test_call_selector() {
        let call = ContractCall::new(
            Address::ZERO,
            IQuackSwapFactory::setFeeToCall {
                feeTo: Address::ZERO,
            },
            "QuackSwapFactory.setFeeTo",
        );
        assert_eq!(call.selector(), IQuackSwapFactory::setFeeToCall::SELECTOR);
    }
}
