//! Compiled contract artifacts.

use std::path::{Path, PathBuf};

use alloy_core::primitives::{B256, Bytes, keccak256};
use anyhow::{Context, Result};
use serde::Deserialize;

/// Name of the pair contract whose creation code hash the factory uses for CREATE2.
pub const PAIR_CONTRACT: &str = "QuackSwapPair";

/// Subset of a Hardhat artifact file.
#[derive(Debug, Deserialize)]
struct Artifact {
    #[serde(rename = "contractName", default)]
    contract_name: Option<String>,
    bytecode: String,
}

/// Directory of Hardhat artifacts, one `<Contract>.json` file per contract.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creation bytecode of `contract`.
    pub fn bytecode(&self, contract: &str) -> Result<Bytes> {
        let path = self.dir.join(format!("{contract}.json"));
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let artifact: Artifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        if let Some(name) = &artifact.contract_name {
            if name != contract {
                anyhow::bail!(
                    "Artifact {} describes {}, expected {}",
                    path.display(),
                    name,
                    contract
                );
            }
        }

        let code = hex::decode(artifact.bytecode.trim_start_matches("0x"))
            .with_context(|| format!("Invalid bytecode in {}", path.display()))?;
        if code.is_empty() {
            anyhow::bail!("Artifact {} has no bytecode (abstract contract?)", path.display());
        }
        Ok(code.into())
    }

    /// Keccak-256 of the creation bytecode of `contract`.
    ///
    /// For [`PAIR_CONTRACT`] this is the init code hash the factory and the fee
    /// collector use to derive pair addresses.
    pub fn init_code_hash(&self, contract: &str) -> Result<B256> {
        Ok(keccak256(self.bytecode(contract)?))
    }
}
