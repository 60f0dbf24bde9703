//! Record of every contract deployed during a run.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use derive_more::Deref;
use serde::{Deserialize, Serialize};

use crate::{chain::ArgValue, config::Network, error::DeployError};

/// One confirmed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub contract: String,
    pub address: Address,
    pub args: Vec<ArgValue>,
}

/// Append-only list of deployments, in the order they were confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger(Vec<DeploymentRecord>);

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: DeploymentRecord) {
        self.0.push(entry);
    }

    /// Address of the most recent deployment of `contract`.
    pub fn address_of(&self, contract: &str) -> Option<Address> {
        self.0
            .iter()
            .rev()
            .find(|record| record.contract == contract)
            .map(|record| record.address)
    }

    pub fn records(&self) -> &[DeploymentRecord] {
        &self.0
    }

    /// Path of the address file for `network` inside `dir`.
    pub fn path_for(dir: &Path, network: &Network) -> PathBuf {
        dir.join(format!("{network}.json"))
    }

    /// Path of the address file written for an aborted run.
    pub fn partial_path_for(dir: &Path, network: &Network) -> PathBuf {
        dir.join(format!("{network}.partial.json"))
    }

    /// Write the ledger to `<dir>/<network>.json`, replacing any previous file.
    pub fn persist(&self, dir: &Path, network: &Network) -> Result<PathBuf, DeployError> {
        let path = Self::path_for(dir, network);
        self.write_atomically(&path)?;
        tracing::info!(path = %path.display(), contracts = self.len(), "Recorded contract addresses");
        Ok(path)
    }

    /// Write the ledger of an aborted run to `<dir>/<network>.partial.json`,
    /// leaving the address file of the last complete run untouched.
    pub fn persist_partial(&self, dir: &Path, network: &Network) -> Result<PathBuf, DeployError> {
        let path = Self::partial_path_for(dir, network);
        self.write_atomically(&path)?;
        tracing::warn!(path = %path.display(), contracts = self.len(), "Recorded partial deployment");
        Ok(path)
    }

    /// Load a ledger written by [`Ledger::persist`].
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Write to a temporary sibling, then rename over `path`, so a crash mid-write
    /// leaves the previous file intact.
    fn write_atomically(&self, path: &Path) -> Result<(), DeployError> {
        let persist_err = |source| DeployError::Persist {
            path: path.to_path_buf(),
            source,
        };

        let json = serde_json::to_vec_pretty(self).map_err(|e| persist_err(e.into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(persist_err)?;
        }

        let tmp = path.with_extension("json.tmp");
        let written = std::fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(&json)?;
            file.write_all(b"\n")?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| std::fs::rename(&tmp, path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(persist_err(e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn record(contract: &str, byte: u8) -> DeploymentRecord {
        DeploymentRecord {
            contract: contract.to_string(),
            address: Address::repeat_byte(byte),
            args: vec![ArgValue::from(Address::repeat_byte(0xde)), ArgValue::from(100u64)],
        }
    }

    fn network() -> Network {
        "bttc-testnet".parse().unwrap()
    }

    #[test]
    fn test_record_keeps_order() {
        let mut ledger = Ledger::new();
        ledger.record(record("QUACK", 1));
        ledger.record(record("QuackSwapFactory", 2));

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].contract, "QUACK");
        assert_eq!(ledger.address_of("QuackSwapFactory"), Some(Address::repeat_byte(2)));
        assert_eq!(ledger.address_of("MasterChef"), None);
    }

    #[test]
    fn test_persist_overwrites_without_leftovers() {
        let tmp = TempDir::new("addresses").unwrap();
        let dir = tmp.path().join("addresses");

        let mut ledger = Ledger::new();
        ledger.record(record("QUACK", 1));
        let path = ledger.persist(&dir, &network()).unwrap();
        assert_eq!(path, dir.join("bttc-testnet.json"));

        ledger.record(record("MasterChef", 3));
        ledger.persist(&dir, &network()).unwrap();

        assert_eq!(Ledger::load(&path).unwrap(), ledger);
        let entries: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("bttc-testnet.json")]);
    }

    #[test]
    fn test_persisted_format() {
        let tmp = TempDir::new("addresses").unwrap();
        let mut ledger = Ledger::new();
        ledger.record(record("DummyERC20", 9));
        let path = ledger.persist(tmp.path(), &network()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{
                "contract": "DummyERC20",
                "address": "0x0909090909090909090909090909090909090909",
                "args": [
                    "0xdededededededededededededededededededede",
                    {"type": "BigNumber", "hex": "0x64"},
                ],
            }])
        );
    }

    #[test]
    fn test_load_keeps_argument_types() {
        let tmp = TempDir::new("addresses").unwrap();
        let mut ledger = Ledger::new();
        ledger.record(DeploymentRecord {
            contract: "DummyERC20".to_string(),
            address: Address::repeat_byte(4),
            args: vec![
                ArgValue::from("2024"),
                ArgValue::from("7"),
                ArgValue::from(Address::repeat_byte(0xde)),
                ArgValue::from(2024u64),
            ],
        });
        let path = ledger.persist(tmp.path(), &network()).unwrap();

        let loaded = Ledger::load(&path).unwrap();
        assert_eq!(loaded, ledger);
        assert_eq!(loaded[0].args[0], ArgValue::String("2024".to_string()));
    }

    #[test]
    fn test_partial_persist_keeps_complete_record() {
        let tmp = TempDir::new("addresses").unwrap();
        let mut complete = Ledger::new();
        complete.record(record("QUACK", 1));
        complete.record(record("MasterChef", 2));
        let complete_path = complete.persist(tmp.path(), &network()).unwrap();

        let mut partial = Ledger::new();
        partial.record(record("QUACK", 7));
        let partial_path = partial.persist_partial(tmp.path(), &network()).unwrap();

        assert_ne!(partial_path, complete_path);
        assert_eq!(Ledger::load(&complete_path).unwrap(), complete);
        assert_eq!(Ledger::load(&partial_path).unwrap(), partial);
    }
}
