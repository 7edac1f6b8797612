//! Persisted records of successful deployments.

use std::path::{Path, PathBuf};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256},
};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractArtifact, DeploymentRequest, DeploymentResult};

/// The default directory deployment records are written under.
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "deployments";

/// What was deployed where, written as
/// `<deployments_dir>/<network>/<contract>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract_name: String,
    pub network: String,
    pub chain_id: u64,
    pub address: Address,
    pub transaction_hash: B256,
    pub block_number: u64,
    pub args: Vec<String>,
    pub abi: JsonAbi,
    pub deployed_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Build a record from a successful result. Returns `None` otherwise.
    pub fn from_result(
        request: &DeploymentRequest,
        result: &DeploymentResult,
        chain_id: u64,
    ) -> Option<Self> {
        if !result.is_success() {
            return None;
        }
        Some(Self {
            contract_name: request.artifact.name.clone(),
            network: result.network.clone(),
            chain_id,
            address: result.contract_address?,
            transaction_hash: result.transaction_hash?,
            block_number: result.block_number?,
            args: request.constructor_args.clone(),
            abi: request.artifact.abi.clone(),
            deployed_at: Utc::now(),
        })
    }

    /// Path of the record for `artifact` on `network` below `dir`.
    ///
    /// Fails for names that would escape `dir`.
    pub fn path_for(dir: &Path, network: &str, artifact: &ContractArtifact) -> Result<PathBuf> {
        record_path(dir, network, &artifact.name)
    }

    /// Write the record below `dir`, replacing any previous record.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = record_path(dir, &self.network, &self.contract_name)?;
        if let Some(network_dir) = path.parent() {
            std::fs::create_dir_all(network_dir)
                .with_context(|| format!("Failed to create {}", network_dir.display()))?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment record")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write deployment record to {}", path.display()))?;

        tracing::info!(path = %path.display(), address = %self.address, "Deployment record saved");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse deployment record")
    }
}

fn record_path(dir: &Path, network: &str, contract: &str) -> Result<PathBuf> {
    ensure_component("network name", network)?;
    ensure_component("contract name", contract)?;
    Ok(dir.join(network).join(format!("{}.json", contract)))
}

/// A single, non-traversing path component.
fn ensure_component(what: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || value.contains('\0')
    {
        bail!("{} '{}' cannot be used as a deployment record path", what, value);
    }
    Ok(())
}
