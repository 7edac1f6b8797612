//! Terminal outcome of a deployment.

use alloy_core::primitives::{Address, B256};
use serde::{Deserialize, Serialize, Serializer};

use crate::{DeployError, ErrorKind};

/// Terminal state of a deployment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeploymentStatus {
    Succeeded,
    Failed,
    /// No receipt within the timeout. The transaction may still be mined.
    TimedOut,
    /// Stopped by the caller. Never cancels an already submitted transaction.
    Cancelled,
}

/// Classified, human-readable error attached to a non-successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&DeployError> for ErrorDetail {
    fn from(err: &DeployError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<DeployError> for ErrorDetail {
    fn from(err: DeployError) -> Self {
        Self::from(&err)
    }
}

/// The sole artifact a deployment returns to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub status: DeploymentStatus,
    pub network: String,
    /// Present iff the status is [`DeploymentStatus::Succeeded`].
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_checksummed"
    )]
    pub contract_address: Option<Address>,
    /// Absent when nothing was submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

fn serialize_checksummed<S: Serializer>(
    address: &Option<Address>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match address {
        Some(address) => serializer.serialize_str(&address.to_checksum(None)),
        None => serializer.serialize_none(),
    }
}

impl DeploymentResult {
    fn new(status: DeploymentStatus, network: impl Into<String>) -> Self {
        Self {
            status,
            network: network.into(),
            contract_address: None,
            transaction_hash: None,
            nonce: None,
            block_number: None,
            error: None,
        }
    }

    pub fn succeeded(
        network: impl Into<String>,
        contract_address: Address,
        transaction_hash: B256,
        block_number: u64,
    ) -> Self {
        Self {
            contract_address: Some(contract_address),
            transaction_hash: Some(transaction_hash),
            block_number: Some(block_number),
            ..Self::new(DeploymentStatus::Succeeded, network)
        }
    }

    /// A failure, with or without a submitted transaction.
    pub fn failed(network: impl Into<String>, error: impl Into<ErrorDetail>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(DeploymentStatus::Failed, network)
        }
    }

    pub fn timed_out(network: impl Into<String>, transaction_hash: B256, message: String) -> Self {
        Self {
            transaction_hash: Some(transaction_hash),
            error: Some(ErrorDetail::new(ErrorKind::TimedOut, message)),
            ..Self::new(DeploymentStatus::TimedOut, network)
        }
    }

    pub fn cancelled(network: impl Into<String>, transaction_hash: Option<B256>) -> Self {
        let message = match transaction_hash {
            Some(hash) => format!(
                "deployment cancelled while waiting for confirmation; transaction {} may still be mined",
                hash
            ),
            None => "deployment cancelled before submission".to_string(),
        };
        Self {
            transaction_hash,
            error: Some(ErrorDetail::new(ErrorKind::Cancelled, message)),
            ..Self::new(DeploymentStatus::Cancelled, network)
        }
    }

    /// Attach the transaction that this result refers to.
    pub fn with_transaction(mut self, hash: B256, nonce: u64) -> Self {
        self.transaction_hash = Some(hash);
        self.nonce = Some(nonce);
        self
    }

    pub fn with_block(mut self, block_number: u64) -> Self {
        self.block_number = Some(block_number);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == DeploymentStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::{address, b256};

    #[test]
    fn test_succeeded_json_is_checksummed() {
        let result = DeploymentResult::succeeded(
            "local",
            address!("5fbdb2315678afecb367f032d93f642f64180aa3"),
            b256!("0000000000000000000000000000000000000000000000000000000000000abc"),
            10,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "succeeded");
        assert_eq!(
            json["contract_address"],
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );
        assert_eq!(json["block_number"], 10);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failed_carries_error_detail() {
        let result = DeploymentResult::failed(
            "local",
            ErrorDetail::new(ErrorKind::ExecutionReverted, "execution reverted"),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "execution_reverted");
        assert!(json.get("contract_address").is_none());
        assert!(json.get("transaction_hash").is_none());
    }

    #[test]
    fn test_cancelled_messages() {
        let before = DeploymentResult::cancelled("local", None);
        assert!(before.error.unwrap().message.contains("before submission"));

        let hash = B256::repeat_byte(1);
        let during = DeploymentResult::cancelled("local", Some(hash));
        assert_eq!(during.transaction_hash, Some(hash));
        assert_eq!(during.status, DeploymentStatus::Cancelled);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(DeploymentStatus::TimedOut.to_string(), "timed_out");
    }
}
