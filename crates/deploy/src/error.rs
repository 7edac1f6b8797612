//! Error taxonomy for the deployment pipeline.
//!
//! Every error maps to a stable [`ErrorKind`], which is what ends up in a
//! [`DeploymentResult`](crate::DeploymentResult) and in the CLI output.

use serde::{Deserialize, Serialize};

/// Stable, machine-parseable classifier for a deployment error.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Config,
    NoDefaultProfile,
    UnknownProfile,
    IncompleteProfile,
    AmbiguousDefault,
    MalformedCredential,
    ChainMismatch,
    Artifact,
    Encoding,
    Network,
    InsufficientFunds,
    NonceTooLow,
    InvalidSignature,
    RpcRejected,
    ExecutionReverted,
    ContractNotDeployed,
    TimedOut,
    Cancelled,
}

/// Errors raised while loading or resolving network profiles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),
    #[error("no network selected and no profile is marked as the default network")]
    NoDefaultProfile,
    #[error("unknown network profile '{0}'")]
    UnknownProfile(String),
    #[error("network profile '{name}' is incomplete: {reason}")]
    IncompleteProfile { name: String, reason: String },
    #[error("more than one default network configured: {0}")]
    AmbiguousDefault(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Load(_) => ErrorKind::Config,
            Self::NoDefaultProfile => ErrorKind::NoDefaultProfile,
            Self::UnknownProfile(_) => ErrorKind::UnknownProfile,
            Self::IncompleteProfile { .. } => ErrorKind::IncompleteProfile,
            Self::AmbiguousDefault(_) => ErrorKind::AmbiguousDefault,
        }
    }
}

/// Errors raised while turning credential material into a signer.
///
/// Messages never include the credential itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("credential for network '{profile}' is malformed: {reason}")]
    Malformed { profile: String, reason: String },
    #[error("network '{profile}' is configured for chain {expected} but the endpoint reports chain {actual}")]
    ChainMismatch {
        profile: String,
        expected: u64,
        actual: u64,
    },
}

impl CredentialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed { .. } => ErrorKind::MalformedCredential,
            Self::ChainMismatch { .. } => ErrorKind::ChainMismatch,
        }
    }
}

/// The constructor arguments do not fit the contract's constructor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("constructor expects {expected} argument(s), got {got}")]
    ArgumentCount { expected: usize, got: usize },
    #[error("contract has no constructor but {got} argument(s) were given")]
    NoConstructor { got: usize },
    #[error("constructor argument #{index} ('{name}': {ty}) is invalid: {reason}")]
    InvalidArgument {
        index: usize,
        name: String,
        ty: String,
        reason: String,
    },
    #[error("failed to ABI-encode constructor arguments: {0}")]
    Abi(String),
}

/// The compiled contract artifact could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to read artifact {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("failed to parse artifact {path}: {reason}")]
    Parse { path: String, reason: String },
    #[error("artifact {path} has no deployable bytecode")]
    MissingBytecode { path: String },
}

/// A failed call against the network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// JSON-RPC code used by several providers for request-rate limiting.
const LIMIT_EXCEEDED_CODE: i64 = -32005;

impl RpcError {
    /// Whether retrying the same request can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Rpc { code, message, .. } => {
                let message = message.to_lowercase();
                *code == LIMIT_EXCEEDED_CODE
                    || message.contains("rate limit")
                    || message.contains("too many requests")
            }
            Self::InvalidResponse(_) => false,
        }
    }

    /// Whether the node already holds this exact transaction.
    pub fn is_already_known(&self) -> bool {
        matches!(
            self,
            Self::Rpc { message, .. } if message.to_lowercase().contains("already known")
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rpc { message, .. } if !self.is_transient() => {
                let message = message.to_lowercase();
                if message.contains("insufficient funds") {
                    ErrorKind::InsufficientFunds
                } else if message.contains("nonce too low") {
                    ErrorKind::NonceTooLow
                } else if message.contains("invalid signature")
                    || message.contains("invalid sender")
                {
                    ErrorKind::InvalidSignature
                } else {
                    ErrorKind::RpcRejected
                }
            }
            Self::Http { .. } if !self.is_transient() => ErrorKind::RpcRejected,
            _ => ErrorKind::Network,
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        // Endpoint URLs routinely embed provider API keys.
        let transient = err.is_timeout() || err.is_connect() || err.is_request();
        let err = err.without_url();
        if transient {
            Self::Transport(err.to_string())
        } else {
            Self::InvalidResponse(err.to_string())
        }
    }
}

/// Any error that stops a deployment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Network {
        operation: String,
        attempts: usize,
        #[source]
        source: RpcError,
    },
    #[error("{operation} rejected: {source}")]
    Rpc {
        operation: String,
        #[source]
        source: RpcError,
    },
    #[error("failed to sign transaction: {0}")]
    Signing(String),
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(e) => e.kind(),
            Self::Credential(e) => e.kind(),
            Self::Artifact(_) => ErrorKind::Artifact,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::Network { .. } => ErrorKind::Network,
            Self::Rpc { source, .. } => source.kind(),
            Self::Signing(_) => ErrorKind::InvalidSignature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc(code: i64, message: &str) -> RpcError {
        RpcError::Rpc {
            code,
            message: message.to_string(),
            data: None,
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(RpcError::Transport("connection reset by peer".into()).is_transient());
        assert!(RpcError::Http { status: 429, body: String::new() }.is_transient());
        assert!(RpcError::Http { status: 503, body: String::new() }.is_transient());
        assert!(rpc(-32005, "limit exceeded").is_transient());
        assert!(rpc(-32000, "Too Many Requests").is_transient());

        assert!(!RpcError::Http { status: 401, body: String::new() }.is_transient());
        assert!(!rpc(-32000, "insufficient funds for gas * price + value").is_transient());
        assert!(!rpc(-32000, "nonce too low").is_transient());
        assert!(!RpcError::InvalidResponse("garbage".into()).is_transient());
    }

    #[test]
    fn test_rpc_error_kinds() {
        assert_eq!(
            rpc(-32000, "insufficient funds for gas * price + value").kind(),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(rpc(-32000, "nonce too low: next nonce 5").kind(), ErrorKind::NonceTooLow);
        assert_eq!(rpc(-32000, "invalid sender").kind(), ErrorKind::InvalidSignature);
        assert_eq!(rpc(-32602, "invalid params").kind(), ErrorKind::RpcRejected);
        assert_eq!(rpc(-32005, "rate limit reached").kind(), ErrorKind::Network);
        assert_eq!(RpcError::Transport("reset".into()).kind(), ErrorKind::Network);
        assert_eq!(
            RpcError::Http { status: 401, body: String::new() }.kind(),
            ErrorKind::RpcRejected
        );
    }

    #[test]
    fn test_already_known() {
        assert!(rpc(-32000, "already known").is_already_known());
        assert!(!rpc(-32000, "nonce too low").is_already_known());
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::ExecutionReverted.to_string(), "execution_reverted");
        assert_eq!(ErrorKind::NoDefaultProfile.to_string(), "no_default_profile");
        assert_eq!(
            serde_json::to_string(&ErrorKind::TimedOut).unwrap(),
            "\"timed_out\""
        );
    }

    #[test]
    fn test_deploy_error_kind() {
        let err = DeployError::from(ConfigError::UnknownProfile("nope".into()));
        assert_eq!(err.kind(), ErrorKind::UnknownProfile);

        let err = DeployError::Network {
            operation: "eth_sendRawTransaction".into(),
            attempts: 4,
            source: RpcError::Transport("reset".into()),
        };
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.to_string().contains("4 attempt(s)"));
    }
}
