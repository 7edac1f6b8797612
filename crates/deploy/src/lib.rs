//! dropship-deploy - Single-contract deployment library for EVM networks.
//!
//! This crate resolves a named network profile, provisions a signer from
//! stored credential material, submits one contract-creation transaction,
//! waits for its confirmation and reports a terminal [`DeploymentResult`].

mod artifact;
pub use artifact::ContractArtifact;

mod client;
pub use client::{HttpNetworkClient, NetworkClient, TransactionReceipt};

mod credential;
pub use credential::Credential;

mod error;
pub use error::{
    ArtifactError, ConfigError, CredentialError, DeployError, EncodingError, ErrorKind, RpcError,
};

mod orchestrator;
pub use orchestrator::{
    CancelHandle, CancelSignal, DEFAULT_TIMEOUT, DeploymentOrchestrator, DeploymentRequest,
    OrchestratorConfig, PendingDeployment, PollPolicy, RequestId, cancellation,
};

mod profile;
pub use profile::{
    CONFIG_FILENAME, DeployConfig, ENV_PREFIX, NetworkConfig, NetworkProfile, ProfileRegistry,
};

mod record;
pub use record::{DEFAULT_DEPLOYMENTS_DIR, DeploymentRecord};

mod report;
pub use report::{OutputFormat, Reporter, exit_code};

mod result;
pub use result::{DeploymentResult, DeploymentStatus, ErrorDetail};

mod retry;
pub use retry::RetryPolicy;

pub mod rpc;

mod signer;
pub use signer::{CreationTx, DeploySigner, SignedCreation, SignerProvisioner};
