//! Builds, submits and confirms a single contract-creation transaction.
//!
//! A deployment moves through `Building -> Submitted -> Confirming` and ends
//! in exactly one [`DeploymentStatus`](crate::DeploymentStatus). Nothing is ever resubmitted once a
//! transaction has been broadcast.
//!
//! Concurrent deployments sharing an orchestrator (or any of its clones)
//! serialize gas/nonce selection and submission per `(profile, signer)`, so
//! they never pick the same nonce. Confirmation polling runs in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use backon::{BackoffBuilder, ExponentialBuilder};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::{
    ContractArtifact, DeployError, DeploySigner, DeploymentResult, ErrorDetail, ErrorKind,
    NetworkClient, NetworkProfile, RetryPolicy,
    signer::{CreationTx, SignedCreation},
};

/// Default time to wait for confirmation after submission.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything needed for one deployment. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub artifact: ContractArtifact,
    pub constructor_args: Vec<String>,
    pub profile: NetworkProfile,
    /// Blocks, counting the inclusion block. Always at least 1.
    pub confirmations: u64,
    pub timeout: Duration,
}

impl DeploymentRequest {
    pub fn new(artifact: ContractArtifact, profile: NetworkProfile) -> Self {
        Self {
            artifact,
            constructor_args: Vec::new(),
            profile,
            confirmations: 1,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.constructor_args = args;
        self
    }

    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Identifier of one deployment attempt, used to correlate log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub struct RequestId(String);

impl RequestId {
    fn generate() -> Self {
        Self(format!("{:016x}", rand::random::<u64>()))
    }
}

/// A broadcast transaction awaiting its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeployment {
    pub request_id: RequestId,
    pub transaction_hash: B256,
    pub nonce: u64,
    pub submitted_at: DateTime<Utc>,
}

/// Create a linked cancellation handle and signal.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(Arc::new(tx)), CancelSignal(rx))
}

/// Requests cancellation of the deployments holding the paired [`CancelSignal`].
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Observed by the orchestrator between suspension points.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// A signal that is never triggered.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation has been requested.
    async fn cancelled(&mut self) {
        if self.0.wait_for(|cancelled| *cancelled).await.is_err() {
            // Handle dropped without cancelling.
            std::future::pending::<()>().await;
        }
    }
}

/// Receipt polling schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
        }
    }
}

impl PollPolicy {
    fn schedule(&self) -> impl Iterator<Item = Duration> + Send {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_interval)
            .with_max_delay(self.max_interval)
            .without_max_times()
            .build()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    pub poll: PollPolicy,
}

/// Nonce bookkeeping for one `(profile, signer)` pair.
#[derive(Debug, Default)]
struct NonceSlot {
    last_used: Option<u64>,
}

type SubmissionKey = (String, Address);

#[derive(Debug, Default)]
struct SubmissionLocks {
    slots: Mutex<HashMap<SubmissionKey, Arc<tokio::sync::Mutex<NonceSlot>>>>,
}

impl SubmissionLocks {
    fn slot(&self, key: SubmissionKey) -> Arc<tokio::sync::Mutex<NonceSlot>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key).or_default().clone()
    }
}

/// Why confirmation polling stopped without a receipt verdict.
enum Wait {
    Receipt(crate::TransactionReceipt),
    TimedOut,
    Cancelled,
}

/// Deploys one contract per [`deploy`](Self::deploy) call.
#[derive(Debug)]
pub struct DeploymentOrchestrator<C> {
    client: Arc<C>,
    config: OrchestratorConfig,
    locks: Arc<SubmissionLocks>,
}

impl<C> Clone for DeploymentOrchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            config: self.config,
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<C: NetworkClient> DeploymentOrchestrator<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self::with_config(client, OrchestratorConfig::default())
    }

    pub fn with_config(client: Arc<C>, config: OrchestratorConfig) -> Self {
        Self {
            client,
            config,
            locks: Arc::default(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run one deployment to a terminal result.
    ///
    /// Never panics on network or input errors; every outcome is a
    /// [`DeploymentResult`].
    pub async fn deploy(
        &self,
        request: &DeploymentRequest,
        signer: &DeploySigner,
        mut cancel: CancelSignal,
    ) -> DeploymentResult {
        let network = request.profile.name.as_str();
        let request_id = RequestId::generate();

        tracing::info!(
            %request_id,
            network,
            contract = %request.artifact.name,
            deployer = %signer.address(),
            state = "building",
            "Deploying contract..."
        );

        let input = match request.artifact.encode_deployment(&request.constructor_args) {
            Ok(input) => input,
            Err(e) => {
                tracing::error!(%request_id, error = %e, "Failed to encode creation payload");
                return DeploymentResult::failed(network, DeployError::from(e));
            }
        };

        if cancel.is_cancelled() {
            return DeploymentResult::cancelled(network, None);
        }

        let pending = match self
            .submit(request, signer, input, request_id.clone(), &mut cancel)
            .await
        {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                tracing::warn!(%request_id, network, "Deployment cancelled before submission");
                return DeploymentResult::cancelled(network, None);
            }
            Err(e) => {
                tracing::error!(%request_id, network, error = %e, "Submission failed");
                return DeploymentResult::failed(network, e);
            }
        };

        tracing::info!(
            %request_id,
            network,
            tx_hash = %pending.transaction_hash,
            nonce = pending.nonce,
            confirmations = request.confirmations,
            state = "confirming",
            "Waiting for confirmation..."
        );

        let started = Instant::now();
        let result = match self.wait(&pending, request, started, &mut cancel).await {
            Wait::Receipt(receipt) => self.settle(network, &pending, receipt, &mut cancel).await,
            Wait::TimedOut => DeploymentResult::timed_out(
                network,
                pending.transaction_hash,
                format!(
                    "transaction {} was not confirmed within {:?}; it may still be mined, check it before redeploying",
                    pending.transaction_hash, request.timeout
                ),
            ),
            Wait::Cancelled => DeploymentResult::cancelled(network, Some(pending.transaction_hash)),
        };
        let result = DeploymentResult {
            nonce: Some(pending.nonce),
            ..result
        };

        tracing::info!(
            %request_id,
            network,
            status = %result.status,
            tx_hash = %pending.transaction_hash,
            address = ?result.contract_address,
            "Deployment finished"
        );
        result
    }

    /// Choose gas and nonce, sign and broadcast under the submission lock.
    ///
    /// Returns `Ok(None)` if cancelled before anything was broadcast.
    async fn submit(
        &self,
        request: &DeploymentRequest,
        signer: &DeploySigner,
        input: Bytes,
        request_id: RequestId,
        cancel: &mut CancelSignal,
    ) -> Result<Option<PendingDeployment>, DeployError> {
        let slot = self
            .locks
            .slot((request.profile.name.clone(), signer.address()));

        let mut slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            guard = slot.lock_owned() => guard,
        };

        let signed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            signed = self.prepare(&request.profile, signer, input, slot.last_used) => signed?,
        };

        // Last point at which cancelling has no on-chain effect.
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let transaction_hash = self.broadcast(&signed).await?;
        slot.last_used = Some(signed.nonce);
        drop(slot);

        tracing::info!(
            %request_id,
            network = %request.profile.name,
            tx_hash = %transaction_hash,
            nonce = signed.nonce,
            state = "submitted",
            "Transaction submitted"
        );

        Ok(Some(PendingDeployment {
            request_id,
            transaction_hash,
            nonce: signed.nonce,
            submitted_at: Utc::now(),
        }))
    }

    async fn prepare(
        &self,
        profile: &NetworkProfile,
        signer: &DeploySigner,
        input: Bytes,
        last_used: Option<u64>,
    ) -> Result<SignedCreation, DeployError> {
        let retry = &self.config.retry;
        let client = self.client.as_ref();
        let from = signer.address();

        let gas_price = match profile.gas_price_override {
            Some(price) => price,
            None => retry.run("eth_gasPrice", || client.gas_price()).await?,
        };

        let gas_limit = match profile.gas_limit {
            Some(limit) => limit,
            None => {
                let estimate = retry
                    .run("eth_estimateGas", || client.estimate_gas(from, input.clone()))
                    .await?;
                apply_multiplier(estimate, profile.gas_multiplier)
            }
        };

        let pending_nonce = retry
            .run("eth_getTransactionCount", || client.pending_nonce(from))
            .await?;
        let nonce = match last_used {
            Some(last) if last >= pending_nonce => last + 1,
            _ => pending_nonce,
        };

        tracing::debug!(
            network = %profile.name,
            gas_price,
            gas_limit,
            pending_nonce,
            nonce,
            "Transaction parameters selected"
        );

        signer.sign_creation(CreationTx {
            nonce,
            gas_price,
            gas_limit,
            input,
        })
    }

    async fn broadcast(&self, signed: &SignedCreation) -> Result<B256, DeployError> {
        let client = self.client.as_ref();

        let hash = self
            .config
            .retry
            .run("eth_sendRawTransaction", || async {
                match client.send_raw_transaction(signed.raw.clone()).await {
                    // An earlier attempt reached the node before the connection dropped.
                    Err(e) if e.is_already_known() => Ok(signed.hash),
                    other => other,
                }
            })
            .await?;

        if hash != signed.hash {
            tracing::warn!(
                expected = %signed.hash,
                reported = %hash,
                "Endpoint reported an unexpected transaction hash"
            );
        }
        Ok(hash)
    }

    /// Poll for a receipt with enough confirmations, a timeout, or a cancel.
    ///
    /// Every network call races the deadline and the cancel signal, so a
    /// hung endpoint never delays either outcome.
    async fn wait(
        &self,
        pending: &PendingDeployment,
        request: &DeploymentRequest,
        started: Instant,
        cancel: &mut CancelSignal,
    ) -> Wait {
        let deadline = started + request.timeout;
        let mut schedule = self.config.poll.schedule();
        let mut polls = 0u64;

        loop {
            polls += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Wait::Cancelled,
                outcome = self.poll_once(pending, request.confirmations) => outcome,
                _ = tokio::time::sleep_until(deadline) => {
                    return Self::timed_out(pending, request, polls);
                }
            };
            if let Some(receipt) = outcome {
                return Wait::Receipt(receipt);
            }

            let now = Instant::now();
            if now >= deadline {
                return Self::timed_out(pending, request, polls);
            }

            let delay = schedule
                .next()
                .unwrap_or(self.config.poll.max_interval)
                .min(deadline - now);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Wait::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One receipt query. Returns the receipt once it is final.
    async fn poll_once(
        &self,
        pending: &PendingDeployment,
        confirmations: u64,
    ) -> Option<crate::TransactionReceipt> {
        match self.client.transaction_receipt(pending.transaction_hash).await {
            Ok(Some(receipt)) => {
                if !receipt.success || self.is_confirmed(&receipt, confirmations).await {
                    return Some(receipt);
                }
                tracing::debug!(
                    tx_hash = %pending.transaction_hash,
                    block = receipt.block_number,
                    "Included, waiting for more confirmations"
                );
            }
            Ok(None) => {
                tracing::trace!(tx_hash = %pending.transaction_hash, "No receipt yet");
            }
            Err(e) => {
                tracing::warn!(
                    tx_hash = %pending.transaction_hash,
                    error = %e,
                    "Receipt query failed, will retry"
                );
            }
        }
        None
    }

    fn timed_out(pending: &PendingDeployment, request: &DeploymentRequest, polls: u64) -> Wait {
        tracing::warn!(
            tx_hash = %pending.transaction_hash,
            polls,
            timeout = ?request.timeout,
            "Timed out waiting for confirmation"
        );
        Wait::TimedOut
    }

    async fn is_confirmed(&self, receipt: &crate::TransactionReceipt, confirmations: u64) -> bool {
        if confirmations <= 1 {
            return true;
        }
        match self.client.block_number().await {
            Ok(head) => head >= receipt.block_number.saturating_add(confirmations - 1),
            Err(e) => {
                tracing::warn!(error = %e, "Block number query failed, will retry");
                false
            }
        }
    }

    /// Turn a final receipt into a result.
    async fn settle(
        &self,
        network: &str,
        pending: &PendingDeployment,
        receipt: crate::TransactionReceipt,
        cancel: &mut CancelSignal,
    ) -> DeploymentResult {
        let hash = pending.transaction_hash;

        if !receipt.success {
            // Best effort: the revert itself is already final.
            let lookup = tokio::select! {
                biased;
                _ = cancel.cancelled() => Ok(None),
                reason = self.client.revert_reason(hash, receipt.block_number) => reason,
            };
            let reason = match lookup {
                Ok(reason) => reason,
                Err(e) => {
                    tracing::debug!(error = %e, "Failed to recover revert reason");
                    None
                }
            };
            let message = match reason {
                Some(reason) => format!("execution reverted: {}", reason),
                None => "execution reverted".to_string(),
            };
            return DeploymentResult::failed(
                network,
                ErrorDetail::new(ErrorKind::ExecutionReverted, message),
            )
            .with_transaction(hash, pending.nonce)
            .with_block(receipt.block_number);
        }

        match receipt.contract_address {
            Some(address) => {
                DeploymentResult::succeeded(network, address, hash, receipt.block_number)
            }
            None => DeploymentResult::failed(
                network,
                ErrorDetail::new(
                    ErrorKind::ContractNotDeployed,
                    "receipt reports success but no contract address",
                ),
            )
            .with_transaction(hash, pending.nonce)
            .with_block(receipt.block_number),
        }
    }
}

fn apply_multiplier(estimate: u64, multiplier: Option<f64>) -> u64 {
    match multiplier {
        Some(multiplier) => (estimate as f64 * multiplier).ceil() as u64,
        None => estimate,
    }
}
