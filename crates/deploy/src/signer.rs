//! Signer provisioning from stored credential material.

use std::fmt;

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};

use crate::{
    CredentialError, DeployError, NetworkClient, NetworkProfile, RetryPolicy,
    credential::KeyMaterial,
};

/// Parameters of a contract-creation transaction, before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationTx {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub input: Bytes,
}

/// A signed contract-creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCreation {
    pub nonce: u64,
    pub hash: B256,
    /// EIP-2718 encoded bytes, ready for `eth_sendRawTransaction`.
    pub raw: Bytes,
}

/// A signing key bound to one network profile and chain id.
///
/// Neither `Debug` nor `Display` reveal key material.
#[derive(Clone)]
pub struct DeploySigner {
    profile: String,
    chain_id: u64,
    inner: PrivateKeySigner,
}

impl fmt::Debug for DeploySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploySigner")
            .field("profile", &self.profile)
            .field("address", &self.address())
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

impl fmt::Display for DeploySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on chain {}", self.address(), self.chain_id)
    }
}

impl DeploySigner {
    pub fn new(profile: impl Into<String>, inner: PrivateKeySigner, chain_id: u64) -> Self {
        Self {
            profile: profile.into(),
            chain_id,
            inner,
        }
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Sign an EIP-155 legacy contract-creation transaction.
    pub fn sign_creation(&self, tx: CreationTx) -> Result<SignedCreation, DeployError> {
        let nonce = tx.nonce;
        let unsigned = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            to: TxKind::Create,
            value: U256::ZERO,
            input: tx.input,
        };

        let signature = self
            .inner
            .sign_hash_sync(&unsigned.signature_hash())
            .map_err(|e| DeployError::Signing(e.to_string()))?;

        let envelope = TxEnvelope::from(unsigned.into_signed(signature));
        Ok(SignedCreation {
            nonce,
            hash: *envelope.tx_hash(),
            raw: envelope.encoded_2718().into(),
        })
    }
}

/// Turns a profile's credential into a [`DeploySigner`].
#[derive(Debug, Clone, Default)]
pub struct SignerProvisioner {
    retry: RetryPolicy,
}

impl SignerProvisioner {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Resolve the profile credential and bind it to the network's chain id.
    ///
    /// Fails with [`CredentialError::ChainMismatch`] when the profile pins a
    /// chain id that differs from the one the endpoint reports.
    pub async fn provision<C: NetworkClient>(
        &self,
        profile: &NetworkProfile,
        client: &C,
    ) -> Result<DeploySigner, DeployError> {
        let inner = Self::key_from_credential(profile)?;

        let actual = self.retry.run("eth_chainId", || client.chain_id()).await?;
        if let Some(expected) = profile.chain_id {
            if expected != actual {
                return Err(CredentialError::ChainMismatch {
                    profile: profile.name.clone(),
                    expected,
                    actual,
                }
                .into());
            }
        }

        let signer = DeploySigner::new(&profile.name, inner, actual);
        tracing::info!(
            network = %profile.name,
            address = %signer.address(),
            chain_id = actual,
            "Signer provisioned"
        );
        Ok(signer)
    }

    fn key_from_credential(profile: &NetworkProfile) -> Result<PrivateKeySigner, CredentialError> {
        let malformed = |reason: String| CredentialError::Malformed {
            profile: profile.name.clone(),
            reason,
        };

        match profile.credential.resolve().map_err(malformed)? {
            KeyMaterial::PrivateKey(key) => PrivateKeySigner::from_bytes(&key)
                .map_err(|_| malformed("not a valid secp256k1 private key".to_string())),
            KeyMaterial::Mnemonic { phrase, index } => MnemonicBuilder::<English>::default()
                .phrase(phrase)
                .index(index)
                .and_then(|builder| builder.build())
                .map_err(|_| malformed("invalid mnemonic phrase or derivation index".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Credential;
    use alloy_consensus::transaction::SignerRecoverable;
    use alloy_eips::eip2718::Decodable2718;
    use url::Url;

    /// First default Anvil/Hardhat account.
    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const MNEMONIC: &str = "test test test test test test test test test test test junk";

    fn profile(credential: &str, chain_id: Option<u64>) -> NetworkProfile {
        NetworkProfile {
            name: "local".to_string(),
            rpc_url: Url::parse("http://127.0.0.1:8545").unwrap(),
            chain_id,
            credential: Credential::new(credential),
            gas_price_override: None,
            gas_limit: None,
            gas_multiplier: None,
            default_network: true,
            live: false,
            save_deployments: false,
        }
    }

    #[test]
    fn test_key_from_hex_credential() {
        let signer = SignerProvisioner::key_from_credential(&profile(KEY, None)).unwrap();
        assert_eq!(signer.address().to_string(), ADDRESS);
    }

    #[test]
    fn test_key_from_mnemonic_credential() {
        let credential = format!("mnemonic:{}", MNEMONIC);
        let signer = SignerProvisioner::key_from_credential(&profile(&credential, None)).unwrap();
        assert_eq!(signer.address().to_string(), ADDRESS);

        let credential = format!("mnemonic:{}#1", MNEMONIC);
        let second = SignerProvisioner::key_from_credential(&profile(&credential, None)).unwrap();
        assert_eq!(
            second.address().to_string(),
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
        );
    }

    #[test]
    fn test_malformed_credential() {
        let err = SignerProvisioner::key_from_credential(&profile("k1", None)).unwrap_err();
        assert!(matches!(err, CredentialError::Malformed { .. }));

        let zero = format!("0x{}", "00".repeat(32));
        let err = SignerProvisioner::key_from_credential(&profile(&zero, None)).unwrap_err();
        assert!(matches!(err, CredentialError::Malformed { .. }));
    }

    #[test]
    fn test_signer_display_hides_key() {
        let inner = SignerProvisioner::key_from_credential(&profile(KEY, None)).unwrap();
        let signer = DeploySigner::new("local", inner, 31337);
        let key_hex = KEY.trim_start_matches("0x");

        let debug = format!("{:?}", signer);
        let display = signer.to_string();
        assert!(!debug.contains(key_hex));
        assert!(!display.contains(key_hex));
        assert_eq!(display, format!("{} on chain 31337", ADDRESS));
    }

    #[test]
    fn test_sign_creation_recovers_sender() {
        let inner = SignerProvisioner::key_from_credential(&profile(KEY, None)).unwrap();
        let signer = DeploySigner::new("local", inner, 31337);

        let signed = signer
            .sign_creation(CreationTx {
                nonce: 7,
                gas_price: 1_000_000_000,
                gas_limit: 500_000,
                input: Bytes::from_static(&[0x60, 0x80]),
            })
            .unwrap();

        let decoded = TxEnvelope::decode_2718(&mut signed.raw.as_ref()).unwrap();
        assert_eq!(*decoded.tx_hash(), signed.hash);
        assert_eq!(decoded.recover_signer().unwrap(), signer.address());
        assert_eq!(signed.nonce, 7);
    }
}
