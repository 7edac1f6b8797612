//! Opaque credential references.
//!
//! A [`Credential`] is only ever resolved inside the signer provisioner. It
//! has no `Serialize` impl and its `Debug` output is redacted.

use std::fmt;
use std::path::PathBuf;

use alloy_core::primitives::B256;
use serde::Deserialize;

const ENV_PREFIX: &str = "env:";
const FILE_PREFIX: &str = "file:";
const MNEMONIC_PREFIX: &str = "mnemonic:";

/// Reference to signing material for a network profile.
///
/// Accepted forms:
/// - a 32-byte private key as hex, with or without `0x`
/// - `mnemonic:<phrase>` or `mnemonic:<phrase>#<index>`
/// - `env:<VAR>`, read from the environment at provisioning time
/// - `file:<path>`, whose trimmed content is one of the literal forms above
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Parsed secret material, ready to become a signer.
pub(crate) enum KeyMaterial {
    PrivateKey(B256),
    Mnemonic { phrase: String, index: u32 },
}

impl Credential {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Resolve the reference into key material.
    ///
    /// The error string describes the problem without echoing the secret.
    pub(crate) fn resolve(&self) -> Result<KeyMaterial, String> {
        let reference = self.0.trim();

        if let Some(var) = reference.strip_prefix(ENV_PREFIX) {
            let value = std::env::var(var)
                .map_err(|_| format!("environment variable {} is not set", var))?;
            return parse_literal(value.trim());
        }

        if let Some(path) = reference.strip_prefix(FILE_PREFIX) {
            let path = PathBuf::from(path);
            let value = std::fs::read_to_string(&path)
                .map_err(|e| format!("failed to read {}: {}", path.display(), e.kind()))?;
            return parse_literal(value.trim());
        }

        parse_literal(reference)
    }
}

fn parse_literal(value: &str) -> Result<KeyMaterial, String> {
    if value.is_empty() {
        return Err("credential is empty".to_string());
    }

    if value.starts_with(ENV_PREFIX) || value.starts_with(FILE_PREFIX) {
        return Err("nested credential references are not supported".to_string());
    }

    if let Some(rest) = value.strip_prefix(MNEMONIC_PREFIX) {
        let (phrase, index) = match rest.rsplit_once('#') {
            Some((phrase, index)) => {
                let index = index
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| "mnemonic account index must be a non-negative integer")?;
                (phrase, index)
            }
            None => (rest, 0),
        };
        let phrase = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        if phrase.is_empty() {
            return Err("mnemonic phrase is empty".to_string());
        }
        return Ok(KeyMaterial::Mnemonic { phrase, index });
    }

    let hex_key = value.strip_prefix("0x").unwrap_or(value);
    if hex_key.len() != 64 {
        return Err(format!(
            "expected a 32-byte hex private key, got {} hex characters",
            hex_key.len()
        ));
    }
    let bytes = hex::decode(hex_key)
        .map_err(|_| "private key contains non-hex characters".to_string())?;

    Ok(KeyMaterial::PrivateKey(B256::from_slice(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_debug_is_redacted() {
        let credential = Credential::new(KEY);
        let debug = format!("{:?}", credential);
        assert_eq!(debug, "Credential(<redacted>)");
        assert!(!debug.contains(KEY));
    }

    #[test]
    fn test_resolve_hex_key() {
        for reference in [KEY.to_string(), format!("0x{}", KEY)] {
            match Credential::new(reference).resolve() {
                Ok(KeyMaterial::PrivateKey(key)) => assert_eq!(hex::encode(key), KEY),
                _ => panic!("expected a private key"),
            }
        }
    }

    #[test]
    fn test_resolve_mnemonic_with_index() {
        let credential = Credential::new("mnemonic:test test test  junk#3");
        match credential.resolve() {
            Ok(KeyMaterial::Mnemonic { phrase, index }) => {
                assert_eq!(phrase, "test test test junk");
                assert_eq!(index, 3);
            }
            _ => panic!("expected a mnemonic"),
        }
    }

    #[test]
    fn test_resolve_rejects_malformed_without_echoing() {
        let secret = "deadbeefnothex!";
        let err = match Credential::new(secret).resolve() {
            Err(reason) => reason,
            Ok(_) => panic!("expected an error"),
        };
        assert!(!err.contains(secret));

        let bad_hex = "zz".repeat(32);
        let err = match Credential::new(bad_hex.as_str()).resolve() {
            Err(reason) => reason,
            Ok(_) => panic!("expected an error"),
        };
        assert!(err.contains("non-hex"));
        assert!(!err.contains(&bad_hex));
    }

    #[test]
    fn test_resolve_missing_env_var() {
        let credential = Credential::new("env:DROPSHIP_TEST_CREDENTIAL_THAT_IS_NEVER_SET");
        match credential.resolve() {
            Err(reason) => assert!(reason.contains("is not set")),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_resolve_from_file() {
        let dir = tempdir::TempDir::new("dropship-credential").unwrap();
        let path = dir.path().join("key.txt");
        std::fs::write(&path, format!("0x{}\n", KEY)).unwrap();

        let credential = Credential::new(format!("file:{}", path.display()));
        assert!(matches!(credential.resolve(), Ok(KeyMaterial::PrivateKey(_))));
    }
}
