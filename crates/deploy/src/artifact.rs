//! Compiled contract artifacts and creation payload encoding.

use std::path::Path;

use alloy_core::{
    dyn_abi::{DynSolValue, JsonAbiExt, Specifier},
    json_abi::JsonAbi,
    primitives::Bytes,
};
use serde::Deserialize;

use crate::{ArtifactError, EncodingError};

/// Compiled bytecode plus the ABI describing its constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    pub name: String,
    pub bytecode: Bytes,
    pub abi: JsonAbi,
}

/// Hardhat (`bytecode: "0x.."`) and Foundry (`bytecode: { object: "0x.." }`) layouts.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    contract_name: Option<String>,
    abi: JsonAbi,
    bytecode: RawBytecode,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

impl RawBytecode {
    fn as_hex(&self) -> &str {
        match self {
            Self::Hex(hex) => hex,
            Self::Object { object } => object,
        }
    }
}

impl ContractArtifact {
    pub fn new(name: impl Into<String>, bytecode: Bytes, abi: JsonAbi) -> Self {
        Self {
            name: name.into(),
            bytecode,
            abi,
        }
    }

    /// Load an artifact JSON file produced by Hardhat or Foundry.
    ///
    /// The contract name is taken from the artifact, or from the file stem.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let path_str = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| ArtifactError::Read {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let fallback_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "Contract".to_string());

        let artifact = Self::from_json(&path_str, &fallback_name, &content)?;
        tracing::debug!(
            path = %path_str,
            contract = %artifact.name,
            bytecode_len = artifact.bytecode.len(),
            has_constructor = artifact.abi.constructor().is_some(),
            "Artifact loaded"
        );
        Ok(artifact)
    }

    fn from_json(path: &str, fallback_name: &str, content: &str) -> Result<Self, ArtifactError> {
        let raw: RawArtifact = serde_json::from_str(content).map_err(|e| ArtifactError::Parse {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let hex_code = raw.bytecode.as_hex();
        let hex_code = hex_code.strip_prefix("0x").unwrap_or(hex_code);
        if hex_code.is_empty() {
            return Err(ArtifactError::MissingBytecode {
                path: path.to_string(),
            });
        }
        if hex_code.contains("__") {
            return Err(ArtifactError::Parse {
                path: path.to_string(),
                reason: "bytecode contains unlinked library placeholders".to_string(),
            });
        }
        let bytecode = hex::decode(hex_code).map_err(|e| ArtifactError::Parse {
            path: path.to_string(),
            reason: format!("invalid bytecode hex: {}", e),
        })?;

        Ok(Self {
            name: raw.contract_name.unwrap_or_else(|| fallback_name.to_string()),
            bytecode: bytecode.into(),
            abi: raw.abi,
        })
    }

    /// Build the creation payload: bytecode followed by the ABI-encoded constructor arguments.
    ///
    /// Arguments are coerced from their string form to the constructor's parameter types.
    pub fn encode_deployment(&self, args: &[String]) -> Result<Bytes, EncodingError> {
        let Some(constructor) = self.abi.constructor() else {
            if args.is_empty() {
                return Ok(self.bytecode.clone());
            }
            return Err(EncodingError::NoConstructor { got: args.len() });
        };

        if constructor.inputs.len() != args.len() {
            return Err(EncodingError::ArgumentCount {
                expected: constructor.inputs.len(),
                got: args.len(),
            });
        }

        let values = constructor
            .inputs
            .iter()
            .zip(args)
            .enumerate()
            .map(|(index, (param, arg))| {
                let invalid = |reason: String| EncodingError::InvalidArgument {
                    index,
                    name: param.name.clone(),
                    ty: param.ty.clone(),
                    reason,
                };
                let ty = param.resolve().map_err(|e| invalid(e.to_string()))?;
                ty.coerce_str(arg).map_err(|e| invalid(e.to_string()))
            })
            .collect::<Result<Vec<DynSolValue>, _>>()?;

        let encoded = constructor
            .abi_encode_input(&values)
            .map_err(|e| EncodingError::Abi(e.to_string()))?;

        Ok(self.bytecode.iter().copied().chain(encoded).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOTBOX_ABI: &str = r#"[
        {
            "type": "constructor",
            "inputs": [{ "name": "name", "type": "string", "internalType": "string" }],
            "stateMutability": "nonpayable"
        },
        {
            "type": "function",
            "name": "name",
            "inputs": [],
            "outputs": [{ "name": "", "type": "string", "internalType": "string" }],
            "stateMutability": "view"
        }
    ]"#;

    fn artifact(abi: &str) -> ContractArtifact {
        ContractArtifact::new(
            "LootBox",
            Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]),
            serde_json::from_str(abi).unwrap(),
        )
    }

    #[test]
    fn test_encode_string_constructor() {
        let artifact = artifact(LOOTBOX_ABI);
        let payload = artifact.encode_deployment(&["test".to_string()]).unwrap();

        // bytecode + offset word + length word + one padded data word
        assert_eq!(payload.len(), 4 + 3 * 32);
        assert_eq!(&payload[..4], &[0x60, 0x80, 0x60, 0x40]);
        assert_eq!(payload[4 + 31], 0x20);
        assert_eq!(payload[4 + 63], 4);
        assert_eq!(&payload[4 + 64..4 + 68], b"test");
    }

    #[test]
    fn test_encode_without_constructor() {
        let artifact = artifact("[]");
        assert_eq!(artifact.encode_deployment(&[]).unwrap(), artifact.bytecode);
        assert_eq!(
            artifact.encode_deployment(&["1".to_string()]),
            Err(EncodingError::NoConstructor { got: 1 })
        );
    }

    #[test]
    fn test_encode_argument_count_mismatch() {
        let artifact = artifact(LOOTBOX_ABI);
        assert_eq!(
            artifact.encode_deployment(&[]),
            Err(EncodingError::ArgumentCount { expected: 1, got: 0 })
        );
    }

    #[test]
    fn test_encode_invalid_argument_type() {
        let artifact = artifact(
            r#"[{
                "type": "constructor",
                "inputs": [
                    { "name": "owner", "type": "address" },
                    { "name": "supply", "type": "uint256" }
                ],
                "stateMutability": "nonpayable"
            }]"#,
        );

        let ok = artifact
            .encode_deployment(&[
                "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
                "1000".to_string(),
            ])
            .unwrap();
        assert_eq!(ok.len(), 4 + 2 * 32);
        assert_eq!(ok[ok.len() - 2..], [0x03, 0xe8]);

        let err = artifact
            .encode_deployment(&[
                "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
                "lots".to_string(),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            EncodingError::InvalidArgument { index: 1, ref name, .. } if name == "supply"
        ));
    }

    #[test]
    fn test_load_hardhat_artifact() {
        let dir = tempdir::TempDir::new("dropship-artifact").unwrap();
        let path = dir.path().join("LootBox.json");
        let content = format!(
            r#"{{ "contractName": "LootBox", "abi": {}, "bytecode": "0x60806040" }}"#,
            LOOTBOX_ABI
        );
        std::fs::write(&path, content).unwrap();

        let artifact = ContractArtifact::load(&path).unwrap();
        assert_eq!(artifact.name, "LootBox");
        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80, 0x60, 0x40]);
        assert!(artifact.abi.constructor().is_some());
    }

    #[test]
    fn test_load_foundry_artifact_uses_file_stem() {
        let dir = tempdir::TempDir::new("dropship-artifact").unwrap();
        let path = dir.path().join("Counter.json");
        std::fs::write(
            &path,
            r#"{ "abi": [], "bytecode": { "object": "0x6080" } }"#,
        )
        .unwrap();

        let artifact = ContractArtifact::load(&path).unwrap();
        assert_eq!(artifact.name, "Counter");
        assert_eq!(artifact.bytecode.len(), 2);
    }

    #[test]
    fn test_load_rejects_undeployable_bytecode() {
        let empty =
            ContractArtifact::from_json("I.json", "I", r#"{ "abi": [], "bytecode": "0x" }"#);
        assert!(matches!(empty, Err(ArtifactError::MissingBytecode { .. })));

        let unlinked = ContractArtifact::from_json(
            "L.json",
            "L",
            r#"{ "abi": [], "bytecode": "0x6080__$abc$__6040" }"#,
        );
        assert!(matches!(unlinked, Err(ArtifactError::Parse { .. })));

        let missing = ContractArtifact::load(Path::new("/nonexistent/artifact.json"));
        assert!(matches!(missing, Err(ArtifactError::Read { .. })));
    }
}
