//! On-disk artifact layouts produced by the common Solidity toolchains.

use alloy::json_abi::JsonAbi;
use alloy::primitives::{hex, Bytes};

use crate::constants::LINK_PLACEHOLDER_PREFIX;

/// `out/<File>.sol/<Name>.json` written by `forge build`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundryArtifactJson {
    pub abi: JsonAbi,
    pub bytecode: FoundryBytecode,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FoundryBytecode {
    pub object: String,
}

/// `artifacts/contracts/<File>.sol/<Name>.json` written by `hardhat compile`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardhatArtifactJson {
    pub contract_name: String,
    pub abi: JsonAbi,
    pub bytecode: String,
}

/// A single contract entry of solc-js compile output: the ABI is itself a JSON string.
#[derive(Clone, Debug, Deserialize)]
pub struct SolcOutputJson {
    pub interface: String,
    pub bytecode: String,
}

/// The layouts an artifact file may use. Hardhat is tried first since it is
/// the only one naming its contract.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ArtifactJson {
    Hardhat(HardhatArtifactJson),
    Foundry(FoundryArtifactJson),
    Solc(SolcOutputJson),
}

impl ArtifactJson {
    pub fn contract_name(&self) -> Option<&str> {
        match self {
            ArtifactJson::Hardhat(artifact) => Some(&artifact.contract_name),
            _ => None,
        }
    }

    /// Split into (abi, hex bytecode).
    pub fn into_parts(self) -> Result<(JsonAbi, String), String> {
        match self {
            ArtifactJson::Hardhat(artifact) => Ok((artifact.abi, artifact.bytecode)),
            ArtifactJson::Foundry(artifact) => Ok((artifact.abi, artifact.bytecode.object)),
            ArtifactJson::Solc(output) => {
                let abi: JsonAbi = serde_json::from_str(&output.interface)
                    .map_err(|e| format!("invalid abi in interface field: {}", e))?;
                Ok((abi, output.bytecode))
            }
        }
    }
}

/// Decode creation bytecode, refusing unlinked library references.
pub fn parse_bytecode(raw: &str) -> Result<Bytes, String> {
    let raw = raw.trim();
    if raw.contains(LINK_PLACEHOLDER_PREFIX) {
        return Err("bytecode contains unlinked library references".to_string());
    }
    let bytes = hex::decode(raw).map_err(|e| format!("invalid bytecode hex: {}", e))?;
    if bytes.is_empty() {
        return Err("bytecode is empty (abstract contract or interface?)".to_string());
    }
    Ok(Bytes::from(bytes))
}
