//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::RpcError;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, RpcError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| RpcError::Transport(format!("failed to create HTTP client: {}", e)))
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or a classified [`RpcError`] if the request failed
/// or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, RpcError> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RpcError::Http {
            status: status.as_u16(),
            body: body.chars().take(256).collect(),
        });
    }

    let result: Value = response
        .json()
        .await
        .map_err(|e| {
            RpcError::InvalidResponse(format!("failed to parse {} response: {}", method, e))
        })?;

    if let Some(error) = result.get("error") {
        return Err(RpcError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string(),
            data: error.get("data").and_then(|d| d.as_str()).map(String::from),
        });
    }

    let result_value = result
        .get("result")
        .ok_or_else(|| RpcError::InvalidResponse(format!("no result in {} response", method)))?
        .clone();

    serde_json::from_value(result_value).map_err(|e| {
        RpcError::InvalidResponse(format!("failed to deserialize {} result: {}", method, e))
    })
}

/// Parse a hex quantity (with 0x prefix) as returned by `eth_*` methods.
pub fn parse_quantity(value: &str) -> Result<u128, RpcError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| {
            RpcError::InvalidResponse(format!("quantity '{}' is not 0x-prefixed", value))
        })?;
    if digits.is_empty() {
        return Err(RpcError::InvalidResponse("empty quantity".to_string()));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| RpcError::InvalidResponse(format!("invalid quantity '{}': {}", value, e)))
}

/// Parse a hex quantity that must fit in a `u64`.
pub fn parse_u64_quantity(value: &str) -> Result<u64, RpcError> {
    let quantity = parse_quantity(value)?;
    u64::try_from(quantity)
        .map_err(|_| RpcError::InvalidResponse(format!("quantity '{}' overflows u64", value)))
}

/// Deserialize a u64 from a hex string (with 0x prefix).
pub fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

/// Encode a quantity as a 0x-prefixed hex string.
pub fn to_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}
