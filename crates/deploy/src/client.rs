//! The network capabilities the deployment core needs, and a JSON-RPC
//! implementation of them.

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::{
    RpcError,
    rpc::{self, deserialize_u64_from_hex},
};

/// Network-reported outcome of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    /// `true` when the transaction executed without reverting.
    pub success: bool,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
}

/// Capability set of a blockchain network endpoint.
///
/// All futures are `Send` so deployments can run on a multi-threaded runtime.
pub trait NetworkClient: Send + Sync {
    /// Chain id reported by the endpoint.
    fn chain_id(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// Next nonce for `address`, counting pending transactions.
    fn pending_nonce(&self, address: Address) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// Current gas price estimate in wei.
    fn gas_price(&self) -> impl Future<Output = Result<u128, RpcError>> + Send;

    /// Gas needed to execute a contract creation with `input` from `from`.
    fn estimate_gas(
        &self,
        from: Address,
        input: Bytes,
    ) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// Broadcast a signed transaction, returning its hash.
    fn send_raw_transaction(
        &self,
        raw: Bytes,
    ) -> impl Future<Output = Result<B256, RpcError>> + Send;

    /// Receipt for `hash`, or `None` while the transaction is not included.
    fn transaction_receipt(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>, RpcError>> + Send;

    /// Latest block height.
    fn block_number(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// Best-effort revert reason for a failed transaction included at `block`.
    fn revert_reason(
        &self,
        _hash: B256,
        _block: u64,
    ) -> impl Future<Output = Result<Option<String>, RpcError>> + Send {
        async { Ok(None) }
    }
}

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    block_number: u64,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    status: u64,
    contract_address: Option<Address>,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    gas_used: u64,
}

impl From<RpcReceipt> for TransactionReceipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status == 1,
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used,
        }
    }
}

/// [`NetworkClient`] over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct HttpNetworkClient {
    client: reqwest::Client,
    url: Url,
}

impl HttpNetworkClient {
    pub fn new(url: Url) -> Result<Self, RpcError> {
        Ok(Self {
            client: rpc::create_client()?,
            url,
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        tracing::trace!(method, "JSON-RPC request");
        rpc::json_rpc_call(&self.client, &self.url, method, params).await
    }
}

impl NetworkClient for HttpNetworkClient {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        let chain_id: String = self.call("eth_chainId", vec![]).await?;
        rpc::parse_u64_quantity(&chain_id)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, RpcError> {
        let nonce: String = self
            .call(
                "eth_getTransactionCount",
                vec![json!(address), json!("pending")],
            )
            .await?;
        rpc::parse_u64_quantity(&nonce)
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        let price: String = self.call("eth_gasPrice", vec![]).await?;
        rpc::parse_quantity(&price)
    }

    async fn estimate_gas(&self, from: Address, input: Bytes) -> Result<u64, RpcError> {
        let gas: String = self
            .call(
                "eth_estimateGas",
                vec![json!({ "from": from, "data": input })],
            )
            .await?;
        rpc::parse_u64_quantity(&gas)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, RpcError> {
        self.call("eth_sendRawTransaction", vec![json!(raw)]).await
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        let receipt: Option<RpcReceipt> = self
            .call("eth_getTransactionReceipt", vec![json!(hash)])
            .await?;
        Ok(receipt.map(TransactionReceipt::from))
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        let number: String = self.call("eth_blockNumber", vec![]).await?;
        rpc::parse_u64_quantity(&number)
    }

    /// Replays the creation with `eth_call` against the parent block's state
    /// and decodes the returned revert data.
    async fn revert_reason(&self, hash: B256, block: u64) -> Result<Option<String>, RpcError> {
        let tx: Option<Value> = self
            .call("eth_getTransactionByHash", vec![json!(hash)])
            .await?;
        let Some(tx) = tx else {
            return Ok(None);
        };

        let replay = json!({
            "from": tx["from"],
            "data": tx["input"],
            "gas": tx["gas"],
            "value": tx["value"],
        });
        let at = rpc::to_quantity(block.saturating_sub(1));

        match self.call::<Bytes>("eth_call", vec![replay, json!(at)]).await {
            Ok(_) => Ok(None),
            Err(RpcError::Rpc { message, data, .. }) => {
                let decoded = data.as_deref().and_then(decode_revert_data);
                Ok(Some(decoded.unwrap_or(message)))
            }
            Err(e) => Err(e),
        }
    }
}

/// Decode `Error(string)`, `Panic(uint256)` or custom-error revert data.
pub(crate) fn decode_revert_data(data: &str) -> Option<String> {
    let bytes = hex::decode(data.strip_prefix("0x").unwrap_or(data)).ok()?;
    if bytes.is_empty() {
        return None;
    }
    alloy_core::sol_types::decode_revert_reason(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_deserialization() {
        let raw = r#"{
            "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000ab",
            "blockNumber": "0xa",
            "status": "0x1",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "gasUsed": "0x5208",
            "logs": []
        }"#;
        let receipt: TransactionReceipt = serde_json::from_str::<RpcReceipt>(raw).unwrap().into();
        assert_eq!(receipt.block_number, 10);
        assert!(receipt.success);
        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(
            receipt.contract_address.unwrap().to_string(),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );
    }

    #[test]
    fn test_reverted_receipt_without_address() {
        let raw = r#"{
            "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000ab",
            "blockNumber": "0x10",
            "status": "0x0",
            "contractAddress": null,
            "gasUsed": "0x0"
        }"#;
        let receipt: TransactionReceipt = serde_json::from_str::<RpcReceipt>(raw).unwrap().into();
        assert!(!receipt.success);
        assert_eq!(receipt.contract_address, None);
    }

    #[test]
    fn test_decode_revert_data() {
        // Error("nope")
        let data = "0x08c379a0\
            0000000000000000000000000000000000000000000000000000000000000020\
            0000000000000000000000000000000000000000000000000000000000000004\
            6e6f706500000000000000000000000000000000000000000000000000000000";
        let reason = decode_revert_data(data).unwrap();
        assert!(reason.contains("nope"));
        assert_eq!(decode_revert_data("0x"), None);
        assert_eq!(decode_revert_data("not hex"), None);
    }
}
