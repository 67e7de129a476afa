//! Arkiv JSON-RPC client and the `Ledger` seam the rest of the crate uses.

use crate::arkiv::entity::Entity;
use crate::arkiv::error::LedgerError;
use crate::arkiv::query::Query;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

// -- Request / response types -----------------------------------------------

/// An entity to be created, before signing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntity {
    pub string_attributes: BTreeMap<String, String>,
    pub numeric_attributes: BTreeMap<String, u64>,
    /// Hex-encoded payload bytes with 0x prefix.
    pub payload: String,
    /// Lifetime in seconds.
    pub btl: u64,
}

impl CreateEntity {
    /// The exact bytes the signing wallet signs.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        serde_json::to_vec(self).map_err(|e| LedgerError::Decode(e.to_string()))
    }

    pub fn payload_bytes(&self) -> Vec<u8> {
        hex::decode(self.payload.trim_start_matches("0x")).unwrap_or_default()
    }
}

/// A create request signed by the server wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedCreate {
    #[serde(flatten)]
    pub entity: CreateEntity,
    pub signer: String,
    pub signature: String,
}

/// What the ledger hands back for an accepted create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReceipt {
    pub entity_key: String,
    pub tx_hash: String,
}

/// A mined transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

// -- Ledger trait -------------------------------------------------------------

/// Everything the backend needs from the ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Run an attribute query.
    async fn query(&self, query: &Query) -> Result<Vec<Entity>, LedgerError>;

    /// Submit a signed create.
    async fn create_entity(&self, request: &SignedCreate) -> Result<CreateReceipt, LedgerError>;

    /// `Ok(None)` when the node does not know the transaction (yet).
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, LedgerError>;

    async fn block(&self, number: u64) -> Result<Option<BlockInfo>, LedgerError>;

    async fn block_number(&self) -> Result<u64, LedgerError>;

    async fn chain_id(&self) -> Result<u64, LedgerError>;
}

// -- JSON-RPC client -----------------------------------------------------------

/// JSON-RPC client for an Arkiv node.
#[derive(Debug)]
pub struct ArkivClient {
    rpc_url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    data: Vec<RpcEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcEntity {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default)]
    created_at_block: Option<Value>,
    #[serde(default)]
    string_attributes: Vec<RpcAttribute<String>>,
    #[serde(default)]
    numeric_attributes: Vec<RpcAttribute<Value>>,
}

#[derive(Debug, Deserialize)]
struct RpcAttribute<T> {
    key: String,
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    number: String,
    timestamp: String,
}

impl ArkivClient {
    /// Create a new client for the given RPC endpoint.
    pub fn new(rpc_url: &str) -> Self {
        Self {
            rpc_url: rpc_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Issue one JSON-RPC call. A `null` result comes back as `Ok(None)`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("Arkiv rpc #{}: {}", id, method);

        let resp = self
            .http
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": id,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Unavailable(format!(
                "{} returned {}: {}",
                method, status, body
            )));
        }

        let body: RpcResponse<T> = resp.json().await?;
        if let Some(err) = body.error {
            return Err(LedgerError::from_rpc(err.code, &err.message));
        }
        Ok(body.result)
    }
}

#[async_trait]
impl Ledger for ArkivClient {
    async fn query(&self, query: &Query) -> Result<Vec<Entity>, LedgerError> {
        let mut options = json!({
            "includeData": { "payload": true, "attributes": true, "metadata": true }
        });
        if let Some(limit) = query.max_results() {
            options["resultsPerPage"] = json!(limit);
        }

        let result: Option<QueryResult> = self
            .call("arkiv_query", json!([query.to_string(), options]))
            .await?;

        result
            .map(|r| r.data)
            .unwrap_or_default()
            .into_iter()
            .map(decode_entity)
            .collect()
    }

    async fn create_entity(&self, request: &SignedCreate) -> Result<CreateReceipt, LedgerError> {
        let result: Option<CreateReceipt> = self
            .call("arkiv_createEntity", json!([request]))
            .await?;
        result.ok_or_else(|| LedgerError::Decode("empty arkiv_createEntity result".into()))
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, LedgerError> {
        let receipt: Option<RpcReceipt> = self
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;

        let Some(receipt) = receipt else {
            return Ok(None);
        };
        // A receipt without a block is still in the pool.
        let Some(block) = receipt.block_number.as_deref() else {
            return Ok(None);
        };

        Ok(Some(TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: parse_quantity(block)?,
            success: receipt.status.as_deref() == Some("0x1"),
        }))
    }

    async fn block(&self, number: u64) -> Result<Option<BlockInfo>, LedgerError> {
        let block: Option<RpcBlock> = self
            .call(
                "eth_getBlockByNumber",
                json!([format!("0x{:x}", number), false]),
            )
            .await?;

        block
            .map(|b| {
                Ok(BlockInfo {
                    number: parse_quantity(&b.number)?,
                    timestamp: parse_quantity(&b.timestamp)? as i64,
                })
            })
            .transpose()
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        let raw: Option<String> = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(raw.as_deref().unwrap_or("0x0"))
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        let raw: Option<String> = self.call("eth_chainId", json!([])).await?;
        parse_quantity(raw.as_deref().unwrap_or("0x0"))
    }
}

fn decode_entity(raw: RpcEntity) -> Result<Entity, LedgerError> {
    let payload = match raw.value.as_deref() {
        Some(v) if v.starts_with("0x") => hex::decode(&v[2..])
            .map_err(|e| LedgerError::Decode(format!("payload of {}: {}", raw.key, e)))?,
        Some(v) => v.as_bytes().to_vec(),
        None => Vec::new(),
    };

    let created_at_block = match raw.created_at_block {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => Some(parse_quantity(&s)?),
        _ => None,
    };

    let mut numeric_attributes = BTreeMap::new();
    for attr in raw.numeric_attributes {
        let value = match &attr.value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => parse_quantity(s).ok(),
            _ => None,
        };
        if let Some(value) = value {
            numeric_attributes.insert(attr.key, value);
        }
    }

    Ok(Entity {
        key: raw.key,
        owner: raw.owner,
        tx_hash: raw.transaction_hash,
        created_at_block,
        string_attributes: raw
            .string_attributes
            .into_iter()
            .map(|a| (a.key, a.value))
            .collect(),
        numeric_attributes,
        payload,
    })
}

/// Parse an Ethereum hex quantity (`0x1a`) or a plain decimal string.
pub fn parse_quantity(raw: &str) -> Result<u64, LedgerError> {
    let parsed = match raw.strip_prefix("0x") {
        Some("") => Ok(0),
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| LedgerError::Decode(format!("bad quantity {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quantities() {
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("42").unwrap(), 42);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn decodes_rpc_entity() {
        let raw: RpcEntity = serde_json::from_value(json!({
            "key": "0xkey",
            "value": format!("0x{}", hex::encode(br#"{"skill":"rust"}"#)),
            "owner": "0xowner",
            "createdAtBlock": "0x10",
            "stringAttributes": [{"key": "type", "value": "ask"}],
            "numericAttributes": [{"key": "ttlSeconds", "value": 3600}]
        }))
        .unwrap();

        let entity = decode_entity(raw).unwrap();
        assert_eq!(entity.attr("type"), Some("ask"));
        assert_eq!(entity.numeric_attributes["ttlSeconds"], 3600);
        assert_eq!(entity.created_at_block, Some(16));
        assert_eq!(entity.payload_json().unwrap()["skill"], "rust");
    }

    #[test]
    fn signed_create_flattens_entity() {
        let signed = SignedCreate {
            entity: CreateEntity {
                payload: "0x7b7d".into(),
                btl: 60,
                ..Default::default()
            },
            signer: "0xsigner".into(),
            signature: "0xsig".into(),
        };
        let v = serde_json::to_value(&signed).unwrap();
        assert_eq!(v["btl"], 60);
        assert_eq!(v["signer"], "0xsigner");
        assert_eq!(signed.entity.payload_bytes(), b"{}".to_vec());
    }
}
