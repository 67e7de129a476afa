//! Auxiliary transaction-log entities.
//!
//! The ledger has no per-application transaction log, so writes record
//! their own: a `tx_event` per logged create (global history) and, for
//! asks, offers and skills, an `<entity>_txhash` entry keyed by the target
//! entity (per-entity history).

use crate::arkiv::entity::{Entity, EntityMeta};
use crate::arkiv::query::{Query, QueryValue};
use crate::arkiv::LedgerError;
use crate::entities::{Created, Record, SpaceScope, Store, PERMANENT_BTL};
use crate::types::{EntityKind, TxOperation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Attribute naming the wallet that signed the logged write.
pub const ATTR_SIGNER_WALLET: &str = "signer_wallet";

/// Attribute carrying the logged entity's key on txhash logs.
pub const ATTR_ENTITY_KEY: &str = "entityKey";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxEvent {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub tx_hash: String,
    pub entity_type: EntityKind,
    pub entity_key: String,
    #[serde(default)]
    pub wallet: String,
    pub operation: TxOperation,
    /// Absent on events written before signer tracking existed.
    #[serde(default, rename = "signer_wallet", skip_serializing_if = "Option::is_none")]
    pub signer_wallet: Option<String>,
}

impl TxEvent {
    pub fn new(
        tx_hash: &str,
        entity_type: EntityKind,
        entity_key: &str,
        wallet: &str,
        operation: TxOperation,
        signer: &str,
    ) -> Self {
        Self {
            meta: EntityMeta::default(),
            tx_hash: tx_hash.to_string(),
            entity_type,
            entity_key: entity_key.to_string(),
            wallet: wallet.to_lowercase(),
            operation,
            signer_wallet: Some(signer.to_lowercase()),
        }
    }

    /// Whether the event was written by `signer`. Events without a recorded
    /// signer predate the attribute and are trusted.
    pub fn signed_by(&self, signer: &str) -> bool {
        match &self.signer_wallet {
            Some(w) => w.eq_ignore_ascii_case(signer),
            None => true,
        }
    }
}

impl Record for TxEvent {
    const KIND: EntityKind = EntityKind::TxEvent;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        let operation = match self.operation {
            TxOperation::Create => "create",
            TxOperation::Update => "update",
        };
        let mut attrs = vec![
            ("txHash", QueryValue::from(self.tx_hash.as_str())),
            ("entityType", QueryValue::from(self.entity_type.as_str())),
            ("entityKey", QueryValue::from(self.entity_key.as_str())),
            ("wallet", QueryValue::from(self.wallet.as_str())),
            ("operation", QueryValue::from(operation)),
        ];
        if let Some(signer) = &self.signer_wallet {
            attrs.push((ATTR_SIGNER_WALLET, QueryValue::from(signer)));
        }
        attrs
    }
}

/// Every `tx_event` in one space.
pub async fn list_tx_events(store: &Store, space_id: &str) -> Result<Vec<TxEvent>, LedgerError> {
    store.list(&SpaceScope::one(space_id), vec![]).await
}

/// A `<entity>_txhash` log entry to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHashLog {
    #[serde(skip)]
    pub kind: EntityKind,
    pub entity_key: String,
    pub tx_hash: String,
    pub operation: TxOperation,
}

impl TxHashLog {
    pub fn new(kind: EntityKind, entity_key: &str, tx_hash: &str, operation: TxOperation) -> Self {
        Self {
            kind,
            entity_key: entity_key.to_string(),
            tx_hash: tx_hash.to_string(),
            operation,
        }
    }
}

pub async fn write_txhash_log(
    store: &Store,
    space_id: &str,
    log: &TxHashLog,
) -> Result<Created, LedgerError> {
    let payload = serde_json::to_vec(log).map_err(|e| LedgerError::Decode(e.to_string()))?;
    let attributes = vec![(ATTR_ENTITY_KEY, QueryValue::from(log.entity_key.as_str()))];
    store
        .create_raw(log.kind, space_id, attributes, payload, PERMANENT_BTL)
        .await
}

/// A decoded txhash log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TxHashEntry {
    pub log_key: String,
    pub space_id: String,
    pub tx_hash: String,
    pub operation: Option<TxOperation>,
    pub created_at: DateTime<Utc>,
}

impl TxHashEntry {
    /// Decode a log entity. The payload may be UTF-8 JSON or a JSON string
    /// holding JSON; anything without a `txHash` yields `None`.
    pub fn from_entity(entity: &Entity) -> Option<Self> {
        let payload = entity.payload_json()?;
        let tx_hash = payload.get("txHash").and_then(Value::as_str)?.to_string();
        let operation = payload
            .get("operation")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());
        Some(Self {
            log_key: entity.key.clone(),
            space_id: entity.space_id().to_string(),
            tx_hash,
            operation,
            created_at: entity.created_at(),
        })
    }
}

/// Txhash log entries recorded for one entity, in ledger order.
pub async fn read_txhash_logs(
    store: &Store,
    log_kind: EntityKind,
    entity_key: &str,
) -> Result<Vec<TxHashEntry>, LedgerError> {
    let query = Query::kind(log_kind).eq(ATTR_ENTITY_KEY, entity_key);
    let entities = store.ledger().query(&query).await?;
    let entries: Vec<TxHashEntry> = entities
        .iter()
        .filter_map(|e| {
            let entry = TxHashEntry::from_entity(e);
            if entry.is_none() {
                debug!("Skipping undecodable {} entry {}", log_kind, e.key);
            }
            entry
        })
        .collect();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::store;

    #[test]
    fn missing_signer_is_trusted() {
        let mut event = TxEvent::new("0x1", EntityKind::Ask, "0xk", "0xW", TxOperation::Create, "0xS");
        assert_eq!(event.wallet, "0xw");
        assert!(event.signed_by("0xs"));
        assert!(!event.signed_by("0xother"));
        event.signer_wallet = None;
        assert!(event.signed_by("0xother"));
    }

    #[tokio::test]
    async fn txhash_log_reads_back_and_skips_garbage() {
        let (store, ledger, _) = store();
        let log = TxHashLog::new(EntityKind::OfferTxhash, "0xoffer", "0xtx1", TxOperation::Create);
        write_txhash_log(&store, "s", &log).await.unwrap();

        let mut garbage = Entity {
            key: "0xjunk".into(),
            payload: b"\x00\x01".to_vec(),
            ..Default::default()
        };
        garbage.string_attributes.insert("type".into(), "offer_txhash".into());
        garbage.string_attributes.insert("entityKey".into(), "0xoffer".into());
        ledger.insert(garbage);

        let mut string_encoded = Entity {
            key: "0xstr".into(),
            payload: br#""{\"txHash\":\"0xtx2\"}""#.to_vec(),
            ..Default::default()
        };
        string_encoded.string_attributes.insert("type".into(), "offer_txhash".into());
        string_encoded.string_attributes.insert("entityKey".into(), "0xoffer".into());
        ledger.insert(string_encoded);

        let entries = read_txhash_logs(&store, EntityKind::OfferTxhash, "0xoffer").await.unwrap();
        let hashes: Vec<_> = entries.iter().map(|e| e.tx_hash.as_str()).collect();
        assert_eq!(hashes, vec!["0xtx1", "0xtx2"]);
        assert_eq!(entries[0].operation, Some(TxOperation::Create));
        assert_eq!(entries[1].operation, None);
    }
}
