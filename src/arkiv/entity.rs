//! Raw ledger entities and their common envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Attribute carrying the entity kind.
pub const ATTR_TYPE: &str = "type";
/// Attribute carrying the space partition.
pub const ATTR_SPACE: &str = "spaceId";
/// Attribute carrying the RFC 3339 creation time.
pub const ATTR_CREATED_AT: &str = "createdAt";

/// An entity as returned by the ledger, before typed parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub key: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub created_at_block: Option<u64>,
    #[serde(default)]
    pub string_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub numeric_attributes: BTreeMap<String, u64>,
    #[serde(default)]
    pub payload: Vec<u8>,
}

/// Envelope shared by every typed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    pub key: String,
    pub space_id: String,
    pub created_at: DateTime<Utc>,
    pub tx_hash: Option<String>,
}

impl Default for EntityMeta {
    fn default() -> Self {
        Self {
            key: String::new(),
            space_id: String::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            tx_hash: None,
        }
    }
}

impl Entity {
    /// String attribute by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.string_attributes.get(name).map(String::as_str)
    }

    pub fn space_id(&self) -> &str {
        self.attr(ATTR_SPACE).unwrap_or_default()
    }

    /// Payload decoded as JSON, if it is JSON.
    ///
    /// Payloads are usually UTF-8 JSON bytes, but some writers stored a JSON
    /// string whose contents are themselves JSON; both are accepted.
    pub fn payload_json(&self) -> Option<Value> {
        if self.payload.is_empty() {
            return None;
        }
        match serde_json::from_slice::<Value>(&self.payload).ok()? {
            Value::String(inner) => serde_json::from_str(&inner).ok(),
            other => Some(other),
        }
    }

    /// Creation time from the `createdAt` attribute, then the payload, then epoch.
    pub fn created_at(&self) -> DateTime<Utc> {
        let from_attr = self.attr(ATTR_CREATED_AT).and_then(parse_timestamp);
        from_attr
            .or_else(|| {
                self.payload_json()
                    .and_then(|v| v.get("createdAt").and_then(Value::as_str).and_then(parse_timestamp))
            })
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn meta(&self) -> EntityMeta {
        EntityMeta {
            key: self.key.clone(),
            space_id: self.space_id().to_string(),
            created_at: self.created_at(),
            tx_hash: self
                .tx_hash
                .clone()
                .or_else(|| self.attr("txHash").map(str::to_string)),
        }
    }

    /// Attributes overlaid with payload fields, as one JSON object.
    ///
    /// Payload fields win over attributes of the same name.
    pub fn to_json_object(&self) -> Map<String, Value> {
        let mut obj = Map::new();
        for (k, v) in &self.string_attributes {
            obj.insert(k.clone(), Value::String(v.clone()));
        }
        for (k, v) in &self.numeric_attributes {
            obj.insert(k.clone(), Value::from(*v));
        }
        if let Some(Value::Object(payload)) = self.payload_json() {
            obj.extend(payload);
        }
        obj
    }
}

/// Parse an RFC 3339 timestamp or epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}
