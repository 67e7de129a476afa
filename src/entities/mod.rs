//! Typed data-access layer over ledger entities.
//!
//! One module per entity kind, each exposing `list_*`, `get_*` and
//! `create_*` functions on top of the generic [`Store`]. Records are stored
//! update-by-insert: nothing is ever modified or deleted, a newer record
//! supersedes an older one by timestamp.

pub mod ask;
pub mod feedback;
pub mod lite;
pub mod metrics;
pub mod offer;
pub mod profile;
pub mod quest;
pub mod session;
pub mod skill;
pub mod txlog;

use crate::arkiv::entity::{Entity, EntityMeta, ATTR_CREATED_AT, ATTR_SPACE, ATTR_TYPE};
use crate::arkiv::query::{Query, QueryValue};
use crate::arkiv::{CreateEntity, Ledger, LedgerError, SignedCreate};
use crate::clock::Clock;
use crate::identity::SigningWallet;
use crate::types::{EntityKind, TxOperation};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Lifetime for records that should outlive any listing.
pub const PERMANENT_BTL: u64 = 10 * 365 * 24 * 60 * 60;

/// Longest lifetime an ask or offer may ask for.
pub const MAX_LISTING_TTL: u64 = 365 * 24 * 60 * 60;

/// `created_at + ttl_seconds`, saturating at the latest representable time.
///
/// Records already on the ledger may carry any `ttlSeconds`, so this must
/// not panic or wrap.
pub fn expiry(created_at: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
    i64::try_from(ttl_seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| created_at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Failure decoding a ledger entity into a typed record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{kind} entity {key} is malformed: {reason}")]
    Malformed {
        kind: EntityKind,
        key: String,
        reason: String,
    },
}

/// A typed entity kind.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Queryable attributes written next to the payload.
    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        Vec::new()
    }

    /// Decode from a raw entity: attributes overlaid by payload, then the envelope.
    fn from_entity(entity: &Entity) -> Result<Self, RecordError> {
        let obj = entity.to_json_object();
        let mut record: Self =
            serde_json::from_value(Value::Object(obj)).map_err(|e| RecordError::Malformed {
                kind: Self::KIND,
                key: entity.key.clone(),
                reason: e.to_string(),
            })?;
        *record.meta_mut() = entity.meta();
        Ok(record)
    }
}

/// Which spaces a read covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceScope {
    One(String),
    Many(Vec<String>),
}

impl SpaceScope {
    pub fn one(space: impl Into<String>) -> Self {
        Self::One(space.into())
    }

    pub fn contains(&self, space: &str) -> bool {
        match self {
            Self::One(s) => s == space,
            Self::Many(spaces) => spaces.iter().any(|s| s == space),
        }
    }

    pub fn spaces(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(spaces) => spaces.clone(),
        }
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Created {
    pub key: String,
    pub tx_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Ledger access with the server-held signing wallet.
#[derive(Clone)]
pub struct Store {
    ledger: Arc<dyn Ledger>,
    signer: Arc<SigningWallet>,
    clock: Arc<dyn Clock>,
    listing_ttl: u64,
}

impl Store {
    pub fn new(ledger: Arc<dyn Ledger>, signer: Arc<SigningWallet>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            signer,
            clock,
            listing_ttl: 7 * 24 * 60 * 60,
        }
    }

    /// Default lifetime of asks and offers, capped at [`MAX_LISTING_TTL`].
    pub fn with_listing_ttl(mut self, secs: u64) -> Self {
        self.listing_ttl = secs.min(MAX_LISTING_TTL);
        self
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn signer(&self) -> &SigningWallet {
        &self.signer
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn listing_ttl(&self) -> u64 {
        self.listing_ttl
    }

    /// Lifetime for a new listing: the default when unset, otherwise the
    /// request capped at [`MAX_LISTING_TTL`].
    pub fn listing_lifetime(&self, requested: u64) -> u64 {
        match requested {
            0 => self.listing_ttl,
            ttl => ttl.min(MAX_LISTING_TTL),
        }
    }

    /// Run a query restricted to a space scope.
    ///
    /// A single space becomes a predicate. Several spaces are read in one
    /// request without the space predicate and filtered here.
    pub async fn query_scoped(
        &self,
        query: Query,
        scope: &SpaceScope,
    ) -> Result<Vec<Entity>, LedgerError> {
        let query = match scope {
            SpaceScope::One(space) => query.space(space),
            SpaceScope::Many(_) => query,
        };
        let mut entities = self.ledger.query(&query).await?;
        if let SpaceScope::Many(_) = scope {
            entities.retain(|e| scope.contains(e.space_id()));
        }
        Ok(entities)
    }

    /// List every record of a kind in scope matching extra equality filters.
    ///
    /// Records that fail to decode are skipped.
    pub async fn list<R: Record>(
        &self,
        scope: &SpaceScope,
        filters: Vec<(&str, QueryValue)>,
    ) -> Result<Vec<R>, LedgerError> {
        let mut query = Query::kind(R::KIND);
        for (name, value) in filters {
            query = query.eq(name, value);
        }
        let entities = self.query_scoped(query, scope).await?;
        Ok(decode_all(&entities))
    }

    /// Fetch one record by entity key.
    pub async fn get<R: Record>(&self, key: &str) -> Result<Option<R>, LedgerError> {
        let query = Query::kind(R::KIND).eq(crate::arkiv::query::ATTR_KEY, key);
        let entities = self.ledger.query(&query).await?;
        Ok(decode_all::<R>(&entities).into_iter().next())
    }

    /// Sign and submit a new record.
    pub async fn create<R: Record>(
        &self,
        space_id: &str,
        record: &R,
        btl: u64,
    ) -> Result<Created, LedgerError> {
        let payload =
            serde_json::to_vec(record).map_err(|e| LedgerError::Decode(e.to_string()))?;
        self.create_raw(R::KIND, space_id, record.attributes(), payload, btl)
            .await
    }

    /// Sign and submit an entity that has no typed record.
    pub async fn create_raw(
        &self,
        kind: EntityKind,
        space_id: &str,
        attributes: Vec<(&'static str, QueryValue)>,
        payload: Vec<u8>,
        btl: u64,
    ) -> Result<Created, LedgerError> {
        let created_at = self.clock.now();
        let entity = build_create(kind, space_id, attributes, payload, btl, created_at);
        let request = self.sign(entity)?;
        let receipt = self.ledger.create_entity(&request).await?;
        debug!("Created {} {} (tx {})", kind, receipt.entity_key, receipt.tx_hash);

        Ok(Created {
            key: receipt.entity_key,
            tx_hash: receipt.tx_hash,
            created_at,
        })
    }

    /// Create a record and write its transaction-log entries.
    ///
    /// Every logged create gets a `tx_event`; asks, offers and skills also
    /// get an `<entity>_txhash` entry. Log writes are best-effort.
    pub async fn create_logged<R: Record>(
        &self,
        space_id: &str,
        record: &R,
        btl: u64,
        wallet: &str,
        operation: TxOperation,
    ) -> Result<Created, LedgerError> {
        let created = self.create(space_id, record, btl).await?;

        let event = txlog::TxEvent::new(
            &created.tx_hash,
            R::KIND,
            &created.key,
            wallet,
            operation,
            &self.signer.address_lower(),
        );
        if let Err(e) = self.create(space_id, &event, PERMANENT_BTL).await {
            warn!("Failed to write tx_event for {} {}: {}", R::KIND, created.key, e);
        }

        if let Some(log_kind) = R::KIND.txhash_log() {
            let log = txlog::TxHashLog::new(log_kind, &created.key, &created.tx_hash, operation);
            if let Err(e) = txlog::write_txhash_log(self, space_id, &log).await {
                warn!("Failed to write {} for {}: {}", log_kind, created.key, e);
            }
        }

        Ok(created)
    }

    fn sign(&self, entity: CreateEntity) -> Result<SignedCreate, LedgerError> {
        let signature = self
            .signer
            .sign_message(&entity.signing_bytes()?)
            .map_err(|e| LedgerError::Conflict(format!("signing failed: {e}")))?;
        Ok(SignedCreate {
            entity,
            signer: self.signer.address.clone(),
            signature,
        })
    }
}

fn build_create(
    kind: EntityKind,
    space_id: &str,
    attributes: Vec<(&'static str, QueryValue)>,
    payload: Vec<u8>,
    btl: u64,
    created_at: DateTime<Utc>,
) -> CreateEntity {
    let mut string_attributes = BTreeMap::new();
    let mut numeric_attributes = BTreeMap::new();
    string_attributes.insert(ATTR_TYPE.to_string(), kind.as_str().to_string());
    string_attributes.insert(ATTR_SPACE.to_string(), space_id.to_string());
    string_attributes.insert(ATTR_CREATED_AT.to_string(), created_at.to_rfc3339());
    for (name, value) in attributes {
        match value {
            QueryValue::Str(v) => {
                string_attributes.insert(name.to_string(), v);
            }
            QueryValue::Num(v) => {
                numeric_attributes.insert(name.to_string(), v);
            }
        }
    }

    CreateEntity {
        string_attributes,
        numeric_attributes,
        payload: format!("0x{}", hex::encode(payload)),
        btl,
    }
}

/// Decode entities into records, skipping (and logging) malformed ones.
pub fn decode_all<R: Record>(entities: &[Entity]) -> Vec<R> {
    entities
        .iter()
        .filter_map(|e| match R::from_entity(e) {
            Ok(r) => Some(r),
            Err(err) => {
                warn!("{}", err);
                None
            }
        })
        .collect()
}

/// Lowercase a wallet address for storage and comparison.
pub fn normalize_wallet(wallet: &str) -> String {
    wallet.trim().to_lowercase()
}


#[cfg(test)]
mod tests {
    use super::testing::store;
    use super::*;
    use crate::entities::ask::{Ask, AskStatus};

    fn ask(wallet: &str, skill: &str) -> Ask {
        Ask {
            wallet: wallet.into(),
            skill: skill.into(),
            status: AskStatus::Open,
            ttl_seconds: 3600,
            ..Default::default()
        }
    }

    #[test]
    fn expiry_saturates_instead_of_overflowing() {
        let t = super::testing::start();
        assert_eq!(expiry(t, 60), t + Duration::seconds(60));
        assert_eq!(expiry(t, 10_000_000_000_000_000), DateTime::<Utc>::MAX_UTC);
        assert_eq!(expiry(t, u64::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn listing_lifetime_defaults_and_caps() {
        let (store, _, _) = store();
        let store = store.with_listing_ttl(u64::MAX);
        assert_eq!(store.listing_ttl(), MAX_LISTING_TTL);
        let store = store.with_listing_ttl(600);
        assert_eq!(store.listing_lifetime(0), 600);
        assert_eq!(store.listing_lifetime(60), 60);
        assert_eq!(store.listing_lifetime(u64::MAX), MAX_LISTING_TTL);
    }

    #[tokio::test]
    async fn create_and_list_round_trip_with_envelope() {
        let (store, _, _) = store();
        let created = store.create("beta-launch", &ask("0xaa", "rust"), 3600).await.unwrap();

        let asks: Vec<Ask> = store
            .list(&SpaceScope::one("beta-launch"), vec![])
            .await
            .unwrap();
        assert_eq!(asks.len(), 1);
        assert_eq!(asks[0].skill, "rust");
        assert_eq!(asks[0].meta.key, created.key);
        assert_eq!(asks[0].meta.space_id, "beta-launch");
        assert_eq!(asks[0].meta.created_at, created.created_at);
        assert_eq!(asks[0].meta.tx_hash.as_deref(), Some(created.tx_hash.as_str()));
    }

    #[tokio::test]
    async fn multi_space_scope_filters_foreign_spaces() {
        let (store, _, _) = store();
        store.create("a", &ask("0x1", "go"), 60).await.unwrap();
        store.create("b", &ask("0x2", "go"), 60).await.unwrap();
        store.create("c", &ask("0x3", "go"), 60).await.unwrap();

        let scope = SpaceScope::Many(vec!["a".into(), "b".into()]);
        let asks: Vec<Ask> = store.list(&scope, vec![]).await.unwrap();
        assert_eq!(asks.len(), 2);
        assert!(asks.iter().all(|a| a.meta.space_id != "c"));
    }

    #[tokio::test]
    async fn malformed_entities_are_skipped() {
        let (store, ledger, _) = store();
        store.create("a", &ask("0x1", "go"), 60).await.unwrap();

        let mut bad = Entity {
            key: "0xbad".into(),
            payload: br#"{"wallet": 7}"#.to_vec(),
            ..Default::default()
        };
        bad.string_attributes.insert("type".into(), "ask".into());
        bad.string_attributes.insert("spaceId".into(), "a".into());
        ledger.insert(bad);

        let asks: Vec<Ask> = store.list(&SpaceScope::one("a"), vec![]).await.unwrap();
        assert_eq!(asks.len(), 1);
    }

    #[tokio::test]
    async fn logged_create_writes_tx_event_and_txhash_log() {
        let (store, ledger, _) = store();
        let created = store
            .create_logged("a", &ask("0x1", "go"), 60, "0x1", TxOperation::Create)
            .await
            .unwrap();
        assert_eq!(ledger.entity_count(), 3);

        let events: Vec<txlog::TxEvent> = store.list(&SpaceScope::one("a"), vec![]).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tx_hash, created.tx_hash);
        assert_eq!(events[0].signer_wallet.as_deref(), Some(store.signer().address_lower().as_str()));
    }

    #[tokio::test]
    async fn get_by_key() {
        let (store, _, _) = store();
        let created = store.create("a", &ask("0x1", "go"), 60).await.unwrap();
        let found: Option<Ask> = store.get(&created.key).await.unwrap();
        assert_eq!(found.unwrap().meta.key, created.key);
        let missing: Option<Ask> = store.get("0xnope").await.unwrap();
        assert!(missing.is_none());
    }
}
