//! Lite asks and offers from the lightweight onboarding flow.
//!
//! These carry no wallet, only a display name and a contact handle. The
//! contact handle is private and never leaves the backend through the
//! explorer. Lite kinds have no multi-space query path, so they are read
//! one space at a time.

use crate::arkiv::entity::EntityMeta;
use crate::arkiv::query::QueryValue;
use crate::arkiv::LedgerError;
use crate::entities::{expiry, Created, Record, SpaceScope, Store};
use crate::types::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteAsk {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub name: String,
    pub skill: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub contact_handle: String,
    #[serde(default)]
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteOffer {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub name: String,
    pub skill: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub contact_handle: String,
    #[serde(default)]
    pub ttl_seconds: u64,
}

impl LiteAsk {
    pub fn expires_at(&self) -> DateTime<Utc> {
        expiry(self.meta.created_at, self.ttl_seconds)
    }
}

impl LiteOffer {
    pub fn expires_at(&self) -> DateTime<Utc> {
        expiry(self.meta.created_at, self.ttl_seconds)
    }
}

impl Record for LiteAsk {
    const KIND: EntityKind = EntityKind::LiteAsk;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        vec![
            ("skill", QueryValue::from(self.skill.as_str())),
            ("ttlSeconds", QueryValue::from(self.ttl_seconds)),
        ]
    }
}

impl Record for LiteOffer {
    const KIND: EntityKind = EntityKind::LiteOffer;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        vec![
            ("skill", QueryValue::from(self.skill.as_str())),
            ("ttlSeconds", QueryValue::from(self.ttl_seconds)),
        ]
    }
}

pub async fn list_lite_asks(store: &Store, space_id: &str) -> Result<Vec<LiteAsk>, LedgerError> {
    list_lite(store, space_id).await
}

pub async fn list_lite_offers(store: &Store, space_id: &str) -> Result<Vec<LiteOffer>, LedgerError> {
    list_lite(store, space_id).await
}

async fn list_lite<R: Record>(store: &Store, space_id: &str) -> Result<Vec<R>, LedgerError> {
    let mut records: Vec<R> = store.list(&SpaceScope::one(space_id), vec![]).await?;
    records.sort_by(|a, b| b.meta().created_at.cmp(&a.meta().created_at));
    Ok(records)
}

pub async fn create_lite_ask(
    store: &Store,
    space_id: &str,
    mut ask: LiteAsk,
) -> Result<Created, LedgerError> {
    ask.ttl_seconds = store.listing_lifetime(ask.ttl_seconds);
    store.create(space_id, &ask, ask.ttl_seconds).await
}

pub async fn create_lite_offer(
    store: &Store,
    space_id: &str,
    mut offer: LiteOffer,
) -> Result<Created, LedgerError> {
    offer.ttl_seconds = store.listing_lifetime(offer.ttl_seconds);
    store.create(space_id, &offer, offer.ttl_seconds).await
}
