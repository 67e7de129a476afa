//! Offers: what a mentor can teach, optionally paid.

use crate::arkiv::entity::EntityMeta;
use crate::arkiv::query::QueryValue;
use crate::arkiv::LedgerError;
use crate::entities::{expiry, normalize_wallet, Created, Record, SpaceScope, Store};
use crate::types::{EntityKind, TxOperation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub wallet: String,
    pub skill: String,
    #[serde(default, rename = "skill_id", skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    #[serde(default, rename = "skill_label", skip_serializing_if = "Option::is_none")]
    pub skill_label: Option<String>,
    #[serde(default)]
    pub message: String,
    /// Free-text availability, e.g. "weekday evenings UTC".
    #[serde(default)]
    pub availability_window: String,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_address: Option<String>,
    #[serde(default)]
    pub status: OfferStatus,
    #[serde(default)]
    pub ttl_seconds: u64,
}

impl Offer {
    pub fn expires_at(&self) -> DateTime<Utc> {
        expiry(self.meta.created_at, self.ttl_seconds)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> OfferStatus {
        if self.is_expired(now) {
            OfferStatus::Inactive
        } else {
            self.status
        }
    }

    pub fn skill_name(&self) -> &str {
        self.skill_label.as_deref().unwrap_or(&self.skill)
    }
}

impl Record for Offer {
    const KIND: EntityKind = EntityKind::Offer;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        let status = match self.status {
            OfferStatus::Active => "active",
            OfferStatus::Inactive => "inactive",
        };
        let mut attrs = vec![
            ("wallet", QueryValue::from(self.wallet.as_str())),
            ("skill", QueryValue::from(self.skill.as_str())),
            ("status", QueryValue::from(status)),
            ("ttlSeconds", QueryValue::from(self.ttl_seconds)),
        ];
        if let Some(id) = &self.skill_id {
            attrs.push(("skill_id", QueryValue::from(id)));
        }
        attrs
    }
}

#[derive(Debug, Clone, Default)]
pub struct OfferFilter {
    pub wallet: Option<String>,
    pub skill_id: Option<String>,
    pub include_inactive: bool,
}

pub async fn list_offers(
    store: &Store,
    scope: &SpaceScope,
    filter: &OfferFilter,
) -> Result<Vec<Offer>, LedgerError> {
    let mut filters = Vec::new();
    if let Some(wallet) = &filter.wallet {
        filters.push(("wallet", QueryValue::from(normalize_wallet(wallet))));
    }
    if let Some(skill_id) = &filter.skill_id {
        filters.push(("skill_id", QueryValue::from(skill_id)));
    }

    let mut offers: Vec<Offer> = store.list(scope, filters).await?;
    if !filter.include_inactive {
        let now = store.now();
        offers.retain(|o| o.effective_status(now) == OfferStatus::Active);
    }
    offers.sort_by(|a, b| b.meta.created_at.cmp(&a.meta.created_at));
    Ok(offers)
}

pub async fn get_offer(store: &Store, key: &str) -> Result<Option<Offer>, LedgerError> {
    store.get(key).await
}

pub async fn create_offer(
    store: &Store,
    space_id: &str,
    mut offer: Offer,
) -> Result<Created, LedgerError> {
    offer.wallet = normalize_wallet(&offer.wallet);
    offer.ttl_seconds = store.listing_lifetime(offer.ttl_seconds);
    if !offer.is_paid {
        offer.cost = None;
        offer.payment_address = None;
    }
    let wallet = offer.wallet.clone();
    store
        .create_logged(space_id, &offer, offer.ttl_seconds, &wallet, TxOperation::Create)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::store;
    use crate::entities::MAX_LISTING_TTL;
    use chrono::Duration;

    #[tokio::test]
    async fn free_offers_drop_payment_terms() {
        let (store, _, _) = store();
        let created = create_offer(
            &store,
            "s",
            Offer {
                wallet: "0x1".into(),
                skill: "solidity".into(),
                is_paid: false,
                cost: Some("10".into()),
                payment_address: Some("0xpay".into()),
                ttl_seconds: 600,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let offer = get_offer(&store, &created.key).await.unwrap().unwrap();
        assert_eq!(offer.cost, None);
        assert_eq!(offer.payment_address, None);
        assert_eq!(offer.expires_at(), created.created_at + Duration::seconds(600));
    }

    #[tokio::test]
    async fn filters_by_wallet() {
        let (store, _, _) = store();
        for wallet in ["0xAA", "0xbb"] {
            create_offer(
                &store,
                "s",
                Offer {
                    wallet: wallet.into(),
                    skill: "rust".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        let filter = OfferFilter {
            wallet: Some("0xaa".into()),
            ..Default::default()
        };
        let offers = list_offers(&store, &SpaceScope::one("s"), &filter).await.unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].wallet, "0xaa");
    }

    #[tokio::test]
    async fn oversized_ttl_is_capped() {
        let (store, _, _) = store();
        let created = create_offer(
            &store,
            "s",
            Offer {
                wallet: "0xaa".into(),
                skill: "rust".into(),
                ttl_seconds: 10_000_000_000_000_000,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let offer = get_offer(&store, &created.key).await.unwrap().unwrap();
        assert_eq!(offer.ttl_seconds, MAX_LISTING_TTL);
        assert_eq!(offer.effective_status(store.now()), OfferStatus::Active);
    }
}
