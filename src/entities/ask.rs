//! Asks: what a learner wants to learn.

use crate::arkiv::entity::EntityMeta;
use crate::arkiv::query::QueryValue;
use crate::arkiv::LedgerError;
use crate::entities::{expiry, normalize_wallet, Created, Record, SpaceScope, Store};
use crate::types::{EntityKind, TxOperation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AskStatus {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ask {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub wallet: String,
    /// Free-text skill name.
    pub skill: String,
    #[serde(default, rename = "skill_id", skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    #[serde(default, rename = "skill_label", skip_serializing_if = "Option::is_none")]
    pub skill_label: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: AskStatus,
    #[serde(default)]
    pub ttl_seconds: u64,
}

impl Ask {
    pub fn expires_at(&self) -> DateTime<Utc> {
        expiry(self.meta.created_at, self.ttl_seconds)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Stored status, except that anything past its TTL reads as closed.
    pub fn effective_status(&self, now: DateTime<Utc>) -> AskStatus {
        if self.is_expired(now) {
            AskStatus::Closed
        } else {
            self.status
        }
    }

    /// Display name of the skill, preferring the taxonomy label.
    pub fn skill_name(&self) -> &str {
        self.skill_label.as_deref().unwrap_or(&self.skill)
    }
}

impl Record for Ask {
    const KIND: EntityKind = EntityKind::Ask;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        let mut attrs = vec![
            ("wallet", QueryValue::from(self.wallet.as_str())),
            ("skill", QueryValue::from(self.skill.as_str())),
            ("status", QueryValue::from(status_str(self.status))),
            ("ttlSeconds", QueryValue::from(self.ttl_seconds)),
        ];
        if let Some(id) = &self.skill_id {
            attrs.push(("skill_id", QueryValue::from(id)));
        }
        attrs
    }
}

fn status_str(status: AskStatus) -> &'static str {
    match status {
        AskStatus::Open => "open",
        AskStatus::Closed => "closed",
    }
}

/// Filters for [`list_asks`].
#[derive(Debug, Clone, Default)]
pub struct AskFilter {
    pub wallet: Option<String>,
    pub skill_id: Option<String>,
    /// Keep asks that are closed or past their TTL.
    pub include_closed: bool,
}

pub async fn list_asks(
    store: &Store,
    scope: &SpaceScope,
    filter: &AskFilter,
) -> Result<Vec<Ask>, LedgerError> {
    let mut filters = Vec::new();
    if let Some(wallet) = &filter.wallet {
        filters.push(("wallet", QueryValue::from(normalize_wallet(wallet))));
    }
    if let Some(skill_id) = &filter.skill_id {
        filters.push(("skill_id", QueryValue::from(skill_id)));
    }

    let mut asks: Vec<Ask> = store.list(scope, filters).await?;
    if !filter.include_closed {
        let now = store.now();
        asks.retain(|a| a.effective_status(now) == AskStatus::Open);
    }
    asks.sort_by(|a, b| b.meta.created_at.cmp(&a.meta.created_at));
    Ok(asks)
}

pub async fn get_ask(store: &Store, key: &str) -> Result<Option<Ask>, LedgerError> {
    store.get(key).await
}

/// Publish a new ask. A zero TTL takes the store's listing default.
pub async fn create_ask(store: &Store, space_id: &str, mut ask: Ask) -> Result<Created, LedgerError> {
    ask.wallet = normalize_wallet(&ask.wallet);
    ask.ttl_seconds = store.listing_lifetime(ask.ttl_seconds);
    let wallet = ask.wallet.clone();
    store
        .create_logged(space_id, &ask, ask.ttl_seconds, &wallet, TxOperation::Create)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::store;
    use crate::entities::MAX_LISTING_TTL;
    use chrono::Duration;

    #[tokio::test]
    async fn expired_asks_read_as_closed() {
        let (store, _, clock) = store();
        create_ask(
            &store,
            "s",
            Ask {
                wallet: "0xAB".into(),
                skill: "rust".into(),
                ttl_seconds: 60,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let scope = SpaceScope::one("s");
        let open = list_asks(&store, &scope, &AskFilter::default()).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].wallet, "0xab");

        clock.advance(Duration::seconds(61));
        let open = list_asks(&store, &scope, &AskFilter::default()).await.unwrap();
        assert!(open.is_empty());

        let all = list_asks(
            &store,
            &scope,
            &AskFilter {
                include_closed: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(all.len(), 1);
        // Stored status is untouched; only the effective status changes.
        assert_eq!(all[0].status, AskStatus::Open);
        assert_eq!(all[0].effective_status(store.now()), AskStatus::Closed);
    }

    #[tokio::test]
    async fn zero_ttl_uses_listing_default() {
        let (store, _, _) = store();
        let store = store.with_listing_ttl(120);
        let created = create_ask(
            &store,
            "s",
            Ask {
                wallet: "0x1".into(),
                skill: "go".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let ask = get_ask(&store, &created.key).await.unwrap().unwrap();
        assert_eq!(ask.ttl_seconds, 120);
    }

    #[tokio::test]
    async fn oversized_ttl_is_capped_and_stays_open() {
        let (store, _, _) = store();
        create_ask(
            &store,
            "s",
            Ask {
                wallet: "0x1".into(),
                skill: "go".into(),
                ttl_seconds: u64::MAX,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let open = list_asks(&store, &SpaceScope::one("s"), &AskFilter::default())
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].ttl_seconds, MAX_LISTING_TTL);
    }

    #[test]
    fn stored_huge_ttl_reads_without_panicking() {
        let ask = Ask {
            ttl_seconds: 10_000_000_000_000_000,
            ..Default::default()
        };
        assert_eq!(ask.expires_at(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(ask.effective_status(Utc::now()), AskStatus::Open);
    }
}
