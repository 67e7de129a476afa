//! Profiles, stored update-by-insert.
//!
//! Every edit publishes a new profile record; the canonical profile for a
//! wallet is the one with the latest `lastActiveTimestamp` (or `createdAt`
//! when that is missing). Older records stay on the ledger as history.

use crate::arkiv::entity::EntityMeta;
use crate::arkiv::query::QueryValue;
use crate::arkiv::LedgerError;
use crate::entities::{normalize_wallet, Created, Record, SpaceScope, Store, PERMANENT_BTL};
use crate::types::{EntityKind, TxOperation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub wallet: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio_short: Option<String>,
    /// Comma-separated skills, kept for older readers.
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub skills_array: Vec<String>,
    /// Skill name to expertise level (0-5).
    #[serde(default)]
    pub skill_expertise: BTreeMap<String, u8>,
    #[serde(default)]
    pub contact_links: ContactLinks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seniority: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_rating: Option<f64>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_timestamp: Option<DateTime<Utc>>,
}

impl Profile {
    /// Timestamp used to order versions of the same wallet's profile.
    pub fn activity_timestamp(&self) -> DateTime<Utc> {
        self.last_active_timestamp.unwrap_or(self.meta.created_at)
    }
}

impl Record for Profile {
    const KIND: EntityKind = EntityKind::Profile;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        let mut attrs = vec![
            ("wallet", QueryValue::from(self.wallet.as_str())),
            ("displayName", QueryValue::from(self.display_name.as_str())),
        ];
        if let Some(username) = &self.username {
            attrs.push(("username", QueryValue::from(username)));
        }
        attrs
    }
}

/// One wallet's canonical profile and how many records it has.
#[derive(Debug, Clone, PartialEq)]
pub struct Canonical<T> {
    pub record: T,
    pub version_count: usize,
}

/// Reduce records to the latest per wallet.
///
/// Records are grouped by lowercased wallet, ordered by `timestamp`
/// descending (entity key ascending on ties), and the first of each group
/// kept. Groups come back in first-seen order.
pub fn select_canonical<T, W, K>(records: Vec<T>, wallet: W, timestamp: K) -> Vec<Canonical<T>>
where
    W: Fn(&T) -> String,
    K: Fn(&T) -> (DateTime<Utc>, String),
{
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<T>> = HashMap::new();
    for record in records {
        let w = normalize_wallet(&wallet(&record));
        if !groups.contains_key(&w) {
            order.push(w.clone());
        }
        groups.entry(w).or_default().push(record);
    }

    order
        .into_iter()
        .filter_map(|w| {
            let mut group = groups.remove(&w)?;
            group.sort_by(|a, b| {
                let (ta, ka) = timestamp(a);
                let (tb, kb) = timestamp(b);
                tb.cmp(&ta).then(ka.cmp(&kb))
            });
            let version_count = group.len();
            let record = group.into_iter().next()?;
            Some(Canonical {
                record,
                version_count,
            })
        })
        .collect()
}

/// Every profile record in scope, all versions included.
pub async fn list_profiles(store: &Store, scope: &SpaceScope) -> Result<Vec<Profile>, LedgerError> {
    store.list(scope, vec![]).await
}

/// Every profile record for one wallet, newest first.
pub async fn list_profiles_for_wallet(
    store: &Store,
    scope: &SpaceScope,
    wallet: &str,
) -> Result<Vec<Profile>, LedgerError> {
    let mut profiles: Vec<Profile> = store
        .list(scope, vec![("wallet", QueryValue::from(normalize_wallet(wallet)))])
        .await?;
    profiles.sort_by(|a, b| {
        b.meta
            .created_at
            .cmp(&a.meta.created_at)
            .then(a.meta.key.cmp(&b.meta.key))
    });
    Ok(profiles)
}

/// The canonical profile for a wallet.
pub async fn get_profile_by_wallet(
    store: &Store,
    scope: &SpaceScope,
    wallet: &str,
) -> Result<Option<Profile>, LedgerError> {
    let profiles = list_profiles_for_wallet(store, scope, wallet).await?;
    Ok(canonical_profiles(profiles).into_iter().next().map(|c| c.record))
}

pub fn canonical_profiles(profiles: Vec<Profile>) -> Vec<Canonical<Profile>> {
    select_canonical(
        profiles,
        |p| p.wallet.clone(),
        |p| (p.activity_timestamp(), p.meta.key.clone()),
    )
}

/// Publish a profile version. The first record for a wallet is logged as a
/// create, later ones as updates.
pub async fn create_profile(
    store: &Store,
    space_id: &str,
    mut profile: Profile,
) -> Result<Created, LedgerError> {
    profile.wallet = normalize_wallet(&profile.wallet);
    if profile.last_active_timestamp.is_none() {
        profile.last_active_timestamp = Some(store.now());
    }
    if profile.skills.is_empty() && !profile.skills_array.is_empty() {
        profile.skills = profile.skills_array.join(", ");
    }

    let existing =
        list_profiles_for_wallet(store, &SpaceScope::one(space_id), &profile.wallet).await?;
    let operation = if existing.is_empty() {
        TxOperation::Create
    } else {
        TxOperation::Update
    };
    let wallet = profile.wallet.clone();
    store
        .create_logged(space_id, &profile, PERMANENT_BTL, &wallet, operation)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::store;
    use crate::entities::txlog::TxEvent;
    use chrono::Duration;

    fn profile(wallet: &str, name: &str) -> Profile {
        Profile {
            wallet: wallet.into(),
            display_name: name.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn canonical_is_latest_by_activity() {
        let (store, _, clock) = store();
        create_profile(&store, "s", profile("0xAA", "first")).await.unwrap();
        clock.advance(Duration::minutes(5));
        create_profile(&store, "s", profile("0xaa", "second")).await.unwrap();
        clock.advance(Duration::minutes(5));
        create_profile(&store, "s", profile("0xbb", "other")).await.unwrap();

        let scope = SpaceScope::one("s");
        let canonical = get_profile_by_wallet(&store, &scope, "0xAa").await.unwrap().unwrap();
        assert_eq!(canonical.display_name, "second");

        let all = list_profiles(&store, &scope).await.unwrap();
        let reduced = canonical_profiles(all);
        assert_eq!(reduced.len(), 2);
        let aa = reduced.iter().find(|c| c.record.wallet == "0xaa").unwrap();
        assert_eq!(aa.version_count, 2);
    }

    #[test]
    fn missing_activity_falls_back_to_created_at() {
        let t0 = crate::entities::testing::start();
        let mut old = profile("0x1", "old");
        old.meta.created_at = t0;
        old.meta.key = "0xa".into();
        old.last_active_timestamp = Some(t0 + Duration::hours(2));
        let mut new = profile("0x1", "new");
        new.meta.created_at = t0 + Duration::hours(1);
        new.meta.key = "0xb".into();

        let reduced = canonical_profiles(vec![new, old]);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].record.display_name, "old");
    }

    #[tokio::test]
    async fn second_version_is_logged_as_update() {
        let (store, _, clock) = store();
        create_profile(&store, "s", profile("0x1", "a")).await.unwrap();
        clock.advance(Duration::seconds(1));
        create_profile(&store, "s", profile("0x1", "b")).await.unwrap();

        let mut events: Vec<TxEvent> = store.list(&SpaceScope::one("s"), vec![]).await.unwrap();
        events.sort_by_key(|e| e.meta.created_at);
        let ops: Vec<_> = events.iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec![TxOperation::Create, TxOperation::Update]);
    }
}
