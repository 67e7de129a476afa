//! Cross-space explorer index with a short-lived in-process cache.
//!
//! A build fans out one read per entity kind across every known space,
//! serializes the records to their public shape, reduces profiles to one
//! per wallet, and sorts everything newest first. The result is cached for
//! a fixed window; a request after expiry rebuilds it in full. There is no
//! single-flight guard: concurrent misses each rebuild and the last one
//! wins, which is harmless because builds have no side effects.

use crate::arkiv::LedgerError;
use crate::clock::Clock;
use crate::entities::ask::{list_asks, AskFilter};
use crate::entities::feedback::Feedback;
use crate::entities::lite::{list_lite_asks, list_lite_offers};
use crate::entities::offer::{list_offers, OfferFilter};
use crate::entities::profile::{canonical_profiles, list_profiles};
use crate::entities::quest::{
    list_for_wallet, list_learner_quests, AssessmentResult, Badge, QuestProgress, QuestTelemetry,
    Reflection, SkillLink,
};
use crate::entities::session::Session;
use crate::entities::skill::list_skills;
use crate::entities::{SpaceScope, Store};
use crate::explorer::serializers;
use crate::explorer::types::{ExplorerEntity, PublicEntity};
use crate::types::EntityKind;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("explorer index cache has been shut down")]
    ShutDown,
}

/// Per-kind totals. Asks and offers include their lite variants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerCounts {
    pub profiles: usize,
    pub asks: usize,
    pub offers: usize,
    pub skills: usize,
    pub lite_asks: usize,
    pub lite_offers: usize,
    pub sessions: usize,
    pub feedback: usize,
    pub learner_quests: usize,
    pub quest_progress: usize,
    pub assessment_results: usize,
    pub badges: usize,
    pub reflections: usize,
    pub skill_links: usize,
    pub quest_telemetry: usize,
    pub total: usize,
}

impl ExplorerCounts {
    pub fn tally(entities: &[ExplorerEntity]) -> Self {
        let mut c = Self::default();
        for e in entities {
            match &e.entity {
                PublicEntity::Profile(_) => c.profiles += 1,
                PublicEntity::Ask(_) => c.asks += 1,
                PublicEntity::Offer(_) => c.offers += 1,
                PublicEntity::Skill(_) => c.skills += 1,
                PublicEntity::LiteAsk(_) => {
                    c.lite_asks += 1;
                    c.asks += 1;
                }
                PublicEntity::LiteOffer(_) => {
                    c.lite_offers += 1;
                    c.offers += 1;
                }
                PublicEntity::Session(_) => c.sessions += 1,
                PublicEntity::Feedback(_) => c.feedback += 1,
                PublicEntity::LearnerQuest(_) => c.learner_quests += 1,
                PublicEntity::QuestProgress(_) => c.quest_progress += 1,
                PublicEntity::AssessmentResult(_) => c.assessment_results += 1,
                PublicEntity::Badge(_) => c.badges += 1,
                PublicEntity::Reflection(_) => c.reflections += 1,
                PublicEntity::SkillLink(_) => c.skill_links += 1,
                PublicEntity::QuestTelemetry(_) => c.quest_telemetry += 1,
            }
        }
        c.total = entities.len();
        c
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerIndex {
    /// Cache token; changes on every rebuild.
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub counts: ExplorerCounts,
    pub entities: Vec<ExplorerEntity>,
}

/// A page of search results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerPage {
    pub version: String,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub items: Vec<ExplorerEntity>,
}

impl ExplorerIndex {
    fn new(generated_at: DateTime<Utc>, entities: Vec<ExplorerEntity>) -> Self {
        Self {
            version: generated_at.timestamp_millis().to_string(),
            generated_at,
            counts: ExplorerCounts::tally(&entities),
            entities,
        }
    }

    /// The same index restricted to one space. Keeps the version token.
    pub fn for_space(&self, space_id: &str) -> Self {
        let entities: Vec<ExplorerEntity> = self
            .entities
            .iter()
            .filter(|e| e.entity.envelope().space_id == space_id)
            .cloned()
            .collect();
        Self {
            version: self.version.clone(),
            generated_at: self.generated_at,
            counts: ExplorerCounts::tally(&entities),
            entities,
        }
    }

    pub fn find(&self, key: &str) -> Option<&ExplorerEntity> {
        self.entities.iter().find(|e| e.entity.key() == key)
    }

    /// Filter by kind and a case-insensitive text query, then page.
    ///
    /// The text query matches title, summary, key and wallet.
    pub fn search(
        &self,
        kind: Option<EntityKind>,
        q: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> ExplorerPage {
        let needle = q.map(str::trim).filter(|q| !q.is_empty()).map(str::to_lowercase);
        let matching: Vec<&ExplorerEntity> = self
            .entities
            .iter()
            .filter(|e| kind.map_or(true, |k| e.entity.kind() == k))
            .filter(|e| match &needle {
                None => true,
                Some(n) => {
                    e.title.to_lowercase().contains(n)
                        || e.summary.to_lowercase().contains(n)
                        || e.entity.key().to_lowercase().contains(n)
                        || e.entity.wallet().is_some_and(|w| w.to_lowercase().contains(n))
                }
            })
            .collect();

        ExplorerPage {
            version: self.version.clone(),
            total: matching.len(),
            offset,
            limit,
            items: matching.into_iter().skip(offset).take(limit).cloned().collect(),
        }
    }
}

struct Cached {
    index: Arc<ExplorerIndex>,
    expires_at: DateTime<Utc>,
}

/// Process-wide explorer index cache, constructed explicitly and shared.
pub struct ExplorerIndexCache {
    store: Store,
    spaces: Vec<String>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<Cached>>,
    shut_down: AtomicBool,
}

impl ExplorerIndexCache {
    pub fn new(store: Store, spaces: Vec<String>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            spaces,
            ttl,
            clock,
            cached: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn spaces(&self) -> &[String] {
        &self.spaces
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Cached>> {
        self.cached.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The full index, or the slice of it for one space.
    ///
    /// Space-filtered requests never trigger a separate fetch; they filter
    /// the cached full index.
    pub async fn get_index(&self, space: Option<&str>) -> Result<Arc<ExplorerIndex>, IndexError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(IndexError::ShutDown);
        }

        let full = self.full_index().await;
        Ok(match space {
            Some(space) => Arc::new(full.for_space(space)),
            None => full,
        })
    }

    async fn full_index(&self) -> Arc<ExplorerIndex> {
        let now = self.clock.now();
        let hit = self
            .lock()
            .as_ref()
            .filter(|c| now < c.expires_at)
            .map(|c| c.index.clone());
        if let Some(index) = hit {
            debug!("Explorer index cache hit (version {})", index.version);
            return index;
        }

        debug!("Explorer index cache miss, rebuilding");
        let index = Arc::new(self.build_index().await);
        *self.lock() = Some(Cached {
            index: index.clone(),
            expires_at: self.clock.now() + self.ttl,
        });
        index
    }

    /// Drop the cached index so the next request rebuilds.
    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    /// Drop the cache and refuse further requests.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.invalidate();
        info!("Explorer index cache shut down");
    }

    /// Build a fresh index without touching the cache.
    pub async fn build_index(&self) -> ExplorerIndex {
        let store = &self.store;
        let scope = SpaceScope::Many(self.spaces.clone());
        let scope = &scope;
        let now = store.now();
        let ask_filter = AskFilter {
            include_closed: true,
            ..Default::default()
        };
        let offer_filter = OfferFilter {
            include_inactive: true,
            ..Default::default()
        };

        let (
            profiles,
            asks,
            offers,
            skills,
            lite_asks,
            lite_offers,
            sessions,
            feedback,
            quests,
            progress,
            assessments,
            badges,
            reflections,
            skill_links,
            telemetry,
        ) = tokio::join!(
            degrade(EntityKind::Profile, list_profiles(store, scope)),
            degrade(EntityKind::Ask, list_asks(store, scope, &ask_filter)),
            degrade(EntityKind::Offer, list_offers(store, scope, &offer_filter)),
            degrade(EntityKind::Skill, list_skills(store, scope, true)),
            self.per_space(EntityKind::LiteAsk, |space| list_lite_asks(store, space)),
            self.per_space(EntityKind::LiteOffer, |space| list_lite_offers(store, space)),
            degrade(EntityKind::Session, store.list::<Session>(scope, vec![])),
            degrade(EntityKind::Feedback, store.list::<Feedback>(scope, vec![])),
            degrade(EntityKind::LearnerQuest, list_learner_quests(store, scope)),
            degrade(EntityKind::QuestProgress, list_for_wallet::<QuestProgress>(store, scope, None)),
            degrade(EntityKind::AssessmentResult, list_for_wallet::<AssessmentResult>(store, scope, None)),
            degrade(EntityKind::Badge, list_for_wallet::<Badge>(store, scope, None)),
            degrade(EntityKind::Reflection, list_for_wallet::<Reflection>(store, scope, None)),
            degrade(EntityKind::SkillLink, list_for_wallet::<SkillLink>(store, scope, None)),
            degrade(EntityKind::QuestTelemetry, list_for_wallet::<QuestTelemetry>(store, scope, None)),
        );

        let mut public: Vec<PublicEntity> = Vec::new();
        public.extend(canonical_profiles(profiles).iter().map(serializers::profile));
        public.extend(asks.iter().map(|a| serializers::ask(a, now)));
        public.extend(offers.iter().map(|o| serializers::offer(o, now)));
        public.extend(skills.iter().map(serializers::skill));
        public.extend(lite_asks.iter().map(serializers::lite_ask));
        public.extend(lite_offers.iter().map(serializers::lite_offer));
        public.extend(sessions.iter().map(|s| serializers::session(s, now)));
        public.extend(feedback.iter().map(serializers::feedback));
        public.extend(quests.iter().map(serializers::learner_quest));
        public.extend(progress.iter().map(serializers::quest_progress));
        public.extend(assessments.iter().map(serializers::assessment_result));
        public.extend(badges.iter().map(serializers::badge));
        public.extend(reflections.iter().filter_map(serializers::reflection));
        public.extend(skill_links.iter().map(serializers::skill_link));
        public.extend(telemetry.iter().map(serializers::quest_telemetry));

        let mut entities: Vec<ExplorerEntity> =
            public.into_iter().map(serializers::explorer_entity).collect();
        entities.sort_by(|a, b| {
            b.entity
                .created_at()
                .cmp(&a.entity.created_at())
                .then_with(|| a.entity.key().cmp(b.entity.key()))
        });

        let index = ExplorerIndex::new(now, entities);
        info!(
            "Built explorer index: {} entities across {} spaces",
            index.counts.total,
            self.spaces.len()
        );
        index
    }

    /// One read per space for kinds without a multi-space query, flattened.
    async fn per_space<'a, T, F, Fut>(&'a self, kind: EntityKind, fetch: F) -> Vec<T>
    where
        F: Fn(&'a str) -> Fut,
        Fut: Future<Output = Result<Vec<T>, LedgerError>>,
    {
        let legs = self
            .spaces
            .iter()
            .map(|space| degrade(kind, fetch(space.as_str())));
        join_all(legs).await.into_iter().flatten().collect()
    }
}

/// Await one fan-out leg; a failure logs and yields nothing.
async fn degrade<T>(
    kind: EntityKind,
    fetch: impl Future<Output = Result<Vec<T>, LedgerError>>,
) -> Vec<T> {
    match fetch.await {
        Ok(records) => records,
        Err(e) => {
            warn!("Explorer: {} fetch failed, continuing without it: {}", kind, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ask::{create_ask, Ask};
    use crate::entities::lite::{create_lite_ask, LiteAsk};
    use crate::entities::testing::store;

    fn cache(store: Store, clock: Arc<dyn Clock>) -> ExplorerIndexCache {
        ExplorerIndexCache::new(
            store,
            vec!["a".into(), "b".into()],
            Duration::seconds(60),
            clock,
        )
    }

    fn ask(wallet: &str) -> Ask {
        Ask {
            wallet: wallet.into(),
            skill: "rust".into(),
            ttl_seconds: 3600,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn failing_kind_degrades_to_empty() {
        let (store, ledger, clock) = store();
        create_ask(&store, "a", ask("0x1")).await.unwrap();
        create_lite_ask(&store, "b", LiteAsk {
            name: "n".into(),
            skill: "go".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        ledger.fail_kind("ask");

        let cache = cache(store, clock);
        let index = cache.get_index(None).await.unwrap();
        assert_eq!(index.counts.asks, 1);
        assert_eq!(index.counts.lite_asks, 1);
    }

    #[tokio::test]
    async fn space_filter_reuses_cached_index() {
        let (store, ledger, clock) = store();
        create_ask(&store, "a", ask("0x1")).await.unwrap();
        create_ask(&store, "b", ask("0x2")).await.unwrap();
        let cache = cache(store, clock);

        let full = cache.get_index(None).await.unwrap();
        let queries = ledger.query_count();
        let only_b = cache.get_index(Some("b")).await.unwrap();

        assert_eq!(ledger.query_count(), queries);
        assert_eq!(full.counts.asks, 2);
        assert_eq!(only_b.counts.asks, 1);
        assert_eq!(only_b.version, full.version);
    }

    #[tokio::test]
    async fn search_filters_kind_and_text() {
        let (store, _, clock) = store();
        create_ask(&store, "a", ask("0xabc")).await.unwrap();
        create_ask(&store, "a", Ask {
            skill: "haskell".into(),
            ..ask("0xdef")
        })
        .await
        .unwrap();
        let cache = cache(store, clock);
        let index = cache.get_index(None).await.unwrap();

        let page = index.search(Some(EntityKind::Ask), Some("HASK"), 0, 10);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title, "Ask: haskell");

        let by_wallet = index.search(None, Some("0xabc"), 0, 10);
        assert_eq!(by_wallet.total, 1);

        let key = page.items[0].entity.key().to_string();
        assert!(index.find(&key).is_some());
    }

    #[tokio::test]
    async fn shutdown_refuses_requests() {
        let (store, _, clock) = store();
        let cache = cache(store, clock);
        cache.get_index(None).await.unwrap();
        cache.shutdown();
        assert!(matches!(cache.get_index(None).await, Err(IndexError::ShutDown)));
    }
}
