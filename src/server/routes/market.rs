//! Marketplace passthroughs: typed reads and signed writes over the
//! entity layer, with no caching.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{body, params, required};
use crate::entities::ask::{self, Ask, AskFilter};
use crate::entities::feedback::{self, average_rating, Feedback};
use crate::entities::offer::{self, Offer, OfferFilter};
use crate::entities::profile::{self, Profile};
use crate::entities::quest::{self, completed_steps, QuestProgress};
use crate::entities::session::{self, Session};
use crate::entities::skill::{self, Skill};
use crate::entities::{Created, Record, MAX_LISTING_TTL};
use crate::server::{ApiError, AppState};

/// A write body: the record plus an optional target space.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest<T> {
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(flatten)]
    pub record: T,
}

/// A record with its ledger envelope merged in.
fn with_meta<R: Record>(record: &R) -> Value {
    let mut value = json!(record);
    if let (Some(obj), Value::Object(meta)) = (value.as_object_mut(), json!(record.meta())) {
        obj.extend(meta);
    }
    value
}

fn many<R: Record>(records: &[R]) -> Vec<Value> {
    records.iter().map(with_meta).collect()
}

fn created(space_id: &str, c: Created) -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({
            "ok": true,
            "key": c.key,
            "txHash": c.tx_hash,
            "createdAt": c.created_at,
            "spaceId": space_id,
        })),
    )
}

/// Zero means the server default; anything above the cap is refused.
fn listing_ttl(ttl_seconds: u64) -> Result<(), ApiError> {
    if ttl_seconds > MAX_LISTING_TTL {
        return Err(ApiError::BadRequest(format!(
            "ttlSeconds must be at most {MAX_LISTING_TTL}"
        )));
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQuery {
    pub wallet: Option<String>,
    pub skill_id: Option<String>,
    pub space: Option<String>,
    /// Include closed asks / inactive offers.
    #[serde(default)]
    pub all: bool,
}

/// GET /api/asks
pub async fn list_asks(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListingQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let q = params(query)?;
    let filter = AskFilter {
        wallet: q.wallet.filter(|w| !w.trim().is_empty()),
        skill_id: q.skill_id.filter(|s| !s.is_empty()),
        include_closed: q.all,
    };
    let asks = ask::list_asks(&state.store, &state.scope(q.space.as_deref()), &filter).await?;
    Ok(Json(json!({ "asks": many(&asks), "count": asks.len() })))
}

/// POST /api/asks
pub async fn create_ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WriteRequest<Ask>>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let req = body(payload)?;
    required("wallet", Some(req.record.wallet.as_str()))?;
    required("skill", Some(req.record.skill.as_str()))?;
    listing_ttl(req.record.ttl_seconds)?;
    let space = state.write_space(req.space_id.as_deref()).to_string();
    let c = ask::create_ask(&state.store, &space, req.record).await?;
    Ok(created(&space, c))
}

/// GET /api/offers
pub async fn list_offers(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListingQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let q = params(query)?;
    let filter = OfferFilter {
        wallet: q.wallet.filter(|w| !w.trim().is_empty()),
        skill_id: q.skill_id.filter(|s| !s.is_empty()),
        include_inactive: q.all,
    };
    let offers = offer::list_offers(&state.store, &state.scope(q.space.as_deref()), &filter).await?;
    Ok(Json(json!({ "offers": many(&offers), "count": offers.len() })))
}

/// POST /api/offers
pub async fn create_offer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WriteRequest<Offer>>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let req = body(payload)?;
    required("wallet", Some(req.record.wallet.as_str()))?;
    required("skill", Some(req.record.skill.as_str()))?;
    listing_ttl(req.record.ttl_seconds)?;
    let space = state.write_space(req.space_id.as_deref()).to_string();
    let c = offer::create_offer(&state.store, &space, req.record).await?;
    Ok(created(&space, c))
}

#[derive(Debug, Default, Deserialize)]
pub struct WalletQuery {
    pub wallet: Option<String>,
    pub space: Option<String>,
}

/// GET /api/profile?wallet=: the canonical profile for a wallet
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    query: Result<Query<WalletQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let q = params(query)?;
    let wallet = required("wallet", q.wallet.as_deref())?;
    let scope = state.scope(q.space.as_deref());
    let found = profile::get_profile_by_wallet(&state.store, &scope, wallet)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no profile for {wallet}")))?;
    Ok(Json(json!({ "profile": with_meta(&found) })))
}

/// POST /api/profile: publish a new profile version
pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WriteRequest<Profile>>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let req = body(payload)?;
    required("wallet", Some(req.record.wallet.as_str()))?;
    let space = state.write_space(req.space_id.as_deref()).to_string();
    let c = profile::create_profile(&state.store, &space, req.record).await?;
    Ok(created(&space, c))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillsQuery {
    pub slug: Option<String>,
    pub space: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
}

/// GET /api/skills: the catalog, or one skill by slug
pub async fn list_skills(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SkillsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let q = params(query)?;
    let scope = state.scope(q.space.as_deref());
    if let Some(slug) = q.slug.as_deref().filter(|s| !s.is_empty()) {
        let found = skill::get_skill_by_slug(&state.store, &scope, slug)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("no skill with slug {slug}")))?;
        return Ok(Json(json!({ "skill": with_meta(&found) })));
    }
    let skills = skill::list_skills(&state.store, &scope, q.include_archived).await?;
    Ok(Json(json!({ "skills": many(&skills), "count": skills.len() })))
}

/// POST /api/skills
pub async fn create_skill(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WriteRequest<Skill>>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let req = body(payload)?;
    required("name_canonical", Some(req.record.name_canonical.as_str()))?;
    let space = state.write_space(req.space_id.as_deref()).to_string();
    let c = skill::create_skill(&state.store, &space, req.record).await?;
    Ok(created(&space, c))
}

/// GET /api/sessions?wallet=: sessions the wallet takes part in
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<WalletQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let q = params(query)?;
    let wallet = required("wallet", q.wallet.as_deref())?;
    let scope = state.scope(q.space.as_deref());
    let now = state.store.now();
    let sessions = session::list_sessions_for_wallet(&state.store, &scope, wallet).await?;
    let items: Vec<Value> = sessions
        .iter()
        .map(|s| {
            let mut v = with_meta(s);
            v["status"] = json!(s.effective_status(now));
            v
        })
        .collect();
    Ok(Json(json!({ "sessions": items, "count": items.len() })))
}

/// POST /api/sessions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WriteRequest<Session>>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let req = body(payload)?;
    required("mentorWallet", Some(req.record.mentor_wallet.as_str()))?;
    required("learnerWallet", Some(req.record.learner_wallet.as_str()))?;
    let space = state.write_space(req.space_id.as_deref()).to_string();
    let c = session::create_session(&state.store, &space, req.record).await?;
    Ok(created(&space, c))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackQuery {
    pub wallet: Option<String>,
    pub session_key: Option<String>,
    pub space: Option<String>,
}

/// GET /api/feedback: feedback received by a wallet, or left on a session
pub async fn list_feedback(
    State(state): State<Arc<AppState>>,
    query: Result<Query<FeedbackQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let q = params(query)?;
    let scope = state.scope(q.space.as_deref());
    let items = match (
        q.wallet.as_deref().filter(|w| !w.trim().is_empty()),
        q.session_key.as_deref().filter(|k| !k.is_empty()),
    ) {
        (Some(wallet), _) => feedback::list_feedback_for_wallet(&state.store, &scope, wallet).await?,
        (None, Some(key)) => feedback::list_feedback_for_session(&state.store, &scope, key).await?,
        (None, None) => {
            return Err(ApiError::BadRequest("wallet or sessionKey is required".into()));
        }
    };
    Ok(Json(json!({
        "feedback": many(&items),
        "count": items.len(),
        "averageRating": average_rating(&items),
    })))
}

/// POST /api/feedback
pub async fn create_feedback(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WriteRequest<Feedback>>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let req = body(payload)?;
    required("sessionKey", Some(req.record.session_key.as_str()))?;
    required("feedbackFrom", Some(req.record.feedback_from.as_str()))?;
    required("feedbackTo", Some(req.record.feedback_to.as_str()))?;
    if !(1..=5).contains(&req.record.rating) {
        return Err(ApiError::BadRequest("rating must be between 1 and 5".into()));
    }
    let space = state.write_space(req.space_id.as_deref()).to_string();
    let c = feedback::create_feedback(&state.store, &space, req.record).await?;
    Ok(created(&space, c))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    pub wallet: Option<String>,
    pub quest_id: Option<String>,
    pub space: Option<String>,
}

/// GET /api/learner-quests/progress?wallet=&questId=
pub async fn list_progress(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ProgressQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let q = params(query)?;
    let wallet = required("wallet", q.wallet.as_deref())?;
    let scope = state.scope(q.space.as_deref());
    let quest_id = q.quest_id.as_deref().filter(|s| !s.is_empty());
    let progress = quest::list_quest_progress(&state.store, &scope, wallet, quest_id).await?;
    Ok(Json(json!({
        "progress": many(&progress),
        "completedSteps": completed_steps(&progress),
    })))
}

/// POST /api/learner-quests/progress
pub async fn record_progress(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WriteRequest<QuestProgress>>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let req = body(payload)?;
    required("wallet", Some(req.record.wallet.as_str()))?;
    required("questId", Some(req.record.quest_id.as_str()))?;
    required("stepId", Some(req.record.step_id.as_str()))?;
    let space = state.write_space(req.space_id.as_deref()).to_string();
    let c = quest::create_for_wallet(&state.store, &space, req.record).await?;
    Ok(created(&space, c))
}
