pub mod admin;
pub mod explorer;
pub mod market;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use std::str::FromStr;
use std::sync::Arc;

use super::{ApiError, AppState};

/// Build the application router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route(
            "/perf-samples",
            get(admin::list_samples)
                .post(admin::record_sample)
                .delete(admin::clear_samples),
        )
        .route(
            "/perf-snapshots",
            get(admin::list_snapshots).post(admin::create_snapshot),
        )
        .route("/graphql-flags", get(admin::graphql_flags));

    let explorer = Router::new()
        .route("/entities", get(explorer::search_entities))
        .route("/entities/{key}", get(explorer::get_entity))
        .route("/entities/{kind}/{key}/history", get(explorer::entity_history))
        .route("/profiles/{wallet}/history", get(explorer::profile_history))
        .route("/transactions", get(explorer::transactions))
        .route("/tx/{hash}", get(explorer::transaction))
        .route("/network", get(explorer::network));

    let market = Router::new()
        .route("/asks", get(market::list_asks).post(market::create_ask))
        .route("/offers", get(market::list_offers).post(market::create_offer))
        .route("/profile", get(market::get_profile).post(market::create_profile))
        .route("/skills", get(market::list_skills).post(market::create_skill))
        .route("/sessions", get(market::list_sessions).post(market::create_session))
        .route("/feedback", get(market::list_feedback).post(market::create_feedback))
        .route(
            "/learner-quests/progress",
            get(market::list_progress).post(market::record_progress),
        );

    Router::new()
        .nest("/api/admin", admin)
        .nest("/api/explorer", explorer)
        .nest("/api", market)
        .with_state(state)
}

/// Unwrap a JSON body, turning rejections into the API's error shape.
pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    Ok(payload?.0)
}

/// Unwrap query parameters, turning rejections into the API's error shape.
pub(crate) fn params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    Ok(query?.0)
}

/// Parse an optional string parameter.
pub(crate) fn parse_opt<T>(name: &str, raw: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e| ApiError::BadRequest(format!("invalid {name}: {e}"))),
    }
}

/// A required, non-blank string parameter.
pub(crate) fn required<'a>(name: &str, raw: Option<&'a str>) -> Result<&'a str, ApiError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))
}

/// Clamp a requested page size.
pub(crate) fn page_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max)
}
