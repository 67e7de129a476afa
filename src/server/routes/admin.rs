use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::{body, page_limit, params, parse_opt};
use crate::entities::metrics::{create_dx_metric, DxMetric};
use crate::metrics::{summarize, NewPerfSample, PerfOperation, SampleFilter};
use crate::server::{ApiError, AppState};
use crate::types::{PerfMethod, PerfSource};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplesQuery {
    pub source: Option<String>,
    pub operation: Option<String>,
    pub route: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub summary: bool,
    pub summary_operation: Option<String>,
    #[serde(default)]
    pub seed: bool,
    pub method: Option<String>,
}

/// GET /api/admin/perf-samples: list samples, or their summary
pub async fn list_samples(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SamplesQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let q = params(query)?;
    let source: Option<PerfSource> = parse_opt("source", q.source.as_deref())?;

    if q.seed {
        let method: PerfMethod = parse_opt("method", q.method.as_deref())?.unwrap_or_default();
        let operations = match parse_opt::<PerfOperation>("operation", q.operation.as_deref())? {
            Some(op) => vec![op],
            None => PerfOperation::ALL.to_vec(),
        };
        let seeded = state.seeder.seed(&operations, method).await;
        info!("Seeded {} perf samples ({})", seeded.len(), method);
    }

    let filter = SampleFilter {
        source,
        operation: q.operation.clone().filter(|s| !s.is_empty()),
        route: q.route.clone().filter(|s| !s.is_empty()),
        since: q.since,
        limit: if q.summary { None } else { q.limit },
    };
    let samples = state.samples.query(&filter);

    if q.summary {
        let operation = q
            .summary_operation
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let summary = summarize(&samples, operation);
        return Ok(Json(json!(summary)));
    }

    Ok(Json(json!({
        "samples": samples,
        "count": samples.len(),
    })))
}

/// POST /api/admin/perf-samples: record one client-side sample
pub async fn record_sample(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewPerfSample>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let new = body(payload)?;
    if new.operation.trim().is_empty() {
        return Err(ApiError::BadRequest("operation is required".into()));
    }
    if !new.duration_ms.is_finite() || new.duration_ms < 0.0 {
        return Err(ApiError::BadRequest(
            "durationMs must be a non-negative number".into(),
        ));
    }

    let sample = state.samples.record(new);
    if let Some(space) = &state.persist_space {
        if let Err(e) = create_dx_metric(&state.store, space, &DxMetric::from_sample(&sample)).await {
            warn!("Failed to persist dx_metric {}: {}", sample.id, e);
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "sample": sample })),
    ))
}

/// DELETE /api/admin/perf-samples: clear the in-memory list
pub async fn clear_samples(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cleared = state.samples.clear();
    info!("Cleared {} perf samples", cleared);
    Json(json!({ "ok": true, "cleared": cleared }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotQuery {
    pub operation: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub include_page_load: bool,
    #[serde(default)]
    pub force: bool,
}

/// POST /api/admin/perf-snapshots: measure and persist a snapshot
pub async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SnapshotQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let q = params(query)?;
    let operation = q
        .operation
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(PerfOperation::ListAsks.as_str());
    let method: PerfMethod = parse_opt("method", q.method.as_deref())?.unwrap_or_default();

    let snapshot = state
        .snapshotter
        .snapshot(operation, method, q.include_page_load, q.force)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "snapshot": snapshot })),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotListQuery {
    pub operation: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/admin/perf-snapshots: recent snapshots, newest first
pub async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SnapshotListQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let q = params(query)?;
    let operation = q.operation.as_deref().filter(|s| !s.is_empty());
    let snapshots = state
        .snapshotter
        .recent(operation, page_limit(q.limit, 20, 200))
        .await?;
    let items: Vec<Value> = snapshots
        .iter()
        .map(|s| {
            let mut v = json!(s);
            if let Some(obj) = v.as_object_mut() {
                obj.insert("key".into(), json!(s.meta.key));
                obj.insert("txHash".into(), json!(s.meta.tx_hash));
            }
            v
        })
        .collect();

    Ok(Json(json!({ "snapshots": items, "count": items.len() })))
}

/// GET /api/admin/graphql-flags: which read paths use GraphQL
pub async fn graphql_flags(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "flags": state.flags,
        "summary": state.flags.summary(),
        "graphqlConfigured": state.seeder.has_graphql(),
    }))
}
