//! Performance records written by the admin instrumentation.

use crate::arkiv::entity::EntityMeta;
use crate::arkiv::query::QueryValue;
use crate::arkiv::LedgerError;
use crate::entities::{Created, Record, SpaceScope, Store, PERMANENT_BTL};
use crate::metrics::perf::{PerfSample, SourceSummary};
use crate::types::{EntityKind, PerfMethod, PerfSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted perf sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DxMetric {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub sample_id: String,
    pub source: PerfSource,
    pub operation: String,
    #[serde(default)]
    pub route: String,
    pub duration_ms: f64,
    #[serde(default)]
    pub payload_bytes: u64,
    #[serde(default)]
    pub http_requests: u32,
    pub measured_at: DateTime<Utc>,
}

impl DxMetric {
    pub fn from_sample(sample: &PerfSample) -> Self {
        Self {
            meta: EntityMeta::default(),
            sample_id: sample.id.clone(),
            source: sample.source,
            operation: sample.operation.clone(),
            route: sample.route.clone(),
            duration_ms: sample.duration_ms,
            payload_bytes: sample.payload_bytes,
            http_requests: sample.http_requests,
            measured_at: sample.created_at,
        }
    }
}

impl Record for DxMetric {
    const KIND: EntityKind = EntityKind::DxMetric;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        vec![
            ("source", QueryValue::from(self.source.to_string())),
            ("operation", QueryValue::from(self.operation.as_str())),
        ]
    }
}

/// A point-in-time aggregate of both access paths for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfSnapshotRecord {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub operation: String,
    pub method: PerfMethod,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arkiv: Option<SourceSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql: Option<SourceSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_load: Option<SourceSummary>,
}

impl Record for PerfSnapshotRecord {
    const KIND: EntityKind = EntityKind::PerfSnapshot;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        vec![
            ("operation", QueryValue::from(self.operation.as_str())),
            ("method", QueryValue::from(self.method.to_string())),
        ]
    }
}

pub async fn create_dx_metric(
    store: &Store,
    space_id: &str,
    metric: &DxMetric,
) -> Result<Created, LedgerError> {
    store.create(space_id, metric, PERMANENT_BTL).await
}

pub async fn list_dx_metrics(
    store: &Store,
    scope: &SpaceScope,
    operation: Option<&str>,
) -> Result<Vec<DxMetric>, LedgerError> {
    let filters = operation
        .map(|op| vec![("operation", QueryValue::from(op))])
        .unwrap_or_default();
    let mut metrics: Vec<DxMetric> = store.list(scope, filters).await?;
    metrics.sort_by(|a, b| b.measured_at.cmp(&a.measured_at));
    Ok(metrics)
}

pub async fn create_perf_snapshot(
    store: &Store,
    space_id: &str,
    snapshot: &PerfSnapshotRecord,
) -> Result<Created, LedgerError> {
    store.create(space_id, snapshot, PERMANENT_BTL).await
}

/// Snapshots newest first, optionally for one operation.
pub async fn list_perf_snapshots(
    store: &Store,
    scope: &SpaceScope,
    operation: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<PerfSnapshotRecord>, LedgerError> {
    let filters = operation
        .map(|op| vec![("operation", QueryValue::from(op))])
        .unwrap_or_default();
    let mut snapshots: Vec<PerfSnapshotRecord> = store.list(scope, filters).await?;
    snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    if let Some(limit) = limit {
        snapshots.truncate(limit);
    }
    Ok(snapshots)
}
