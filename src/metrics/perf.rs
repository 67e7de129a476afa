//! In-memory perf samples and their aggregation.
//!
//! Samples time matched operations over the two read paths (direct ledger
//! RPC and the GraphQL façade). The list is bounded and purely in-process;
//! clearing it never touches anything persisted on the ledger.

use crate::clock::Clock;
use crate::types::PerfSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Operation name client-side page-load samples are recorded under.
pub const PAGE_LOAD_OPERATION: &str = "pageLoad";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfSample {
    pub id: String,
    pub source: PerfSource,
    pub operation: String,
    #[serde(default)]
    pub route: String,
    pub duration_ms: f64,
    #[serde(default)]
    pub payload_bytes: u64,
    #[serde(default)]
    pub http_requests: u32,
    pub created_at: DateTime<Utc>,
}

/// A sample as submitted, before it gets an id and timestamp.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPerfSample {
    pub source: PerfSource,
    pub operation: String,
    #[serde(default)]
    pub route: String,
    pub duration_ms: f64,
    #[serde(default)]
    pub payload_bytes: u64,
    #[serde(default)]
    pub http_requests: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct SampleFilter {
    pub source: Option<PerfSource>,
    pub operation: Option<String>,
    pub route: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl SampleFilter {
    fn admits(&self, s: &PerfSample) -> bool {
        self.source.map_or(true, |src| s.source == src)
            && self.operation.as_deref().map_or(true, |op| s.operation == op)
            && self.route.as_deref().map_or(true, |r| s.route == r)
            && self.since.map_or(true, |t| s.created_at >= t)
    }
}

/// Bounded sample list; the oldest sample is dropped when full.
pub struct PerfSampleStore {
    samples: Mutex<VecDeque<PerfSample>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl PerfSampleStore {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            clock,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<PerfSample>> {
        self.samples.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, new: NewPerfSample) -> PerfSample {
        let sample = PerfSample {
            id: ulid::Ulid::new().to_string(),
            source: new.source,
            operation: new.operation,
            route: new.route,
            duration_ms: new.duration_ms.max(0.0),
            payload_bytes: new.payload_bytes,
            http_requests: new.http_requests,
            created_at: new.created_at.unwrap_or_else(|| self.clock.now()),
        };
        let mut samples = self.lock();
        while samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample.clone());
        sample
    }

    /// Matching samples, newest first.
    pub fn query(&self, filter: &SampleFilter) -> Vec<PerfSample> {
        let samples = self.lock();
        let matching = samples.iter().rev().filter(|s| filter.admits(s)).cloned();
        match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// Drop every sample, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut samples = self.lock();
        let n = samples.len();
        samples.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub samples: usize,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub avg_payload_bytes: f64,
    pub avg_http_requests: f64,
    /// Samples per route.
    pub routes: BTreeMap<String, usize>,
}

/// Min/avg/max and averages over a set of samples; `None` when empty.
///
/// Route counts accumulate across every sample given, so aggregating
/// several operations sums their per-route counts.
pub fn aggregate<'a, I>(samples: I) -> Option<SourceSummary>
where
    I: IntoIterator<Item = &'a PerfSample>,
{
    let mut n = 0usize;
    let mut total = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut payload = 0u64;
    let mut requests = 0u64;
    let mut routes: BTreeMap<String, usize> = BTreeMap::new();

    for s in samples {
        n += 1;
        total += s.duration_ms;
        min = min.min(s.duration_ms);
        max = max.max(s.duration_ms);
        payload += s.payload_bytes;
        requests += s.http_requests as u64;
        if !s.route.is_empty() {
            *routes.entry(s.route.clone()).or_default() += 1;
        }
    }

    if n == 0 {
        return None;
    }
    let count = n as f64;
    Some(SourceSummary {
        samples: n,
        avg_duration_ms: total / count,
        min_duration_ms: min,
        max_duration_ms: max,
        avg_payload_bytes: payload as f64 / count,
        avg_http_requests: requests as f64 / count,
        routes,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfSummary {
    /// `None` when summarizing every operation.
    pub operation: Option<String>,
    pub arkiv: Option<SourceSummary>,
    pub graphql: Option<SourceSummary>,
    pub page_load: Option<SourceSummary>,
}

/// Per-source summaries, optionally for one operation.
///
/// Page-load samples are summarized on their own and never mixed into the
/// per-source figures.
pub fn summarize(samples: &[PerfSample], operation: Option<&str>) -> PerfSummary {
    let data = |source: PerfSource| {
        aggregate(samples.iter().filter(|s| {
            s.source == source
                && s.operation != PAGE_LOAD_OPERATION
                && operation.map_or(true, |op| s.operation == op)
        }))
    };
    PerfSummary {
        operation: operation.map(str::to_string),
        arkiv: data(PerfSource::Arkiv),
        graphql: data(PerfSource::Graphql),
        page_load: aggregate(samples.iter().filter(|s| s.operation == PAGE_LOAD_OPERATION)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entities::testing::start;
    use chrono::Duration;

    fn new(source: PerfSource, op: &str, route: &str, ms: f64) -> NewPerfSample {
        NewPerfSample {
            source,
            operation: op.into(),
            route: route.into(),
            duration_ms: ms,
            payload_bytes: 100,
            http_requests: 1,
            created_at: None,
        }
    }

    fn store(capacity: usize) -> (PerfSampleStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        (PerfSampleStore::new(capacity, clock.clone()), clock)
    }

    #[test]
    fn aggregates_ten_twenty_thirty() {
        let (store, _) = store(10);
        for ms in [10.0, 20.0, 30.0] {
            store.record(new(PerfSource::Arkiv, "listAsks", "/api/asks", ms));
        }
        let samples = store.query(&SampleFilter::default());
        let s = aggregate(&samples).unwrap();
        assert_eq!(s.samples, 3);
        assert_eq!(s.avg_duration_ms, 20.0);
        assert_eq!(s.min_duration_ms, 10.0);
        assert_eq!(s.max_duration_ms, 30.0);
        assert_eq!(s.avg_payload_bytes, 100.0);
        assert_eq!(s.routes.get("/api/asks"), Some(&3));
    }

    #[test]
    fn empty_aggregate_is_none() {
        assert!(aggregate(&Vec::<PerfSample>::new()).is_none());
    }

    #[test]
    fn route_counts_sum_across_operations() {
        let (store, _) = store(10);
        store.record(new(PerfSource::Graphql, "listAsks", "/api/graphql", 5.0));
        store.record(new(PerfSource::Graphql, "listOffers", "/api/graphql", 7.0));
        store.record(new(PerfSource::Graphql, "listOffers", "/api/offers", 9.0));

        let summary = summarize(&store.query(&SampleFilter::default()), None);
        let g = summary.graphql.unwrap();
        assert_eq!(g.routes.get("/api/graphql"), Some(&2));
        assert_eq!(g.routes.get("/api/offers"), Some(&1));
        assert!(summary.arkiv.is_none());
    }

    #[test]
    fn summary_separates_sources_and_page_loads() {
        let (store, _) = store(10);
        store.record(new(PerfSource::Arkiv, "listAsks", "", 100.0));
        store.record(new(PerfSource::Graphql, "listAsks", "", 150.0));
        store.record(new(PerfSource::Arkiv, "listOffers", "", 999.0));
        store.record(new(PerfSource::Arkiv, PAGE_LOAD_OPERATION, "/asks", 800.0));

        let s = summarize(&store.query(&SampleFilter::default()), Some("listAsks"));
        assert_eq!(s.arkiv.unwrap().avg_duration_ms, 100.0);
        assert_eq!(s.graphql.unwrap().avg_duration_ms, 150.0);
        assert_eq!(s.page_load.unwrap().avg_duration_ms, 800.0);
    }

    #[test]
    fn bounded_and_newest_first() {
        let (store, clock) = store(2);
        for ms in [1.0, 2.0, 3.0] {
            store.record(new(PerfSource::Arkiv, "op", "", ms));
            clock.advance(Duration::seconds(1));
        }
        let samples = store.query(&SampleFilter::default());
        let durations: Vec<f64> = samples.iter().map(|s| s.duration_ms).collect();
        assert_eq!(durations, vec![3.0, 2.0]);

        let recent = store.query(&SampleFilter {
            since: Some(start() + Duration::seconds(2)),
            ..Default::default()
        });
        assert_eq!(recent.len(), 1);

        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
    }
}
