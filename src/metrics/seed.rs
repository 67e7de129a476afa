//! Timed seeding of matched operations over both read paths.
//!
//! Each operation is run once untimed to warm connections and caches, then
//! once more under a timer. The timed call becomes one sample.

use crate::arkiv::GraphqlClient;
use crate::entities::ask::{list_asks, AskFilter};
use crate::entities::metrics::{create_dx_metric, DxMetric};
use crate::entities::offer::{list_offers, OfferFilter};
use crate::entities::profile::list_profiles;
use crate::entities::skill::list_skills;
use crate::entities::{SpaceScope, Store};
use crate::metrics::perf::{NewPerfSample, PerfSample, PerfSampleStore};
use crate::types::{PerfMethod, PerfSource};
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Rows requested from the GraphQL façade per call.
const GRAPHQL_LIMIT: usize = 100;

/// Operations timed on both paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PerfOperation {
    ListAsks,
    ListOffers,
    ListProfiles,
    Network,
}

impl PerfOperation {
    pub const ALL: [PerfOperation; 4] = [
        Self::ListAsks,
        Self::ListOffers,
        Self::ListProfiles,
        Self::Network,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListAsks => "listAsks",
            Self::ListOffers => "listOffers",
            Self::ListProfiles => "listProfiles",
            Self::Network => "network",
        }
    }

    /// API route the operation backs.
    pub fn route(self) -> &'static str {
        match self {
            Self::ListAsks => "/api/asks",
            Self::ListOffers => "/api/offers",
            Self::ListProfiles => "/api/profile",
            Self::Network => "/network",
        }
    }

    /// Round trips one direct-ledger run takes. The network view reads
    /// asks, offers and skills separately; GraphQL always takes one.
    fn ledger_requests(self) -> u32 {
        match self {
            Self::Network => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for PerfOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PerfOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown perf operation: {s}"))
    }
}

/// Runs matched operations and records their timings.
pub struct PerfSeeder {
    store: Store,
    graphql: Option<GraphqlClient>,
    samples: Arc<PerfSampleStore>,
    scope: SpaceScope,
    persist_space: Option<String>,
}

impl PerfSeeder {
    pub fn new(
        store: Store,
        graphql: Option<GraphqlClient>,
        samples: Arc<PerfSampleStore>,
        spaces: Vec<String>,
    ) -> Self {
        Self {
            store,
            graphql,
            samples,
            scope: SpaceScope::Many(spaces),
            persist_space: None,
        }
    }

    /// Also write every sample to `space_id` as a `dx_metric` entity.
    pub fn persisting_to(mut self, space_id: &str) -> Self {
        self.persist_space = Some(space_id.to_string());
        self
    }

    pub fn has_graphql(&self) -> bool {
        self.graphql.is_some()
    }

    /// Time each operation over the paths `method` selects.
    ///
    /// A path that fails or is not configured contributes no sample.
    pub async fn seed(&self, operations: &[PerfOperation], method: PerfMethod) -> Vec<PerfSample> {
        let mut recorded = Vec::new();
        for &op in operations {
            for source in [PerfSource::Arkiv, PerfSource::Graphql] {
                if !method.includes(source) {
                    continue;
                }
                if let Some(sample) = self.seed_one(op, source).await {
                    recorded.push(sample);
                }
            }
        }
        recorded
    }

    async fn seed_one(&self, op: PerfOperation, source: PerfSource) -> Option<PerfSample> {
        if source == PerfSource::Graphql && self.graphql.is_none() {
            warn!("GraphQL endpoint not configured; skipping {} over graphql", op);
            return None;
        }

        if let Err(e) = self.run(op, source).await {
            warn!("Warm-up {} over {} failed: {}", op, source, e);
            return None;
        }

        let started = Instant::now();
        let (payload_bytes, http_requests) = match self.run(op, source).await {
            Ok(measured) => measured,
            Err(e) => {
                warn!("Measured {} over {} failed: {}", op, source, e);
                return None;
            }
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let sample = self.samples.record(NewPerfSample {
            source,
            operation: op.as_str().to_string(),
            route: op.route().to_string(),
            duration_ms,
            payload_bytes,
            http_requests,
            created_at: None,
        });
        debug!("{} over {}: {:.1}ms, {} bytes", op, source, duration_ms, payload_bytes);

        if let Some(space) = &self.persist_space {
            if let Err(e) = create_dx_metric(&self.store, space, &DxMetric::from_sample(&sample)).await {
                warn!("Failed to persist dx_metric {}: {}", sample.id, e);
            }
        }
        Some(sample)
    }

    /// Run one operation, returning response size and request count.
    async fn run(&self, op: PerfOperation, source: PerfSource) -> Result<(u64, u32)> {
        match source {
            PerfSource::Arkiv => {
                let bytes = self.run_ledger(op).await?;
                Ok((bytes, op.ledger_requests()))
            }
            PerfSource::Graphql => {
                let Some(client) = &self.graphql else {
                    anyhow::bail!("GraphQL endpoint not configured");
                };
                let resp = match op {
                    PerfOperation::ListAsks => client.list_asks(GRAPHQL_LIMIT).await?,
                    PerfOperation::ListOffers => client.list_offers(GRAPHQL_LIMIT).await?,
                    PerfOperation::ListProfiles => client.list_profiles(GRAPHQL_LIMIT).await?,
                    PerfOperation::Network => client.network_overview(GRAPHQL_LIMIT).await?,
                };
                Ok((resp.payload_bytes as u64, 1))
            }
        }
    }

    async fn run_ledger(&self, op: PerfOperation) -> Result<u64> {
        let store = &self.store;
        let scope = &self.scope;
        let bytes = match op {
            PerfOperation::ListAsks => {
                encoded_len(&list_asks(store, scope, &AskFilter::default()).await?)?
            }
            PerfOperation::ListOffers => {
                encoded_len(&list_offers(store, scope, &OfferFilter::default()).await?)?
            }
            PerfOperation::ListProfiles => encoded_len(&list_profiles(store, scope).await?)?,
            PerfOperation::Network => {
                let ask_filter = AskFilter::default();
                let offer_filter = OfferFilter::default();
                let (asks, offers, skills) = futures::try_join!(
                    list_asks(store, scope, &ask_filter),
                    list_offers(store, scope, &offer_filter),
                    list_skills(store, scope, false),
                )?;
                encoded_len(&asks)? + encoded_len(&offers)? + encoded_len(&skills)?
            }
        };
        Ok(bytes)
    }
}

fn encoded_len<T: Serialize>(value: &T) -> Result<u64> {
    Ok(serde_json::to_vec(value)?.len() as u64)
}
