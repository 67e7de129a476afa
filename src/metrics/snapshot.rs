//! Point-in-time perf snapshots persisted to the ledger.

use crate::arkiv::LedgerError;
use crate::clock::Clock;
use crate::entities::metrics::{create_perf_snapshot, list_perf_snapshots, PerfSnapshotRecord};
use crate::entities::{SpaceScope, Store};
use crate::metrics::perf::{aggregate, summarize, PerfSampleStore, SampleFilter, PAGE_LOAD_OPERATION};
use crate::metrics::seed::{PerfOperation, PerfSeeder};
use crate::types::PerfMethod;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("a {operation} snapshot was taken recently; retry in {retry_after_secs}s")]
    TooSoon {
        operation: String,
        retry_after_secs: u64,
    },
    #[error("snapshot write conflicted: {0}")]
    Conflict(String),
    #[error("unknown perf operation: {0}")]
    UnknownOperation(String),
    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<LedgerError> for SnapshotError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Pending => Self::Conflict("previous transaction still pending".into()),
            LedgerError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Ledger(other),
        }
    }
}

/// A persisted snapshot with its ledger coordinates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResult {
    pub key: String,
    pub tx_hash: String,
    #[serde(flatten)]
    pub record: PerfSnapshotRecord,
}

pub struct Snapshotter {
    store: Store,
    seeder: Arc<PerfSeeder>,
    samples: Arc<PerfSampleStore>,
    clock: Arc<dyn Clock>,
    min_interval: Duration,
    space: String,
    last: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Snapshotter {
    pub fn new(
        store: Store,
        seeder: Arc<PerfSeeder>,
        samples: Arc<PerfSampleStore>,
        min_interval: Duration,
        space: &str,
    ) -> Self {
        Self {
            clock: store.clock().clone(),
            store,
            seeder,
            samples,
            min_interval,
            space: space.to_string(),
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn space(&self) -> &str {
        &self.space
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Recent snapshots in this snapshotter's space, newest first.
    pub async fn recent(
        &self,
        operation: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PerfSnapshotRecord>, LedgerError> {
        list_perf_snapshots(&self.store, &SpaceScope::one(&self.space), operation, Some(limit)).await
    }

    /// Measure `operation` over the selected paths and persist the aggregate.
    ///
    /// Refuses with [`SnapshotError::TooSoon`] while the newest snapshot for
    /// the operation is younger than the minimum interval, unless `force`.
    pub async fn snapshot(
        &self,
        operation: &str,
        method: PerfMethod,
        include_page_load: bool,
        force: bool,
    ) -> Result<SnapshotResult, SnapshotError> {
        let op: PerfOperation = operation
            .parse()
            .map_err(|_| SnapshotError::UnknownOperation(operation.to_string()))?;
        let now = self.clock.now();

        // The in-memory slot is taken before any await so concurrent
        // requests for the same operation cannot both pass the gate.
        let previous = if force {
            self.lock().insert(op.as_str().to_string(), now)
        } else {
            self.reserve(op, now)?
        };
        if !force {
            if let Err(e) = self.check_persisted(op, now).await {
                self.release(op, previous);
                return Err(e);
            }
        }

        match self.measure_and_persist(op, method, include_page_load, now).await {
            Ok(result) => {
                info!("Wrote {} perf snapshot {} (tx {})", op, result.key, result.tx_hash);
                Ok(result)
            }
            Err(e) => {
                self.release(op, previous);
                Err(e)
            }
        }
    }

    fn reserve(
        &self,
        op: PerfOperation,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, SnapshotError> {
        let mut last = self.lock();
        if let Some(at) = last.get(op.as_str()) {
            self.gate(op, *at, now)?;
        }
        Ok(last.insert(op.as_str().to_string(), now))
    }

    /// Put back whatever the slot held before a failed attempt.
    fn release(&self, op: PerfOperation, previous: Option<DateTime<Utc>>) {
        let mut last = self.lock();
        match previous {
            Some(at) => last.insert(op.as_str().to_string(), at),
            None => last.remove(op.as_str()),
        };
    }

    /// Check the newest snapshot on the ledger, which other instances share.
    async fn check_persisted(&self, op: PerfOperation, now: DateTime<Utc>) -> Result<(), SnapshotError> {
        match self.recent(Some(op.as_str()), 1).await {
            Ok(snapshots) => match snapshots.first() {
                Some(s) => self.gate(op, s.timestamp, now),
                None => Ok(()),
            },
            Err(e) => {
                warn!("Could not read last {} snapshot: {}", op, e);
                Ok(())
            }
        }
    }

    fn gate(&self, op: PerfOperation, last: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), SnapshotError> {
        let elapsed = now - last;
        if elapsed < self.min_interval {
            let remaining = (self.min_interval - elapsed).num_seconds().max(1);
            return Err(SnapshotError::TooSoon {
                operation: op.as_str().to_string(),
                retry_after_secs: remaining as u64,
            });
        }
        Ok(())
    }

    async fn measure_and_persist(
        &self,
        op: PerfOperation,
        method: PerfMethod,
        include_page_load: bool,
        now: DateTime<Utc>,
    ) -> Result<SnapshotResult, SnapshotError> {
        let measured = self.seeder.seed(&[op], method).await;
        let summary = summarize(&measured, Some(op.as_str()));

        let page_load = if include_page_load {
            let loads = self.samples.query(&SampleFilter {
                operation: Some(PAGE_LOAD_OPERATION.to_string()),
                ..Default::default()
            });
            aggregate(&loads)
        } else {
            None
        };

        let record = PerfSnapshotRecord {
            meta: Default::default(),
            operation: op.as_str().to_string(),
            method,
            timestamp: now,
            arkiv: summary.arkiv,
            graphql: summary.graphql,
            page_load,
        };
        let created = create_perf_snapshot(&self.store, &self.space, &record).await?;
        Ok(SnapshotResult {
            key: created.key,
            tx_hash: created.tx_hash,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arkiv::{BlockInfo, CreateReceipt, Entity, Ledger, MemoryLedger, Query, SignedCreate, TxReceipt};
    use crate::clock::ManualClock;
    use crate::entities::testing::{start, store};
    use crate::identity::SigningWallet;
    use crate::metrics::perf::NewPerfSample;
    use async_trait::async_trait;
    use crate::types::PerfSource;

    fn snapshotter(store: Store) -> Snapshotter {
        let samples = Arc::new(PerfSampleStore::new(100, store.clock().clone()));
        let seeder = Arc::new(PerfSeeder::new(store.clone(), None, samples.clone(), vec!["s".into()]));
        Snapshotter::new(store, seeder, samples, Duration::minutes(5), "s")
    }

    #[tokio::test]
    async fn second_snapshot_within_interval_is_refused() {
        let (store, _, clock) = store();
        let snap = snapshotter(store);

        let first = snap.snapshot("listAsks", PerfMethod::Arkiv, false, false).await.unwrap();
        assert_eq!(first.record.operation, "listAsks");
        assert_eq!(first.record.arkiv.as_ref().map(|s| s.samples), Some(1));
        assert!(first.record.graphql.is_none());

        clock.advance(Duration::minutes(2));
        match snap.snapshot("listAsks", PerfMethod::Arkiv, false, false).await {
            Err(SnapshotError::TooSoon { retry_after_secs, .. }) => assert_eq!(retry_after_secs, 180),
            other => panic!("expected TooSoon, got {other:?}"),
        }

        // Other operations have their own gate.
        snap.snapshot("listOffers", PerfMethod::Arkiv, false, false).await.unwrap();
        // Forcing skips the gate.
        snap.snapshot("listAsks", PerfMethod::Arkiv, false, true).await.unwrap();

        clock.advance(Duration::minutes(6));
        snap.snapshot("listAsks", PerfMethod::Arkiv, false, false).await.unwrap();
    }

    #[tokio::test]
    async fn gate_sees_snapshots_persisted_by_another_instance() {
        let (store, _, clock) = store();
        snapshotter(store.clone())
            .snapshot("network", PerfMethod::Arkiv, false, false)
            .await
            .unwrap();

        clock.advance(Duration::minutes(1));
        let fresh = snapshotter(store);
        let err = fresh.snapshot("network", PerfMethod::Arkiv, false, false).await.unwrap_err();
        assert!(matches!(err, SnapshotError::TooSoon { .. }));
    }

    /// Yields before every query, like a remote node would.
    struct YieldingLedger(Arc<MemoryLedger>);

    #[async_trait]
    impl Ledger for YieldingLedger {
        async fn query(&self, query: &Query) -> Result<Vec<Entity>, LedgerError> {
            tokio::task::yield_now().await;
            self.0.query(query).await
        }

        async fn create_entity(&self, request: &SignedCreate) -> Result<CreateReceipt, LedgerError> {
            self.0.create_entity(request).await
        }

        async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, LedgerError> {
            self.0.transaction_receipt(tx_hash).await
        }

        async fn block(&self, number: u64) -> Result<Option<BlockInfo>, LedgerError> {
            self.0.block(number).await
        }

        async fn block_number(&self) -> Result<u64, LedgerError> {
            self.0.block_number().await
        }

        async fn chain_id(&self) -> Result<u64, LedgerError> {
            self.0.chain_id().await
        }
    }

    #[tokio::test]
    async fn concurrent_requests_for_one_operation_take_one_slot() {
        let ledger = Arc::new(YieldingLedger(Arc::new(MemoryLedger::new())));
        let store = Store::new(
            ledger,
            Arc::new(SigningWallet::ephemeral()),
            Arc::new(ManualClock::new(start())),
        );
        let snap = snapshotter(store);

        let (a, b) = tokio::join!(
            snap.snapshot("listAsks", PerfMethod::Arkiv, false, false),
            snap.snapshot("listAsks", PerfMethod::Arkiv, false, false),
        );
        let refused = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(SnapshotError::TooSoon { .. })))
            .count();
        assert_eq!(refused, 1, "{a:?} / {b:?}");
        assert_eq!(snap.recent(Some("listAsks"), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_write_frees_the_slot() {
        let (store, ledger, _) = store();
        let snap = snapshotter(store);
        ledger.fail_kind("perf_snapshot");

        // The gate read fails too and is ignored; the write is what fails.
        assert!(snap.snapshot("listAsks", PerfMethod::Arkiv, false, false).await.is_err());
        ledger.heal_kind("perf_snapshot");
        snap.snapshot("listAsks", PerfMethod::Arkiv, false, false).await.unwrap();
    }

    #[tokio::test]
    async fn includes_page_loads_on_request() {
        let (store, _, _) = store();
        let snap = snapshotter(store);
        snap.samples.record(NewPerfSample {
            source: PerfSource::Arkiv,
            operation: PAGE_LOAD_OPERATION.into(),
            route: "/asks".into(),
            duration_ms: 420.0,
            payload_bytes: 0,
            http_requests: 0,
            created_at: None,
        });

        let result = snap.snapshot("listAsks", PerfMethod::Arkiv, true, false).await.unwrap();
        assert_eq!(result.record.page_load.unwrap().avg_duration_ms, 420.0);
        let stored = snap.recent(Some("listAsks"), 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].meta.key, result.key);
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected() {
        let (store, _, _) = store();
        let err = snapshotter(store)
            .snapshot("listEverything", PerfMethod::Both, false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::UnknownOperation(_)));
    }

    #[test]
    fn pending_and_conflict_map_to_conflict() {
        assert!(matches!(SnapshotError::from(LedgerError::Pending), SnapshotError::Conflict(_)));
        assert!(matches!(
            SnapshotError::from(LedgerError::Conflict("nonce".into())),
            SnapshotError::Conflict(_)
        ));
        assert!(matches!(
            SnapshotError::from(LedgerError::Unavailable("x".into())),
            SnapshotError::Ledger(_)
        ));
    }
}
