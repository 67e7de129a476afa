//! Transaction hash to block/status metadata, cached by mutability.
//!
//! Confirmed transactions never change, so their metadata is kept for a
//! long window. Pending ones are kept briefly so the next poll sees the
//! confirmation. Entries are evicted lazily when looked up past expiry.

use crate::arkiv::{Ledger, LedgerError};
use crate::clock::Clock;
use crate::types::TxStatus;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMetadata {
    pub block_number: Option<u64>,
    pub block_timestamp: Option<DateTime<Utc>>,
    pub status: TxStatus,
}

impl TxMetadata {
    fn pending() -> Self {
        Self {
            block_number: None,
            block_timestamp: None,
            status: TxStatus::Pending,
        }
    }
}

struct Entry {
    metadata: TxMetadata,
    expires_at: DateTime<Utc>,
}

pub struct TxMetadataCache {
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    finalized_ttl: Duration,
    pending_ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl TxMetadataCache {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
        finalized_ttl: Duration,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            ledger,
            clock,
            finalized_ttl,
            pending_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Metadata for a transaction, or `None` when the lookup failed for a
    /// reason other than "not mined yet". Failures are not cached.
    pub async fn get(&self, tx_hash: &str) -> Option<TxMetadata> {
        let key = tx_hash.to_lowercase();
        let now = self.clock.now();
        {
            let mut entries = self.lock();
            match entries.get(&key) {
                Some(entry) if now < entry.expires_at => return Some(entry.metadata.clone()),
                Some(_) => {
                    entries.remove(&key);
                }
                None => {}
            }
        }

        let (metadata, ttl) = match self.ledger.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => {
                let status = if receipt.success {
                    TxStatus::Success
                } else {
                    TxStatus::Failed
                };
                let block_timestamp = match self.ledger.block(receipt.block_number).await {
                    Ok(block) => block.and_then(|b| DateTime::<Utc>::from_timestamp(b.timestamp, 0)),
                    Err(e) => {
                        debug!("Block {} lookup failed: {}", receipt.block_number, e);
                        None
                    }
                };
                let metadata = TxMetadata {
                    block_number: Some(receipt.block_number),
                    block_timestamp,
                    status,
                };
                (metadata, self.finalized_ttl)
            }
            Ok(None) | Err(LedgerError::Pending) => (TxMetadata::pending(), self.pending_ttl),
            Err(e) => {
                warn!("Transaction {} metadata lookup failed: {}", tx_hash, e);
                return None;
            }
        };

        self.lock().insert(
            key,
            Entry {
                metadata: metadata.clone(),
                expires_at: self.clock.now() + ttl,
            },
        );
        Some(metadata)
    }

    pub fn invalidate(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arkiv::{MemoryLedger, TxReceipt};
    use crate::clock::ManualClock;
    use crate::entities::testing::start;

    fn cache(ledger: Arc<MemoryLedger>, clock: Arc<ManualClock>) -> TxMetadataCache {
        TxMetadataCache::new(ledger, clock, Duration::hours(24), Duration::seconds(30))
    }

    #[tokio::test]
    async fn unknown_errors_are_not_cached() {
        let ledger = Arc::new(MemoryLedger::new());
        let clock = Arc::new(ManualClock::new(start()));
        ledger.set_receipt("0xbad", Err(LedgerError::Unavailable("down".into())));
        let cache = cache(ledger.clone(), clock);

        assert_eq!(cache.get("0xbad").await, None);
        assert!(cache.is_empty());
        assert_eq!(cache.get("0xbad").await, None);
        assert_eq!(ledger.receipt_lookup_count(), 2);
    }

    #[tokio::test]
    async fn pending_error_classifies_as_pending() {
        let ledger = Arc::new(MemoryLedger::new());
        let clock = Arc::new(ManualClock::new(start()));
        ledger.set_receipt("0xp", Err(LedgerError::Pending));
        let cache = cache(ledger, clock);

        let meta = cache.get("0xp").await.unwrap();
        assert_eq!(meta.status, TxStatus::Pending);
        assert_eq!(meta.block_number, None);
    }

    #[tokio::test]
    async fn failed_receipt_keeps_block_number() {
        let ledger = Arc::new(MemoryLedger::new());
        let clock = Arc::new(ManualClock::new(start()));
        ledger.set_receipt(
            "0xf",
            Ok(Some(TxReceipt {
                tx_hash: "0xf".into(),
                block_number: 99,
                success: false,
            })),
        );
        let cache = cache(ledger, clock);

        let meta = cache.get("0xf").await.unwrap();
        assert_eq!(meta.status, TxStatus::Failed);
        assert_eq!(meta.block_number, Some(99));
        // Block 99 does not exist; the receipt status still stands.
        assert_eq!(meta.block_timestamp, None);
    }
}
