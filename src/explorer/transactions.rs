//! Human-readable write history reconstructed from ledger records.
//!
//! Profiles are append-only, so their history is simply every stored
//! version. Asks, offers and skills keep a `<entity>_txhash` log keyed by
//! entity. Global history reads the unified `tx_event` log from each space.

use crate::arkiv::LedgerError;
use crate::entities::profile::list_profiles_for_wallet;
use crate::entities::txlog::{list_tx_events, read_txhash_logs, TxEvent};
use crate::entities::{normalize_wallet, SpaceScope, Store};
use crate::explorer::tx_meta::{TxMetadata, TxMetadataCache};
use crate::types::{EntityKind, TxOperation, TxStatus};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// One row of reconstructed history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub entity_type: EntityKind,
    pub entity_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
    pub operation: TxOperation,
    pub space_id: String,
    pub created_at: DateTime<Utc>,
    pub block_number: Option<u64>,
    pub block_timestamp: Option<DateTime<Utc>>,
    pub status: Option<TxStatus>,
}

impl TransactionRecord {
    fn with_metadata(mut self, metadata: Option<TxMetadata>) -> Self {
        if let Some(m) = metadata {
            self.block_number = m.block_number;
            self.block_timestamp = m.block_timestamp;
            self.status = Some(m.status);
        }
        self
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("{0} entities have no transaction log")]
    Unsupported(EntityKind),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("malformed cursor: {0}")]
    Malformed(String),
    #[error("unsupported cursor version {0}")]
    UnsupportedVersion(u32),
}

/// Opaque pagination position. Clients get it base64url-encoded and must
/// not look inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub v: u32,
    pub index: usize,
}

impl PageCursor {
    pub const VERSION: u32 = 1;

    pub fn new(index: usize) -> Self {
        Self {
            v: Self::VERSION,
            index,
        }
    }

    pub fn encode(&self) -> String {
        // Serializing two integers cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|e| CursorError::Malformed(e.to_string()))?;
        let cursor: PageCursor =
            serde_json::from_slice(&bytes).map_err(|e| CursorError::Malformed(e.to_string()))?;
        if cursor.v != Self::VERSION {
            return Err(CursorError::UnsupportedVersion(cursor.v));
        }
        Ok(cursor)
    }
}

/// Label a newest-first list: the oldest row is the create.
fn label_operations(rows: &mut [TransactionRecord]) {
    let last = rows.len().saturating_sub(1);
    for (i, row) in rows.iter_mut().enumerate() {
        row.operation = if i == last {
            TxOperation::Create
        } else {
            TxOperation::Update
        };
    }
}

async fn attach_metadata(
    tx_meta: &TxMetadataCache,
    rows: Vec<TransactionRecord>,
) -> Vec<TransactionRecord> {
    let lookups = rows.iter().map(|r| tx_meta.get(&r.tx_hash));
    let metadata = join_all(lookups).await;
    rows.into_iter()
        .zip(metadata)
        .map(|(row, m)| row.with_metadata(m))
        .collect()
}

/// Every stored profile version for a wallet, newest first.
pub async fn profile_history(
    store: &Store,
    tx_meta: &TxMetadataCache,
    wallet: &str,
    scope: &SpaceScope,
) -> Result<Vec<TransactionRecord>, LedgerError> {
    let wallet = normalize_wallet(wallet);
    let profiles = list_profiles_for_wallet(store, scope, &wallet).await?;

    let mut rows: Vec<TransactionRecord> = profiles
        .into_iter()
        .filter_map(|p| {
            let tx_hash = p.meta.tx_hash?;
            Some(TransactionRecord {
                tx_hash,
                entity_type: EntityKind::Profile,
                entity_key: p.meta.key,
                wallet: Some(wallet.clone()),
                operation: TxOperation::Update,
                space_id: p.meta.space_id,
                created_at: p.meta.created_at,
                block_number: None,
                block_timestamp: None,
                status: None,
            })
        })
        .collect();
    label_operations(&mut rows);
    Ok(attach_metadata(tx_meta, rows).await)
}

/// History of one ask, offer or skill from its txhash log, newest first.
pub async fn entity_history(
    store: &Store,
    tx_meta: &TxMetadataCache,
    kind: EntityKind,
    entity_key: &str,
) -> Result<Vec<TransactionRecord>, HistoryError> {
    let log_kind = kind.txhash_log().ok_or(HistoryError::Unsupported(kind))?;
    let mut entries = read_txhash_logs(store, log_kind, entity_key).await?;
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.log_key.cmp(&b.log_key))
    });

    let mut rows: Vec<TransactionRecord> = entries
        .into_iter()
        .map(|e| TransactionRecord {
            tx_hash: e.tx_hash,
            entity_type: kind,
            entity_key: entity_key.to_string(),
            wallet: None,
            operation: TxOperation::Update,
            space_id: e.space_id,
            created_at: e.created_at,
            block_number: None,
            block_timestamp: None,
            status: None,
        })
        .collect();
    label_operations(&mut rows);
    Ok(attach_metadata(tx_meta, rows).await)
}

/// Filters for [`all_transactions`].
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub entity_type: Option<EntityKind>,
    pub wallet: Option<String>,
    pub tx_hash: Option<String>,
    pub entity_key: Option<String>,
    /// Applied within the page only.
    pub status: Option<TxStatus>,
    /// Applied within the page only.
    pub block_number: Option<u64>,
}

impl TransactionFilter {
    fn admits(&self, event: &TxEvent) -> bool {
        self.entity_type.map_or(true, |k| event.entity_type == k)
            && self
                .wallet
                .as_deref()
                .map_or(true, |w| event.wallet.eq_ignore_ascii_case(w.trim()))
            && self
                .tx_hash
                .as_deref()
                .map_or(true, |h| event.tx_hash.eq_ignore_ascii_case(h.trim()))
            && self
                .entity_key
                .as_deref()
                .map_or(true, |k| event.entity_key.eq_ignore_ascii_case(k.trim()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub transactions: Vec<TransactionRecord>,
    pub next_cursor: Option<String>,
    /// Matching events before the page-level status/block filters.
    pub total: usize,
}

/// Global write history across `spaces`, newest first, one page at a time.
///
/// Events recording a signer other than `signer` are dropped; events with
/// no recorded signer are kept. A space whose read fails contributes
/// nothing. Block metadata is fetched only for the returned page, and the
/// status and block-number filters run after paging, so a filtered page
/// can hold fewer than `limit` rows.
pub async fn all_transactions(
    store: &Store,
    tx_meta: &TxMetadataCache,
    spaces: &[String],
    signer: &str,
    filter: &TransactionFilter,
    cursor: Option<&str>,
    limit: usize,
) -> Result<TransactionPage, CursorError> {
    let start = match cursor {
        Some(raw) => PageCursor::decode(raw)?.index,
        None => 0,
    };

    let legs = spaces.iter().map(|space| async move {
        match list_tx_events(store, space).await {
            Ok(events) => events,
            Err(e) => {
                warn!("tx_event read for space {} failed: {}", space, e);
                Vec::new()
            }
        }
    });
    let mut events: Vec<TxEvent> = join_all(legs)
        .await
        .into_iter()
        .flatten()
        .filter(|e| e.signed_by(signer) && filter.admits(e))
        .collect();
    events.sort_by(|a, b| {
        b.meta
            .created_at
            .cmp(&a.meta.created_at)
            .then_with(|| a.meta.key.cmp(&b.meta.key))
    });

    let total = events.len();
    let end = start.saturating_add(limit).min(total);
    let page: Vec<TransactionRecord> = events
        .into_iter()
        .skip(start)
        .take(end.saturating_sub(start))
        .map(|e| TransactionRecord {
            wallet: (!e.wallet.is_empty()).then(|| e.wallet.clone()),
            tx_hash: e.tx_hash,
            entity_type: e.entity_type,
            entity_key: e.entity_key,
            operation: e.operation,
            space_id: e.meta.space_id,
            created_at: e.meta.created_at,
            block_number: None,
            block_timestamp: None,
            status: None,
        })
        .collect();
    let next_cursor = (end < total).then(|| PageCursor::new(end).encode());

    let transactions = attach_metadata(tx_meta, page)
        .await
        .into_iter()
        .filter(|r| filter.status.map_or(true, |s| r.status == Some(s)))
        .filter(|r| filter.block_number.map_or(true, |b| r.block_number == Some(b)))
        .collect();

    Ok(TransactionPage {
        transactions,
        next_cursor,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips_and_rejects_other_versions() {
        let c = PageCursor::new(40);
        assert_eq!(PageCursor::decode(&c.encode()).unwrap(), c);

        let v2 = URL_SAFE_NO_PAD.encode(br#"{"v":2,"index":40}"#);
        assert_eq!(PageCursor::decode(&v2), Err(CursorError::UnsupportedVersion(2)));
        assert!(matches!(PageCursor::decode("!!"), Err(CursorError::Malformed(_))));
    }

    #[test]
    fn oldest_row_is_the_create() {
        let row = |hash: &str| TransactionRecord {
            tx_hash: hash.into(),
            entity_type: EntityKind::Ask,
            entity_key: "k".into(),
            wallet: None,
            operation: TxOperation::Update,
            space_id: "s".into(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            block_number: None,
            block_timestamp: None,
            status: None,
        };
        let mut rows = vec![row("new"), row("mid"), row("old")];
        label_operations(&mut rows);
        let ops: Vec<_> = rows.iter().map(|r| r.operation).collect();
        assert_eq!(
            ops,
            vec![TxOperation::Update, TxOperation::Update, TxOperation::Create]
        );
    }
}
