//! In-process ledger used by `serve --memory` and by tests.
//!
//! Entities are append-only, keys and transaction hashes are derived from
//! ULIDs, and every create mines one block. Receipts can be rewritten and
//! whole entity kinds made to fail so callers' degradation paths can be
//! exercised.

use crate::arkiv::client::{BlockInfo, CreateReceipt, Ledger, SignedCreate, TxReceipt};
use crate::arkiv::entity::{Entity, ATTR_TYPE};
use crate::arkiv::error::LedgerError;
use crate::arkiv::query::{Query, QueryValue};
use async_trait::async_trait;
use sha3::{Digest, Keccak256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Chain id reported by the in-memory ledger.
pub const MEMORY_CHAIN_ID: u64 = 60138453025;

#[derive(Debug, Default)]
struct State {
    entities: Vec<Entity>,
    receipts: HashMap<String, Result<Option<TxReceipt>, LedgerError>>,
    blocks: Vec<BlockInfo>,
    failing_kinds: HashSet<String>,
}

/// An append-only ledger held in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
    queries: AtomicUsize,
    receipt_lookups: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a fully-formed entity as-is, with a success receipt when it has a tx hash.
    pub fn insert(&self, entity: Entity) {
        let mut state = self.lock();
        if let Some(hash) = entity.tx_hash.clone() {
            let block = mine_block(&mut state);
            state.receipts.insert(
                hash.clone(),
                Ok(Some(TxReceipt {
                    tx_hash: hash,
                    block_number: block.number,
                    success: true,
                })),
            );
        }
        state.entities.push(entity);
    }

    /// Replace the receipt lookup result for a transaction.
    pub fn set_receipt(&self, tx_hash: &str, receipt: Result<Option<TxReceipt>, LedgerError>) {
        self.lock().receipts.insert(tx_hash.to_string(), receipt);
    }

    /// Forget a receipt so the transaction looks unmined.
    pub fn remove_receipt(&self, tx_hash: &str) {
        self.lock().receipts.remove(tx_hash);
    }

    /// Make every query for `kind` fail with `Unavailable`.
    pub fn fail_kind(&self, kind: &str) {
        self.lock().failing_kinds.insert(kind.to_string());
    }

    pub fn heal_kind(&self, kind: &str) {
        self.lock().failing_kinds.remove(kind);
    }

    pub fn entity_count(&self) -> usize {
        self.lock().entities.len()
    }

    /// Number of `query` calls served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    /// Number of `transaction_receipt` calls served so far.
    pub fn receipt_lookup_count(&self) -> usize {
        self.receipt_lookups.load(Ordering::Relaxed)
    }
}

fn mine_block(state: &mut State) -> BlockInfo {
    let number = state.blocks.len() as u64 + 1;
    let block = BlockInfo {
        number,
        timestamp: chrono::Utc::now().timestamp(),
    };
    state.blocks.push(block);
    block
}

fn random_hash(salt: &str) -> String {
    let seed = format!("{}:{}", ulid::Ulid::new(), salt);
    format!("0x{}", hex::encode(Keccak256::digest(seed.as_bytes())))
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn query(&self, query: &Query) -> Result<Vec<Entity>, LedgerError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let state = self.lock();

        let kind = query.predicates().iter().find_map(|p| match &p.value {
            QueryValue::Str(v) if p.attribute == ATTR_TYPE => Some(v.as_str()),
            _ => None,
        });
        if let Some(kind) = kind {
            if state.failing_kinds.contains(kind) {
                return Err(LedgerError::Unavailable(format!("{kind} queries are failing")));
            }
        }

        let mut hits: Vec<Entity> = state
            .entities
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        if let Some(limit) = query.max_results() {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    async fn create_entity(&self, request: &SignedCreate) -> Result<CreateReceipt, LedgerError> {
        let mut state = self.lock();

        if let Some(kind) = request.entity.string_attributes.get(ATTR_TYPE) {
            if state.failing_kinds.contains(kind) {
                return Err(LedgerError::Unavailable(format!("{kind} writes are failing")));
            }
        }

        let key = random_hash("entity");
        let tx_hash = random_hash("tx");
        let block = mine_block(&mut state);

        state.entities.push(Entity {
            key: key.clone(),
            owner: Some(request.signer.to_lowercase()),
            tx_hash: Some(tx_hash.clone()),
            created_at_block: Some(block.number),
            string_attributes: request.entity.string_attributes.clone(),
            numeric_attributes: request.entity.numeric_attributes.clone(),
            payload: request.entity.payload_bytes(),
        });
        state.receipts.insert(
            tx_hash.clone(),
            Ok(Some(TxReceipt {
                tx_hash: tx_hash.clone(),
                block_number: block.number,
                success: true,
            })),
        );

        Ok(CreateReceipt {
            entity_key: key,
            tx_hash,
        })
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, LedgerError> {
        self.receipt_lookups.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .receipts
            .get(tx_hash)
            .cloned()
            .unwrap_or(Ok(None))
    }

    async fn block(&self, number: u64) -> Result<Option<BlockInfo>, LedgerError> {
        let state = self.lock();
        Ok(number
            .checked_sub(1)
            .and_then(|i| state.blocks.get(i as usize))
            .copied())
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        Ok(self.lock().blocks.len() as u64)
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        Ok(MEMORY_CHAIN_ID)
    }
}
