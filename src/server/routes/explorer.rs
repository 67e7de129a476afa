use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{page_limit, params, parse_opt};
use crate::explorer::transactions::{self, all_transactions};
use crate::explorer::TransactionFilter;
use crate::server::{ApiError, AppState};
use crate::types::{EntityKind, TxStatus};

#[derive(Debug, Default, Deserialize)]
pub struct EntitiesQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub q: Option<String>,
    pub space: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// GET /api/explorer/entities: search the cached public index
pub async fn search_entities(
    State(state): State<Arc<AppState>>,
    query: Result<Query<EntitiesQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let q = params(query)?;
    let kind: Option<EntityKind> = parse_opt("type", q.kind.as_deref())?;
    let index = state
        .explorer
        .get_index(q.space.as_deref().filter(|s| !s.is_empty()))
        .await?;

    let page = index.search(
        kind,
        q.q.as_deref(),
        q.offset.unwrap_or(0),
        page_limit(q.limit, 50, 500),
    );
    Ok(Json(json!({
        "version": page.version,
        "generatedAt": index.generated_at,
        "counts": index.counts,
        "total": page.total,
        "offset": page.offset,
        "limit": page.limit,
        "entities": page.items,
    })))
}

/// GET /api/explorer/entities/{key}: one public entity
pub async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let index = state.explorer.get_index(None).await?;
    let entity = index
        .find(&key)
        .ok_or_else(|| ApiError::NotFound(format!("entity {key} not found")))?;
    Ok(Json(json!({ "version": index.version, "entity": entity })))
}

/// GET /api/explorer/entities/{kind}/{key}/history: per-entity history
pub async fn entity_history(
    State(state): State<Arc<AppState>>,
    Path((kind, key)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let kind: EntityKind = kind
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid entity type: {e}")))?;
    let rows = transactions::entity_history(&state.store, &state.tx_meta, kind, &key).await?;
    Ok(Json(json!({
        "entityType": kind,
        "entityKey": key,
        "transactions": rows,
    })))
}

/// GET /api/explorer/profiles/{wallet}/history: every profile version
pub async fn profile_history(
    State(state): State<Arc<AppState>>,
    Path(wallet): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let scope = state.scope(None);
    let rows = transactions::profile_history(&state.store, &state.tx_meta, &wallet, &scope).await?;
    Ok(Json(json!({
        "wallet": wallet.trim().to_lowercase(),
        "transactions": rows,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    pub entity_type: Option<String>,
    pub wallet: Option<String>,
    pub tx_hash: Option<String>,
    pub entity_key: Option<String>,
    pub status: Option<String>,
    pub block_number: Option<u64>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/explorer/transactions: global write history, paged
pub async fn transactions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TransactionsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let q = params(query)?;
    let status: Option<TxStatus> = parse_opt("status", q.status.as_deref())?;
    let filter = TransactionFilter {
        entity_type: parse_opt("entityType", q.entity_type.as_deref())?,
        wallet: q.wallet.filter(|s| !s.trim().is_empty()),
        tx_hash: q.tx_hash.filter(|s| !s.trim().is_empty()),
        entity_key: q.entity_key.filter(|s| !s.trim().is_empty()),
        status,
        block_number: q.block_number,
    };

    let page = all_transactions(
        &state.store,
        &state.tx_meta,
        &state.spaces,
        &state.signer_address(),
        &filter,
        q.cursor.as_deref().filter(|c| !c.is_empty()),
        page_limit(q.limit, 50, 200),
    )
    .await?;
    Ok(Json(json!(page)))
}

/// GET /api/explorer/tx/{hash}: block and status for one transaction
pub async fn transaction(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let metadata = state
        .tx_meta
        .get(hash.trim())
        .await
        .ok_or_else(|| ApiError::Internal(format!("could not resolve transaction {hash}")))?;
    Ok(Json(json!({
        "txHash": hash.trim().to_lowercase(),
        "blockNumber": metadata.block_number,
        "blockTimestamp": metadata.block_timestamp,
        "status": metadata.status,
    })))
}

/// GET /api/explorer/network: chain id and head block
pub async fn network(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let ledger = state.store.ledger();
    let (chain_id, block_number) = futures::try_join!(ledger.chain_id(), ledger.block_number())?;
    Ok(Json(json!({
        "chainId": chain_id,
        "blockNumber": block_number,
        "signer": state.signer_address(),
        "spaces": state.spaces,
    })))
}
