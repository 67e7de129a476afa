mod common;

use axum::http::StatusCode;
use chrono::{Duration, SecondsFormat};
use common::{harness, Harness, SPACE};
use peerlearn::arkiv::{Entity, LedgerError, TxReceipt};
use peerlearn::clock::Clock;
use serde_json::json;
use std::collections::BTreeMap;

/// A `tx_event` written by someone else, or before signers were recorded.
fn foreign_event(h: &Harness, tx_hash: &str, signer: Option<&str>) {
    let created_at = h.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut attrs = BTreeMap::from([
        ("type".to_string(), "tx_event".to_string()),
        ("spaceId".to_string(), SPACE.to_string()),
        ("createdAt".to_string(), created_at),
    ]);
    let mut payload = json!({
        "txHash": tx_hash,
        "entityType": "ask",
        "entityKey": format!("0xentity-{tx_hash}"),
        "wallet": "0xfeed",
        "operation": "create",
    });
    if let Some(signer) = signer {
        attrs.insert("signer_wallet".into(), signer.into());
        payload["signer_wallet"] = json!(signer);
    }
    h.ledger.insert(Entity {
        key: format!("0xevent-{tx_hash}"),
        tx_hash: Some(format!("0xwrite-{tx_hash}")),
        string_attributes: attrs,
        payload: serde_json::to_vec(&payload).unwrap(),
        ..Default::default()
    });
}

#[tokio::test]
async fn finalized_metadata_is_cached_for_a_day() {
    let h = harness();
    let (_, tx) = h.post_ask("0xaa", "rust").await;
    let lookups = h.ledger.receipt_lookup_count();

    let (status, body) = h.get(&format!("/api/explorer/tx/{tx}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["blockNumber"].as_u64().is_some());
    assert_eq!(h.ledger.receipt_lookup_count(), lookups + 1);

    // The ledger changing its answer does not matter while the entry is fresh.
    h.ledger
        .set_receipt(&tx, Err(LedgerError::Unavailable("node down".into())));
    h.clock.advance(Duration::hours(23));
    let (status, again) = h.get(&format!("/api/explorer/tx/{tx}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again, body);
    assert_eq!(h.ledger.receipt_lookup_count(), lookups + 1);

    h.clock.advance(Duration::hours(1) + Duration::seconds(1));
    let (status, _) = h.get(&format!("/api/explorer/tx/{tx}")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.ledger.receipt_lookup_count(), lookups + 2);
}

#[tokio::test]
async fn pending_metadata_is_rechecked_quickly() {
    let h = harness();
    let (_, tx) = h.post_ask("0xaa", "rust").await;
    h.ledger.remove_receipt(&tx);
    let lookups = h.ledger.receipt_lookup_count();

    let (_, body) = h.get(&format!("/api/explorer/tx/{tx}")).await;
    assert_eq!(body["status"], "pending");
    assert!(body["blockNumber"].is_null());

    h.clock.advance(Duration::seconds(10));
    h.get(&format!("/api/explorer/tx/{tx}")).await;
    assert_eq!(h.ledger.receipt_lookup_count(), lookups + 1);

    h.clock.advance(Duration::seconds(21));
    h.get(&format!("/api/explorer/tx/{tx}")).await;
    assert_eq!(h.ledger.receipt_lookup_count(), lookups + 2);
}

#[tokio::test]
async fn global_history_only_shows_our_signer() {
    let h = harness();
    h.post_ask("0xaa", "rust").await;
    foreign_event(&h, "mallory", Some("0x000000000000000000000000000000000000beef"));
    foreign_event(&h, "legacy", None);

    let (status, body) = h.get("/api/explorer/transactions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let hashes: Vec<&str> = body["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["txHash"].as_str().unwrap())
        .collect();
    assert!(hashes.contains(&"legacy"));
    assert!(!hashes.contains(&"mallory"));
}

#[tokio::test]
async fn global_history_pages_without_gaps() {
    let h = harness();
    let mut keys = Vec::new();
    for i in 0..5 {
        let (key, _) = h.post_ask(&format!("0x{i}"), "rust").await;
        keys.push(key);
        h.clock.advance(Duration::seconds(1));
    }

    let mut seen = Vec::new();
    let mut sizes = Vec::new();
    let mut uri = "/api/explorer/transactions?limit=2".to_string();
    loop {
        let (status, page) = h.get(&uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 5);
        let rows = page["transactions"].as_array().unwrap();
        sizes.push(rows.len());
        seen.extend(rows.iter().map(|r| r["entityKey"].as_str().unwrap().to_string()));
        match page["nextCursor"].as_str() {
            Some(cursor) => uri = format!("/api/explorer/transactions?limit=2&cursor={cursor}"),
            None => break,
        }
    }

    assert_eq!(sizes, vec![2, 2, 1]);
    keys.reverse();
    assert_eq!(seen, keys, "newest first, each exactly once");
}

/// Walk every page of `query`, returning each page's row keys.
async fn walk_pages(h: &Harness, query: &str) -> Vec<Vec<String>> {
    let mut pages = Vec::new();
    let mut uri = format!("/api/explorer/transactions?{query}");
    loop {
        let (status, page) = h.get(&uri).await;
        assert_eq!(status, StatusCode::OK, "{page}");
        assert_eq!(page["total"], 5, "total counts rows before status and block filters");
        pages.push(
            page["transactions"]
                .as_array()
                .unwrap()
                .iter()
                .map(|r| r["entityKey"].as_str().unwrap().to_string())
                .collect(),
        );
        match page["nextCursor"].as_str() {
            Some(cursor) => uri = format!("/api/explorer/transactions?{query}&cursor={cursor}"),
            None => break,
        }
    }
    pages
}

#[tokio::test]
async fn status_and_block_filters_apply_within_each_page() {
    let h = harness();
    let mut keys = Vec::new();
    let mut failed_tx = String::new();
    for i in 0..5 {
        let (key, tx) = h.post_ask(&format!("0x{i}"), "rust").await;
        if i == 2 {
            failed_tx = tx;
        }
        keys.push(key);
        h.clock.advance(Duration::seconds(1));
    }
    h.ledger.set_receipt(
        &failed_tx,
        Ok(Some(TxReceipt {
            tx_hash: failed_tx.clone(),
            block_number: 999,
            success: false,
        })),
    );

    // Newest first: [4, 3] [2, 1] [0]. Only the middle page holds the failed write.
    let pages = walk_pages(&h, "status=failed&limit=2").await;
    assert_eq!(pages, vec![vec![], vec![keys[2].clone()], vec![]]);

    let pages = walk_pages(&h, "blockNumber=999&limit=2").await;
    assert_eq!(pages, vec![vec![], vec![keys[2].clone()], vec![]]);

    let pages = walk_pages(&h, "status=success&limit=2").await;
    assert_eq!(
        pages,
        vec![
            vec![keys[4].clone(), keys[3].clone()],
            vec![keys[1].clone()],
            vec![keys[0].clone()],
        ]
    );
}

#[tokio::test]
async fn global_history_filters_by_wallet_and_type() {
    let h = harness();
    h.post_ask("0xaa", "rust").await;
    h.post_ask("0xbb", "go").await;
    h.post(
        "/api/offers",
        json!({ "wallet": "0xaa", "skill": "rust", "availabilityWindow": "weekends" }),
    )
    .await;

    let (_, body) = h.get("/api/explorer/transactions?wallet=0xAA").await;
    assert_eq!(body["total"], 2);

    let (_, body) = h
        .get("/api/explorer/transactions?wallet=0xaa&entityType=offer")
        .await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["transactions"][0]["entityType"], "offer");
    assert_eq!(body["transactions"][0]["status"], "success");
}

#[tokio::test]
async fn ask_history_starts_with_its_create() {
    let h = harness();
    let (key, tx) = h.post_ask("0xaa", "rust").await;

    let (status, body) = h
        .get(&format!("/api/explorer/entities/ask/{key}/history"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["transactions"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["txHash"], tx.as_str());
    assert_eq!(rows[0]["operation"], "create");
    assert_eq!(rows[0]["status"], "success");
}

#[tokio::test]
async fn profile_history_lists_every_version() {
    let h = harness();
    for name in ["Ada", "Ada L.", "Ada Lovelace"] {
        h.post("/api/profile", json!({ "wallet": "0xAda", "displayName": name }))
            .await;
        h.clock.advance(Duration::minutes(1));
    }

    let (status, body) = h.get("/api/explorer/profiles/0xADA/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wallet"], "0xada");
    let ops: Vec<&str> = body["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["operation"].as_str().unwrap())
        .collect();
    assert_eq!(ops, vec!["update", "update", "create"]);
}

#[tokio::test]
async fn unsupported_history_and_bad_cursors_are_rejected() {
    let h = harness();
    let (status, body) = h
        .get("/api/explorer/entities/session/0xabc/history")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);

    let (status, _) = h.get("/api/explorer/transactions?cursor=not-a-cursor").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.get("/api/explorer/transactions?status=confirmed").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
