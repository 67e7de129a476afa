mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::{harness, SPACE};
use peerlearn::arkiv::Entity;
use serde_json::json;
use std::collections::BTreeMap;

#[tokio::test]
async fn profiles_are_reduced_to_one_per_wallet() {
    let h = harness();
    for name in ["Ada", "Ada L."] {
        let (status, _) = h
            .post("/api/profile", json!({ "wallet": "0xAAA", "displayName": name }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        h.clock.advance(Duration::seconds(5));
    }
    h.post("/api/profile", json!({ "wallet": "0xbbb", "displayName": "Grace" }))
        .await;

    let (status, body) = h.get("/api/explorer/entities?type=profile").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let profiles = body["entities"].as_array().unwrap();
    let ada = profiles.iter().find(|p| p["wallet"] == "0xaaa").unwrap();
    assert_eq!(ada["displayName"], "Ada L.");
    assert_eq!(ada["versionCount"], 2);
    assert_eq!(ada["type"], "profile");
}

#[tokio::test]
async fn index_is_reused_within_the_window_and_rebuilt_after() {
    let h = harness();
    h.post_ask("0xaa", "rust").await;

    let (_, first) = h.get("/api/explorer/entities").await;

    // A write inside the window is not visible yet.
    h.post_ask("0xbb", "go").await;
    let queries = h.ledger.query_count();
    h.clock.advance(Duration::seconds(30));
    let (_, second) = h.get("/api/explorer/entities").await;
    assert_eq!(second["version"], first["version"]);
    assert_eq!(second["counts"]["asks"], 1);
    assert_eq!(h.ledger.query_count(), queries);

    h.clock.advance(Duration::seconds(31));
    let (_, third) = h.get("/api/explorer/entities").await;
    assert_ne!(third["version"], first["version"]);
    assert_eq!(third["counts"]["asks"], 2);
}

#[tokio::test]
async fn space_filter_and_search_use_the_cached_index() {
    let h = harness();
    h.post_ask("0xaa", "rust").await;
    h.post(
        "/api/asks",
        json!({ "wallet": "0xcc", "skill": "haskell", "spaceId": "local-dev" }),
    )
    .await;

    let (_, all) = h.get("/api/explorer/entities?type=ask").await;
    assert_eq!(all["total"], 2);
    let queries = h.ledger.query_count();

    let (_, scoped) = h.get(&format!("/api/explorer/entities?type=ask&space={SPACE}")).await;
    assert_eq!(scoped["total"], 1);
    assert_eq!(scoped["version"], all["version"]);

    let (_, hits) = h.get("/api/explorer/entities?q=HASKELL").await;
    assert_eq!(hits["total"], 1);
    assert_eq!(hits["entities"][0]["spaceId"], "local-dev");
    assert_eq!(h.ledger.query_count(), queries);
}

#[tokio::test]
async fn entity_lookup_by_key() {
    let h = harness();
    let (key, tx) = h.post_ask("0xaa", "rust").await;

    let (status, body) = h.get(&format!("/api/explorer/entities/{key}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entity"]["type"], "ask");
    assert_eq!(body["entity"]["txHash"], tx);
    assert_eq!(body["entity"]["status"], "open");

    let (status, body) = h.get("/api/explorer/entities/0xmissing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn private_fields_never_reach_the_explorer() {
    let h = harness();
    h.post(
        "/api/sessions",
        json!({
            "mentorWallet": "0xm",
            "learnerWallet": "0xl",
            "skill": "rust",
            "sessionDate": "2025-06-02T10:00:00Z",
            "durationMinutes": 60,
            "videoJoinUrl": "https://meet.example/secret",
            "notes": "private"
        }),
    )
    .await;

    let (_, body) = h.get("/api/explorer/entities?type=session").await;
    assert_eq!(body["total"], 1);
    let session = &body["entities"][0];
    assert!(session.get("videoJoinUrl").is_none());
    assert!(session.get("notes").is_none());
    assert_eq!(session["status"], "scheduled");
}

#[tokio::test]
async fn unknown_type_filter_is_a_bad_request() {
    let h = harness();
    let (status, body) = h.get("/api/explorer/entities?type=spaceship").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn network_reports_chain_and_signer() {
    let h = harness();
    h.post_ask("0xaa", "rust").await;
    let (status, body) = h.get("/api/explorer/network").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["signer"], h.state.signer_address());
    assert!(body["blockNumber"].as_u64().unwrap() >= 3);
}

#[tokio::test]
async fn stored_listings_with_huge_ttls_still_index() {
    let h = harness();
    for (kind, key) in [("ask", "0xbig-ask"), ("offer", "0xbig-offer")] {
        h.ledger.insert(Entity {
            key: key.into(),
            tx_hash: Some(format!("0xtx-{key}")),
            string_attributes: BTreeMap::from([
                ("type".to_string(), kind.to_string()),
                ("spaceId".to_string(), SPACE.to_string()),
                ("createdAt".to_string(), "2025-06-01T11:00:00Z".to_string()),
            ]),
            payload: serde_json::to_vec(&json!({
                "wallet": "0xaa",
                "skill": "rust",
                "ttlSeconds": 10_000_000_000_000_000u64
            }))
            .unwrap(),
            ..Default::default()
        });
    }

    let (status, body) = h.get("/api/explorer/entities").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counts"]["asks"], 1);
    assert_eq!(body["counts"]["offers"], 1);

    let (_, asks) = h.get("/api/asks").await;
    assert_eq!(asks["count"], 1, "a huge lifetime is not an expired one");
}
