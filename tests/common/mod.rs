#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use peerlearn::arkiv::MemoryLedger;
use peerlearn::clock::ManualClock;
use peerlearn::config::PeerlearnConfig;
use peerlearn::identity::SigningWallet;
use peerlearn::server::{self, AppState};

pub const SPACE: &str = "beta-launch";

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub ledger: Arc<MemoryLedger>,
    pub clock: Arc<ManualClock>,
    pub app: Router,
}

pub fn harness() -> Harness {
    let cfg = PeerlearnConfig {
        spaces: vec![SPACE.into(), "local-dev".into()],
        default_space: SPACE.into(),
        ..Default::default()
    };
    let ledger = Arc::new(MemoryLedger::new());
    let clock = Arc::new(ManualClock::new(start()));
    let state = Arc::new(AppState::from_config(
        &cfg,
        ledger.clone(),
        Arc::new(SigningWallet::ephemeral()),
        clock.clone(),
    ));
    let app = server::build_router(state.clone());
    Harness {
        state,
        ledger,
        clock,
        app,
    }
}

impl Harness {
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, None).await
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Publish an ask through the API, returning its key and tx hash.
    pub async fn post_ask(&self, wallet: &str, skill: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/api/asks",
                serde_json::json!({ "wallet": wallet, "skill": skill, "ttlSeconds": 86400 }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["key"].as_str().unwrap().to_string(),
            body["txHash"].as_str().unwrap().to_string(),
        )
    }
}
