//! Client for the experimental GraphQL façade over the same entity data.
//!
//! Only used to time matched operations against direct JSON-RPC reads.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

/// GraphQL façade client.
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: &'a Value,
}

/// Response data plus the raw body size.
#[derive(Debug, Clone)]
pub struct GraphqlResponse {
    pub data: Value,
    pub payload_bytes: usize,
}

const LIST_ASKS: &str = r#"
query ListAsks($limit: Int) {
  asks(limit: $limit) { key wallet skill skillLabel status createdAt ttlSeconds spaceId }
}"#;

const LIST_OFFERS: &str = r#"
query ListOffers($limit: Int) {
  offers(limit: $limit) { key wallet skill skillLabel status isPaid createdAt ttlSeconds spaceId }
}"#;

const LIST_PROFILES: &str = r#"
query ListProfiles($limit: Int) {
  profiles(limit: $limit) { key wallet displayName username skills lastActiveTimestamp createdAt spaceId }
}"#;

const NETWORK_OVERVIEW: &str = r#"
query NetworkOverview($limit: Int) {
  network {
    asks(limit: $limit) { key wallet skill status createdAt }
    offers(limit: $limit) { key wallet skill status createdAt }
    skills { key nameCanonical slug status }
  }
}"#;

impl GraphqlClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Execute a query and return its `data` object.
    pub async fn execute(&self, query: &str, variables: Value) -> Result<GraphqlResponse> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&GraphqlRequest {
                query,
                variables: &variables,
            })
            .send()
            .await
            .context("GraphQL request failed")?;

        let status = resp.status();
        let body = resp.bytes().await.context("Failed to read GraphQL body")?;
        if !status.is_success() {
            bail!(
                "GraphQL request failed ({}): {}",
                status,
                String::from_utf8_lossy(&body)
            );
        }

        let mut parsed: Value =
            serde_json::from_slice(&body).context("Failed to parse GraphQL response")?;
        if let Some(errors) = parsed.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                bail!("GraphQL errors: {}", Value::Array(errors.clone()));
            }
        }

        debug!("GraphQL response: {} bytes", body.len());
        Ok(GraphqlResponse {
            data: parsed.get_mut("data").map(Value::take).unwrap_or(Value::Null),
            payload_bytes: body.len(),
        })
    }

    pub async fn list_asks(&self, limit: usize) -> Result<GraphqlResponse> {
        self.execute(LIST_ASKS, json!({ "limit": limit })).await
    }

    pub async fn list_offers(&self, limit: usize) -> Result<GraphqlResponse> {
        self.execute(LIST_OFFERS, json!({ "limit": limit })).await
    }

    pub async fn list_profiles(&self, limit: usize) -> Result<GraphqlResponse> {
        self.execute(LIST_PROFILES, json!({ "limit": limit })).await
    }

    pub async fn network_overview(&self, limit: usize) -> Result<GraphqlResponse> {
        self.execute(NETWORK_OVERVIEW, json!({ "limit": limit })).await
    }
}
