//! HTTP API: admin perf instrumentation, the public explorer, and thin
//! marketplace passthroughs over the entity layer.

pub mod error;
pub mod routes;

pub use error::ApiError;

use crate::arkiv::{GraphqlClient, Ledger};
use crate::clock::Clock;
use crate::config::PeerlearnConfig;
use crate::entities::{SpaceScope, Store};
use crate::explorer::{ExplorerIndexCache, TxMetadataCache};
use crate::flags::GraphqlFlags;
use crate::identity::SigningWallet;
use crate::metrics::{PerfSampleStore, PerfSeeder, Snapshotter};
use anyhow::{Context, Result};
use chrono::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Longest cache window or snapshot interval a config may set.
const MAX_CONFIG_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// A seconds setting from config, capped at [`MAX_CONFIG_SECS`].
fn config_duration(secs: u64) -> Duration {
    i64::try_from(secs.min(MAX_CONFIG_SECS))
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(Duration::zero)
}

/// Everything a request handler can reach. Caches are constructed once
/// here and shared by every request.
pub struct AppState {
    pub store: Store,
    pub explorer: Arc<ExplorerIndexCache>,
    pub tx_meta: Arc<TxMetadataCache>,
    pub samples: Arc<PerfSampleStore>,
    pub seeder: Arc<PerfSeeder>,
    pub snapshotter: Arc<Snapshotter>,
    pub flags: GraphqlFlags,
    pub spaces: Vec<String>,
    pub default_space: String,
    /// Space client-posted samples are persisted to, when enabled.
    pub persist_space: Option<String>,
}

impl AppState {
    pub fn from_config(
        config: &PeerlearnConfig,
        ledger: Arc<dyn Ledger>,
        signer: Arc<SigningWallet>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Store::new(ledger.clone(), signer, clock.clone())
            .with_listing_ttl(config.listing_ttl_secs);
        let spaces = config.spaces.clone();
        let default_space = config.default_space.clone();

        let explorer = Arc::new(ExplorerIndexCache::new(
            store.clone(),
            spaces.clone(),
            config_duration(config.explorer_cache_secs),
            clock.clone(),
        ));
        let tx_meta = Arc::new(TxMetadataCache::new(
            ledger,
            clock.clone(),
            config_duration(config.tx_finalized_cache_secs),
            config_duration(config.tx_pending_cache_secs),
        ));

        let samples = Arc::new(PerfSampleStore::new(config.perf_sample_capacity, clock));
        let graphql = config.graphql_endpoint().map(GraphqlClient::new);
        let persist_space = config
            .persist_perf_samples
            .then(|| default_space.clone());
        let mut seeder = PerfSeeder::new(store.clone(), graphql, samples.clone(), spaces.clone());
        if let Some(space) = &persist_space {
            seeder = seeder.persisting_to(space);
        }
        let seeder = Arc::new(seeder);
        let snapshotter = Arc::new(Snapshotter::new(
            store.clone(),
            seeder.clone(),
            samples.clone(),
            config_duration(config.snapshot_min_interval_secs),
            &default_space,
        ));

        Self {
            store,
            explorer,
            tx_meta,
            samples,
            seeder,
            snapshotter,
            flags: GraphqlFlags::from(&config.graphql_flags),
            spaces,
            default_space,
            persist_space,
        }
    }

    /// Lowercased address of the server's signing wallet.
    pub fn signer_address(&self) -> String {
        self.store.signer().address_lower()
    }

    /// One named space, or every known space.
    pub fn scope(&self, space: Option<&str>) -> SpaceScope {
        match space.map(str::trim).filter(|s| !s.is_empty()) {
            Some(space) => SpaceScope::one(space),
            None => SpaceScope::Many(self.spaces.clone()),
        }
    }

    /// The space a write goes to.
    pub fn write_space<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_space)
    }
}

/// Build the application router with permissive CORS.
pub fn build_router(state: Arc<AppState>) -> axum::Router {
    routes::build_router(state).layer(CorsLayer::permissive())
}

/// Serve until `cancel` fires, then drain in-flight requests.
pub async fn run(state: Arc<AppState>, addr: &str, cancel: CancellationToken) -> Result<()> {
    let explorer = state.explorer.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("Server error")?;

    explorer.shutdown();
    info!("Server stopped");
    Ok(())
}
