//! Configuration schema for peerlearn.toml.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerlearnConfig {
    /// Address the HTTP API binds to.
    pub listen_addr: String,

    /// Arkiv JSON-RPC endpoint.
    pub arkiv_rpc_url: String,

    /// GraphQL façade endpoint. Empty disables the GraphQL path.
    pub graphql_url: String,

    /// Path to the server-held signing wallet.
    pub wallet_path: String,

    /// Every space the explorer and transaction log aggregate over.
    pub spaces: Vec<String>,

    /// Space used for writes when a request names none.
    pub default_space: String,

    /// Explorer index cache lifetime.
    pub explorer_cache_secs: u64,

    /// Cache lifetime for confirmed transaction metadata.
    pub tx_finalized_cache_secs: u64,

    /// Cache lifetime for pending transaction metadata.
    pub tx_pending_cache_secs: u64,

    /// Maximum number of perf samples kept in memory.
    pub perf_sample_capacity: usize,

    /// Also write each perf sample to the ledger as a `dx_metric` entity.
    pub persist_perf_samples: bool,

    /// Minimum age of the last snapshot before a new one is written.
    pub snapshot_min_interval_secs: u64,

    /// Default lifetime of asks and offers.
    pub listing_ttl_secs: u64,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Scheduled perf snapshots.
    pub snapshots: SnapshotSchedule,

    /// Which read paths the frontend routes through GraphQL.
    pub graphql_flags: GraphqlFlagsConfig,
}

/// Cron-driven perf snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSchedule {
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    pub schedule: String,
    pub operations: Vec<String>,
    pub method: String,
}

impl Default for SnapshotSchedule {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: "0 */15 * * * *".into(),
            operations: vec!["listAsks".into(), "listOffers".into()],
            method: "both".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphqlFlagsConfig {
    pub network: bool,
    pub me: bool,
    pub profile: bool,
    pub asks: bool,
    pub offers: bool,
}

impl Default for PeerlearnConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".into(),
            arkiv_rpc_url: "https://mendoza.hoodi.arkiv.network/rpc".into(),
            graphql_url: String::new(),
            wallet_path: "~/.peerlearn/wallet.json".into(),
            spaces: vec![
                "beta-launch".into(),
                "local-dev".into(),
                "local-dev-seed".into(),
            ],
            default_space: "beta-launch".into(),
            explorer_cache_secs: 60,
            tx_finalized_cache_secs: 24 * 60 * 60,
            tx_pending_cache_secs: 30,
            perf_sample_capacity: 2000,
            persist_perf_samples: false,
            snapshot_min_interval_secs: 5 * 60,
            listing_ttl_secs: 7 * 24 * 60 * 60,
            log_level: "info".into(),
            snapshots: SnapshotSchedule::default(),
            graphql_flags: GraphqlFlagsConfig::default(),
        }
    }
}

impl PeerlearnConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved wallet path.
    pub fn resolved_wallet_path(&self) -> String {
        self.resolve_path(&self.wallet_path)
    }

    /// The GraphQL endpoint, if one is configured.
    pub fn graphql_endpoint(&self) -> Option<&str> {
        let url = self.graphql_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: PeerlearnConfig = toml::from_str(
            r#"
            listen_addr = "0.0.0.0:8080"
            spaces = ["beta-launch"]

            [graphql_flags]
            asks = true
            "#,
        )
        .unwrap();

        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.spaces, vec!["beta-launch".to_string()]);
        assert_eq!(cfg.explorer_cache_secs, 60);
        assert!(cfg.graphql_flags.asks);
        assert!(!cfg.graphql_flags.offers);
        assert_eq!(cfg.snapshots.schedule, "0 */15 * * * *");
        assert!(cfg.graphql_endpoint().is_none());
    }
}
