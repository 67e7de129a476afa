//! Which read paths the frontend routes through the GraphQL façade.

use crate::config::GraphqlFlagsConfig;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphqlFlags {
    pub network: bool,
    pub me: bool,
    pub profile: bool,
    pub asks: bool,
    pub offers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlagSummary {
    pub enabled: usize,
    pub total: usize,
    pub percentage: f64,
}

impl GraphqlFlags {
    fn all(&self) -> [bool; 5] {
        [self.network, self.me, self.profile, self.asks, self.offers]
    }

    pub fn summary(&self) -> FlagSummary {
        let flags = self.all();
        let enabled = flags.iter().filter(|f| **f).count();
        let total = flags.len();
        FlagSummary {
            enabled,
            total,
            percentage: (enabled as f64 / total as f64 * 100.0).round(),
        }
    }
}

impl From<&GraphqlFlagsConfig> for GraphqlFlags {
    fn from(c: &GraphqlFlagsConfig) -> Self {
        Self {
            network: c.network,
            me: c.me,
            profile: c.profile,
            asks: c.asks,
            offers: c.offers,
        }
    }
}
