//! Shared types used across the peerlearn backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// Every entity kind the backend reads from or writes to the ledger.
///
/// The wire name is stored in the `type` attribute of each entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Profile,
    Ask,
    Offer,
    Skill,
    LiteAsk,
    LiteOffer,
    Session,
    Feedback,
    LearnerQuest,
    QuestProgress,
    AssessmentResult,
    Badge,
    QuestTelemetry,
    Reflection,
    SkillLink,
    DxMetric,
    PerfSnapshot,
    TxEvent,
    AskTxhash,
    OfferTxhash,
    SkillTxhash,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Ask => "ask",
            Self::Offer => "offer",
            Self::Skill => "skill",
            Self::LiteAsk => "lite_ask",
            Self::LiteOffer => "lite_offer",
            Self::Session => "session",
            Self::Feedback => "feedback",
            Self::LearnerQuest => "learner_quest",
            Self::QuestProgress => "quest_progress",
            Self::AssessmentResult => "assessment_result",
            Self::Badge => "badge",
            Self::QuestTelemetry => "quest_telemetry",
            Self::Reflection => "reflection",
            Self::SkillLink => "skill_link",
            Self::DxMetric => "dx_metric",
            Self::PerfSnapshot => "perf_snapshot",
            Self::TxEvent => "tx_event",
            Self::AskTxhash => "ask_txhash",
            Self::OfferTxhash => "offer_txhash",
            Self::SkillTxhash => "skill_txhash",
        }
    }

    /// The `<entity>_txhash` log kind for entities that keep one.
    pub fn txhash_log(self) -> Option<Self> {
        match self {
            Self::Ask => Some(Self::AskTxhash),
            Self::Offer => Some(Self::OfferTxhash),
            Self::Skill => Some(Self::SkillTxhash),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown entity kind.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown entity kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for EntityKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "profile" => Self::Profile,
            "ask" => Self::Ask,
            "offer" => Self::Offer,
            "skill" => Self::Skill,
            "lite_ask" => Self::LiteAsk,
            "lite_offer" => Self::LiteOffer,
            "session" => Self::Session,
            "feedback" => Self::Feedback,
            "learner_quest" => Self::LearnerQuest,
            "quest_progress" => Self::QuestProgress,
            "assessment_result" => Self::AssessmentResult,
            "badge" => Self::Badge,
            "quest_telemetry" => Self::QuestTelemetry,
            "reflection" => Self::Reflection,
            "skill_link" => Self::SkillLink,
            "dx_metric" => Self::DxMetric,
            "perf_snapshot" => Self::PerfSnapshot,
            "tx_event" => Self::TxEvent,
            "ask_txhash" => Self::AskTxhash,
            "offer_txhash" => Self::OfferTxhash,
            "skill_txhash" => Self::SkillTxhash,
            other => return Err(UnknownKind(other.to_string())),
        };
        Ok(kind)
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Settlement status of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
    Pending,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

impl FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "pending" => Ok(Self::Pending),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// Label applied to a reconstructed history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxOperation {
    Create,
    Update,
}

// ---------------------------------------------------------------------------
// Performance measurement
// ---------------------------------------------------------------------------

/// The two data-access paths compared by the perf instrumentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerfSource {
    /// Direct JSON-RPC against the ledger.
    Arkiv,
    /// The experimental GraphQL façade.
    Graphql,
}

impl fmt::Display for PerfSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arkiv => write!(f, "arkiv"),
            Self::Graphql => write!(f, "graphql"),
        }
    }
}

impl FromStr for PerfSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arkiv" => Ok(Self::Arkiv),
            "graphql" => Ok(Self::Graphql),
            other => Err(format!("unknown perf source: {other}")),
        }
    }
}

/// Which paths a seed or snapshot run exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerfMethod {
    Arkiv,
    Graphql,
    #[default]
    Both,
}

impl PerfMethod {
    pub fn includes(self, source: PerfSource) -> bool {
        matches!(
            (self, source),
            (Self::Both, _)
                | (Self::Arkiv, PerfSource::Arkiv)
                | (Self::Graphql, PerfSource::Graphql)
        )
    }
}

impl fmt::Display for PerfMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arkiv => write!(f, "arkiv"),
            Self::Graphql => write!(f, "graphql"),
            Self::Both => write!(f, "both"),
        }
    }
}

impl FromStr for PerfMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arkiv" => Ok(Self::Arkiv),
            "graphql" => Ok(Self::Graphql),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown perf method: {other}")),
        }
    }
}
