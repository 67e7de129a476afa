//! Public, explorer-facing entity shapes.
//!
//! These structs are the compatibility surface of the explorer: every field
//! here is visible to anyone. Private fields of the underlying records are
//! simply absent.

use crate::arkiv::entity::EntityMeta;
use crate::types::EntityKind;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Envelope shared by every public entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicEnvelope {
    pub key: String,
    pub space_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl From<&EntityMeta> for PublicEnvelope {
    fn from(meta: &EntityMeta) -> Self {
        Self {
            key: meta.key.clone(),
            space_id: meta.space_id.clone(),
            created_at: meta.created_at,
            tx_hash: meta.tx_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub wallet: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio_short: Option<String>,
    pub skills: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seniority: Option<String>,
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_rating: Option<f64>,
    pub review_count: u32,
    pub last_active_timestamp: DateTime<Utc>,
    /// Number of stored records for this wallet, when more than one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAsk {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub wallet: String,
    pub skill: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_label: Option<String>,
    pub message: String,
    pub status: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicOffer {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub wallet: String,
    pub skill: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_label: Option<String>,
    pub message: String,
    pub availability_window: String,
    pub is_paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<String>,
    pub status: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSkill {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub name_canonical: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: String,
}

/// Lite asks and offers share one public shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicLiteListing {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub name: String,
    pub skill: String,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSession {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub mentor_wallet: String,
    pub learner_wallet: String,
    pub skill: String,
    pub session_date: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicFeedback {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub session_key: String,
    pub feedback_from: String,
    pub feedback_to: String,
    pub rating: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicLearnerQuest {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub quest_id: String,
    pub title: String,
    pub description: String,
    pub skill: String,
    pub step_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestProgress {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub wallet: String,
    pub quest_id: String,
    pub step_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAssessmentResult {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub wallet: String,
    pub quest_id: String,
    pub section_id: String,
    pub score: u32,
    pub max_score: u32,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicBadge {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub wallet: String,
    pub quest_id: String,
    pub badge_type: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicReflection {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub wallet: String,
    pub quest_id: String,
    pub step_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSkillLink {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub wallet: String,
    pub from_skill: String,
    pub to_skill: String,
    pub relation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestTelemetry {
    #[serde(flatten)]
    pub envelope: PublicEnvelope,
    pub wallet: String,
    pub quest_id: String,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

/// Every entity kind the explorer shows, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublicEntity {
    Profile(PublicProfile),
    Ask(PublicAsk),
    Offer(PublicOffer),
    Skill(PublicSkill),
    LiteAsk(PublicLiteListing),
    LiteOffer(PublicLiteListing),
    Session(PublicSession),
    Feedback(PublicFeedback),
    LearnerQuest(PublicLearnerQuest),
    QuestProgress(PublicQuestProgress),
    AssessmentResult(PublicAssessmentResult),
    Badge(PublicBadge),
    Reflection(PublicReflection),
    SkillLink(PublicSkillLink),
    QuestTelemetry(PublicQuestTelemetry),
}

impl PublicEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Profile(_) => EntityKind::Profile,
            Self::Ask(_) => EntityKind::Ask,
            Self::Offer(_) => EntityKind::Offer,
            Self::Skill(_) => EntityKind::Skill,
            Self::LiteAsk(_) => EntityKind::LiteAsk,
            Self::LiteOffer(_) => EntityKind::LiteOffer,
            Self::Session(_) => EntityKind::Session,
            Self::Feedback(_) => EntityKind::Feedback,
            Self::LearnerQuest(_) => EntityKind::LearnerQuest,
            Self::QuestProgress(_) => EntityKind::QuestProgress,
            Self::AssessmentResult(_) => EntityKind::AssessmentResult,
            Self::Badge(_) => EntityKind::Badge,
            Self::Reflection(_) => EntityKind::Reflection,
            Self::SkillLink(_) => EntityKind::SkillLink,
            Self::QuestTelemetry(_) => EntityKind::QuestTelemetry,
        }
    }

    pub fn envelope(&self) -> &PublicEnvelope {
        match self {
            Self::Profile(e) => &e.envelope,
            Self::Ask(e) => &e.envelope,
            Self::Offer(e) => &e.envelope,
            Self::Skill(e) => &e.envelope,
            Self::LiteAsk(e) | Self::LiteOffer(e) => &e.envelope,
            Self::Session(e) => &e.envelope,
            Self::Feedback(e) => &e.envelope,
            Self::LearnerQuest(e) => &e.envelope,
            Self::QuestProgress(e) => &e.envelope,
            Self::AssessmentResult(e) => &e.envelope,
            Self::Badge(e) => &e.envelope,
            Self::Reflection(e) => &e.envelope,
            Self::SkillLink(e) => &e.envelope,
            Self::QuestTelemetry(e) => &e.envelope,
        }
    }

    pub fn key(&self) -> &str {
        &self.envelope().key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.envelope().created_at
    }

    /// The wallet most associated with the entity, if any.
    pub fn wallet(&self) -> Option<&str> {
        match self {
            Self::Profile(e) => Some(&e.wallet),
            Self::Ask(e) => Some(&e.wallet),
            Self::Offer(e) => Some(&e.wallet),
            Self::Session(e) => Some(&e.mentor_wallet),
            Self::Feedback(e) => Some(&e.feedback_to),
            Self::QuestProgress(e) => Some(&e.wallet),
            Self::AssessmentResult(e) => Some(&e.wallet),
            Self::Badge(e) => Some(&e.wallet),
            Self::Reflection(e) => Some(&e.wallet),
            Self::SkillLink(e) => Some(&e.wallet),
            Self::QuestTelemetry(e) => Some(&e.wallet),
            Self::Skill(_) | Self::LiteAsk(_) | Self::LiteOffer(_) | Self::LearnerQuest(_) => None,
        }
    }
}

/// A public entity with its display label and snippet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplorerEntity {
    #[serde(flatten)]
    pub entity: PublicEntity,
    pub title: String,
    pub summary: String,
}
