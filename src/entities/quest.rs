//! Learning-quest records.
//!
//! Quest definitions, progress, assessment results, badges, telemetry,
//! reflections and skill links are independent append-only kinds keyed by
//! `(wallet, questId, stepId)`-style tuples. Nothing checks them against
//! the quest definition.

use crate::arkiv::entity::EntityMeta;
use crate::arkiv::query::QueryValue;
use crate::arkiv::LedgerError;
use crate::entities::{normalize_wallet, Created, Record, SpaceScope, Store, PERMANENT_BTL};
use crate::types::{EntityKind, TxOperation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestStep {
    pub step_id: String,
    pub title: String,
}

/// A quest definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerQuest {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub quest_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skill: String,
    #[serde(default)]
    pub steps: Vec<QuestStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestProgress {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub wallet: String,
    pub quest_id: String,
    pub step_id: String,
    #[serde(default)]
    pub status: ProgressStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub wallet: String,
    pub quest_id: String,
    pub section_id: String,
    pub score: u32,
    pub max_score: u32,
    #[serde(default)]
    pub passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub wallet: String,
    pub quest_id: String,
    pub badge_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
}

/// Client-side quest analytics. `metadata` is free-form and private.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestTelemetry {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub wallet: String,
    pub quest_id: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reflection {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub wallet: String,
    pub quest_id: String,
    pub step_id: String,
    pub text: String,
    #[serde(default)]
    pub visibility: Visibility,
}

/// A learner-declared relation between two skills.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillLink {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub wallet: String,
    pub from_skill: String,
    pub to_skill: String,
    #[serde(default)]
    pub relation: String,
}

/// Records owned by a wallet.
pub trait WalletRecord: Record {
    fn wallet(&self) -> &str;
    fn wallet_mut(&mut self) -> &mut String;
}

macro_rules! quest_record {
    ($ty:ty, $kind:expr) => {
        impl Record for $ty {
            const KIND: EntityKind = $kind;

            fn meta(&self) -> &EntityMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut EntityMeta {
                &mut self.meta
            }

            fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
                vec![
                    ("wallet", QueryValue::from(self.wallet.as_str())),
                    ("questId", QueryValue::from(self.quest_id.as_str())),
                ]
            }
        }

        impl WalletRecord for $ty {
            fn wallet(&self) -> &str {
                &self.wallet
            }

            fn wallet_mut(&mut self) -> &mut String {
                &mut self.wallet
            }
        }
    };
}

quest_record!(QuestProgress, EntityKind::QuestProgress);
quest_record!(AssessmentResult, EntityKind::AssessmentResult);
quest_record!(Badge, EntityKind::Badge);
quest_record!(QuestTelemetry, EntityKind::QuestTelemetry);
quest_record!(Reflection, EntityKind::Reflection);

impl Record for LearnerQuest {
    const KIND: EntityKind = EntityKind::LearnerQuest;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        vec![("questId", QueryValue::from(self.quest_id.as_str()))]
    }
}

impl Record for SkillLink {
    const KIND: EntityKind = EntityKind::SkillLink;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        vec![("wallet", QueryValue::from(self.wallet.as_str()))]
    }
}

impl WalletRecord for SkillLink {
    fn wallet(&self) -> &str {
        &self.wallet
    }

    fn wallet_mut(&mut self) -> &mut String {
        &mut self.wallet
    }
}

pub async fn list_learner_quests(
    store: &Store,
    scope: &SpaceScope,
) -> Result<Vec<LearnerQuest>, LedgerError> {
    store.list(scope, vec![]).await
}

pub async fn get_learner_quest(
    store: &Store,
    scope: &SpaceScope,
    quest_id: &str,
) -> Result<Option<LearnerQuest>, LedgerError> {
    let mut quests: Vec<LearnerQuest> = store
        .list(scope, vec![("questId", QueryValue::from(quest_id))])
        .await?;
    quests.sort_by(|a, b| b.meta.created_at.cmp(&a.meta.created_at));
    Ok(quests.into_iter().next())
}

/// Every record of a wallet-owned kind in scope, optionally for one wallet,
/// newest first.
pub async fn list_for_wallet<R: WalletRecord>(
    store: &Store,
    scope: &SpaceScope,
    wallet: Option<&str>,
) -> Result<Vec<R>, LedgerError> {
    let filters = match wallet {
        Some(w) => vec![("wallet", QueryValue::from(normalize_wallet(w)))],
        None => vec![],
    };
    let mut records: Vec<R> = store.list(scope, filters).await?;
    records.sort_by(|a, b| b.meta().created_at.cmp(&a.meta().created_at));
    Ok(records)
}

/// Progress records for a wallet, optionally narrowed to one quest.
pub async fn list_quest_progress(
    store: &Store,
    scope: &SpaceScope,
    wallet: &str,
    quest_id: Option<&str>,
) -> Result<Vec<QuestProgress>, LedgerError> {
    let mut filters = vec![("wallet", QueryValue::from(normalize_wallet(wallet)))];
    if let Some(quest_id) = quest_id {
        filters.push(("questId", QueryValue::from(quest_id)));
    }
    let mut progress: Vec<QuestProgress> = store.list(scope, filters).await?;
    progress.sort_by(|a, b| b.meta.created_at.cmp(&a.meta.created_at));
    Ok(progress)
}

/// Step ids with at least one completed progress record.
pub fn completed_steps(progress: &[QuestProgress]) -> Vec<String> {
    let mut steps: Vec<String> = progress
        .iter()
        .filter(|p| p.status == ProgressStatus::Completed)
        .map(|p| p.step_id.clone())
        .collect();
    steps.sort();
    steps.dedup();
    steps
}

pub async fn create_learner_quest(
    store: &Store,
    space_id: &str,
    quest: &LearnerQuest,
) -> Result<Created, LedgerError> {
    let signer = store.signer().address_lower();
    store
        .create_logged(space_id, quest, PERMANENT_BTL, &signer, TxOperation::Create)
        .await
}

/// Publish any wallet-owned quest record.
pub async fn create_for_wallet<R: WalletRecord>(
    store: &Store,
    space_id: &str,
    mut record: R,
) -> Result<Created, LedgerError> {
    let wallet = normalize_wallet(record.wallet());
    *record.wallet_mut() = wallet.clone();
    store
        .create_logged(space_id, &record, PERMANENT_BTL, &wallet, TxOperation::Create)
        .await
}
