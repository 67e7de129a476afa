//! Post-session feedback.

use crate::arkiv::entity::EntityMeta;
use crate::arkiv::query::QueryValue;
use crate::arkiv::LedgerError;
use crate::entities::{normalize_wallet, Created, Record, SpaceScope, Store, PERMANENT_BTL};
use crate::types::{EntityKind, TxOperation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub session_key: String,
    pub feedback_from: String,
    pub feedback_to: String,
    /// 1 to 5.
    pub rating: u8,
    #[serde(default)]
    pub text: String,
}

impl Record for Feedback {
    const KIND: EntityKind = EntityKind::Feedback;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        vec![
            ("sessionKey", QueryValue::from(self.session_key.as_str())),
            ("feedbackFrom", QueryValue::from(self.feedback_from.as_str())),
            ("feedbackTo", QueryValue::from(self.feedback_to.as_str())),
            ("rating", QueryValue::from(self.rating as u64)),
        ]
    }
}

/// Feedback received by a wallet, newest first.
pub async fn list_feedback_for_wallet(
    store: &Store,
    scope: &SpaceScope,
    wallet: &str,
) -> Result<Vec<Feedback>, LedgerError> {
    let mut feedback: Vec<Feedback> = store
        .list(scope, vec![("feedbackTo", QueryValue::from(normalize_wallet(wallet)))])
        .await?;
    feedback.sort_by(|a, b| b.meta.created_at.cmp(&a.meta.created_at));
    Ok(feedback)
}

pub async fn list_feedback_for_session(
    store: &Store,
    scope: &SpaceScope,
    session_key: &str,
) -> Result<Vec<Feedback>, LedgerError> {
    store
        .list(scope, vec![("sessionKey", QueryValue::from(session_key))])
        .await
}

/// Mean rating, or `None` with no feedback.
pub fn average_rating(feedback: &[Feedback]) -> Option<f64> {
    if feedback.is_empty() {
        return None;
    }
    let total: u64 = feedback.iter().map(|f| f.rating as u64).sum();
    Some(total as f64 / feedback.len() as f64)
}

pub async fn create_feedback(
    store: &Store,
    space_id: &str,
    mut feedback: Feedback,
) -> Result<Created, LedgerError> {
    feedback.feedback_from = normalize_wallet(&feedback.feedback_from);
    feedback.feedback_to = normalize_wallet(&feedback.feedback_to);
    feedback.rating = feedback.rating.clamp(1, 5);
    let wallet = feedback.feedback_from.clone();
    store
        .create_logged(space_id, &feedback, PERMANENT_BTL, &wallet, TxOperation::Create)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::store;

    #[tokio::test]
    async fn averages_received_ratings() {
        let (store, _, _) = store();
        for (to, rating) in [("0xM", 5), ("0xm", 4), ("0xother", 1), ("0xm", 9)] {
            create_feedback(
                &store,
                "s",
                Feedback {
                    session_key: "0xsess".into(),
                    feedback_from: "0xl".into(),
                    feedback_to: to.into(),
                    rating,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let received = list_feedback_for_wallet(&store, &SpaceScope::one("s"), "0xm")
            .await
            .unwrap();
        assert_eq!(received.len(), 3);
        // 9 is clamped to 5.
        assert_eq!(average_rating(&received), Some(14.0 / 3.0));
        assert_eq!(average_rating(&[]), None);
    }
}
