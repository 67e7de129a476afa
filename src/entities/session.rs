//! Mentor/learner sessions.

use crate::arkiv::entity::EntityMeta;
use crate::arkiv::query::QueryValue;
use crate::arkiv::LedgerError;
use crate::entities::{normalize_wallet, Created, Record, SpaceScope, Store, PERMANENT_BTL};
use crate::types::{EntityKind, TxOperation};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Scheduled,
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub mentor_wallet: String,
    pub learner_wallet: String,
    pub skill: String,
    pub session_date: DateTime<Utc>,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Private to the participants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_join_url: Option<String>,
}

impl Session {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.session_date
            .checked_add_signed(Duration::minutes(i64::from(self.duration_minutes)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// A scheduled session whose end time has passed reads as completed.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        match self.status {
            SessionStatus::Scheduled if now >= self.ends_at() => SessionStatus::Completed,
            status => status,
        }
    }

    pub fn involves(&self, wallet: &str) -> bool {
        let wallet = normalize_wallet(wallet);
        self.mentor_wallet == wallet || self.learner_wallet == wallet
    }
}

impl Record for Session {
    const KIND: EntityKind = EntityKind::Session;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        vec![
            ("mentorWallet", QueryValue::from(self.mentor_wallet.as_str())),
            ("learnerWallet", QueryValue::from(self.learner_wallet.as_str())),
            ("skill", QueryValue::from(self.skill.as_str())),
        ]
    }
}

/// Sessions where the wallet is mentor or learner, soonest first.
///
/// The ledger cannot OR two attributes, so this issues one query per role.
pub async fn list_sessions_for_wallet(
    store: &Store,
    scope: &SpaceScope,
    wallet: &str,
) -> Result<Vec<Session>, LedgerError> {
    let wallet = normalize_wallet(wallet);
    let (as_mentor, as_learner) = futures::try_join!(
        store.list::<Session>(scope, vec![("mentorWallet", QueryValue::from(&wallet))]),
        store.list::<Session>(scope, vec![("learnerWallet", QueryValue::from(&wallet))]),
    )?;

    let mut sessions = as_mentor;
    for s in as_learner {
        if !sessions.iter().any(|m| m.meta.key == s.meta.key) {
            sessions.push(s);
        }
    }
    sessions.sort_by(|a, b| a.session_date.cmp(&b.session_date));
    Ok(sessions)
}

pub async fn get_session(store: &Store, key: &str) -> Result<Option<Session>, LedgerError> {
    store.get(key).await
}

pub async fn create_session(
    store: &Store,
    space_id: &str,
    mut session: Session,
) -> Result<Created, LedgerError> {
    session.mentor_wallet = normalize_wallet(&session.mentor_wallet);
    session.learner_wallet = normalize_wallet(&session.learner_wallet);
    let wallet = session.learner_wallet.clone();
    store
        .create_logged(space_id, &session, PERMANENT_BTL, &wallet, TxOperation::Create)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::{start, store};

    #[test]
    fn past_due_scheduled_reads_completed() {
        let session = Session {
            session_date: start(),
            duration_minutes: 30,
            ..Default::default()
        };
        assert_eq!(session.effective_status(start()), SessionStatus::Scheduled);
        assert_eq!(
            session.effective_status(start() + Duration::minutes(30)),
            SessionStatus::Completed
        );
    }

    #[test]
    fn end_time_saturates_near_the_calendar_limit() {
        let session = Session {
            session_date: DateTime::<Utc>::MAX_UTC - Duration::minutes(1),
            duration_minutes: u32::MAX,
            ..Default::default()
        };
        assert_eq!(session.ends_at(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(session.effective_status(start()), SessionStatus::Scheduled);
    }

    #[tokio::test]
    async fn lists_both_roles() {
        let (store, _, _) = store();
        let mk = |mentor: &str, learner: &str, hours: i64| Session {
            mentor_wallet: mentor.into(),
            learner_wallet: learner.into(),
            skill: "rust".into(),
            session_date: start() + Duration::hours(hours),
            duration_minutes: 60,
            ..Default::default()
        };
        create_session(&store, "s", mk("0xA", "0xB", 2)).await.unwrap();
        create_session(&store, "s", mk("0xC", "0xa", 1)).await.unwrap();
        create_session(&store, "s", mk("0xC", "0xD", 3)).await.unwrap();

        let sessions = list_sessions_for_wallet(&store, &SpaceScope::one("s"), "0xA")
            .await
            .unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].mentor_wallet, "0xc");
        assert!(sessions.iter().all(|s| s.involves("0xa")));
    }
}
