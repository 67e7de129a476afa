//! Record to public-entity mapping, plus display labels.
//!
//! Each serializer copies an explicit list of fields. Sensitive kinds drop
//! fields outright: session join URLs and notes, lite contact handles,
//! telemetry metadata, payment addresses, and private reflections as a
//! whole.

use crate::entities::ask::{Ask, AskStatus};
use crate::entities::feedback::Feedback;
use crate::entities::lite::{LiteAsk, LiteOffer};
use crate::entities::offer::{Offer, OfferStatus};
use crate::entities::profile::{Canonical, Profile};
use crate::entities::quest::{
    AssessmentResult, Badge, LearnerQuest, ProgressStatus, QuestProgress, QuestTelemetry,
    Reflection, SkillLink, Visibility,
};
use crate::entities::session::{Session, SessionStatus};
use crate::entities::skill::{Skill, SkillStatus};
use crate::explorer::types::*;
use chrono::{DateTime, Utc};

const SUMMARY_MAX_CHARS: usize = 160;

pub fn profile(canonical: &Canonical<Profile>) -> PublicEntity {
    let p = &canonical.record;
    let skills = if p.skills_array.is_empty() {
        p.skills
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        p.skills_array.clone()
    };
    PublicEntity::Profile(PublicProfile {
        envelope: PublicEnvelope::from(&p.meta),
        wallet: p.wallet.to_lowercase(),
        display_name: p.display_name.clone(),
        username: p.username.clone(),
        bio_short: p.bio_short.clone(),
        skills,
        seniority: p.seniority.clone(),
        languages: p.languages.clone(),
        timezone: p.timezone.clone(),
        avg_rating: p.avg_rating,
        review_count: p.review_count,
        last_active_timestamp: p.activity_timestamp(),
        version_count: (canonical.version_count > 1).then_some(canonical.version_count),
    })
}

pub fn ask(a: &Ask, now: DateTime<Utc>) -> PublicEntity {
    let status = match a.effective_status(now) {
        AskStatus::Open => "open",
        AskStatus::Closed => "closed",
    };
    PublicEntity::Ask(PublicAsk {
        envelope: PublicEnvelope::from(&a.meta),
        wallet: a.wallet.clone(),
        skill: a.skill.clone(),
        skill_label: a.skill_label.clone(),
        message: a.message.clone(),
        status: status.to_string(),
        expires_at: a.expires_at(),
    })
}

pub fn offer(o: &Offer, now: DateTime<Utc>) -> PublicEntity {
    let status = match o.effective_status(now) {
        OfferStatus::Active => "active",
        OfferStatus::Inactive => "inactive",
    };
    PublicEntity::Offer(PublicOffer {
        envelope: PublicEnvelope::from(&o.meta),
        wallet: o.wallet.clone(),
        skill: o.skill.clone(),
        skill_label: o.skill_label.clone(),
        message: o.message.clone(),
        availability_window: o.availability_window.clone(),
        is_paid: o.is_paid,
        cost: o.cost.clone(),
        status: status.to_string(),
        expires_at: o.expires_at(),
    })
}

pub fn skill(s: &Skill) -> PublicEntity {
    let status = match s.status {
        SkillStatus::Active => "active",
        SkillStatus::Archived => "archived",
    };
    PublicEntity::Skill(PublicSkill {
        envelope: PublicEnvelope::from(&s.meta),
        name_canonical: s.name_canonical.clone(),
        slug: s.slug.clone(),
        description: s.description.clone(),
        status: status.to_string(),
    })
}

pub fn lite_ask(a: &LiteAsk) -> PublicEntity {
    PublicEntity::LiteAsk(PublicLiteListing {
        envelope: PublicEnvelope::from(&a.meta),
        name: a.name.clone(),
        skill: a.skill.clone(),
        message: a.message.clone(),
        expires_at: a.expires_at(),
    })
}

pub fn lite_offer(o: &LiteOffer) -> PublicEntity {
    PublicEntity::LiteOffer(PublicLiteListing {
        envelope: PublicEnvelope::from(&o.meta),
        name: o.name.clone(),
        skill: o.skill.clone(),
        message: o.message.clone(),
        expires_at: o.expires_at(),
    })
}

pub fn session(s: &Session, now: DateTime<Utc>) -> PublicEntity {
    let status = match s.effective_status(now) {
        SessionStatus::Scheduled => "scheduled",
        SessionStatus::Completed => "completed",
    };
    PublicEntity::Session(PublicSession {
        envelope: PublicEnvelope::from(&s.meta),
        mentor_wallet: s.mentor_wallet.clone(),
        learner_wallet: s.learner_wallet.clone(),
        skill: s.skill.clone(),
        session_date: s.session_date,
        duration_minutes: s.duration_minutes,
        status: status.to_string(),
    })
}

pub fn feedback(f: &Feedback) -> PublicEntity {
    PublicEntity::Feedback(PublicFeedback {
        envelope: PublicEnvelope::from(&f.meta),
        session_key: f.session_key.clone(),
        feedback_from: f.feedback_from.clone(),
        feedback_to: f.feedback_to.clone(),
        rating: f.rating,
        text: f.text.clone(),
    })
}

pub fn learner_quest(q: &LearnerQuest) -> PublicEntity {
    PublicEntity::LearnerQuest(PublicLearnerQuest {
        envelope: PublicEnvelope::from(&q.meta),
        quest_id: q.quest_id.clone(),
        title: q.title.clone(),
        description: q.description.clone(),
        skill: q.skill.clone(),
        step_count: q.steps.len(),
    })
}

pub fn quest_progress(p: &QuestProgress) -> PublicEntity {
    let status = match p.status {
        ProgressStatus::InProgress => "in_progress",
        ProgressStatus::Completed => "completed",
    };
    PublicEntity::QuestProgress(PublicQuestProgress {
        envelope: PublicEnvelope::from(&p.meta),
        wallet: p.wallet.clone(),
        quest_id: p.quest_id.clone(),
        step_id: p.step_id.clone(),
        status: status.to_string(),
    })
}

pub fn assessment_result(r: &AssessmentResult) -> PublicEntity {
    PublicEntity::AssessmentResult(PublicAssessmentResult {
        envelope: PublicEnvelope::from(&r.meta),
        wallet: r.wallet.clone(),
        quest_id: r.quest_id.clone(),
        section_id: r.section_id.clone(),
        score: r.score,
        max_score: r.max_score,
        passed: r.passed,
    })
}

pub fn badge(b: &Badge) -> PublicEntity {
    PublicEntity::Badge(PublicBadge {
        envelope: PublicEnvelope::from(&b.meta),
        wallet: b.wallet.clone(),
        quest_id: b.quest_id.clone(),
        badge_type: b.badge_type.clone(),
        issued_at: b.issued_at.unwrap_or(b.meta.created_at),
    })
}

/// Private reflections have no public form.
pub fn reflection(r: &Reflection) -> Option<PublicEntity> {
    match r.visibility {
        Visibility::Private => None,
        Visibility::Public => Some(PublicEntity::Reflection(PublicReflection {
            envelope: PublicEnvelope::from(&r.meta),
            wallet: r.wallet.clone(),
            quest_id: r.quest_id.clone(),
            step_id: r.step_id.clone(),
            text: r.text.clone(),
        })),
    }
}

pub fn skill_link(l: &SkillLink) -> PublicEntity {
    PublicEntity::SkillLink(PublicSkillLink {
        envelope: PublicEnvelope::from(&l.meta),
        wallet: l.wallet.clone(),
        from_skill: l.from_skill.clone(),
        to_skill: l.to_skill.clone(),
        relation: l.relation.clone(),
    })
}

pub fn quest_telemetry(t: &QuestTelemetry) -> PublicEntity {
    PublicEntity::QuestTelemetry(PublicQuestTelemetry {
        envelope: PublicEnvelope::from(&t.meta),
        wallet: t.wallet.clone(),
        quest_id: t.quest_id.clone(),
        event_type: t.event_type.clone(),
        step_id: t.step_id.clone(),
    })
}

fn short_wallet(wallet: &str) -> String {
    if wallet.len() > 10 && wallet.is_ascii() {
        format!("{}…{}", &wallet[..6], &wallet[wallet.len() - 4..])
    } else {
        wallet.to_string()
    }
}

/// One-line label.
pub fn title(entity: &PublicEntity) -> String {
    match entity {
        PublicEntity::Profile(p) => {
            if p.display_name.is_empty() {
                short_wallet(&p.wallet)
            } else {
                p.display_name.clone()
            }
        }
        PublicEntity::Ask(a) => format!("Ask: {}", a.skill_label.as_deref().unwrap_or(&a.skill)),
        PublicEntity::Offer(o) => {
            format!("Offer: {}", o.skill_label.as_deref().unwrap_or(&o.skill))
        }
        PublicEntity::Skill(s) => s.name_canonical.clone(),
        PublicEntity::LiteAsk(l) => format!("Lite ask: {}", l.skill),
        PublicEntity::LiteOffer(l) => format!("Lite offer: {}", l.skill),
        PublicEntity::Session(s) => format!("Session: {}", s.skill),
        PublicEntity::Feedback(f) => format!("Feedback for {}", short_wallet(&f.feedback_to)),
        PublicEntity::LearnerQuest(q) => q.title.clone(),
        PublicEntity::QuestProgress(p) => format!("Progress: {} / {}", p.quest_id, p.step_id),
        PublicEntity::AssessmentResult(r) => format!("Assessment: {} / {}", r.quest_id, r.section_id),
        PublicEntity::Badge(b) => format!("Badge: {}", b.badge_type),
        PublicEntity::Reflection(r) => format!("Reflection: {} / {}", r.quest_id, r.step_id),
        PublicEntity::SkillLink(l) => format!("{} → {}", l.from_skill, l.to_skill),
        PublicEntity::QuestTelemetry(t) => format!("Telemetry: {}", t.event_type),
    }
}

/// Description snippet, truncated.
pub fn summary(entity: &PublicEntity) -> String {
    let text = match entity {
        PublicEntity::Profile(p) => {
            let mut parts = Vec::new();
            if let Some(bio) = &p.bio_short {
                parts.push(bio.clone());
            }
            if !p.skills.is_empty() {
                parts.push(format!("Skills: {}", p.skills.join(", ")));
            }
            if parts.is_empty() {
                short_wallet(&p.wallet)
            } else {
                parts.join(" · ")
            }
        }
        PublicEntity::Ask(a) => non_empty_or(&a.message, || format!("{} ask", a.status)),
        PublicEntity::Offer(o) => {
            let terms = match (o.is_paid, &o.cost) {
                (true, Some(cost)) => format!("Paid ({cost})"),
                (true, None) => "Paid".to_string(),
                (false, _) => "Free".to_string(),
            };
            if o.message.is_empty() {
                terms
            } else {
                format!("{terms} · {}", o.message)
            }
        }
        PublicEntity::Skill(s) => s.description.clone().unwrap_or_else(|| s.slug.clone()),
        PublicEntity::LiteAsk(l) | PublicEntity::LiteOffer(l) => {
            non_empty_or(&l.message, || format!("by {}", l.name))
        }
        PublicEntity::Session(s) => format!(
            "{} min with {}, {}",
            s.duration_minutes,
            short_wallet(&s.mentor_wallet),
            s.status
        ),
        PublicEntity::Feedback(f) => non_empty_or(&f.text, || format!("Rated {}/5", f.rating)),
        PublicEntity::LearnerQuest(q) => {
            non_empty_or(&q.description, || format!("{} steps", q.step_count))
        }
        PublicEntity::QuestProgress(p) => format!("{} is {}", short_wallet(&p.wallet), p.status),
        PublicEntity::AssessmentResult(r) => format!(
            "{}/{} ({})",
            r.score,
            r.max_score,
            if r.passed { "passed" } else { "not passed" }
        ),
        PublicEntity::Badge(b) => format!("Earned by {}", short_wallet(&b.wallet)),
        PublicEntity::Reflection(r) => r.text.clone(),
        PublicEntity::SkillLink(l) => non_empty_or(&l.relation, || "related".to_string()),
        PublicEntity::QuestTelemetry(t) => format!("{} in {}", t.event_type, t.quest_id),
    };
    truncate(&text, SUMMARY_MAX_CHARS)
}

fn non_empty_or(text: &str, fallback: impl FnOnce() -> String) -> String {
    if text.trim().is_empty() {
        fallback()
    } else {
        text.to_string()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

pub fn explorer_entity(entity: PublicEntity) -> ExplorerEntity {
    ExplorerEntity {
        title: title(&entity),
        summary: summary(&entity),
        entity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arkiv::entity::EntityMeta;
    use crate::entities::testing::start;
    use chrono::Duration;

    fn meta(key: &str) -> EntityMeta {
        EntityMeta {
            key: key.into(),
            space_id: "beta-launch".into(),
            created_at: start(),
            tx_hash: Some("0xtx".into()),
        }
    }

    #[test]
    fn session_drops_join_url_and_notes() {
        let s = Session {
            meta: meta("0xs"),
            mentor_wallet: "0xm".into(),
            learner_wallet: "0xl".into(),
            skill: "rust".into(),
            session_date: start(),
            duration_minutes: 45,
            notes: Some("secret".into()),
            video_join_url: Some("https://meet/abc".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(session(&s, start() + Duration::hours(2))).unwrap();
        assert_eq!(json["type"], "session");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["key"], "0xs");
        assert!(json.get("videoJoinUrl").is_none());
        assert!(json.get("notes").is_none());
    }

    #[test]
    fn lite_listing_hides_contact_handle() {
        let a = LiteAsk {
            meta: meta("0xl"),
            name: "sam".into(),
            skill: "go".into(),
            contact_handle: "@sam".into(),
            ttl_seconds: 60,
            ..Default::default()
        };
        let json = serde_json::to_value(lite_ask(&a)).unwrap();
        assert_eq!(json["type"], "lite_ask");
        assert!(json.get("contactHandle").is_none());
        assert!(!json.to_string().contains("@sam"));
    }

    #[test]
    fn private_reflections_are_omitted() {
        let mut r = Reflection {
            meta: meta("0xr"),
            text: "hm".into(),
            ..Default::default()
        };
        assert!(reflection(&r).is_none());
        r.visibility = Visibility::Public;
        assert!(reflection(&r).is_some());
    }

    #[test]
    fn telemetry_metadata_is_dropped() {
        let t = QuestTelemetry {
            meta: meta("0xt"),
            event_type: "viewed".into(),
            metadata: serde_json::json!({"ip": "10.0.0.1"}),
            ..Default::default()
        };
        let json = serde_json::to_value(quest_telemetry(&t)).unwrap();
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn explorer_entity_flattens_with_labels() {
        let a = Ask {
            meta: meta("0xa"),
            wallet: "0xabc".into(),
            skill: "rust".into(),
            message: "help with lifetimes".into(),
            ttl_seconds: 3600,
            ..Default::default()
        };
        let json = serde_json::to_value(explorer_entity(ask(&a, start()))).unwrap();
        assert_eq!(json["type"], "ask");
        assert_eq!(json["title"], "Ask: rust");
        assert_eq!(json["summary"], "help with lifetimes");
        assert_eq!(json["spaceId"], "beta-launch");
        assert_eq!(json["status"], "open");
    }

    #[test]
    fn version_count_only_when_several() {
        let p = Profile {
            meta: meta("0xp"),
            wallet: "0xAB".into(),
            skills: "rust, go".into(),
            ..Default::default()
        };
        let single = serde_json::to_value(profile(&Canonical {
            record: p.clone(),
            version_count: 1,
        }))
        .unwrap();
        assert!(single.get("versionCount").is_none());
        assert_eq!(single["skills"], serde_json::json!(["rust", "go"]));

        let many = serde_json::to_value(profile(&Canonical {
            record: p,
            version_count: 3,
        }))
        .unwrap();
        assert_eq!(many["versionCount"], 3);
        assert_eq!(many["wallet"], "0xab");
    }
}
