//! Skill taxonomy entries.

use crate::arkiv::entity::EntityMeta;
use crate::arkiv::query::QueryValue;
use crate::arkiv::LedgerError;
use crate::entities::{Created, Record, SpaceScope, Store, PERMANENT_BTL};
use crate::types::{EntityKind, TxOperation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    #[default]
    Active,
    Archived,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    #[serde(skip)]
    pub meta: EntityMeta,
    pub name_canonical: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: SkillStatus,
}

impl Record for Skill {
    const KIND: EntityKind = EntityKind::Skill;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<(&'static str, QueryValue)> {
        let status = match self.status {
            SkillStatus::Active => "active",
            SkillStatus::Archived => "archived",
        };
        vec![
            ("name_canonical", QueryValue::from(self.name_canonical.as_str())),
            ("slug", QueryValue::from(self.slug.as_str())),
            ("status", QueryValue::from(status)),
        ]
    }
}

/// URL-safe identifier: lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut dash = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if dash && !slug.is_empty() {
                slug.push('-');
            }
            dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            dash = true;
        }
    }
    slug
}

/// Skills in scope, archived ones excluded unless asked for, sorted by name.
pub async fn list_skills(
    store: &Store,
    scope: &SpaceScope,
    include_archived: bool,
) -> Result<Vec<Skill>, LedgerError> {
    let mut skills: Vec<Skill> = store.list(scope, vec![]).await?;
    if !include_archived {
        skills.retain(|s| s.status == SkillStatus::Active);
    }
    skills.sort_by(|a, b| a.name_canonical.cmp(&b.name_canonical));
    Ok(skills)
}

/// Newest skill record with the given slug.
pub async fn get_skill_by_slug(
    store: &Store,
    scope: &SpaceScope,
    slug: &str,
) -> Result<Option<Skill>, LedgerError> {
    let mut skills: Vec<Skill> = store
        .list(scope, vec![("slug", QueryValue::from(slug))])
        .await?;
    skills.sort_by(|a, b| b.meta.created_at.cmp(&a.meta.created_at));
    Ok(skills.into_iter().next())
}

pub async fn create_skill(
    store: &Store,
    space_id: &str,
    mut skill: Skill,
) -> Result<Created, LedgerError> {
    skill.name_canonical = skill.name_canonical.trim().to_string();
    if skill.slug.is_empty() {
        skill.slug = slugify(&skill.name_canonical);
    }
    let signer = store.signer().address_lower();
    store
        .create_logged(space_id, &skill, PERMANENT_BTL, &signer, TxOperation::Create)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::store;

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("  Rust / Async Programming! "), "rust-async-programming");
        assert_eq!(slugify("C++"), "c");
        assert_eq!(slugify("Web3.js"), "web3-js");
    }

    #[tokio::test]
    async fn create_derives_slug_and_lookup_finds_it() {
        let (store, _, _) = store();
        create_skill(
            &store,
            "s",
            Skill {
                name_canonical: "Zero Knowledge Proofs".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        create_skill(
            &store,
            "s",
            Skill {
                name_canonical: "Old".into(),
                status: SkillStatus::Archived,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let scope = SpaceScope::one("s");
        let found = get_skill_by_slug(&store, &scope, "zero-knowledge-proofs")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name_canonical, "Zero Knowledge Proofs");

        assert_eq!(list_skills(&store, &scope, false).await.unwrap().len(), 1);
        assert_eq!(list_skills(&store, &scope, true).await.unwrap().len(), 2);
    }
}
