//! Equality-predicate queries over entity attributes.
//!
//! The Arkiv query language has no OR across values of one attribute, so a
//! query is always a conjunction; multi-space reads either drop the space
//! predicate and filter client-side or issue one query per space.

use crate::arkiv::entity::{Entity, ATTR_SPACE, ATTR_TYPE};
use crate::types::EntityKind;
use std::fmt;

/// Pseudo-attribute addressing the entity key itself.
pub const ATTR_KEY: &str = "$key";

/// A value on the right-hand side of an equality predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Str(String),
    Num(u64),
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&String> for QueryValue {
    fn from(v: &String) -> Self {
        Self::Str(v.clone())
    }
}

impl From<u64> for QueryValue {
    fn from(v: u64) -> Self {
        Self::Num(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub attribute: String,
    pub value: QueryValue,
}

/// A conjunction of `attribute = value` predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    predicates: Vec<Predicate>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a query for one entity kind.
    pub fn kind(kind: EntityKind) -> Self {
        Self::new().eq(ATTR_TYPE, kind.as_str())
    }

    pub fn eq(mut self, attribute: &str, value: impl Into<QueryValue>) -> Self {
        self.predicates.push(Predicate {
            attribute: attribute.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn space(self, space_id: &str) -> Self {
        self.eq(ATTR_SPACE, space_id)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    /// Match a single entity by key.
    pub fn key(key: &str) -> Self {
        Self::new().eq(ATTR_KEY, key)
    }

    /// Whether an entity satisfies every predicate.
    pub fn matches(&self, entity: &Entity) -> bool {
        self.predicates.iter().all(|p| match &p.value {
            QueryValue::Str(v) if p.attribute == ATTR_KEY => entity.key == *v,
            QueryValue::Str(v) => entity.attr(&p.attribute) == Some(v.as_str()),
            QueryValue::Num(v) => entity.numeric_attributes.get(&p.attribute) == Some(v),
        })
    }
}

impl fmt::Display for Query {
    /// Render in the Arkiv query language: `type = "ask" && ttl = 60`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.predicates.iter().enumerate() {
            if i > 0 {
                f.write_str(" && ")?;
            }
            match &p.value {
                QueryValue::Str(v) => {
                    let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                    write!(f, "{} = \"{}\"", p.attribute, escaped)?;
                }
                QueryValue::Num(v) => write!(f, "{} = {}", p.attribute, v)?,
            }
        }
        Ok(())
    }
}
