//! Relation descriptors and where templates.
//!
//! A [`RelationDef`] is the declared half of a relation: its cardinality, the
//! name of the related mapper and a [`WhereTemplate`]. The template names
//! fields of the *related* mapper (remote fields) and fields of the *owning*
//! entity (placeholders). Resolving a template against an entity substitutes
//! each placeholder with the entity's current value, producing a [`Condition`].

use crate::entity::Entity;
use crate::query::{Condition, Operator, OrderBy, Predicate};
use std::fmt;
use std::str::FromStr;

/// Cardinality of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// At most one related entity
    HasOne,
    /// Any number of related entities
    HasMany,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::HasOne => f.write_str("has_one"),
            RelationKind::HasMany => f.write_str("has_many"),
        }
    }
}

impl FromStr for RelationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "").as_str() {
            "hasone" => Ok(RelationKind::HasOne),
            "hasmany" => Ok(RelationKind::HasMany),
            _ => Err(format!("unknown relation kind '{s}'")),
        }
    }
}

/// `(remote field, operator, placeholder field)`
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateTerm {
    /// Field on the related mapper
    pub field: String,
    pub op: Operator,
    /// Field on the owning entity whose value is substituted
    pub placeholder: String,
}

impl TemplateTerm {
    pub fn new(field: impl Into<String>, op: Operator, placeholder: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            placeholder: placeholder.into(),
        }
    }

    fn resolve(&self, entity: &Entity) -> Predicate {
        Predicate::new(self.field.clone(), self.op, entity.value(&self.placeholder).clone())
    }
}

/// Declared relation condition with placeholders
///
/// # Example
///
/// ```
/// use datamapper::relation::WhereTemplate;
/// use datamapper::Entity;
///
/// // images.test_id = <owning entity>.id
/// let template = WhereTemplate::eq("test_id", "id");
///
/// let mut test = Entity::new();
/// test.set("id", 7);
/// let condition = template.resolve(&test);
/// assert_eq!(condition.predicates()[0].value, 7);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum WhereTemplate {
    /// Single term
    Term(TemplateTerm),
    /// Terms combined with AND
    All(Vec<TemplateTerm>),
    /// `remote field = placeholder` pairs
    Map(Vec<(String, String)>),
}

impl WhereTemplate {
    pub fn term(field: impl Into<String>, op: Operator, placeholder: impl Into<String>) -> Self {
        WhereTemplate::Term(TemplateTerm::new(field, op, placeholder))
    }

    /// `field = <placeholder>`
    pub fn eq(field: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self::term(field, Operator::Eq, placeholder)
    }

    pub fn all(terms: Vec<TemplateTerm>) -> Self {
        WhereTemplate::All(terms)
    }

    /// Equality map from remote field to placeholder field
    pub fn map<R, L>(pairs: impl IntoIterator<Item = (R, L)>) -> Self
    where
        R: Into<String>,
        L: Into<String>,
    {
        WhereTemplate::Map(
            pairs
                .into_iter()
                .map(|(remote, local)| (remote.into(), local.into()))
                .collect(),
        )
    }

    /// Fields of the owning entity referenced by the template
    pub fn placeholders(&self) -> Vec<&str> {
        match self {
            WhereTemplate::Term(term) => vec![term.placeholder.as_str()],
            WhereTemplate::All(terms) => terms.iter().map(|t| t.placeholder.as_str()).collect(),
            WhereTemplate::Map(pairs) => pairs.iter().map(|(_, local)| local.as_str()).collect(),
        }
    }

    /// Fields of the related mapper referenced by the template
    pub fn remote_fields(&self) -> Vec<&str> {
        match self {
            WhereTemplate::Term(term) => vec![term.field.as_str()],
            WhereTemplate::All(terms) => terms.iter().map(|t| t.field.as_str()).collect(),
            WhereTemplate::Map(pairs) => pairs.iter().map(|(remote, _)| remote.as_str()).collect(),
        }
    }

    /// Substitute placeholders with the entity's current values
    pub fn resolve(&self, entity: &Entity) -> Condition {
        match self {
            WhereTemplate::Term(term) => Condition::Term(term.resolve(entity)),
            WhereTemplate::All(terms) => Condition::All(terms.iter().map(|t| t.resolve(entity)).collect()),
            WhereTemplate::Map(pairs) => Condition::Equals(
                pairs
                    .iter()
                    .map(|(remote, local)| (remote.clone(), entity.value(local).clone()))
                    .collect(),
            ),
        }
    }

    /// True when every placeholder holds a non-null value on `entity`
    ///
    /// A relation keyed on a value the owner does not have yet (typically the
    /// primary key of an unsaved entity) cannot match any row.
    pub fn is_resolvable(&self, entity: &Entity) -> bool {
        self.placeholders().into_iter().all(|field| entity.is_set(field))
    }
}

/// Declared relation of a mapper
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    pub name: String,
    pub kind: RelationKind,
    /// Registered name of the related mapper
    pub mapper: String,
    /// `None` relates to every row of the related mapper
    pub template: Option<WhereTemplate>,
    /// Ordering applied when a has-many relation is fetched
    pub order: Vec<OrderBy>,
}

impl RelationDef {
    /// Resolve the template against `entity`
    ///
    /// Returns the condition and whether it can match anything.
    pub fn resolve(&self, entity: &Entity) -> (Condition, bool) {
        match &self.template {
            Some(template) => (template.resolve(entity), template.is_resolvable(entity)),
            None => (Condition::everything(), true),
        }
    }
}
