//! Generic query conditions.
//!
//! A [`Condition`] is either a single `(field, operator, value)` triple, a
//! sequence of triples combined with AND, or a field → value equality map.
//! Query services translate conditions into their own filter representation.

use super::QueryError;
use crate::entity::Record;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a condition triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
    In,
    NotIn,
}

impl Operator {
    /// SQL spelling of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        match normalized.as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "LIKE" => Ok(Operator::Like),
            "NOT LIKE" => Ok(Operator::NotLike),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            _ => Err(QueryError::UnsupportedOperator(s.to_string())),
        }
    }
}

/// One `(field, operator, value)` triple
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: Operator,
    pub value: JsonValue,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<JsonValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

/// Query filter
///
/// # Example
///
/// ```
/// use datamapper::{Condition, Operator};
///
/// let by_key = Condition::eq("id", 5);
/// let first_fifteen = Condition::term("id", Operator::Lte, 15);
/// let parsed = Condition::parse("name", "like", "Name 1%").unwrap();
/// assert_eq!(parsed.predicates()[0].op, Operator::Like);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Single triple
    Term(Predicate),
    /// Triples combined with AND; empty matches every row
    All(Vec<Predicate>),
    /// Field → value equality map
    Equals(Record),
}

impl Default for Condition {
    fn default() -> Self {
        Condition::All(Vec::new())
    }
}

impl Condition {
    /// Condition matching every row
    pub fn everything() -> Self {
        Self::default()
    }

    /// Single triple condition
    pub fn term(field: impl Into<String>, op: Operator, value: impl Into<JsonValue>) -> Self {
        Condition::Term(Predicate::new(field, op, value))
    }

    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::term(field, Operator::Eq, value)
    }

    /// Single triple condition with the operator given in its textual form
    ///
    /// # Errors
    ///
    /// Returns `QueryError::UnsupportedOperator` for an unknown operator.
    pub fn parse(field: impl Into<String>, op: &str, value: impl Into<JsonValue>) -> Result<Self, QueryError> {
        Ok(Self::term(field, op.parse()?, value))
    }

    /// AND-combined sequence of triples
    pub fn all(predicates: Vec<Predicate>) -> Self {
        Condition::All(predicates)
    }

    /// Equality map condition
    pub fn equals(values: Record) -> Self {
        Condition::Equals(values)
    }

    /// Normalize into a flat list of AND-combined triples
    pub fn predicates(&self) -> Vec<Predicate> {
        match self {
            Condition::Term(p) => vec![p.clone()],
            Condition::All(ps) => ps.clone(),
            Condition::Equals(map) => map
                .iter()
                .map(|(field, value)| Predicate::new(field.clone(), Operator::Eq, value.clone()))
                .collect(),
        }
    }

    /// True when the condition places no restriction on rows
    pub fn is_empty(&self) -> bool {
        match self {
            Condition::Term(_) => false,
            Condition::All(ps) => ps.is_empty(),
            Condition::Equals(map) => map.is_empty(),
        }
    }

    /// Add a triple, turning the condition into an AND sequence
    #[must_use]
    pub fn and(self, predicate: Predicate) -> Self {
        let mut predicates = self.predicates();
        predicates.push(predicate);
        Condition::All(predicates)
    }
}

impl From<Predicate> for Condition {
    fn from(predicate: Predicate) -> Self {
        Condition::Term(predicate)
    }
}

impl From<Vec<Predicate>> for Condition {
    fn from(predicates: Vec<Predicate>) -> Self {
        Condition::All(predicates)
    }
}

impl From<Record> for Condition {
    fn from(values: Record) -> Self {
        Condition::Equals(values)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One ORDER BY term
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_parse() {
        assert_eq!("=".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!("<=".parse::<Operator>().unwrap(), Operator::Lte);
        assert_eq!("like".parse::<Operator>().unwrap(), Operator::Like);
        assert_eq!("not   in".parse::<Operator>().unwrap(), Operator::NotIn);
    }

    #[test]
    fn test_operator_parse_unknown() {
        let err = "~=".parse::<Operator>().unwrap_err();
        assert!(err.to_string().contains("~="));
    }

    #[test]
    fn test_equals_map_normalizes_to_eq_predicates() {
        let mut map = Record::new();
        map.insert("name".to_string(), json!("Name 15"));
        let predicates = Condition::equals(map).predicates();

        assert_eq!(predicates, vec![Predicate::new("name", Operator::Eq, "Name 15")]);
    }

    #[test]
    fn test_empty_conditions() {
        assert!(Condition::everything().is_empty());
        assert!(Condition::equals(Record::new()).is_empty());
        assert!(!Condition::eq("id", 1).is_empty());
    }

    #[test]
    fn test_and_builds_sequence() {
        let condition = Condition::eq("id", 1).and(Predicate::new("name", Operator::Ne, json!(null)));
        match condition {
            Condition::All(ps) => assert_eq!(ps.len(), 2),
            other => panic!("expected All, got {other:?}"),
        }
    }
}
