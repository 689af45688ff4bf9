//! Field validation rules.
//!
//! A [`Validator`] is built from a record, collects `(field, rule)` pairs and
//! reports per-field messages. Every rule except [`Rule::NotEmpty`] passes on an
//! empty value (null, `""`, empty array), so optional fields only need
//! `NotEmpty` when they are actually required.

use crate::entity::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Field → messages for every failed rule
pub type ValidationErrors = BTreeMap<String, Vec<String>>;

static EMAIL: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)+$").ok()
});

/// Validation rule attached to a field
#[derive(Debug, Clone)]
pub enum Rule {
    NotEmpty,
    MinLength(usize),
    MaxLength(usize),
    ExactLength(usize),
    Email,
    /// Number, or string parsing as a number
    Numeric,
    /// Numeric value within `min..=max`
    Range { min: f64, max: f64 },
    Regex(Regex),
    /// Equal to the value of another field
    Matches(String),
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::NotEmpty => "not_empty",
            Rule::MinLength(_) => "min_length",
            Rule::MaxLength(_) => "max_length",
            Rule::ExactLength(_) => "exact_length",
            Rule::Email => "email",
            Rule::Numeric => "numeric",
            Rule::Range { .. } => "range",
            Rule::Regex(_) => "regex",
            Rule::Matches(_) => "matches",
        }
    }

    fn check(&self, value: &JsonValue, data: &Record) -> bool {
        if let Rule::NotEmpty = self {
            return !is_empty(value);
        }
        if is_empty(value) {
            return true;
        }

        match self {
            Rule::NotEmpty => true,
            Rule::MinLength(min) => text_len(value) >= *min,
            Rule::MaxLength(max) => text_len(value) <= *max,
            Rule::ExactLength(len) => text_len(value) == *len,
            Rule::Email => EMAIL.as_ref().is_some_and(|re| re.is_match(&text(value))),
            Rule::Numeric => as_number(value).is_some(),
            Rule::Range { min, max } => as_number(value).is_some_and(|n| n >= *min && n <= *max),
            Rule::Regex(re) => re.is_match(&text(value)),
            Rule::Matches(other) => data.get(other) == Some(value),
        }
    }

    fn message(&self, field: &str) -> String {
        match self {
            Rule::NotEmpty => format!("{field} must not be empty"),
            Rule::MinLength(min) => format!("{field} must be at least {min} characters long"),
            Rule::MaxLength(max) => format!("{field} must not exceed {max} characters long"),
            Rule::ExactLength(len) => format!("{field} must be exactly {len} characters long"),
            Rule::Email => format!("{field} must be an email address"),
            Rule::Numeric => format!("{field} must be numeric"),
            Rule::Range { min, max } => format!("{field} must be within the range of {min} to {max}"),
            Rule::Regex(re) => format!("{field} does not match the required format {}", re.as_str()),
            Rule::Matches(other) => format!("{field} must be the same as {other}"),
        }
    }
}

fn is_empty(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_len(value: &JsonValue) -> usize {
    text(value).chars().count()
}

fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Checks a record against per-field rules
///
/// # Example
///
/// ```
/// use datamapper::validation::{Rule, Validator};
/// use serde_json::json;
///
/// let data = json!({"name": "", "email": "not-an-address"});
/// let data = data.as_object().unwrap();
///
/// let mut validator = Validator::new(data);
/// validator.rule("name", Rule::NotEmpty).rule("email", Rule::Email);
///
/// assert!(!validator.check());
/// assert_eq!(validator.errors().len(), 2);
/// ```
#[derive(Debug)]
pub struct Validator<'a> {
    data: &'a Record,
    rules: Vec<(String, Rule)>,
    errors: ValidationErrors,
}

impl<'a> Validator<'a> {
    pub fn new(data: &'a Record) -> Self {
        Self {
            data,
            rules: Vec::new(),
            errors: ValidationErrors::new(),
        }
    }

    pub fn rule(&mut self, field: impl Into<String>, rule: Rule) -> &mut Self {
        self.rules.push((field.into(), rule));
        self
    }

    pub fn rules(&mut self, field: &str, rules: impl IntoIterator<Item = Rule>) -> &mut Self {
        for rule in rules {
            self.rule(field, rule);
        }
        self
    }

    /// Run every rule, replacing previously recorded errors
    pub fn check(&mut self) -> bool {
        self.errors.clear();
        for (field, rule) in &self.rules {
            let value = self.data.get(field).unwrap_or(&JsonValue::Null);
            if !rule.check(value, self.data) {
                self.errors
                    .entry(field.clone())
                    .or_default()
                    .push(rule.message(field));
            }
        }
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }
}
