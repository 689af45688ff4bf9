//! In-process query service.
//!
//! Tables are created on first insert and hold plain records. Integer keys are
//! generated per table when an insert does not supply one. Filtering follows
//! SQL null semantics: `= null` and `!= null` test for absence of a value, any
//! other comparison against null is false.

use super::{
    Condition, Direction, InsertOutcome, Operator, OrderBy, Predicate, QueryError, QueryService,
    RowSet, Select,
};
use crate::entity::Record;
use crate::executor::ExecutorError;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct MemoryTable {
    rows: Vec<Record>,
    /// `None` once the sequence has handed out `i64::MAX`
    next_key: Option<i64>,
}

/// `QueryService` keeping every table in process memory
#[derive(Debug, Default)]
pub struct MemoryQueryService {
    tables: Mutex<HashMap<String, MemoryTable>>,
}

impl MemoryQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a table's rows in insertion order
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the store lock is poisoned.
    pub fn rows(&self, table: &str) -> Result<Vec<Record>, QueryError> {
        Ok(self
            .lock()?
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, MemoryTable>>, QueryError> {
        self.tables
            .lock()
            .map_err(|_| QueryError::Execution(ExecutorError::Other("memory store lock poisoned".to_string())))
    }
}

impl QueryService for MemoryQueryService {
    fn select(&self, select: &Select) -> Result<RowSet, QueryError> {
        let tables = self.lock()?;
        let Some(table) = tables.get(&select.table) else {
            return Ok(RowSet::default());
        };

        let predicates = select.condition.predicates();
        let matchers = compile(&predicates)?;
        let mut rows = Vec::new();
        for row in &table.rows {
            if matches_all(row, &matchers) {
                rows.push(row.clone());
            }
        }

        if !select.order_by.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &select.order_by));
        }
        if let Some(limit) = select.limit {
            rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        log::debug!("memory select on {}: {} row(s)", select.table, rows.len());
        Ok(RowSet::new(rows))
    }

    fn insert(&self, table: &str, values: &Record, key_column: &str) -> Result<InsertOutcome, QueryError> {
        let mut tables = self.lock()?;
        let table_data = tables.entry(table.to_string()).or_insert_with(|| MemoryTable {
            rows: Vec::new(),
            next_key: Some(1),
        });

        let mut row = values.clone();
        let key = match row.get(key_column) {
            Some(key) if !key.is_null() => {
                if table_data
                    .rows
                    .iter()
                    .any(|r| r.get(key_column).is_some_and(|k| values_equal(k, key)))
                {
                    return Err(QueryError::Execution(ExecutorError::Query(format!(
                        "duplicate key {key} for {table}.{key_column}"
                    ))));
                }
                if let Some(k) = key.as_i64() {
                    table_data.next_key = match (table_data.next_key, k.checked_add(1)) {
                        (Some(next), Some(after)) => Some(next.max(after)),
                        _ => None,
                    };
                }
                key.clone()
            }
            _ => {
                let Some(next) = table_data.next_key else {
                    return Err(QueryError::Execution(ExecutorError::Query(format!(
                        "key sequence of {table}.{key_column} is exhausted"
                    ))));
                };
                table_data.next_key = next.checked_add(1);
                let key = JsonValue::from(next);
                row.insert(key_column.to_string(), key.clone());
                key
            }
        };

        table_data.rows.push(row);
        log::debug!("memory insert into {table}: {key_column} = {key}");

        Ok(InsertOutcome {
            generated_key: Some(key),
            affected: 1,
        })
    }

    fn update(&self, table: &str, values: &Record, condition: &Condition) -> Result<u64, QueryError> {
        let mut tables = self.lock()?;
        let Some(table_data) = tables.get_mut(table) else {
            return Ok(0);
        };

        let predicates = condition.predicates();
        let matchers = compile(&predicates)?;
        let mut affected = 0;
        for row in &mut table_data.rows {
            if matches_all(row, &matchers) {
                for (field, value) in values {
                    row.insert(field.clone(), value.clone());
                }
                affected += 1;
            }
        }

        log::debug!("memory update on {table}: {affected} row(s)");
        Ok(affected)
    }

    fn delete(&self, table: &str, condition: &Condition) -> Result<u64, QueryError> {
        let mut tables = self.lock()?;
        let Some(table_data) = tables.get_mut(table) else {
            return Ok(0);
        };

        let predicates = condition.predicates();
        let matchers = compile(&predicates)?;
        let mut kept = Vec::with_capacity(table_data.rows.len());
        let mut affected = 0;
        for row in table_data.rows.drain(..) {
            if matches_all(&row, &matchers) {
                affected += 1;
            } else {
                kept.push(row);
            }
        }
        table_data.rows = kept;

        log::debug!("memory delete on {table}: {affected} row(s)");
        Ok(affected)
    }
}

/// Predicate checked against rows, with its LIKE pattern compiled once
struct Matcher<'a> {
    predicate: &'a Predicate,
    like: Option<Regex>,
}

fn compile(predicates: &[Predicate]) -> Result<Vec<Matcher<'_>>, QueryError> {
    predicates
        .iter()
        .map(|predicate| {
            let like = match (predicate.op, &predicate.value) {
                (Operator::Like | Operator::NotLike, JsonValue::String(pattern)) => Some(like_regex(pattern)?),
                (Operator::Like | Operator::NotLike, _) => {
                    return Err(unsupported(predicate, "LIKE needs a string pattern"));
                }
                (Operator::In | Operator::NotIn, value) if !value.is_array() => {
                    return Err(unsupported(predicate, "IN needs an array"));
                }
                _ => None,
            };
            Ok(Matcher { predicate, like })
        })
        .collect()
}

fn matches_all(row: &Record, matchers: &[Matcher<'_>]) -> bool {
    matchers.iter().all(|matcher| matches(row, matcher))
}

fn matches(row: &Record, matcher: &Matcher<'_>) -> bool {
    let predicate = matcher.predicate;
    let actual = row.get(&predicate.field).unwrap_or(&JsonValue::Null);
    let expected = &predicate.value;

    match predicate.op {
        Operator::Eq if expected.is_null() => actual.is_null(),
        Operator::Ne if expected.is_null() => !actual.is_null(),
        _ if actual.is_null() => false,
        Operator::Eq => values_equal(actual, expected),
        Operator::Ne => !values_equal(actual, expected),
        Operator::Lt => compare_values(actual, expected) == Ordering::Less,
        Operator::Lte => compare_values(actual, expected) != Ordering::Greater,
        Operator::Gt => compare_values(actual, expected) == Ordering::Greater,
        Operator::Gte => compare_values(actual, expected) != Ordering::Less,
        Operator::Like | Operator::NotLike => {
            let found = matcher
                .like
                .as_ref()
                .is_some_and(|re| re.is_match(&text_of(actual)));
            found == (predicate.op == Operator::Like)
        }
        Operator::In | Operator::NotIn => {
            let found = expected
                .as_array()
                .is_some_and(|items| items.iter().any(|item| values_equal(actual, item)));
            found == (predicate.op == Operator::In)
        }
    }
}

fn unsupported(predicate: &Predicate, reason: &str) -> QueryError {
    QueryError::UnsupportedValue(format!(
        "{} {} {}: {reason}",
        predicate.field, predicate.op, predicate.value
    ))
}

fn text_of(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Translate a SQL LIKE pattern (`%`, `_`) into an anchored regex
fn like_regex(pattern: &str) -> Result<Regex, QueryError> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| QueryError::UnsupportedValue(format!("LIKE pattern '{pattern}': {e}")))
}

fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

// null < bool < number < string < array < object
fn type_rank(value: &JsonValue) -> u8 {
    match value {
        JsonValue::Null => 0,
        JsonValue::Bool(_) => 1,
        JsonValue::Number(_) => 2,
        JsonValue::String(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Object(_) => 5,
    }
}

fn compare_values(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_rows(a: &Record, b: &Record, order_by: &[OrderBy]) -> Ordering {
    for order in order_by {
        let left = a.get(&order.field).unwrap_or(&JsonValue::Null);
        let right = b.get(&order.field).unwrap_or(&JsonValue::Null);
        let ordering = match order.direction {
            Direction::Asc => compare_values(left, right),
            Direction::Desc => compare_values(right, left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: JsonValue) -> Record {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn seeded() -> MemoryQueryService {
        let service = MemoryQueryService::new();
        for i in 1..=20 {
            service
                .insert(
                    "tests",
                    &record(json!({"name": format!("Name {i}"), "title": format!("Title {i}")})),
                    "id",
                )
                .unwrap();
        }
        service
    }

    #[test]
    fn test_insert_generates_sequential_keys() {
        let service = MemoryQueryService::new();
        let first = service.insert("tests", &record(json!({"name": "a"})), "id").unwrap();
        let second = service.insert("tests", &record(json!({"name": "b"})), "id").unwrap();

        assert_eq!(first.generated_key, Some(json!(1)));
        assert_eq!(second.generated_key, Some(json!(2)));
        assert_eq!(service.rows("tests").unwrap()[1]["id"], json!(2));
    }

    #[test]
    fn test_insert_with_supplied_key_advances_sequence() {
        let service = MemoryQueryService::new();
        service.insert("tests", &record(json!({"id": 10, "name": "a"})), "id").unwrap();
        let next = service.insert("tests", &record(json!({"name": "b"})), "id").unwrap();
        assert_eq!(next.generated_key, Some(json!(11)));
    }

    #[test]
    fn test_insert_at_key_limit_exhausts_sequence() {
        let service = MemoryQueryService::new();
        service
            .insert("tests", &record(json!({"id": i64::MAX - 1, "name": "a"})), "id")
            .unwrap();
        let last = service.insert("tests", &record(json!({"name": "b"})), "id").unwrap();
        assert_eq!(last.generated_key, Some(json!(i64::MAX)));

        let result = service.insert("tests", &record(json!({"name": "c"})), "id");
        assert!(matches!(result, Err(QueryError::Execution(_))));
        assert_eq!(service.rows("tests").unwrap().len(), 2);
    }

    #[test]
    fn test_insert_supplied_max_key() {
        let service = MemoryQueryService::new();
        let outcome = service.insert("tests", &record(json!({"id": i64::MAX})), "id").unwrap();
        assert_eq!(outcome.generated_key, Some(json!(i64::MAX)));
        assert!(service.insert("tests", &record(json!({"name": "b"})), "id").is_err());
    }

    #[test]
    fn test_insert_duplicate_key_fails() {
        let service = MemoryQueryService::new();
        service.insert("tests", &record(json!({"id": 1})), "id").unwrap();
        let result = service.insert("tests", &record(json!({"id": 1})), "id");
        assert!(matches!(result, Err(QueryError::Execution(_))));
    }

    #[test]
    fn test_select_missing_table_is_empty() {
        let service = MemoryQueryService::new();
        let rows = service.select(&Select::new("nothing", Condition::everything())).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_select_with_comparison_and_limit() {
        let service = seeded();
        let rows = service
            .select(&Select::new("tests", Condition::term("id", Operator::Lte, 15)))
            .unwrap();
        assert_eq!(rows.count(), 15);

        let limited = service
            .select(&Select::new("tests", Condition::everything()).limit(1))
            .unwrap();
        assert_eq!(limited.count(), 1);
        assert_eq!(limited.get(0).unwrap()["id"], json!(1));
    }

    #[test]
    fn test_select_order_desc() {
        let service = seeded();
        let rows = service
            .select(&Select::new("tests", Condition::everything()).order_by([OrderBy::desc("id")]))
            .unwrap();
        assert_eq!(rows.get(0).unwrap()["id"], json!(20));
    }

    #[test]
    fn test_like_and_in() {
        let service = seeded();
        let like = service
            .select(&Select::new("tests", Condition::term("name", Operator::Like, "Name 1_")))
            .unwrap();
        assert_eq!(like.count(), 10);

        let within = service
            .select(&Select::new("tests", Condition::term("id", Operator::In, json!([2, 4, 99]))))
            .unwrap();
        assert_eq!(within.count(), 2);
    }

    #[test]
    fn test_null_semantics() {
        let service = MemoryQueryService::new();
        service.insert("images", &record(json!({"test_id": null})), "id").unwrap();
        service.insert("images", &record(json!({"test_id": 1})), "id").unwrap();

        let is_null = service
            .select(&Select::new("images", Condition::eq("test_id", JsonValue::Null)))
            .unwrap();
        assert_eq!(is_null.count(), 1);

        let not_one = service
            .select(&Select::new("images", Condition::term("test_id", Operator::Ne, 1)))
            .unwrap();
        assert_eq!(not_one.count(), 0);
    }

    #[test]
    fn test_like_compiled_once_per_statement() {
        let predicates = vec![
            Predicate::new("name", Operator::NotLike, "Name 1%"),
            Predicate::new("id", Operator::Gt, 1),
        ];
        let matchers = compile(&predicates).unwrap();
        assert!(matchers[0].like.is_some());
        assert!(matchers[1].like.is_none());

        let service = seeded();
        let removed = service
            .delete("tests", &Condition::term("name", Operator::NotLike, "Name 1%"))
            .unwrap();
        // Name 2 ..= Name 9 and Name 20
        assert_eq!(removed, 9);
    }

    #[test]
    fn test_like_requires_string_pattern() {
        let service = seeded();
        let result = service.update(
            "tests",
            &record(json!({"title": "x"})),
            &Condition::term("name", Operator::Like, 5),
        );
        assert!(matches!(result, Err(QueryError::UnsupportedValue(_))));
    }

    #[test]
    fn test_in_requires_array() {
        let service = seeded();
        let result = service.select(&Select::new("tests", Condition::term("id", Operator::In, 1)));
        assert!(matches!(result, Err(QueryError::UnsupportedValue(_))));
    }

    #[test]
    fn test_update_and_delete_counts() {
        let service = seeded();
        let changed = service
            .update("tests", &record(json!({"title": "changed"})), &Condition::eq("id", 5))
            .unwrap();
        assert_eq!(changed, 1);

        let row = service.select(&Select::new("tests", Condition::eq("id", 5))).unwrap();
        assert_eq!(row.get(0).unwrap()["title"], json!("changed"));

        let removed = service
            .delete("tests", &Condition::term("id", Operator::Gt, 15))
            .unwrap();
        assert_eq!(removed, 5);
        assert_eq!(service.rows("tests").unwrap().len(), 15);
    }
}
