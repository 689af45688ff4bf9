//! Query service contract and its implementations.
//!
//! The mapper never builds SQL itself. It hands a [`Select`] or a write request
//! to a [`QueryService`], which returns raw [`Record`]s in a [`RowSet`] or an
//! affected-row count.
//!
//! - [`sql::PostgresQueryService`] translates requests with sea-query and runs
//!   them through an [`Executor`](crate::executor::Executor).
//! - [`memory::MemoryQueryService`] keeps tables in process memory.

pub mod condition;
pub mod memory;
pub mod sql;
pub mod value_conversion;

pub use condition::{Condition, Direction, Operator, OrderBy, Predicate};

use crate::entity::Record;
use crate::executor::ExecutorError;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Error type for query services
#[derive(Debug, Error)]
pub enum QueryError {
    /// The executor failed to run the statement
    #[error(transparent)]
    Execution(#[from] ExecutorError),
    /// The statement could not be built from the request
    #[error("Statement build error: {0}")]
    Build(String),
    /// A returned row could not be decoded into a record
    #[error("Row decode error: {0}")]
    Decode(String),
    /// Operator text not recognised
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// Value shape not usable in this position (e.g. `IN` with a scalar)
    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),
}

/// A select request against one table
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub table: String,
    pub condition: Condition,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
}

impl Select {
    pub fn new(table: impl Into<String>, condition: Condition) -> Self {
        Self {
            table: table.into(),
            condition,
            order_by: Vec::new(),
            limit: None,
        }
    }

    #[must_use]
    pub fn order_by(mut self, order_by: impl IntoIterator<Item = OrderBy>) -> Self {
        self.order_by.extend(order_by);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Rows returned by a select
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    rows: Vec<Record>,
}

impl RowSet {
    pub fn new(rows: Vec<Record>) -> Self {
        Self { rows }
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.rows.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.rows.iter()
    }
}

impl IntoIterator for RowSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl FromIterator<Record> for RowSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Result of an insert
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertOutcome {
    /// Value of the key column of the inserted row (generated or supplied)
    pub generated_key: Option<JsonValue>,
    pub affected: u64,
}

/// Database service consumed by mappers
///
/// Implementations execute blocking, parameterised statements. Failures are
/// returned as errors and never swallowed; an empty result is not a failure.
pub trait QueryService: Send + Sync {
    /// Run a select and return the matching rows
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the statement cannot be built or executed.
    fn select(&self, select: &Select) -> Result<RowSet, QueryError>;

    /// Insert one row, returning the value of `key_column` for the new row
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the statement cannot be built or executed.
    fn insert(&self, table: &str, values: &Record, key_column: &str) -> Result<InsertOutcome, QueryError>;

    /// Update matching rows, returning the affected count
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the statement cannot be built or executed.
    fn update(&self, table: &str, values: &Record, condition: &Condition) -> Result<u64, QueryError>;

    /// Delete matching rows, returning the affected count
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the statement cannot be built or executed.
    fn delete(&self, table: &str, condition: &Condition) -> Result<u64, QueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_builder() {
        let select = Select::new("tests", Condition::eq("id", 1))
            .order_by([OrderBy::desc("name")])
            .limit(1);
        assert_eq!(select.table, "tests");
        assert_eq!(select.limit, Some(1));
        assert_eq!(select.order_by, vec![OrderBy::desc("name")]);
    }

    #[test]
    fn test_row_set_access() {
        let mut row = Record::new();
        row.insert("id".to_string(), json!(1));
        let rows: RowSet = vec![row.clone()].into_iter().collect();

        assert_eq!(rows.count(), 1);
        assert_eq!(rows.get(0), Some(&row));
        assert!(rows.get(1).is_none());
        assert!(RowSet::default().is_empty());
    }
}
