//! PostgreSQL query service.
//!
//! Conditions and write requests are translated into sea-query statements,
//! rendered with `PostgresQueryBuilder` (quoted identifiers, `$n` parameters)
//! and run through an [`Executor`].

use super::value_conversion::{json_to_value, row_to_record, with_converted_params};
use super::{
    Condition, Direction, InsertOutcome, Operator, Predicate, QueryError, QueryService, RowSet,
    Select,
};
use crate::config::DatabaseConfig;
use crate::connection::{connect, ConnectionError};
use crate::entity::Record;
use crate::executor::{Executor, MayPostgresExecutor};
use sea_query::{
    Asterisk, Condition as SeaCondition, Expr, ExprTrait, Iden, Order, PostgresQueryBuilder, Query,
    Values,
};
use serde_json::Value as JsonValue;

/// Runtime table/column name
#[derive(Debug, Clone)]
struct Ident(String);

impl Ident {
    fn new(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl Iden for Ident {
    fn unquoted(&self) -> &str {
        &self.0
    }
}

fn add_predicate(condition: SeaCondition, predicate: &Predicate) -> Result<SeaCondition, QueryError> {
    let col = Expr::col(Ident::new(&predicate.field));
    let value = &predicate.value;

    let condition = match (predicate.op, value) {
        (Operator::Eq, JsonValue::Null) => condition.add(col.is_null()),
        (Operator::Ne, JsonValue::Null) => condition.add(col.is_not_null()),
        (Operator::Eq, v) => condition.add(col.eq(Expr::val(json_to_value(v)))),
        (Operator::Ne, v) => condition.add(col.ne(Expr::val(json_to_value(v)))),
        (Operator::Lt, v) => condition.add(col.lt(Expr::val(json_to_value(v)))),
        (Operator::Lte, v) => condition.add(col.lte(Expr::val(json_to_value(v)))),
        (Operator::Gt, v) => condition.add(col.gt(Expr::val(json_to_value(v)))),
        (Operator::Gte, v) => condition.add(col.gte(Expr::val(json_to_value(v)))),
        (Operator::Like, JsonValue::String(pattern)) => condition.add(col.like(pattern.clone())),
        (Operator::NotLike, JsonValue::String(pattern)) => {
            condition.add(col.not_like(pattern.clone()))
        }
        (Operator::In, JsonValue::Array(items)) => {
            condition.add(col.is_in(items.iter().map(|v| Expr::val(json_to_value(v)))))
        }
        (Operator::NotIn, JsonValue::Array(items)) => {
            condition.add(col.is_not_in(items.iter().map(|v| Expr::val(json_to_value(v)))))
        }
        (op, v) => {
            return Err(QueryError::UnsupportedValue(format!(
                "{} {op} {v} (LIKE needs a string, IN needs an array)",
                predicate.field
            )));
        }
    };
    Ok(condition)
}

/// Translate a generic condition into a sea-query `Condition`
///
/// # Errors
///
/// Returns `QueryError::UnsupportedValue` when an operator gets a value it cannot use.
pub fn to_sea_condition(condition: &Condition) -> Result<SeaCondition, QueryError> {
    condition
        .predicates()
        .iter()
        .try_fold(SeaCondition::all(), add_predicate)
}

/// Render a select request
///
/// # Errors
///
/// Returns `QueryError` if the condition cannot be translated.
pub fn build_select(select: &Select) -> Result<(String, Values), QueryError> {
    let mut query = Query::select();
    query.column(Asterisk).from(Ident::new(&select.table));

    if !select.condition.is_empty() {
        query.cond_where(to_sea_condition(&select.condition)?);
    }
    for order in &select.order_by {
        let direction = match order.direction {
            Direction::Asc => Order::Asc,
            Direction::Desc => Order::Desc,
        };
        query.order_by(Ident::new(&order.field), direction);
    }
    if let Some(limit) = select.limit {
        query.limit(limit);
    }

    Ok(query.build(PostgresQueryBuilder))
}

/// Render an insert of one row returning `key_column`
///
/// # Errors
///
/// Returns `QueryError::Build` for an empty row.
pub fn build_insert(table: &str, values: &Record, key_column: &str) -> Result<(String, Values), QueryError> {
    if values.is_empty() {
        return Err(QueryError::Build(format!("No columns to insert into {table}")));
    }

    let mut columns = Vec::with_capacity(values.len());
    let mut exprs = Vec::with_capacity(values.len());
    for (column, value) in values {
        columns.push(Ident::new(column));
        exprs.push(Expr::val(json_to_value(value)));
    }

    let mut query = Query::insert();
    query.into_table(Ident::new(table)).columns(columns);
    query
        .values(exprs)
        .map_err(|e| QueryError::Build(e.to_string()))?;
    query.returning_col(Ident::new(key_column));

    Ok(query.build(PostgresQueryBuilder))
}

/// Render an update of the given columns on matching rows
///
/// # Errors
///
/// Returns `QueryError::Build` for an empty column set, or a translation error.
pub fn build_update(table: &str, values: &Record, condition: &Condition) -> Result<(String, Values), QueryError> {
    if values.is_empty() {
        return Err(QueryError::Build(format!("No columns to update in {table}")));
    }

    let mut query = Query::update();
    query.table(Ident::new(table));
    for (column, value) in values {
        query.value(Ident::new(column), Expr::val(json_to_value(value)));
    }
    if !condition.is_empty() {
        query.cond_where(to_sea_condition(condition)?);
    }

    Ok(query.build(PostgresQueryBuilder))
}

/// Render a delete of matching rows
///
/// # Errors
///
/// Returns `QueryError` if the condition cannot be translated.
pub fn build_delete(table: &str, condition: &Condition) -> Result<(String, Values), QueryError> {
    let mut query = Query::delete();
    query.from_table(Ident::new(table));
    if !condition.is_empty() {
        query.cond_where(to_sea_condition(condition)?);
    }

    Ok(query.build(PostgresQueryBuilder))
}

/// `QueryService` running sea-query statements through an [`Executor`]
///
/// # Example
///
/// ```no_run
/// use datamapper::config::DatabaseConfig;
/// use datamapper::query::sql::PostgresQueryService;
///
/// let config = DatabaseConfig::default();
/// let service = PostgresQueryService::connect(&config)?;
/// # Ok::<(), datamapper::ConnectionError>(())
/// ```
pub struct PostgresQueryService<E: Executor> {
    executor: E,
}

impl<E: Executor> PostgresQueryService<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }
}

impl PostgresQueryService<MayPostgresExecutor> {
    /// Connect using the configured database URL
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` if the URL is invalid or the connection fails.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        let client = connect(&config.url)?;
        Ok(Self::new(MayPostgresExecutor::new(client)))
    }
}

impl<E: Executor> QueryService for PostgresQueryService<E> {
    fn select(&self, select: &Select) -> Result<RowSet, QueryError> {
        let (sql, values) = build_select(select)?;

        with_converted_params(&values, |params| {
            let rows = self.executor.query_all(&sql, params)?;
            rows.iter().map(row_to_record).collect::<Result<RowSet, _>>()
        })
    }

    fn insert(&self, table: &str, values: &Record, key_column: &str) -> Result<InsertOutcome, QueryError> {
        let (sql, params) = build_insert(table, values, key_column)?;

        with_converted_params(&params, |params| {
            let row = self.executor.query_one(&sql, params)?;
            let returned = row_to_record(&row)?;
            Ok(InsertOutcome {
                generated_key: returned.get(key_column).cloned(),
                affected: 1,
            })
        })
    }

    fn update(&self, table: &str, values: &Record, condition: &Condition) -> Result<u64, QueryError> {
        let (sql, params) = build_update(table, values, condition)?;
        with_converted_params(&params, |params| Ok(self.executor.execute(&sql, params)?))
    }

    fn delete(&self, table: &str, condition: &Condition) -> Result<u64, QueryError> {
        let (sql, params) = build_delete(table, condition)?;
        with_converted_params(&params, |params| Ok(self.executor.execute(&sql, params)?))
    }
}
