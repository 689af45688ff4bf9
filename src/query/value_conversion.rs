//! Value conversion between entity JSON values, sea-query values and may_postgres.
//!
//! Parameter binding follows a two-pass pattern:
//! 1. First pass: collect all values into owned parameters
//! 2. Second pass: create references to the stored values
//!
//! This keeps the `&dyn ToSql` references valid for the duration of the closure.
//!
//! Parameters are encoded for the type the prepared statement reports for
//! their position, so an integer binds to `SMALLINT`, `INTEGER`, `BIGINT` or
//! `NUMERIC` columns alike, and a string binds to `UUID`, `NUMERIC` and the
//! date/time types by parsing it.

use super::QueryError;
use crate::entity::Record;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use may_postgres::types::{FromSql, IsNull, ToSql, Type};
use may_postgres::Row;
use postgres_types::Kind;
use rust_decimal::Decimal;
use sea_query::Value;
use serde_json::{Number, Value as JsonValue};
use std::error::Error;
use std::fmt::Display;
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// Statement parameter, encoded for whatever type its position expects
#[derive(Debug, Clone, PartialEq)]
enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(JsonValue),
}

impl ToSql for Param {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Param::Null => Ok(IsNull::Yes),
            Param::Bool(b) => bind_bool(*b, ty, out),
            Param::Int(i) => bind_int(*i, ty, out),
            Param::Float(f) => bind_float(*f, ty, out),
            Param::Text(s) => bind_text(s, ty, out),
            Param::Json(j) => bind_json(j, ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

fn mismatch(value: impl Display, ty: &Type) -> BoxError {
    format!("cannot bind {value} to a parameter of type {ty}").into()
}

fn is_text(ty: &Type) -> bool {
    <String as ToSql>::accepts(ty)
}

fn is_json(ty: &Type) -> bool {
    *ty == Type::JSON || *ty == Type::JSONB
}

fn bind_bool(b: bool, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::BOOL {
        b.to_sql(ty, out)
    } else if is_text(ty) {
        b.to_string().to_sql(ty, out)
    } else if is_json(ty) {
        JsonValue::Bool(b).to_sql(ty, out)
    } else {
        Err(mismatch(b, ty))
    }
}

fn bind_int(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::INT8 {
        i.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(i).map_err(|_| mismatch(i, ty))?.to_sql(ty, out)
    } else if *ty == Type::INT2 {
        i16::try_from(i).map_err(|_| mismatch(i, ty))?.to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        (i as f64).to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        (i as f32).to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::from(i).to_sql(ty, out)
    } else if is_text(ty) {
        i.to_string().to_sql(ty, out)
    } else if is_json(ty) {
        JsonValue::from(i).to_sql(ty, out)
    } else {
        Err(mismatch(i, ty))
    }
}

fn bind_float(f: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::FLOAT8 {
        f.to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        (f as f32).to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::try_from(f)?.to_sql(ty, out)
    } else if is_text(ty) {
        f.to_string().to_sql(ty, out)
    } else if is_json(ty) {
        Number::from_f64(f)
            .map_or(JsonValue::Null, JsonValue::Number)
            .to_sql(ty, out)
    } else {
        Err(mismatch(f, ty))
    }
}

fn bind_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if is_text(ty) {
        s.to_sql(ty, out)
    } else if matches!(ty.kind(), Kind::Enum(_)) {
        // enum labels travel as plain text
        out.extend_from_slice(s.as_bytes());
        Ok(IsNull::No)
    } else if *ty == Type::UUID {
        s.parse::<Uuid>()?.to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        s.parse::<Decimal>()?.to_sql(ty, out)
    } else if *ty == Type::DATE {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out)
    } else if *ty == Type::TIME {
        s.parse::<NaiveTime>()?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMP {
        parse_timestamp(s)?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMPTZ {
        parse_timestamptz(s)?.to_sql(ty, out)
    } else if *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 {
        bind_int(s.parse()?, ty, out)
    } else if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 {
        bind_float(s.parse()?, ty, out)
    } else if *ty == Type::BOOL {
        bind_bool(s.parse()?, ty, out)
    } else if is_json(ty) {
        JsonValue::String(s.to_string()).to_sql(ty, out)
    } else {
        Err(mismatch(format!("'{s}'"), ty))
    }
}

fn bind_json(j: &JsonValue, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if is_json(ty) {
        j.to_sql(ty, out)
    } else if is_text(ty) {
        j.to_string().to_sql(ty, out)
    } else {
        Err(mismatch(j, ty))
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
}

// offset-less values are taken as UTC
fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| parse_timestamp(s).map(|naive| naive.and_utc()))
}

/// Convert an entity field value into a sea-query value
///
/// Integers map to `BigInt` and are narrowed at bind time to the column's
/// integer width. Arrays and objects are bound as JSON.
pub fn json_to_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::String(None),
        JsonValue::Bool(b) => Value::Bool(Some(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::BigInt(Some(i))
            } else {
                Value::Double(n.as_f64())
            }
        }
        JsonValue::String(s) => Value::String(Some(s.clone())),
        JsonValue::Array(_) | JsonValue::Object(_) => Value::Json(Some(Box::new(value.clone()))),
    }
}

fn to_param(value: &Value) -> Result<Param, QueryError> {
    let param = match value {
        Value::Bool(Some(b)) => Param::Bool(*b),
        Value::Int(Some(i)) => Param::Int(i64::from(*i)),
        Value::BigInt(Some(i)) => Param::Int(*i),
        Value::BigUnsigned(Some(u)) => Param::Int(i64::try_from(*u).map_err(|_| {
            QueryError::UnsupportedValue(format!(
                "BigUnsigned value {u} exceeds i64::MAX, cannot be bound as BIGINT"
            ))
        })?),
        Value::Double(Some(d)) => Param::Float(*d),
        Value::String(Some(s)) => Param::Text(s.clone()),
        Value::Json(Some(j)) => Param::Json((**j).clone()),
        Value::Bool(None)
        | Value::Int(None)
        | Value::BigInt(None)
        | Value::BigUnsigned(None)
        | Value::Double(None)
        | Value::String(None)
        | Value::Json(None) => Param::Null,
        _ => {
            return Err(QueryError::UnsupportedValue(format!(
                "Unsupported value type in query: {value:?}"
            )));
        }
    };
    Ok(param)
}

/// Convert sea-query values to may_postgres `ToSql` parameters and run `f` with them
///
/// # Errors
///
/// Returns `QueryError::UnsupportedValue` if a value type has no binding, or any
/// error returned by `f`.
pub fn with_converted_params<F, R>(values: &sea_query::Values, f: F) -> Result<R, QueryError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, QueryError>,
{
    // First pass: collect all values into owned parameters
    let stored = values.iter().map(to_param).collect::<Result<Vec<_>, _>>()?;

    // Second pass: create references to the stored values
    let params: Vec<&dyn ToSql> = stored.iter().map(|p| p as &dyn ToSql).collect();

    f(&params)
}

/// Column value decoded by its wire type
///
/// Numbers, booleans and JSON keep their JSON shape. `NUMERIC`, `UUID` and the
/// date/time types become their text form, which binds back to the same
/// column type. Anything else is read as UTF-8 text (text types, enums).
#[derive(Debug)]
struct Decoded(JsonValue);

impl<'a> FromSql<'a> for Decoded {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = if *ty == Type::INT2 {
            JsonValue::from(i16::from_sql(ty, raw)?)
        } else if *ty == Type::INT4 {
            JsonValue::from(i32::from_sql(ty, raw)?)
        } else if *ty == Type::INT8 {
            JsonValue::from(i64::from_sql(ty, raw)?)
        } else if *ty == Type::FLOAT4 {
            float_value(f64::from(f32::from_sql(ty, raw)?))
        } else if *ty == Type::FLOAT8 {
            float_value(f64::from_sql(ty, raw)?)
        } else if *ty == Type::BOOL {
            JsonValue::Bool(bool::from_sql(ty, raw)?)
        } else if is_json(ty) {
            JsonValue::from_sql(ty, raw)?
        } else if *ty == Type::NUMERIC {
            JsonValue::String(Decimal::from_sql(ty, raw)?.to_string())
        } else if *ty == Type::UUID {
            JsonValue::String(Uuid::from_sql(ty, raw)?.to_string())
        } else if *ty == Type::DATE {
            JsonValue::String(NaiveDate::from_sql(ty, raw)?.to_string())
        } else if *ty == Type::TIME {
            JsonValue::String(NaiveTime::from_sql(ty, raw)?.to_string())
        } else if *ty == Type::TIMESTAMP {
            JsonValue::String(NaiveDateTime::from_sql(ty, raw)?.to_string())
        } else if *ty == Type::TIMESTAMPTZ {
            JsonValue::String(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339())
        } else {
            JsonValue::String(std::str::from_utf8(raw)?.to_string())
        };
        Ok(Decoded(value))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

// NaN and infinities have no JSON form
fn float_value(f: f64) -> JsonValue {
    Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
}

/// Decode a database row into a record keyed by column name
///
/// # Errors
///
/// Returns `QueryError::Decode` if a column cannot be read as its declared type.
pub fn row_to_record(row: &Row) -> Result<Record, QueryError> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = row
            .try_get::<_, Option<Decoded>>(idx)
            .map_err(|e| QueryError::Decode(format!("column '{}': {e}", column.name())))?
            .map_or(JsonValue::Null, |decoded| decoded.0);
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}
