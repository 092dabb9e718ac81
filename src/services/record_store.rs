//! Generic table-oriented access to the mirror.
//!
//! Rows travel as JSON objects keyed by column name. Implementations only need to agree on the
//! merge semantics: an upsert or update touches the columns present in the row and leaves every
//! other column of an existing row alone.

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

pub type Row = Map<String, Value>;

/// Mirror table names
pub mod tables {
    pub const EQUIPMENT: &str = "parc_ascenseurs";
    pub const BREAKDOWNS: &str = "parc_pannes";
    pub const STOPPAGES: &str = "parc_arrets";
    pub const PLANNING_TYPES: &str = "parc_type_planning";
    pub const SYNC_LOGS: &str = "parc_sync_logs";
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Gte(String, Value),
    IsNull(String),
    NotNull(String),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::Eq(column.to_string(), value.into())
    }

    pub fn neq(column: &str, value: impl Into<Value>) -> Self {
        Self::Neq(column.to_string(), value.into())
    }

    pub fn gte(column: &str, value: impl Into<Value>) -> Self {
        Self::Gte(column.to_string(), value.into())
    }

    pub fn is_null(column: &str) -> Self {
        Self::IsNull(column.to_string())
    }

    pub fn not_null(column: &str) -> Self {
        Self::NotNull(column.to_string())
    }

    pub fn is_in(column: &str, values: Vec<Value>) -> Self {
        Self::In(column.to_string(), values)
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Eq(c, _)
            | Self::Neq(c, _)
            | Self::Gte(c, _)
            | Self::IsNull(c)
            | Self::NotNull(c)
            | Self::In(c, _) => c,
        }
    }

    /// PostgREST query-string pair, e.g. `("en_arret", "eq.true")`.
    pub fn to_query_pair(&self) -> (String, String) {
        let operand = match self {
            Self::Eq(_, v) => format!("eq.{}", literal(v)),
            Self::Neq(_, v) => format!("neq.{}", literal(v)),
            Self::Gte(_, v) => format!("gte.{}", literal(v)),
            Self::IsNull(_) => "is.null".to_string(),
            Self::NotNull(_) => "not.is.null".to_string(),
            Self::In(_, values) => format!(
                "in.({})",
                values.iter().map(literal).collect::<Vec<_>>().join(",")
            ),
        };
        (self.column().to_string(), operand)
    }

    /// Evaluate against an in-memory row.
    pub fn matches(&self, row: &Row) -> bool {
        let field = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Self::Eq(_, v) => loosely_equal(field, v),
            Self::Neq(_, v) => !loosely_equal(field, v),
            Self::Gte(_, v) => compare(field, v).is_some_and(|o| o.is_ge()),
            Self::IsNull(_) => field.is_null(),
            Self::NotNull(_) => !field.is_null(),
            Self::In(_, values) => values.iter().any(|v| loosely_equal(field, v)),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (column, operand) = self.to_query_pair();
        write!(f, "{}={}", column, operand)
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

// Stored values may come back as strings or numbers depending on the backend.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    a == b || (!a.is_null() && !b.is_null() && literal(a) == literal(b))
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub table: String,
    /// Empty means every column.
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Default::default()
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order_by = Some((column.to_string(), true));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, table: &str, rows: &[Row]) -> Result<()>;

    /// Insert, or merge into the existing row sharing `on_conflict`.
    async fn upsert(&self, table: &str, rows: &[Row], on_conflict: &str) -> Result<()>;

    /// Merge `patch` into the row(s) where `key_column == key`.
    async fn update(&self, table: &str, key_column: &str, key: &Value, patch: &Row) -> Result<()>;

    async fn delete_all(&self, table: &str) -> Result<()>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<()>;

    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>>;

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64>;
}

/// Serialize a model into a store row.
pub fn to_row<T: serde::Serialize>(value: &T) -> Row {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Row::new(),
    }
}
