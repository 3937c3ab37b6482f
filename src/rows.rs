//! Row decoding for the record store's `user_field_names` schema.
//!
//! Rows arrive as flat JSON objects keyed by human field names. Single-select
//! fields come either as a plain label or as an option object `{id, value, color}`,
//! link fields as arrays of `{id, value}`. The helpers here are
//! lenient about shape and strict only about ids.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::fields::{LinkRef, RowId};

/// One record as returned by the store.
pub type Row = Map<String, Value>;

/// A partial set of fields sent with create/update requests.
pub type Fields = Map<String, Value>;

/// Field names used by the console's tables.
pub mod field {
    pub const ID: &str = "id";
    pub const NAME: &str = "Name";
    pub const DESCRIPTION: &str = "Description";
    pub const STATUS: &str = "Status";
    pub const CATEGORY: &str = "Category";
    pub const COMPLETION: &str = "Completion %";
    pub const OWNER: &str = "Owner";
    pub const DEADLINE: &str = "Deadline";
    pub const TYPE: &str = "Type";
    pub const PROJECT: &str = "Project";
    pub const CLIENT: &str = "Client";
    pub const ASSIGNMENT: &str = "Assignment";
    pub const ASSIGNEE: &str = "Assignee";
    pub const TASK: &str = "Task";
    pub const DONE: &str = "Done";
    pub const PRIORITY: &str = "Priority";
    pub const NEEDS_APPROVAL: &str = "Needs Approval";
    pub const APPROVAL_STATUS: &str = "Approval Status";
    pub const STARTED_BY: &str = "Started By";
    pub const APPROVED_BY: &str = "Approved By";
    pub const SUBMITTED_AT: &str = "Submitted At";
    pub const APPROVED_AT: &str = "Approved At";
    pub const APPROVAL_NOTES: &str = "Approval Notes";
    pub const EXPECTED_VALUE: &str = "Expected Value";
    pub const NEXT_ACTION_DATE: &str = "Next Action Date";
}

/// Decode a typed entity from a store row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self, DecodeError>;
}

/// Decode every row, skipping (and logging) the ones that do not fit.
pub fn decode_all<T: FromRow>(rows: &[Row], table: &str) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match T::from_row(row) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(table, error = %e, "skipping undecodable row");
                None
            }
        })
        .collect()
}

pub fn row_id(row: &Row) -> Result<RowId, DecodeError> {
    row.get(field::ID).and_then(Value::as_u64).ok_or(DecodeError::MissingId)
}

/// Plain text, or `None` for null/missing/empty.
pub fn text(row: &Row, name: &str) -> Option<String> {
    match row.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        // Collaborator / single-select style objects carry a display value.
        Value::Object(o) => o
            .get("value")
            .or_else(|| o.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Label of a single-select field.
pub fn select(row: &Row, name: &str) -> Option<String> {
    text(row, name)
}

pub fn boolean(row: &Row, name: &str) -> bool {
    match row.get(name) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
        _ => false,
    }
}

pub fn number(row: &Row, name: &str) -> Option<f64> {
    match row.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn date(row: &Row, name: &str) -> Option<NaiveDate> {
    let raw = row.get(name)?.as_str()?;
    // Date fields with "include time" enabled come back as full timestamps.
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

pub fn timestamp(row: &Row, name: &str) -> Option<DateTime<Utc>> {
    let raw = row.get(name)?.as_str()?;
    DateTime::parse_from_rfc3339(raw).ok().map(|d| d.with_timezone(&Utc))
}

/// Link-array field; missing or malformed entries are dropped.
pub fn links(row: &Row, name: &str) -> Vec<LinkRef> {
    match row.get(name) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| serde_json::from_value::<LinkRef>(item.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

pub fn opt_string(v: Option<&str>) -> Value {
    v.map_or(Value::Null, |s| Value::String(s.to_string()))
}

pub fn opt_timestamp(v: Option<DateTime<Utc>>) -> Value {
    v.map_or(Value::Null, |t| Value::String(t.to_rfc3339()))
}

/// Link field value for create/update requests: the store takes bare row ids.
pub fn link_ids(ids: &[RowId]) -> Value {
    Value::Array(ids.iter().map(|id| Value::from(*id)).collect())
}
