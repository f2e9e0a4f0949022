//! Value types for sqlgate
//!
//! Two value domains meet in this module:
//! - [`DriverValue`]: the closed set of native scalar kinds a backend hands over
//! - [`GenericValue`]: the host-agnostic tagged value returned to callers
//!
//! Rows and result tables are built from generic values only.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

/// Native scalar produced by a backend for one cell.
///
/// Backends normalize their wire types into this set before marshalling:
/// narrow integers widen to `Int64`, dates become `Timestamp`, decimal and
/// identifier types arrive as `Text`. Anything a backend cannot normalize is
/// reported as `Unsupported` and fails the row scan.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverValue {
    /// SQL NULL
    Null,
    /// Boolean (BIT, BOOLEAN)
    Bool(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit floating point (REAL)
    Float32(f32),
    /// 64-bit floating point (DOUBLE PRECISION, FLOAT)
    Float64(f64),
    /// Text (VARCHAR, TEXT, NVARCHAR)
    Text(String),
    /// Binary payload (BYTEA, VARBINARY)
    Bytes(Vec<u8>),
    /// Point in time
    Timestamp(DateTime<Utc>),
    /// Backend kind with no normalization
    Unsupported {
        /// Vendor type name, for diagnostics
        type_name: String,
    },
}

impl DriverValue {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short kind name used in logs and scan errors
    pub fn kind(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int64(_) => "int64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
            Self::Unsupported { type_name } => type_name,
        }
    }

    /// Create an unsupported value for the given vendor type
    pub fn unsupported(type_name: impl Into<String>) -> Self {
        Self::Unsupported {
            type_name: type_name.into(),
        }
    }
}

impl From<bool> for DriverValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i16> for DriverValue {
    fn from(v: i16) -> Self {
        Self::Int64(i64::from(v))
    }
}

impl From<i32> for DriverValue {
    fn from(v: i32) -> Self {
        Self::Int64(i64::from(v))
    }
}

impl From<i64> for DriverValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f32> for DriverValue {
    fn from(v: f32) -> Self {
        Self::Float32(v)
    }
}

impl From<f64> for DriverValue {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<String> for DriverValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for DriverValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for DriverValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<DateTime<Utc>> for DriverValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<NaiveDateTime> for DriverValue {
    /// Naive timestamps are taken to be UTC
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v.and_utc())
    }
}

impl<T: Into<DriverValue>> From<Option<T>> for DriverValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

/// Host-agnostic tagged value.
///
/// Lossy: every number is an `f64`, binary payloads are text and
/// timestamps are Unix-epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenericValue {
    /// Absent value
    Nil,
    /// Any numeric value
    Number(f64),
    /// Text value
    String(String),
    /// Boolean value
    Boolean(bool),
}

impl GenericValue {
    /// Check if value is nil
    #[inline]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Get the number, if this is one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the string, if this is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the boolean, if this is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Textual form used when the value is submitted as a query argument.
    ///
    /// Integral numbers render without a fractional part. Nil has no textual
    /// form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Nil => None,
            Self::Number(n) => Some(format_number(*n)),
            Self::String(s) => Some(s.clone()),
            Self::Boolean(b) => Some(b.to_string()),
        }
    }
}

/// Largest magnitude below which every integral f64 is exact
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

impl From<f64> for GenericValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for GenericValue {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<i32> for GenericValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<bool> for GenericValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for GenericValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for GenericValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl<T: Into<GenericValue>> From<Option<T>> for GenericValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Nil,
        }
    }
}

/// One result row: column names paired with generic values, in result order.
///
/// Column names are shared between the rows of a table and need not be
/// unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column names
    columns: Arc<[String]>,
    /// Column values (same order as columns)
    values: Vec<GenericValue>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: impl Into<Arc<[String]>>, values: Vec<GenericValue>) -> Self {
        let columns = columns.into();
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get column names
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get all values
    #[inline]
    pub fn values(&self) -> &[GenericValue] {
        &self.values
    }

    /// Get value by column index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&GenericValue> {
        self.values.get(idx)
    }

    /// Get the first value whose column matches `name` (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> Option<&GenericValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Iterate over `(column, value)` pairs in result order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &GenericValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Convert row to HashMap; later duplicate columns win
    pub fn into_map(self) -> HashMap<String, GenericValue> {
        self.columns.iter().cloned().zip(self.values).collect()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Fully materialized result set.
///
/// `partial` is set when row iteration stopped early on a fetch or scan
/// failure; the rows decoded before the failure are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: Vec<Row>,
    partial: bool,
}

impl ResultTable {
    /// Create an empty, complete table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a complete table from rows
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            partial: false,
        }
    }

    /// Number of rows
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if table has no rows
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether iteration was truncated by a per-row failure
    #[inline]
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Get all rows
    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Get row by index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Row> {
        self.rows.get(idx)
    }

    /// Iterate over rows
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Take ownership of the rows
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub(crate) fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub(crate) fn mark_partial(&mut self) {
        self.partial = true;
    }
}

impl IntoIterator for ResultTable {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultTable {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl Serialize for ResultTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.rows)
    }
}
