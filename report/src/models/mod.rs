//! Domain models for the incident report.
//!
//! - [`Scalar`] - A single column value as read from the data source
//! - [`Row`] / [`ResultSet`] - Materialized query results
//! - [`QueryShape`] - Whether a query's rows are nested or kept flat
//! - [`Metadata`] - Provenance of one table in the report
//! - [`TableEntry`] / [`TableData`] - One named query's complete output
//! - [`GroupedResult`] / [`PeriodCount`] - The nested time-series shape
//! - [`ReportDocument`] - The whole report, keyed by query name

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Scalar values
// =============================================================================

/// A single column value.
///
/// `Decimal` only ever comes from the database (NUMERIC columns) and is
/// replaced by `Float` during normalization. It is never produced by
/// deserialization. `Json` holds json/jsonb columns and any array or
/// object found in a fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
    #[serde(skip_deserializing)]
    Decimal(Decimal),
}

impl Scalar {
    /// Whether this is an arbitrary-precision decimal.
    pub fn is_decimal(&self) -> bool {
        matches!(self, Scalar::Decimal(_))
    }

    /// Render the value as a JSON object key.
    ///
    /// Follows the usual JSON encoder convention for non-string keys:
    /// booleans become `true`/`false`, null becomes `null` and floats
    /// keep a fractional part (`1.0`), so a float group value never
    /// shares a bucket with the integer or text of the same digits.
    pub fn to_key(&self) -> String {
        match self {
            Scalar::Null => "null".to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => float_key(*f),
            Scalar::Text(s) => s.clone(),
            Scalar::Json(v) => v.to_string(),
            Scalar::Decimal(d) => d.to_string(),
        }
    }
}

/// Shortest round-trip form of a float, written in fixed notation for
/// exponents in `-4..16` and as `1e+16` / `1.5e-07` outside it.
fn float_key(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        let key = if value.is_sign_positive() { "Infinity" } else { "-Infinity" };
        return key.to_string();
    }

    // `{:e}` yields the shortest digits, e.g. "-1.25e3" or "0e0"
    let sci = format!("{:e}", value);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };

    if !(-4..16).contains(&exponent) {
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}{}e{}{:02}", sign, mantissa, exp_sign, exponent.abs());
    }

    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let point = exponent + 1;
    let body = if point <= 0 {
        format!("0.{}{}", "0".repeat(point.unsigned_abs() as usize), digits)
    } else if point as usize >= digits.len() {
        format!("{}{}.0", digits, "0".repeat(point as usize - digits.len()))
    } else {
        let (whole, fraction) = digits.split_at(point as usize);
        format!("{}.{}", whole, fraction)
    };
    format!("{}{}", sign, body)
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<Decimal> for Scalar {
    fn from(value: Decimal) -> Self {
        Scalar::Decimal(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

// =============================================================================
// Rows
// =============================================================================

/// One result row: column name to value, in column order.
pub type Row = IndexMap<String, Scalar>;

/// An ordered, fully materialized list of rows sharing one schema.
pub type ResultSet = Vec<Row>;

/// What a data source hands back for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// Column names in projection order.
    pub columns: Vec<String>,
    /// Rows in data-source order.
    pub rows: ResultSet,
}

impl QueryOutput {
    pub fn new(columns: Vec<String>, rows: ResultSet) -> Self {
        Self { columns, rows }
    }
}

// =============================================================================
// Query shape
// =============================================================================

/// How a query's rows are laid out in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryShape {
    /// Rows are written as-is.
    Plain,
    /// Rows are nested under the values of `dimension`.
    GroupedBy { dimension: String },
}

impl QueryShape {
    pub fn grouped_by(dimension: impl Into<String>) -> Self {
        QueryShape::GroupedBy {
            dimension: dimension.into(),
        }
    }

    pub fn is_grouped(&self) -> bool {
        matches!(self, QueryShape::GroupedBy { .. })
    }
}

impl fmt::Display for QueryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryShape::Plain => f.write_str("plain"),
            QueryShape::GroupedBy { dimension } => write!(f, "grouped by {}", dimension),
        }
    }
}

// =============================================================================
// Report structure
// =============================================================================

/// Provenance of one table in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub query_name: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Metadata {
    pub fn new(
        query_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            query_name: query_name.into(),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            kind: kind.into(),
        }
    }
}

/// One period bucket inside a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodCount {
    pub month_year: Scalar,
    pub count: Scalar,
}

/// Group value to its period buckets, in first-seen order.
pub type GroupedResult = IndexMap<String, Vec<PeriodCount>>;

/// The `data` field of a table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableData {
    Grouped(GroupedResult),
    Rows(ResultSet),
}

impl TableData {
    pub fn is_grouped(&self) -> bool {
        matches!(self, TableData::Grouped(_))
    }

    /// Number of rows, or number of groups for grouped data.
    pub fn len(&self) -> usize {
        match self {
            TableData::Grouped(groups) => groups.len(),
            TableData::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One named query's complete output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub metadata: Metadata,
    pub data: TableData,
}

/// All table entries of one run, in configuration order.
pub type ReportDocument = IndexMap<String, TableEntry>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_scalar_deserializes_json_values() {
        let row: Row = serde_json::from_str(
            r#"{ "severity": "1", "count": 5, "ratio": 0.5, "open": true, "closed_at": null }"#,
        )
        .unwrap();

        assert_eq!(row["severity"], Scalar::Text("1".into()));
        assert_eq!(row["count"], Scalar::Int(5));
        assert_eq!(row["ratio"], Scalar::Float(0.5));
        assert_eq!(row["open"], Scalar::Bool(true));
        assert_eq!(row["closed_at"], Scalar::Null);
        // Column order is kept
        let columns: Vec<_> = row.keys().cloned().collect();
        assert_eq!(columns, vec!["severity", "count", "ratio", "open", "closed_at"]);
    }

    #[test]
    fn test_scalar_keys() {
        assert_eq!(Scalar::Text("P1".into()).to_key(), "P1");
        assert_eq!(Scalar::Int(2).to_key(), "2");
        assert_eq!(Scalar::Float(2.5).to_key(), "2.5");
        assert_eq!(Scalar::Bool(false).to_key(), "false");
        assert_eq!(Scalar::Null.to_key(), "null");
        assert_eq!(
            Scalar::Decimal(Decimal::from_str("1.50").unwrap()).to_key(),
            "1.50"
        );
    }

    #[test]
    fn test_float_keys_keep_fraction() {
        assert_eq!(Scalar::Float(1.0).to_key(), "1.0");
        assert_eq!(Scalar::Float(-0.0).to_key(), "-0.0");
        assert_eq!(Scalar::Float(0.0).to_key(), "0.0");
        assert_eq!(Scalar::Float(123.456).to_key(), "123.456");
        assert_eq!(Scalar::Float(0.0001).to_key(), "0.0001");
        assert_eq!(Scalar::Float(0.00001).to_key(), "1e-05");
        assert_eq!(Scalar::Float(1.5e-7).to_key(), "1.5e-07");
        assert_eq!(Scalar::Float(1e15).to_key(), "1000000000000000.0");
        assert_eq!(Scalar::Float(1e16).to_key(), "1e+16");
        assert_eq!(Scalar::Float(f64::INFINITY).to_key(), "Infinity");
        assert_eq!(Scalar::Float(f64::NAN).to_key(), "NaN");
    }

    #[test]
    fn test_json_values_deserialize_as_json() {
        let row: Row = serde_json::from_str(r#"{ "tags": ["p1", "network"], "n": 1 }"#).unwrap();
        assert_eq!(row["tags"], Scalar::Json(json!(["p1", "network"])));
        assert_eq!(row["n"], Scalar::Int(1));
        assert_eq!(row["tags"].to_key(), r#"["p1","network"]"#);
    }

    #[test]
    fn test_metadata_serialization() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let metadata = Metadata::new("total_incidents", ts, "incident_data");
        let value = serde_json::to_value(&metadata).unwrap();

        assert_eq!(
            value,
            json!({
                "query_name": "total_incidents",
                "timestamp": "2024-03-01T12:00:00Z",
                "type": "incident_data"
            })
        );
    }

    #[test]
    fn test_table_data_untagged() {
        let mut groups = GroupedResult::new();
        groups.insert(
            "1".into(),
            vec![PeriodCount {
                month_year: "01/2024".into(),
                count: 5i64.into(),
            }],
        );
        let grouped = serde_json::to_value(TableData::Grouped(groups)).unwrap();
        assert_eq!(grouped, json!({ "1": [{ "month_year": "01/2024", "count": 5 }] }));

        let rows = serde_json::to_value(TableData::Rows(vec![])).unwrap();
        assert_eq!(rows, json!([]));
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(QueryShape::Plain.to_string(), "plain");
        assert_eq!(
            QueryShape::grouped_by("severity").to_string(),
            "grouped by severity"
        );
        assert!(QueryShape::grouped_by("team").is_grouped());
    }
}
