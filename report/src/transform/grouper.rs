//! Nest flat time-series rows under their group value.
//!
//! # Architecture
//!
//! ```text
//! Query rows (flat)                           →  Grouped output
//! ┌──────────────────────────────────────┐       ┌──────────────────────────────┐
//! │ severity: 1, month_year: 01/2024, 5  │       │ "1": [ {01/2024, 5},         │
//! │ severity: 1, month_year: 02/2024, 7  │  →    │        {02/2024, 7} ]        │
//! │ severity: 2, month_year: 01/2024, 2  │       │ "2": [ {01/2024, 2} ]        │
//! └──────────────────────────────────────┘       └──────────────────────────────┘
//! ```
//!
//! Groups appear in first-seen order and each bucket keeps row order. No
//! sorting, deduplication or merging happens here: queries are expected to
//! return rows already aggregated and ordered.

use crate::error::{TransformError, TransformResult};
use crate::models::{GroupedResult, PeriodCount, ResultSet, Row, Scalar};

/// Column names the transformer reads from every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingKeys<'a> {
    /// Column whose values become the top-level keys.
    pub group_key: &'a str,
    /// Column holding the period label.
    pub date_key: &'a str,
    /// Column holding the count for that period.
    pub count_key: &'a str,
}

/// Nest rows by `keys.group_key` into period/count buckets.
///
/// Fails on the first row missing any of the three columns.
pub fn nest_by_period(rows: &ResultSet, keys: &GroupingKeys<'_>) -> TransformResult<GroupedResult> {
    let mut grouped = GroupedResult::new();

    for (index, row) in rows.iter().enumerate() {
        let group = column(row, index, keys.group_key)?;
        let period = column(row, index, keys.date_key)?;
        let count = column(row, index, keys.count_key)?;

        grouped.entry(group.to_key()).or_default().push(PeriodCount {
            month_year: period.clone(),
            count: count.clone(),
        });
    }

    Ok(grouped)
}

fn column<'r>(row: &'r Row, index: usize, name: &str) -> TransformResult<&'r Scalar> {
    row.get(name).ok_or_else(|| TransformError::MissingColumn {
        row: index,
        column: name.to_string(),
    })
}
