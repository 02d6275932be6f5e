//! Turn one query's raw rows into a report table entry.
//!
//! Steps, in order:
//! 1. Normalize decimals
//! 2. Nest by the grouping dimension if the query is grouped
//! 3. Wrap with metadata

use serde::{Deserialize, Serialize};

use super::grouper::{nest_by_period, GroupingKeys};
use super::normalizer::normalize;
use crate::error::TransformResult;
use crate::logs::log_info_indent;
use crate::models::{Metadata, QueryShape, ResultSet, TableData, TableEntry};

/// Column aliases every grouped query must project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAliases {
    /// Period column
    #[serde(default = "default_date_column")]
    pub date: String,

    /// Count column
    #[serde(default = "default_count_column")]
    pub count: String,
}

fn default_date_column() -> String {
    "month_year".to_string()
}

fn default_count_column() -> String {
    "count".to_string()
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            date: default_date_column(),
            count: default_count_column(),
        }
    }
}

/// Build the table entry for one query.
///
/// `shape` is either given explicitly by the config or inferred from the
/// query name with [`QueryShape::infer`].
pub fn assemble(
    name: &str,
    shape: &QueryShape,
    rows: ResultSet,
    metadata: Metadata,
    aliases: &ColumnAliases,
) -> TransformResult<TableEntry> {
    let rows = normalize(rows);

    let data = match shape {
        QueryShape::Plain => TableData::Rows(rows),
        QueryShape::GroupedBy { dimension } => {
            let keys = GroupingKeys {
                group_key: dimension,
                date_key: &aliases.date,
                count_key: &aliases.count,
            };
            let grouped = nest_by_period(&rows, &keys)?;
            log_info_indent(
                format!(
                    "{}: {} rows → {} groups by {}",
                    name,
                    rows.len(),
                    grouped.len(),
                    dimension
                ),
                1,
            );
            TableData::Grouped(grouped)
        }
    };

    Ok(TableEntry { metadata, data })
}
