//! Canned result sets keyed by query name.
//!
//! Fixture file format:
//!
//! ```json
//! {
//!   "incidents_by_severity": [
//!     { "severity": "1", "month_year": "01/2024", "count": 5 }
//!   ],
//!   "total_incidents": [{ "count": 42 }]
//! }
//! ```

use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::Path;

use super::QuerySource;
use crate::error::{SourceError, SourceResult};
use crate::models::{QueryOutput, ResultSet};

/// Serves stored rows instead of running queries.
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    tables: IndexMap<String, ResultSet>,
    executed: Vec<String>,
}

impl FixtureSource {
    /// Build a source from in-memory tables.
    pub fn from_tables(tables: IndexMap<String, ResultSet>) -> SourceResult<Self> {
        for (name, rows) in &tables {
            check_columns(name, rows)?;
        }
        Ok(Self {
            tables,
            executed: Vec::new(),
        })
    }

    /// Parse a fixture JSON document.
    pub fn from_json(json: &str) -> SourceResult<Self> {
        Self::from_tables(serde_json::from_str(json)?)
    }

    /// Load a fixture file.
    pub fn from_path(path: impl AsRef<Path>) -> SourceResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Add or replace the rows served for `name`.
    pub fn insert(&mut self, name: impl Into<String>, rows: ResultSet) -> SourceResult<()> {
        let name = name.into();
        check_columns(&name, &rows)?;
        self.tables.insert(name, rows);
        Ok(())
    }

    /// Names of the queries served so far, in call order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}

#[async_trait]
impl QuerySource for FixtureSource {
    async fn execute(&mut self, name: &str, _sql: &str) -> SourceResult<QueryOutput> {
        let rows = self
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::MissingFixture(name.to_string()))?;
        self.executed.push(name.to_string());

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Ok(QueryOutput::new(columns, rows))
    }
}

/// Every row of a table must carry the first row's columns.
fn check_columns(name: &str, rows: &ResultSet) -> SourceResult<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };

    for (i, row) in rows.iter().enumerate().skip(1) {
        let same = row.len() == first.len() && first.keys().all(|k| row.contains_key(k));
        if !same {
            return Err(SourceError::Fixture(format!(
                "{}: row {} has columns [{}], expected [{}]",
                name,
                i,
                row.keys().cloned().collect::<Vec<_>>().join(", "),
                first.keys().cloned().collect::<Vec<_>>().join(", "),
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scalar;
    use std::io::Write;

    const FIXTURE: &str = r#"{
        "incidents_by_severity": [
            { "severity": "1", "month_year": "01/2024", "count": 5 },
            { "severity": "2", "month_year": "01/2024", "count": 2 }
        ],
        "total_incidents": [{ "count": 7 }],
        "empty": []
    }"#;

    #[tokio::test]
    async fn test_serves_rows_in_order() {
        let mut source = FixtureSource::from_json(FIXTURE).unwrap();

        let output = source.execute("incidents_by_severity", "SELECT 1").await.unwrap();
        assert_eq!(output.columns, vec!["severity", "month_year", "count"]);
        assert_eq!(output.rows.len(), 2);
        assert_eq!(output.rows[1]["severity"], Scalar::Text("2".into()));

        let output = source.execute("empty", "SELECT 1").await.unwrap();
        assert!(output.columns.is_empty());
        assert!(output.rows.is_empty());

        assert_eq!(source.executed(), ["incidents_by_severity", "empty"]);
    }

    #[tokio::test]
    async fn test_missing_fixture() {
        let mut source = FixtureSource::from_json(FIXTURE).unwrap();
        let err = source.execute("incidents_by_team", "SELECT 1").await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::MissingFixture(ref name) if name == "incidents_by_team"
        ));
    }

    #[test]
    fn test_inconsistent_columns_rejected() {
        let json = r#"{ "t": [ { "a": 1, "b": 2 }, { "a": 1 } ] }"#;
        let err = FixtureSource::from_json(json).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            FixtureSource::from_json(r#"{ "t": 3 }"#),
            Err(SourceError::Json(_))
        ));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();

        let source = FixtureSource::from_path(file.path()).unwrap();
        assert_eq!(source.tables.len(), 3);
    }
}
