//! Run driver: execute every configured query and build the report.
//!
//! # Example
//!
//! ```rust,ignore
//! use incident_report::{run_against_postgres, ConnectionSettings, ReportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ReportConfig::load("report.json")?;
//!     let settings = ConnectionSettings {
//!         password: Some("secret".into()),
//!         ..ConnectionSettings::default()
//!     };
//!     let result = run_against_postgres(&config, &settings, &config.output).await?;
//!     println!("Wrote {} tables", result.tables);
//!     Ok(())
//! }
//! ```

use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::config::{ConnectionSettings, ReportConfig};
use crate::error::{ReportError, ReportResult};
use crate::logs::{log_info, log_info_indent, log_success};
use crate::models::{Metadata, ReportDocument};
use crate::output::write_report;
use crate::source::{PostgresSource, QuerySource};
use crate::transform::assemble;

/// Outcome of a run that wrote its report
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The report that was written
    pub report: ReportDocument,
    /// Number of tables in the report
    pub tables: usize,
    /// Where the report was written
    pub output: PathBuf,
}

/// Run all configured queries, in order, and assemble the report.
///
/// Queries run one at a time. The first failure aborts the run and is
/// returned as [`ReportError::Query`] carrying the query name; no partial
/// report is produced.
pub async fn run_report<S>(config: &ReportConfig, source: &mut S) -> ReportResult<ReportDocument>
where
    S: QuerySource + ?Sized,
{
    let plan = config.plan()?;
    let mut report = ReportDocument::with_capacity(plan.len());

    for query in plan {
        log_info(format!("Processing query: {}", query.name));

        let output = source
            .execute(query.name, query.sql)
            .await
            .map_err(|e| ReportError::query(query.name, e))?;
        log_info_indent(
            format!("{} rows, columns: {}", output.rows.len(), output.columns.join(", ")),
            1,
        );

        let metadata = Metadata::new(query.name, Utc::now(), config.data_type.as_str());
        let entry = assemble(query.name, &query.shape, output.rows, metadata, &config.columns)
            .map_err(|e| ReportError::query(query.name, e))?;

        report.insert(query.name.to_string(), entry);
    }

    log_success(format!("{} tables assembled", report.len()));
    Ok(report)
}

/// Run all queries and write the report to `output`.
///
/// Nothing is written if any query fails.
pub async fn run_to_file<S>(
    config: &ReportConfig,
    source: &mut S,
    output: &Path,
) -> ReportResult<RunResult>
where
    S: QuerySource + ?Sized,
{
    let report = run_report(config, source).await?;
    write_report(&report, output)?;
    log_success(format!("Report written to {}", output.display()));

    Ok(RunResult {
        tables: report.len(),
        report,
        output: output.to_path_buf(),
    })
}

/// Connect to PostgreSQL, run all queries, write the report and close
/// the connection.
///
/// The connection is closed whether or not the run succeeded. Missing
/// credentials fail before connecting.
pub async fn run_against_postgres(
    config: &ReportConfig,
    settings: &ConnectionSettings,
    output: &Path,
) -> ReportResult<RunResult> {
    settings.validate()?;
    let mut source = PostgresSource::connect(settings).await?;

    let result = run_to_file(config, &mut source, output).await;
    source.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryEntry;
    use crate::error::{ConfigError, QueryFailure, SourceError, SourceResult, TransformError};
    use crate::logs::LOG_BROADCASTER;
    use crate::models::{QueryOutput, ResultSet, Scalar, TableData};
    use crate::source::FixtureSource;
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;

    fn config(names: &[&str]) -> ReportConfig {
        let queries = names
            .iter()
            .map(|n| (n.to_string(), QueryEntry::Sql(format!("SELECT * FROM {}", n))))
            .collect();
        ReportConfig::new(queries)
    }

    fn rows(value: serde_json::Value) -> ResultSet {
        serde_json::from_value(value).unwrap()
    }

    fn fixtures() -> FixtureSource {
        let mut tables = IndexMap::new();
        tables.insert(
            "incidents_by_severity".to_string(),
            rows(json!([
                { "severity": "1", "month_year": "01/2024", "count": 5 },
                { "severity": "1", "month_year": "02/2024", "count": 7 },
                { "severity": "2", "month_year": "01/2024", "count": 2 }
            ])),
        );
        tables.insert("total_incidents".to_string(), rows(json!([{ "count": 14 }])));
        tables.insert("incidents_by_team".to_string(), Vec::new());
        FixtureSource::from_tables(tables).unwrap()
    }

    #[tokio::test]
    async fn test_report_follows_config_order() {
        let config = config(&["total_incidents", "incidents_by_severity", "incidents_by_team"]);
        let mut source = fixtures();

        let report = run_report(&config, &mut source).await.unwrap();

        let names: Vec<_> = report.keys().cloned().collect();
        assert_eq!(names, vec!["total_incidents", "incidents_by_severity", "incidents_by_team"]);
        assert_eq!(source.executed(), names.as_slice());

        assert_eq!(report["total_incidents"].data, TableData::Rows(rows(json!([{ "count": 14 }]))));
        assert_eq!(
            serde_json::to_value(&report["incidents_by_severity"].data).unwrap(),
            json!({
                "1": [
                    { "month_year": "01/2024", "count": 5 },
                    { "month_year": "02/2024", "count": 7 }
                ],
                "2": [{ "month_year": "01/2024", "count": 2 }]
            })
        );
        assert_eq!(report["incidents_by_team"].data, TableData::Grouped(Default::default()));
    }

    #[tokio::test]
    async fn test_metadata() {
        let config = config(&["total_incidents"]);
        let report = run_report(&config, &mut fixtures()).await.unwrap();

        let metadata = &report["total_incidents"].metadata;
        assert_eq!(metadata.query_name, "total_incidents");
        assert_eq!(metadata.kind, "incident_data");
        assert!(chrono::DateTime::parse_from_rfc3339(&metadata.timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_explicit_shape_overrides_name() {
        let mut queries = IndexMap::new();
        queries.insert(
            "incidents_by_severity".to_string(),
            QueryEntry::Detailed {
                sql: "SELECT 1".into(),
                group_by: None,
                plain: true,
            },
        );
        let config = ReportConfig::new(queries);

        let report = run_report(&config, &mut fixtures()).await.unwrap();
        assert!(!report["incidents_by_severity"].data.is_grouped());
        assert_eq!(report["incidents_by_severity"].data.len(), 3);
    }

    #[tokio::test]
    async fn test_source_failure_aborts_run() {
        let config = config(&["total_incidents", "incidents_by_priority", "incidents_by_severity"]);
        let mut source = fixtures();

        let err = run_report(&config, &mut source).await.unwrap_err();

        match err {
            ReportError::Query {
                name,
                source: QueryFailure::Source(SourceError::MissingFixture(_)),
            } => {
                assert_eq!(name, "incidents_by_priority");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Later queries never ran
        assert_eq!(source.executed(), ["total_incidents"]);
    }

    #[tokio::test]
    async fn test_missing_column_aborts_run() {
        let mut source = fixtures();
        source
            .insert("incidents_by_state", rows(json!([{ "state": "New", "count": 3 }])))
            .unwrap();
        let config = config(&["incidents_by_state"]);

        let err = run_report(&config, &mut source).await.unwrap_err();
        assert!(matches!(
            err,
            ReportError::Query {
                source: QueryFailure::Transform(TransformError::MissingColumn { .. }),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_run_to_file_writes_nothing_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let config = config(&["total_incidents", "not_there"]);

        assert!(run_to_file(&config, &mut fixtures(), &path).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_run_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let config = config(&["total_incidents", "incidents_by_severity"]);

        let result = run_to_file(&config, &mut fixtures(), &path).await.unwrap();
        assert_eq!(result.tables, 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let written: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(written["total_incidents"]["data"][0]["count"], 14);
        assert_eq!(written["incidents_by_severity"]["data"]["2"][0]["count"], 2);
    }

    #[tokio::test]
    async fn test_postgres_run_needs_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let config = config(&["total_incidents"]);

        let err = run_against_postgres(&config, &ConnectionSettings::default(), &path)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Config(ConfigError::MissingVariable(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_postgres_connect_failure_is_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let config = config(&["total_incidents"]);
        // Nothing listens on port 1
        let settings = ConnectionSettings {
            url: Some("postgresql://postgres:pw@127.0.0.1:1/postgres".into()),
            ..ConnectionSettings::default()
        };

        let err = run_against_postgres(&config, &settings, &path).await.unwrap_err();
        assert!(matches!(err, ReportError::Source(SourceError::Connect(_))));
        assert!(!path.exists());
    }

    /// Returns decimal counts and answers slower for earlier queries.
    struct SlowDecimalSource;

    #[async_trait]
    impl QuerySource for SlowDecimalSource {
        async fn execute(&mut self, name: &str, _sql: &str) -> SourceResult<QueryOutput> {
            let delay = if name.ends_with("first") { 30 } else { 1 };
            tokio::time::sleep(Duration::from_millis(delay)).await;

            let mut row = crate::models::Row::new();
            row.insert("ratio".into(), Scalar::Decimal(Decimal::from_str("0.25").unwrap()));
            Ok(QueryOutput::new(vec!["ratio".into()], vec![row]))
        }
    }

    #[tokio::test]
    async fn test_latency_does_not_change_order_and_decimals_normalized() {
        let config = config(&["ratio_first", "ratio_second"]);
        let report = run_report(&config, &mut SlowDecimalSource).await.unwrap();

        let names: Vec<_> = report.keys().cloned().collect();
        assert_eq!(names, vec!["ratio_first", "ratio_second"]);
        match &report["ratio_first"].data {
            TableData::Rows(rows) => assert_eq!(rows[0]["ratio"], Scalar::Float(0.25)),
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_logs_each_query() {
        let mut rx = LOG_BROADCASTER.subscribe();
        let config = config(&["total_incidents", "incidents_by_severity"]);
        run_report(&config, &mut fixtures()).await.unwrap();

        let mut processed = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(entry) => {
                    if let Some(name) = entry.message.strip_prefix("Processing query: ") {
                        processed.push(name.to_string());
                    }
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        // Other tests may log concurrently through the same broadcaster
        assert!(processed.iter().any(|n| n == "total_incidents"));
        assert!(processed.iter().any(|n| n == "incidents_by_severity"));
    }
}
