//! Error types for the incident report run.
//!
//! - [`SourceError`] - Query execution and data-source errors
//! - [`TransformError`] - Contract violations inside the transformation engine
//! - [`ConfigError`] - Report config and connection settings errors
//! - [`OutputError`] - Report file writing errors
//! - [`ReportError`] - Top-level run errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Source Errors
// =============================================================================

/// Errors raised while acquiring a data source or executing a query.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Could not connect or authenticate to the database.
    #[error("Failed to connect to database: {0}")]
    Connect(#[source] tokio_postgres::Error),

    /// The database rejected or failed the query.
    #[error("Query execution failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// A result column has a type the report cannot represent.
    #[error("Unsupported type '{type_name}' for column '{column}'")]
    UnsupportedType { column: String, type_name: String },

    /// No canned result set exists for this query.
    #[error("No fixture for query: {0}")]
    MissingFixture(String),

    /// Fixture file has the wrong shape.
    #[error("Invalid fixture: {0}")]
    Fixture(String),

    /// Failed to read a fixture file.
    #[error("Fixture IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Fixture file is not valid JSON.
    #[error("Fixture JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Transformation Errors
// =============================================================================

/// Contract violations detected by the transformation engine.
///
/// These are programming or configuration errors: queries feeding the
/// engine must project the agreed columns and follow the naming convention.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A row does not carry a column the transformer needs.
    #[error("Row {row} is missing column '{column}'")]
    MissingColumn { row: usize, column: String },

    /// The grouping directive in a query name is empty or malformed.
    #[error("Malformed grouping directive in '{name}': {reason}")]
    MalformedDirective { name: String, reason: String },
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors while loading the report config or connection settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for the expected shape.
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Config parsed but is semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// A query name carries a malformed grouping directive.
    #[error("Invalid query name: {0}")]
    Directive(#[from] TransformError),

    /// A required setting was not supplied.
    #[error("Missing setting: {0}")]
    MissingVariable(String),
}

// =============================================================================
// Output Errors
// =============================================================================

/// Errors while writing the report document.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Filesystem error while writing or persisting.
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failed.
    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tempfile::PersistError> for OutputError {
    fn from(err: tempfile::PersistError) -> Self {
        OutputError::Io(err.error)
    }
}

// =============================================================================
// Report Errors (top-level)
// =============================================================================

/// Why a single query could not be turned into a table entry.
#[derive(Debug, Error)]
pub enum QueryFailure {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Top-level run errors.
///
/// Any of these aborts the whole run before the report is written.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Config error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Data source error outside of a specific query (e.g. connecting).
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Writing the report failed.
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// A configured query failed; the run is aborted.
    #[error("Query '{name}' failed: {source}")]
    Query {
        name: String,
        #[source]
        source: QueryFailure,
    },
}

impl ReportError {
    /// Attach the failing query's name to a per-query failure.
    pub fn query(name: impl Into<String>, failure: impl Into<QueryFailure>) -> Self {
        ReportError::Query {
            name: name.into(),
            source: failure.into(),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for data-source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for transformation operations.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for output operations.
pub type OutputResult<T> = Result<T, OutputError>;

/// Result type for a whole report run.
pub type ReportResult<T> = Result<T, ReportError>;
