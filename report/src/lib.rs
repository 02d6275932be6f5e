//! # incident-report - Grouped time-series reports from incident queries
//!
//! Runs a fixed set of analytical queries against PostgreSQL, normalizes
//! their numbers, nests the results of groupable queries into per-group
//! period buckets, and writes everything to one indented JSON document.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Config    │────▶│   Source    │────▶│  Transform  │────▶│ Report JSON │
//! │ (queries)   │     │ (Postgres)  │     │ (normalize, │     │  (atomic)   │
//! │             │     │             │     │   nest)     │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use incident_report::{run_report, FixtureSource, ReportConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ReportConfig::load("report.json").unwrap();
//!     let mut source = FixtureSource::from_path("fixtures.json").unwrap();
//!     let report = run_report(&config, &mut source).await.unwrap();
//!     println!("Assembled {} tables", report.len());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Rows, table entries and the report document
//! - [`transform`] - Normalizer, directive parser, grouper, assembler
//! - [`source`] - Query sources (PostgreSQL, fixtures)
//! - [`config`] - Report config and connection settings
//! - [`pipeline`] - Run driver
//! - [`output`] - Report writer
//! - [`logs`] - Progress logging

// Core modules
pub mod error;
pub mod models;

// Engine
pub mod transform;

// Glue
pub mod config;
pub mod logs;
pub mod output;
pub mod pipeline;
pub mod source;

// =============================================================================
// Re-exports - Errors
// =============================================================================

pub use error::{
    ConfigError,
    OutputError,
    QueryFailure,
    ReportError,
    ReportResult,
    SourceError,
    TransformError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    GroupedResult,
    Metadata,
    PeriodCount,
    QueryOutput,
    QueryShape,
    ReportDocument,
    ResultSet,
    Row,
    Scalar,
    TableData,
    TableEntry,
};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    assemble,
    nest_by_period,
    normalize,
    ColumnAliases,
    Directive,
    GroupingKeys,
};

// =============================================================================
// Re-exports - Sources, config, driver, output
// =============================================================================

pub use config::{ConnectionSettings, PlannedQuery, QueryEntry, ReportConfig};
pub use output::{render_report, write_report};
pub use pipeline::{run_against_postgres, run_report, run_to_file, RunResult};
pub use source::{FixtureSource, PostgresSource, QuerySource};
