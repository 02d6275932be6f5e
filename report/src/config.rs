//! Report configuration.
//!
//! # Report config file
//!
//! ```json
//! {
//!   "type": "incident_data",
//!   "output": "snow_incident_aggregated_results.json",
//!   "columns": { "date": "month_year", "count": "count" },
//!   "queries": {
//!     "total_incidents": "SELECT count(*) AS count FROM incidents",
//!     "incidents_by_severity": "SELECT severity, month_year, count FROM ...",
//!     "open_by_team": { "sql": "SELECT team, month_year, count FROM ...", "group_by": "team" }
//!   }
//! }
//! ```
//!
//! A query given as a bare string has its shape inferred from its name
//! (`incidents_by_<dim>`). The object form states the shape explicitly
//! with `group_by` or `"plain": true`.
//!
//! # Connection settings
//!
//! Either a full `DATABASE_URL` or host/port/user/dbname/password, the
//! password being mandatory.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::models::QueryShape;
use crate::transform::ColumnAliases;

/// Default report file name
pub const DEFAULT_OUTPUT: &str = "snow_incident_aggregated_results.json";

/// Default classification tag written into every table's metadata
pub const DEFAULT_DATA_TYPE: &str = "incident_data";

/// Default database connection values
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_DBNAME: &str = "postgres";

// =============================================================================
// Report config
// =============================================================================

/// A configured query, as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryEntry {
    /// Bare SQL text; shape comes from the query name.
    Sql(String),

    /// SQL text with an explicit shape.
    Detailed {
        sql: String,
        /// Nest rows by this column.
        #[serde(default)]
        group_by: Option<String>,
        /// Keep rows flat even if the name looks groupable.
        #[serde(default)]
        plain: bool,
    },
}

impl QueryEntry {
    pub fn sql(&self) -> &str {
        match self {
            QueryEntry::Sql(sql) => sql,
            QueryEntry::Detailed { sql, .. } => sql,
        }
    }

    /// The explicit shape, if the entry states one.
    pub fn explicit_shape(&self) -> Option<QueryShape> {
        match self {
            QueryEntry::Sql(_) => None,
            QueryEntry::Detailed {
                group_by: Some(dim),
                ..
            } => Some(QueryShape::grouped_by(dim.clone())),
            QueryEntry::Detailed { plain: true, .. } => Some(QueryShape::Plain),
            QueryEntry::Detailed { .. } => None,
        }
    }
}

/// The whole report config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Classification tag for table metadata
    #[serde(rename = "type", default = "default_data_type")]
    pub data_type: String,

    /// Where to write the report
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Column aliases grouped queries must project
    #[serde(default)]
    pub columns: ColumnAliases,

    /// Queries in execution order
    pub queries: IndexMap<String, QueryEntry>,
}

fn default_data_type() -> String {
    DEFAULT_DATA_TYPE.to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

/// A query ready to run: name, SQL and resolved shape.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedQuery<'a> {
    pub name: &'a str,
    pub sql: &'a str,
    pub shape: QueryShape,
}

impl ReportConfig {
    /// Create a config with default settings and the given queries
    pub fn new(queries: IndexMap<String, QueryEntry>) -> Self {
        Self {
            data_type: default_data_type(),
            output: default_output(),
            columns: ColumnAliases::default(),
            queries,
        }
    }

    /// Parse and validate a config from a JSON string
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the config and resolve every query's shape.
    ///
    /// A malformed grouping directive in a query name is reported here,
    /// before any query runs.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.queries.is_empty() {
            return Err(ConfigError::Invalid("no queries configured".to_string()));
        }
        if self.columns.date.trim().is_empty() || self.columns.count.trim().is_empty() {
            return Err(ConfigError::Invalid("column aliases must not be empty".to_string()));
        }

        for (name, entry) in &self.queries {
            if entry.sql().trim().is_empty() {
                return Err(ConfigError::Invalid(format!("query '{}' has empty SQL", name)));
            }
            if let QueryEntry::Detailed { group_by, plain, .. } = entry {
                match group_by {
                    Some(_) if *plain => {
                        return Err(ConfigError::Invalid(format!(
                            "query '{}' sets both group_by and plain",
                            name
                        )));
                    }
                    Some(dim) if dim.trim().is_empty() => {
                        return Err(ConfigError::Invalid(format!(
                            "query '{}' has an empty group_by",
                            name
                        )));
                    }
                    _ => {}
                }
            }
        }

        self.plan().map(|_| ())
    }

    /// Resolve each query's shape, in configuration order.
    pub fn plan(&self) -> ConfigResult<Vec<PlannedQuery<'_>>> {
        self.queries
            .iter()
            .map(|(name, entry)| {
                let shape = match entry.explicit_shape() {
                    Some(shape) => shape,
                    None => QueryShape::infer(name)?,
                };
                Ok(PlannedQuery {
                    name,
                    sql: entry.sql(),
                    shape,
                })
            })
            .collect()
    }
}

// =============================================================================
// Connection settings
// =============================================================================

/// Where and how to connect to PostgreSQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Full connection URL; overrides the other fields when set
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub dbname: String,
    pub password: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            dbname: DEFAULT_DBNAME.to_string(),
            password: None,
        }
    }
}

impl ConnectionSettings {
    /// Check that enough was supplied to connect
    pub fn validate(&self) -> ConfigResult<()> {
        if self.url.is_none() && self.password.is_none() {
            return Err(ConfigError::MissingVariable(
                "database password (--password or PGPASSWORD) or DATABASE_URL".to_string(),
            ));
        }
        Ok(())
    }
}
