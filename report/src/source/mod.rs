//! Query sources.
//!
//! The run driver only needs something that turns query text into rows.
//! [`PostgresSource`] talks to a live database; [`FixtureSource`] serves
//! canned result sets for offline replays and tests.

pub mod fixture;
pub mod postgres;

use async_trait::async_trait;

use crate::error::SourceResult;
use crate::models::QueryOutput;

pub use fixture::FixtureSource;
pub use postgres::{ColumnKind, PostgresSource};

/// Executes one query and returns its fully materialized result.
#[async_trait]
pub trait QuerySource: Send {
    /// Run `sql`, configured under `name`, and return all of its rows.
    async fn execute(&mut self, name: &str, sql: &str) -> SourceResult<QueryOutput>;
}
