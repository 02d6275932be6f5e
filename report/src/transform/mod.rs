//! Transformation engine.
//!
//! Turns raw query results into report tables:
//! - Normalizer: decimals to floats
//! - Directive: grouping dimensions encoded in query names
//! - Grouper: flat rows to period buckets per group
//! - Assembler: the per-query pipeline over the three above

pub mod assembler;
pub mod directive;
pub mod grouper;
pub mod normalizer;

pub use assembler::{assemble, ColumnAliases};
pub use directive::{Directive, DIMENSION_SEPARATOR, GROUPABLE_PREFIX};
pub use grouper::{nest_by_period, GroupingKeys};
pub use normalizer::{normalize, normalize_row};
