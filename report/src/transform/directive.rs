//! Grouping directives encoded in query names.
//!
//! A groupable query is named `incidents_by_<dim>[_by_<dim>...]`. The
//! dimensions form a chain; the last one is the grouping key. Only one
//! level of nesting is derived from a directive, whatever its length.
//!
//! ```text
//! incidents_by_severity                           → [severity]               → severity
//! incidents_by_major_incident_state_by_portfolio  → [major_incident_state,
//!                                                    portfolio]              → portfolio
//! total_incidents                                 → (not groupable)
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{TransformError, TransformResult};
use crate::models::QueryShape;

/// Prefix marking a query as groupable.
pub const GROUPABLE_PREFIX: &str = "incidents_by_";

/// Separator between chained dimensions.
pub const DIMENSION_SEPARATOR: &str = "_by_";

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// The dimension chain parsed from a groupable query name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    dimensions: Vec<String>,
}

impl Directive {
    /// Parse the directive in `name`.
    ///
    /// Returns `Ok(None)` if the name is not groupable. A groupable name
    /// without a usable dimension is an error.
    pub fn parse(name: &str) -> TransformResult<Option<Self>> {
        let Some(rest) = name.strip_prefix(GROUPABLE_PREFIX) else {
            return Ok(None);
        };

        if rest.is_empty() {
            return Err(malformed(name, "no dimension after prefix"));
        }

        let dimensions: Vec<String> = rest.split(DIMENSION_SEPARATOR).map(str::to_string).collect();

        for (i, dimension) in dimensions.iter().enumerate() {
            if dimension.is_empty() {
                return Err(malformed(name, format!("dimension {} is empty", i + 1)));
            }
            if !IDENTIFIER.is_match(dimension) {
                return Err(malformed(
                    name,
                    format!("'{}' is not a column identifier", dimension),
                ));
            }
        }

        Ok(Some(Self { dimensions }))
    }

    /// All dimensions, outermost first.
    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    /// The grouping key: the last dimension of the chain.
    pub fn primary(&self) -> &str {
        // parse() guarantees at least one dimension
        self.dimensions.last().map(String::as_str).unwrap_or_default()
    }

    /// Whether the name chains more than one dimension.
    pub fn is_chained(&self) -> bool {
        self.dimensions.len() > 1
    }
}

impl QueryShape {
    /// Infer the shape of a query from its name.
    pub fn infer(name: &str) -> TransformResult<Self> {
        Ok(match Directive::parse(name)? {
            Some(directive) => QueryShape::grouped_by(directive.primary()),
            None => QueryShape::Plain,
        })
    }
}

fn malformed(name: &str, reason: impl Into<String>) -> TransformError {
    TransformError::MalformedDirective {
        name: name.to_string(),
        reason: reason.into(),
    }
}
