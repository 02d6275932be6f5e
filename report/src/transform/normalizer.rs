//! Numeric normalization of result sets.
//!
//! Arbitrary-precision decimals (Postgres NUMERIC) become `f64` so the
//! report serializes them as JSON numbers. Everything else passes through.

use rust_decimal::prelude::ToPrimitive;

use crate::models::{ResultSet, Row, Scalar};

impl Scalar {
    /// The value with any decimal replaced by its nearest `f64`.
    ///
    /// A decimal with no `f64` representation is returned unchanged.
    pub fn normalized(self) -> Scalar {
        match self {
            Scalar::Decimal(d) => match d.to_f64() {
                Some(f) => Scalar::Float(f),
                None => Scalar::Decimal(d),
            },
            other => other,
        }
    }
}

/// Normalize every value of a single row in place.
pub fn normalize_row(row: &mut Row) {
    for value in row.values_mut() {
        if value.is_decimal() {
            *value = std::mem::replace(value, Scalar::Null).normalized();
        }
    }
}

/// Normalize a result set.
///
/// Keeps row order, row count and column order. Never fails and is
/// idempotent.
pub fn normalize(mut rows: ResultSet) -> ResultSet {
    rows.iter_mut().for_each(normalize_row);
    rows
}
