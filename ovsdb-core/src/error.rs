//! Core error types.

use ovsdb_protocol::ValueError;
use thiserror::Error;

/// Errors from decoding rows and table updates.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("column '{column}' of table '{table}': {source}")]
    Field {
        table: String,
        column: String,
        #[source]
        source: ValueError,
    },

    #[error("malformed table update: {0}")]
    MalformedUpdate(String),

    #[error("malformed row in table '{table}': {reason}")]
    MalformedRow { table: String, reason: String },

    #[error("value error: {0}")]
    Value(#[from] ValueError),
}

impl CoreError {
    /// Returns whether the error is confined to a single column value.
    pub fn is_field_error(&self) -> bool {
        matches!(self, CoreError::Field { .. } | CoreError::Value(_))
    }
}
