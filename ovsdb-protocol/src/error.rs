//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing or classifying JSON-RPC documents.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid stream encoding: expected UTF-8, detected {0}")]
    InvalidEncoding(&'static str),

    #[error("frame too long: {length} bytes without a complete document (max {max})")]
    FrameTooLong { length: usize, max: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON-RPC message: {0}")]
    InvalidMessage(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl ProtocolError {
    /// Returns whether this error must tear the connection down.
    ///
    /// Fatal errors leave the byte stream in a state where message
    /// boundaries can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidEncoding(_) | ProtocolError::FrameTooLong { .. }
        )
    }
}

/// Invalid OVSDB extended value encoding.
///
/// Scoped to a single field: the caller decides whether to drop the field
/// or abort the message that contains it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("invalid value encoding: '{tag}' expects {expected} elements, got {actual}")]
    WrongArity {
        tag: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid value encoding: unrecognized tag {0}")]
    UnknownTag(String),

    #[error("invalid value encoding: expected {expected}, got {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: String,
    },

    #[error("invalid value encoding: unknown condition function '{0}'")]
    UnknownFunction(String),

    #[error("invalid value encoding: nesting deeper than {0}")]
    TooDeep(usize),
}
