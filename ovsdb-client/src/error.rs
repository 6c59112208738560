//! Client error types.

use crate::config::ConfigError;
use crate::state::ConnectionState;
use ovsdb_protocol::RpcError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ovsdb_protocol::ProtocolError),

    #[error("{0}")]
    Core(#[from] ovsdb_core::CoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("server error: {0}")]
    Rpc(RpcError),

    #[error("illegal state transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("invalid params: {0}")]
    InvalidParams(String),
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Timeout | ClientError::ConnectionClosed)
    }
}
