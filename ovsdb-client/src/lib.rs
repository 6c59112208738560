//! # ovsdb-client
//!
//! Connection driver for OVSDB.
//!
//! This crate provides:
//! - A per-connection read task that frames the byte stream and answers echo
//! - A worker task that decodes monitor updates into the table cache
//! - JSON-RPC calls correlated by request id
//! - Fault reporting and the connection state machine
//! - Layered configuration (defaults, YAML file, environment)

pub mod config;
pub mod connection;
pub mod error;
pub mod fault;
pub mod state;

pub use config::{ClientConfig, ConfigError};
pub use connection::{Connection, ConnectionEvent, ConnectionHandle};
pub use error::ClientError;
pub use fault::{ChannelFaultSink, Fault, FaultSink, LoggingFaultSink};
pub use state::{ConnectionState, ConnectionStateMachine};
