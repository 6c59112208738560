//! # ovsdb-protocol
//!
//! Wire protocol implementation for the OVSDB management protocol (RFC 7047).
//!
//! This crate provides:
//! - Incremental framing of back-to-back JSON-RPC documents on a byte stream
//! - The OVSDB extended value encoding (uuid, named-uuid, set, map, condition)
//! - JSON-RPC request/response/notification envelopes
//! - Error types for framing and value decoding

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod value;

pub use codec::{CodecConfig, ValueCodec, ValueKind};
pub use error::{ProtocolError, ValueError};
pub use frame::{FrameDecoder, ScanState};
pub use message::{Encoder, Message, Notification, Request, Response, RpcError};
pub use value::{Condition, Function, OvsdbMap, OvsdbSet, OvsdbValue, Uuid, UuidKind};

/// Default port for OVSDB servers (plain TCP).
pub const DEFAULT_PORT: u16 = 6640;

/// Default upper bound on the size of one JSON-RPC document, in bytes.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 100_000;

/// Method name of monitor update notifications.
pub const UPDATE_METHOD: &str = "update";

/// Method name of echo (keepalive) requests.
pub const ECHO_METHOD: &str = "echo";

/// Method name of monitor requests.
pub const MONITOR_METHOD: &str = "monitor";
