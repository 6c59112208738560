//! # ovsdb-core
//!
//! Client-side data model for OVSDB.
//!
//! This crate provides:
//! - Schema-light rows and columns built on the protocol value types
//! - A per-connection table cache (database -> table -> row)
//! - Parsing of monitor `update` notifications and table-update documents
//! - Routing of decoded updates into the cache

pub mod error;
pub mod notification;
pub mod row;
pub mod store;
pub mod update;

pub use error::CoreError;
pub use notification::{
    parse_update_notification, NotificationRouter, RoutedUpdate, UpdateNotification,
};
pub use row::{Column, ColumnSchema, FieldPolicy, Row};
pub use store::{DatabaseStore, RowStore, TableStore};
pub use update::{RowUpdate, RowUpdateKind, TableUpdate, TableUpdates};

/// Name of the Open vSwitch configuration database.
pub const OPEN_VSWITCH_DB: &str = "Open_vSwitch";
