//! Table-update documents.
//!
//! Monitor replies and `update` notifications both carry
//! `{table: {row-uuid: {"old": row, "new": row}}}`. A missing or null `old`
//! means the row was inserted, a missing or null `new` means it was deleted.

use crate::error::CoreError;
use crate::row::{FieldPolicy, Row};
use ovsdb_protocol::{Uuid, ValueCodec};
use serde_json::{Map, Value};

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowUpdateKind {
    Insert,
    Modify,
    Delete,
}

/// Change to a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    pub uuid: Uuid,
    pub old: Option<Row>,
    pub new: Option<Row>,
}

impl RowUpdate {
    pub fn kind(&self) -> RowUpdateKind {
        match (&self.old, &self.new) {
            (None, Some(_)) => RowUpdateKind::Insert,
            (Some(_), Some(_)) => RowUpdateKind::Modify,
            (_, None) => RowUpdateKind::Delete,
        }
    }
}

/// All row changes for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableUpdate {
    pub table: String,
    pub rows: Vec<RowUpdate>,
}

impl TableUpdate {
    /// Returns whether any row change leaves a row behind.
    pub fn has_upserts(&self) -> bool {
        self.rows.iter().any(|r| r.new.is_some())
    }
}

/// A decoded table-updates document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableUpdates {
    tables: Vec<TableUpdate>,
}

impl TableUpdates {
    pub fn new(tables: Vec<TableUpdate>) -> Self {
        Self { tables }
    }

    pub fn decode(doc: &Value, codec: &ValueCodec, policy: FieldPolicy) -> Result<Self, CoreError> {
        let tables = expect_object(doc, "table updates")?;

        let mut decoded = Vec::with_capacity(tables.len());
        for (table, rows) in tables {
            let rows = expect_object(rows, table)?;
            let mut updates = Vec::with_capacity(rows.len());
            for (uuid, change) in rows {
                let change = expect_object(change, uuid)?;
                let old = decode_side(table, change.get("old"), codec, policy)?;
                let new = decode_side(table, change.get("new"), codec, policy)?;
                if old.is_none() && new.is_none() {
                    return Err(CoreError::MalformedUpdate(format!(
                        "row {} of table {} has neither old nor new",
                        uuid, table
                    )));
                }
                updates.push(RowUpdate {
                    uuid: Uuid::new(uuid.as_str()),
                    old,
                    new,
                });
            }
            decoded.push(TableUpdate {
                table: table.clone(),
                rows: updates,
            });
        }
        Ok(Self { tables: decoded })
    }

    pub fn tables(&self) -> &[TableUpdate] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableUpdate> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.rows.is_empty())
    }

    /// Total number of row changes across all tables.
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }
}

fn expect_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, CoreError> {
    value
        .as_object()
        .ok_or_else(|| CoreError::MalformedUpdate(format!("{} is not an object", what)))
}

fn decode_side(
    table: &str,
    side: Option<&Value>,
    codec: &ValueCodec,
    policy: FieldPolicy,
) -> Result<Option<Row>, CoreError> {
    match side {
        None | Some(Value::Null) => Ok(None),
        Some(row) => Row::decode(table, row, codec, policy).map(Some),
    }
}
