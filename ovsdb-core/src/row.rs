//! Rows and columns.

use crate::error::CoreError;
use ovsdb_protocol::{OvsdbSet, OvsdbValue, Uuid, ValueCodec, ValueKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// What to do with a column whose value fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPolicy {
    /// Drop the column, keep the rest of the row.
    #[default]
    SkipField,
    /// Fail the whole row, and with it the containing message.
    AbortMessage,
}

/// Light reference to a column's schema: its name and expected value kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnSchema {
    pub name: String,
    pub kind: ValueKind,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One column value of a row.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    schema: ColumnSchema,
    data: OvsdbValue,
}

impl Column {
    pub fn new(schema: ColumnSchema, data: OvsdbValue) -> Self {
        Self { schema, data }
    }

    /// Creates a column whose schema kind is taken from the value.
    pub fn from_value(name: impl Into<String>, data: impl Into<OvsdbValue>) -> Self {
        let data = data.into();
        Self {
            schema: ColumnSchema::new(name, data.kind()),
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn data(&self) -> &OvsdbValue {
        &self.data
    }

    pub fn into_data(self) -> OvsdbValue {
        self.data
    }
}

/// One row of a table.
///
/// A missing column is reported as `None`, never as an error. Equality is
/// over the table name and the column map.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    table_name: String,
    columns: HashMap<String, Column>,
}

impl Row {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: HashMap::new(),
        }
    }

    /// Builder-style [`Row::add_column`] from a plain value.
    pub fn with(mut self, name: impl Into<String>, data: impl Into<OvsdbValue>) -> Self {
        let name = name.into();
        let column = Column::from_value(name.clone(), data);
        self.add_column(name, column);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn columns(&self) -> &HashMap<String, Column> {
        &self.columns
    }

    /// Stores a column, replacing any previous value under that name.
    ///
    /// Null values are not stored: a null column removes whatever was there.
    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> Option<Column> {
        let name = name.into();
        if column.data().is_null() {
            return self.columns.remove(&name);
        }
        self.columns.insert(name, column)
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        self.columns.remove(name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn value(&self, name: &str) -> Option<&OvsdbValue> {
        self.column(name).map(Column::data)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.value(name)?.as_str()
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.value(name)?.as_i64()
    }

    pub fn uuid(&self, name: &str) -> Option<&Uuid> {
        self.value(name)?.as_uuid()
    }

    /// Reads a set column. A bare value is read as a one-element set and an
    /// absent column as an empty set.
    pub fn set(&self, name: &str) -> OvsdbSet {
        match self.value(name) {
            Some(OvsdbValue::Set(s)) => s.clone(),
            Some(other) => OvsdbSet::singleton(other.clone()),
            None => OvsdbSet::new(),
        }
    }

    /// Reads a string-to-string map column such as `external_ids`.
    pub fn string_map(&self, name: &str) -> BTreeMap<String, String> {
        self.value(name)
            .and_then(OvsdbValue::as_map)
            .map(|m| m.to_string_map())
            .unwrap_or_default()
    }

    /// Decodes a wire row object.
    ///
    /// Null columns are skipped. Columns with an invalid value encoding are
    /// handled according to `policy`.
    pub fn decode(
        table: &str,
        wire: &Value,
        codec: &ValueCodec,
        policy: FieldPolicy,
    ) -> Result<Self, CoreError> {
        let obj = wire.as_object().ok_or_else(|| CoreError::MalformedRow {
            table: table.to_string(),
            reason: "row is not an object".to_string(),
        })?;

        let mut row = Row::new(table);
        for (name, value) in obj {
            if value.is_null() {
                continue;
            }
            match codec.decode(value, ValueKind::Any) {
                Ok(data) => {
                    row.add_column(name.clone(), Column::from_value(name.clone(), data));
                }
                Err(source) => match policy {
                    FieldPolicy::SkipField => {
                        tracing::warn!("skipping column {}.{}: {}", table, name, source);
                    }
                    FieldPolicy::AbortMessage => {
                        return Err(CoreError::Field {
                            table: table.to_string(),
                            column: name.clone(),
                            source,
                        });
                    }
                },
            }
        }
        Ok(row)
    }

    /// Encodes the row as a wire object.
    pub fn encode(&self, codec: &ValueCodec) -> Value {
        let obj: Map<String, Value> = self
            .columns
            .iter()
            .map(|(name, column)| (name.clone(), codec.encode(column.data())))
            .collect();
        Value::Object(obj)
    }
}
