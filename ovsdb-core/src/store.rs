//! Per-connection table cache.
//!
//! Two levels: table name -> [`RowStore`], row uuid -> [`Row`]. Each table's
//! row store has its own lock, so writers to one table never block readers
//! or writers of another. Updates spanning several tables are applied one
//! table at a time; a reader may observe some tables updated and others not.

use crate::row::Row;
use crate::update::{RowUpdateKind, TableUpdates};
use dashmap::DashMap;
use ovsdb_protocol::Uuid;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Rows of one table, keyed by row uuid.
#[derive(Debug, Default)]
pub struct RowStore {
    rows: RwLock<HashMap<Uuid, Row>>,
}

impl RowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_row(&self, uuid: &Uuid) -> Option<Row> {
        self.rows.read().get(uuid).cloned()
    }

    /// Stores a row, replacing any previous row with that uuid.
    pub fn insert_row(&self, uuid: Uuid, row: Row) -> Option<Row> {
        self.rows.write().insert(uuid, row)
    }

    pub fn delete_row(&self, uuid: &Uuid) -> Option<Row> {
        self.rows.write().remove(uuid)
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.rows.read().contains_key(uuid)
    }

    pub fn row_ids(&self) -> Vec<Uuid> {
        self.rows.read().keys().cloned().collect()
    }

    /// Snapshot of all rows.
    pub fn rows(&self) -> HashMap<Uuid, Row> {
        self.rows.read().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl FromIterator<(Uuid, Row)> for RowStore {
    fn from_iter<I: IntoIterator<Item = (Uuid, Row)>>(iter: I) -> Self {
        Self {
            rows: RwLock::new(iter.into_iter().collect()),
        }
    }
}

/// Tables of one database.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: DashMap<String, Arc<RowStore>>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rows of a table. Never creates the table.
    pub fn get_rows(&self, table: &str) -> Option<Arc<RowStore>> {
        self.tables.get(table).map(|entry| Arc::clone(entry.value()))
    }

    /// Replaces a table's rows wholesale.
    pub fn create_or_update_table(
        &self,
        table: impl Into<String>,
        rows: RowStore,
    ) -> Option<Arc<RowStore>> {
        self.tables.insert(table.into(), Arc::new(rows))
    }

    pub fn drop_table(&self, table: &str) -> Option<Arc<RowStore>> {
        self.tables.remove(table).map(|(_, rows)| rows)
    }

    /// Table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn row(&self, table: &str, uuid: &Uuid) -> Option<Row> {
        self.get_rows(table)?.get_row(uuid)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Applies incremental row changes.
    ///
    /// A table that does not exist yet is created here, but only when the
    /// update leaves at least one row in it. Returns the number of row
    /// changes applied.
    pub fn apply_updates(&self, updates: &TableUpdates) -> usize {
        let mut applied = 0;
        for table_update in updates.tables() {
            let rows = match self.get_rows(&table_update.table) {
                Some(rows) => rows,
                None if table_update.has_upserts() => Arc::clone(
                    self.tables
                        .entry(table_update.table.clone())
                        .or_default()
                        .value(),
                ),
                None => continue,
            };

            for update in &table_update.rows {
                match (update.kind(), &update.new) {
                    (RowUpdateKind::Insert | RowUpdateKind::Modify, Some(new)) => {
                        rows.insert_row(update.uuid.clone(), new.clone());
                    }
                    _ => {
                        rows.delete_row(&update.uuid);
                    }
                }
                applied += 1;
            }
            debug!(
                "applied {} row changes to table {}",
                table_update.rows.len(),
                table_update.table
            );
        }
        applied
    }

    /// Installs a monitor snapshot: each table named in `snapshot` is
    /// replaced by the rows it carries.
    pub fn bootstrap(&self, snapshot: &TableUpdates) {
        for table_update in snapshot.tables() {
            let rows: RowStore = table_update
                .rows
                .iter()
                .filter_map(|u| u.new.clone().map(|row| (u.uuid.clone(), row)))
                .collect();
            debug!(
                "bootstrapped table {} with {} rows",
                table_update.table,
                rows.len()
            );
            self.create_or_update_table(table_update.table.clone(), rows);
        }
    }
}

/// Databases cached by one connection.
#[derive(Debug, Default)]
pub struct DatabaseStore {
    databases: DashMap<String, Arc<TableStore>>,
}

impl DatabaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, db: &str) -> Option<Arc<TableStore>> {
        self.databases.get(db).map(|entry| Arc::clone(entry.value()))
    }

    pub fn get_or_create(&self, db: &str) -> Arc<TableStore> {
        if let Some(tables) = self.get(db) {
            return tables;
        }
        Arc::clone(self.databases.entry(db.to_string()).or_default().value())
    }

    pub fn drop_database(&self, db: &str) -> Option<Arc<TableStore>> {
        self.databases.remove(db).map(|(_, tables)| tables)
    }

    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn row(&self, db: &str, table: &str, uuid: &Uuid) -> Option<Row> {
        self.get(db)?.row(table, uuid)
    }

    pub fn clear(&self) {
        self.databases.clear();
    }
}
