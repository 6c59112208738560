//! Monitor update notifications.

use crate::error::CoreError;
use crate::row::FieldPolicy;
use crate::store::DatabaseStore;
use crate::update::TableUpdates;
use crate::OPEN_VSWITCH_DB;
use dashmap::DashMap;
use ovsdb_protocol::message::id_key;
use ovsdb_protocol::{Notification, ValueCodec, UPDATE_METHOD};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Params of an `update` notification: `[monitor-id, table-updates]`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateNotification {
    pub subscription_id: Value,
    pub table_updates: Value,
}

/// Parses `update` params.
///
/// Only a two-element array is accepted. Any other arity returns `None`,
/// and the caller drops the message silently.
pub fn parse_update_notification(params: &[Value]) -> Option<UpdateNotification> {
    match params {
        [subscription_id, table_updates] => Some(UpdateNotification {
            subscription_id: subscription_id.clone(),
            table_updates: table_updates.clone(),
        }),
        _ => None,
    }
}

/// An update notification after it has been applied to the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedUpdate {
    pub database: String,
    pub notification: UpdateNotification,
    pub updates: TableUpdates,
}

/// Applies `update` notifications to a connection's cache.
///
/// Monitor ids are mapped to the database they were registered against;
/// updates for an unregistered id go to the default database.
pub struct NotificationRouter {
    store: Arc<DatabaseStore>,
    codec: ValueCodec,
    policy: FieldPolicy,
    default_db: String,
    monitors: DashMap<String, String>,
}

impl NotificationRouter {
    pub fn new(store: Arc<DatabaseStore>, codec: ValueCodec, policy: FieldPolicy) -> Self {
        Self {
            store,
            codec,
            policy,
            default_db: OPEN_VSWITCH_DB.to_string(),
            monitors: DashMap::new(),
        }
    }

    pub fn with_default_db(mut self, db: impl Into<String>) -> Self {
        self.default_db = db.into();
        self
    }

    pub fn store(&self) -> &Arc<DatabaseStore> {
        &self.store
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    pub fn register_monitor(&self, monitor_id: &Value, db: impl Into<String>) {
        self.monitors.insert(id_key(monitor_id), db.into());
    }

    pub fn unregister_monitor(&self, monitor_id: &Value) -> Option<String> {
        self.monitors.remove(&id_key(monitor_id)).map(|(_, db)| db)
    }

    /// Database that updates for `monitor_id` are applied to.
    pub fn database_for(&self, monitor_id: &Value) -> String {
        self.monitors
            .get(&id_key(monitor_id))
            .map(|db| db.value().clone())
            .unwrap_or_else(|| self.default_db.clone())
    }

    /// Handles one notification.
    ///
    /// Returns `Ok(None)` for notifications that are not updates or whose
    /// params have the wrong shape.
    pub fn route(&self, notification: &Notification) -> Result<Option<RoutedUpdate>, CoreError> {
        if notification.method != UPDATE_METHOD {
            debug!("ignoring '{}' notification", notification.method);
            return Ok(None);
        }

        let parsed = notification
            .params_array()
            .and_then(parse_update_notification);
        let Some(parsed) = parsed else {
            debug!("dropping update notification with unexpected params");
            return Ok(None);
        };

        let updates = TableUpdates::decode(&parsed.table_updates, &self.codec, self.policy)?;
        let database = self.database_for(&parsed.subscription_id);
        let applied = self.store.get_or_create(&database).apply_updates(&updates);
        debug!(
            "monitor {} applied {} row changes to {}",
            id_key(&parsed.subscription_id),
            applied,
            database
        );

        Ok(Some(RoutedUpdate {
            database,
            notification: parsed,
            updates,
        }))
    }

    /// Installs the result of a `monitor` call as the initial contents of
    /// the monitored tables.
    pub fn bootstrap(&self, monitor_id: &Value, result: &Value) -> Result<TableUpdates, CoreError> {
        let snapshot = TableUpdates::decode(result, &self.codec, self.policy)?;
        let database = self.database_for(monitor_id);
        self.store.get_or_create(&database).bootstrap(&snapshot);
        Ok(snapshot)
    }
}
