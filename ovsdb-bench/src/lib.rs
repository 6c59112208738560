//! Shared fixtures for the benchmarks.

use ovsdb_protocol::{Notification, Uuid};
use serde_json::{json, Map, Value};

/// A canonical uuid derived from `i`.
pub fn uuid(i: usize) -> Uuid {
    Uuid::new(format!("00000000-0000-4000-8000-{:012x}", i))
}

/// An `update` notification inserting `rows` Interface rows.
pub fn interface_update(rows: usize) -> Notification {
    let table: Map<String, Value> = (0..rows)
        .map(|i| {
            (
                uuid(i).into_string(),
                json!({"new": {
                    "name": format!("tap{}", i),
                    "external_ids": ["map", [
                        ["iface-id", format!("vm-{}", i)],
                        ["attached-mac", "fa:16:3e:00:00:01"]
                    ]],
                    "ofport": i,
                }}),
            )
        })
        .collect();
    Notification::new("update", json!(["mon0", {"Interface": table}]))
}
