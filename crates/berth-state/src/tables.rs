//! redb table definitions for the Berth state store.

use redb::TableDefinition;

/// Allocated host ports keyed by `{tenant_id}`.
pub const PORTS: TableDefinition<&str, u16> = TableDefinition::new("ports");

/// JSON-serialized instance metadata records keyed by `{tenant_id}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");
