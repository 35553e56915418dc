//! StateStore — redb-backed state persistence for Berth.
//!
//! Holds the port allocation table and one metadata record per tenant.
//! Instance records are JSON-serialized into redb's `&[u8]` value
//! columns; ports are stored natively as `u16`. The store supports both
//! on-disk and in-memory backends (the latter for testing).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(PORTS).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Ports ──────────────────────────────────────────────────────

    /// Read the full tenant → port mapping.
    pub(crate) fn read_ports(&self) -> StateResult<BTreeMap<String, u16>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PORTS).map_err(map_err!(Table))?;
        let mut ports = BTreeMap::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            ports.insert(key.value().to_string(), value.value());
        }
        Ok(ports)
    }

    /// Read a single tenant's port.
    pub(crate) fn read_port(&self, tenant_id: &str) -> StateResult<Option<u16>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PORTS).map_err(map_err!(Table))?;
        let port = table
            .get(tenant_id)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value());
        Ok(port)
    }

    /// Insert or overwrite a tenant's port.
    pub(crate) fn write_port(&self, tenant_id: &str, port: u16) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PORTS).map_err(map_err!(Table))?;
            table.insert(tenant_id, port).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Insert or update a tenant's metadata record.
    pub fn put_instance(&self, record: &InstanceRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            table
                .insert(record.tenant_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(tenant_id = %record.tenant_id, "instance record stored");
        Ok(())
    }

    /// Get a tenant's metadata record.
    ///
    /// A record that is absent or cannot be decoded is reported as
    /// `StateError::NotFound`.
    pub fn get_instance(&self, tenant_id: &str) -> StateResult<InstanceRecord> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        let guard = table
            .get(tenant_id)
            .map_err(map_err!(Read))?
            .ok_or_else(|| StateError::NotFound(tenant_id.to_string()))?;
        serde_json::from_slice(guard.value()).map_err(|e| {
            warn!(%tenant_id, error = %e, "undecodable instance record");
            StateError::NotFound(tenant_id.to_string())
        })
    }

    /// List all decodable instance records, ordered by tenant ID.
    pub fn list_instances(&self) -> StateResult<Vec<InstanceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            match serde_json::from_slice::<InstanceRecord>(value.value()) {
                Ok(record) => results.push(record),
                Err(e) => warn!(tenant_id = key.value(), error = %e, "skipping undecodable record"),
            }
        }
        Ok(results)
    }

    /// Delete a tenant's record. Returns true if it existed.
    pub fn delete_instance(&self, tenant_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            existed = table.remove(tenant_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%tenant_id, existed, "instance record deleted");
        Ok(existed)
    }

    /// Store raw bytes under a tenant key, bypassing serialization.
    #[cfg(test)]
    pub(crate) fn put_raw_instance(&self, tenant_id: &str, bytes: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            table.insert(tenant_id, bytes).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn test_record(tenant_id: &str, port: u16) -> InstanceRecord {
        let created_at = Utc::now();
        InstanceRecord {
            tenant_id: tenant_id.to_string(),
            port,
            subdomain: format!("{tenant_id}.10.0.0.1.nip.io"),
            plan: PlanTier::Free,
            limits: PlanTier::Free.limits(),
            ai_provider: "gemini".to_string(),
            access_token: "0123456789abcdef0123456789abcdef".to_string(),
            created_at,
            expires_at: Some(created_at + Duration::days(7)),
        }
    }

    // ── Instance CRUD ──────────────────────────────────────────────

    #[test]
    fn instance_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let record = test_record("abc123", 18001);

        store.put_instance(&record).unwrap();
        let retrieved = store.get_instance("abc123").unwrap();

        assert_eq!(retrieved, record);
    }

    #[test]
    fn instance_get_missing_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.get_instance("nobody").unwrap_err();
        assert!(matches!(err, StateError::NotFound(id) if id == "nobody"));
    }

    #[test]
    fn instance_get_corrupt_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_raw_instance("broken", b"{not json").unwrap();

        let err = store.get_instance("broken").unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
        // Listing skips it rather than failing.
        assert!(store.list_instances().unwrap().is_empty());
    }

    #[test]
    fn instance_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let mut record = test_record("abc123", 18001);
        store.put_instance(&record).unwrap();

        record.plan = PlanTier::Pro;
        record.limits = PlanTier::Pro.limits();
        store.put_instance(&record).unwrap();

        let retrieved = store.get_instance("abc123").unwrap();
        assert_eq!(retrieved.plan, PlanTier::Pro);
        assert_eq!(store.list_instances().unwrap().len(), 1);
    }

    #[test]
    fn instance_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_instance(&test_record("abc123", 18001)).unwrap();

        assert!(store.delete_instance("abc123").unwrap());
        assert!(!store.delete_instance("abc123").unwrap());
        assert!(store.get_instance("abc123").is_err());
    }

    #[test]
    fn records_are_independent_per_tenant() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_instance(&test_record("a", 18001)).unwrap();
        store.put_instance(&test_record("b", 18002)).unwrap();
        store.delete_instance("a").unwrap();

        let all = store.list_instances().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].tenant_id, "b");
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("berth.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_instance(&test_record("abc123", 18001)).unwrap();
            store.write_port("abc123", 18001).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.get_instance("abc123").unwrap().port, 18001);
        assert_eq!(store.read_port("abc123").unwrap(), Some(18001));
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_instances().unwrap().is_empty());
        assert!(store.read_ports().unwrap().is_empty());
        assert_eq!(store.read_port("any").unwrap(), None);
        assert!(!store.delete_instance("nope").unwrap());
    }
}
