//! StateStore — redb-backed persistence for policies and scaling events.
//!
//! Implements [`PolicyStore`], the storage seam the autoscaler depends on.
//! Supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Storage for scaling policies and their event history.
///
/// Implementations must be safe to share between the lifecycle API and the
/// per-policy control loops. Every read returns an owned copy.
pub trait PolicyStore: Send + Sync {
    /// Allocate a fresh policy id.
    fn next_policy_id(&self) -> StateResult<PolicyId>;

    /// Insert or replace a policy.
    fn put_policy(&self, policy: &ScalingPolicy) -> StateResult<()>;

    fn get_policy(&self, id: PolicyId) -> StateResult<Option<ScalingPolicy>>;

    /// All policies, ordered by id.
    fn list_policies(&self) -> StateResult<Vec<ScalingPolicy>>;

    /// Delete a policy. Returns true if it existed. Its events are kept.
    fn delete_policy(&self, id: PolicyId) -> StateResult<bool>;

    /// Append an event, assigning its id. Returns the stored event.
    fn append_event(&self, event: ScalingEvent) -> StateResult<ScalingEvent>;

    /// A policy's events in the order they were appended.
    fn list_events(&self, policy_id: PolicyId) -> StateResult<Vec<ScalingEvent>>;

    fn get_active_policies(&self) -> StateResult<Vec<ScalingPolicy>> {
        Ok(self
            .list_policies()?
            .into_iter()
            .filter(|p| p.is_active)
            .collect())
    }
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

    /// Create an ephemeral in-memory state store.
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
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(POLICIES).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

/// Bump a named sequence inside an open write transaction.
fn bump_sequence(txn: &redb::WriteTransaction, name: &str) -> StateResult<u64> {
    let mut table = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
    let current = table
        .get(name)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = current + 1;
    table.insert(name, next).map_err(map_err!(Write))?;
    Ok(next)
}

impl PolicyStore for StateStore {
    // ── Policies ───────────────────────────────────────────────────

    fn next_policy_id(&self) -> StateResult<PolicyId> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let id = bump_sequence(&txn, POLICY_SEQ)?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(id)
    }

    fn put_policy(&self, policy: &ScalingPolicy) -> StateResult<()> {
        let value = serde_json::to_vec(policy).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            table
                .insert(policy.id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(policy_id = policy.id, "policy stored");
        Ok(())
    }

    fn get_policy(&self, id: PolicyId) -> StateResult<Option<ScalingPolicy>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let policy: ScalingPolicy =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(policy))
            }
            None => Ok(None),
        }
    }

    fn list_policies(&self) -> StateResult<Vec<ScalingPolicy>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let policy: ScalingPolicy =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(policy);
        }
        Ok(results)
    }

    fn delete_policy(&self, id: PolicyId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(policy_id = id, existed, "policy deleted");
        Ok(existed)
    }

    // ── Events ─────────────────────────────────────────────────────

    fn append_event(&self, mut event: ScalingEvent) -> StateResult<ScalingEvent> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        event.id = bump_sequence(&txn, EVENT_SEQ)?;
        let key = event.table_key();
        let value = serde_json::to_vec(&event).map_err(map_err!(Serialize))?;
        {
            let mut table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "scaling event stored");
        Ok(event)
    }

    fn list_events(&self, policy_id: PolicyId) -> StateResult<Vec<ScalingEvent>> {
        let prefix = ScalingEvent::policy_prefix(policy_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        // Keys sort by policy then event id, so one policy's events are contiguous.
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let event: ScalingEvent =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(event);
        }
        Ok(results)
    }
}
