//! Object reference table.
//!
//! JavaScript values that must keep their identity across calls (a port, a
//! window handle, an object returned with `returnObjectReferenceId`) stay on
//! the JavaScript side. The host only ever sees the id they are filed under.
//!
//! The table lives on the JavaScript thread and is never shared, so it needs
//! no locking.

use std::collections::{HashMap, HashSet};

use jsbind_common::{BridgeError, ReferenceId, Result};

const ALLOCATED_PREFIX: &str = "obj-";

/// Maps reference ids to JavaScript-side values of type `V`.
///
/// Removed ids never resolve again and cannot be re-registered, so a stale
/// id held by the host can never reach a newer value. Allocated ids come
/// from a monotonic counter and need no bookkeeping once removed.
/// Host-chosen ids are tombstoned instead, so the tombstone set grows with
/// every distinct host-chosen id that is removed.
#[derive(Debug)]
pub struct ObjectReferenceTable<V> {
    entries: HashMap<ReferenceId, V>,
    removed: HashSet<ReferenceId>,
    allocated: u64,
}

impl<V> Default for ObjectReferenceTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ObjectReferenceTable<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            removed: HashSet::new(),
            allocated: 0,
        }
    }

    /// Files `value` under a freshly allocated id.
    pub fn register(&mut self, value: V) -> ReferenceId {
        let id = loop {
            self.allocated += 1;
            let id = format!("{}{}", ALLOCATED_PREFIX, self.allocated);
            // host-chosen ids may use the same prefix
            if !self.entries.contains_key(&id) && !self.removed.contains(&id) {
                break id;
            }
        };
        self.entries.insert(id.clone(), value);
        id
    }

    /// Whether `id` is one the counter has already passed.
    fn is_allocated(&self, id: &str) -> bool {
        id.strip_prefix(ALLOCATED_PREFIX)
            .filter(|n| !n.starts_with('0'))
            .and_then(|n| n.parse::<u64>().ok())
            .is_some_and(|n| n <= self.allocated)
    }

    fn is_retired(&self, id: &str) -> bool {
        !self.entries.contains_key(id) && (self.removed.contains(id) || self.is_allocated(id))
    }

    /// Files `value` under a host-chosen id.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::DuplicateReference` if `id` is live or was removed.
    pub fn insert(&mut self, id: impl Into<ReferenceId>, value: V) -> Result<()> {
        let id = id.into();
        if self.entries.contains_key(&id) || self.is_retired(&id) {
            tracing::warn!("Refusing to reuse reference id '{}'", id);
            return Err(BridgeError::DuplicateReference(id));
        }
        self.entries.insert(id, value);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `BridgeError::UnknownReference` if `id` was never filed or has been removed.
    pub fn resolve(&self, id: &str) -> Result<&V> {
        self.entries.get(id).ok_or_else(|| {
            if self.is_retired(id) {
                tracing::warn!("Reference '{}' was already removed", id);
            }
            BridgeError::UnknownReference(id.to_string())
        })
    }

    /// Drops the value filed under `id`. Removing an unknown or already
    /// removed id does nothing.
    pub fn remove(&mut self, id: &str) -> Option<V> {
        let value = self.entries.remove(id)?;
        if !self.is_allocated(id) {
            self.removed.insert(id.to_string());
        }
        Some(value)
    }

    /// Number of removed host-chosen ids held back from reuse.
    pub fn tombstone_count(&self) -> usize {
        self.removed.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of live references.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Live reference ids, sorted.
    pub fn ids(&self) -> Vec<ReferenceId> {
        let mut ids: Vec<_> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}
