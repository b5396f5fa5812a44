//! Function reference registry.
//!
//! Host callbacks never cross into JavaScript. When one is passed as an
//! argument, it is filed here and only its id travels; the JavaScript side
//! calls back through [`FunctionReferenceRegistry::invoke`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use jsbind_common::{BridgeError, ReferenceId, ReferenceIdGenerator, Result};
use serde_json::Value as JsonValue;

/// A host callback invokable from JavaScript.
///
/// Receives the call's arguments as wire JSON and returns a wire JSON result.
pub type HostCallback = Arc<dyn Fn(Vec<JsonValue>) -> Result<JsonValue> + Send + Sync>;

/// Host-side table of callbacks, shared between host threads and the
/// JavaScript thread.
pub struct FunctionReferenceRegistry {
    callbacks: Mutex<HashMap<ReferenceId, HostCallback>>,
    ids: ReferenceIdGenerator,
}

impl Default for FunctionReferenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FunctionReferenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionReferenceRegistry")
            .field("count", &self.count())
            .finish()
    }
}

impl FunctionReferenceRegistry {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(HashMap::new()),
            ids: ReferenceIdGenerator::new("fn"),
        }
    }

    /// Files `callback` under a fresh id.
    ///
    /// Ids already taken through [`insert`](Self::insert) are skipped.
    pub fn register<F>(&self, callback: F) -> ReferenceId
    where
        F: Fn(Vec<JsonValue>) -> Result<JsonValue> + Send + Sync + 'static,
    {
        let mut callbacks = self.lock();
        let mut id = self.ids.next_id();
        while callbacks.contains_key(&id) {
            id = self.ids.next_id();
        }
        callbacks.insert(id.clone(), Arc::new(callback));
        tracing::debug!("Registered function reference '{}'", id);
        id
    }

    /// Files `callback` under a caller-chosen id, e.g. one picked by a
    /// transport peer.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::DuplicateReference` if `id` is already taken.
    pub fn insert<F>(&self, id: impl Into<ReferenceId>, callback: F) -> Result<()>
    where
        F: Fn(Vec<JsonValue>) -> Result<JsonValue> + Send + Sync + 'static,
    {
        let id = id.into();
        let mut callbacks = self.lock();
        if callbacks.contains_key(&id) {
            return Err(BridgeError::DuplicateReference(id));
        }
        tracing::debug!("Registered function reference '{}'", id);
        callbacks.insert(id, Arc::new(callback));
        Ok(())
    }

    /// Calls the callback filed under `id` with `arguments`.
    ///
    /// The callback runs outside the registry lock, so it may register or
    /// remove other callbacks.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::UnknownReference` if no callback is filed under
    /// `id`, or whatever error the callback itself returns.
    pub fn invoke(&self, id: &str, arguments: Vec<JsonValue>) -> Result<JsonValue> {
        let callback = self
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownReference(id.to_string()))?;
        tracing::debug!("Invoking function reference '{}' with {} argument(s)", id, arguments.len());
        callback(arguments)
    }

    /// Removes the callback filed under `id`. Unknown ids are ignored.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            tracing::debug!("Removed function reference '{}'", id);
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ReferenceId, HostCallback>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
