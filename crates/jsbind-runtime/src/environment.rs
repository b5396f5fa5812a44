//! The capabilities a JavaScript value model must provide to the dispatcher.
//!
//! The dispatcher never looks inside values. It walks member paths, calls
//! functions and waits for pending operations purely through this trait, so
//! the same dispatch logic drives the Boa engine and the in-process
//! [`ScriptEnvironment`](crate::ScriptEnvironment).

use std::future::Future;
use std::sync::Arc;

use jsbind_common::Result;
use serde_json::Value as JsonValue;

use crate::functions::FunctionReferenceRegistry;

/// Whether a value is usable as-is or still has to settle.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion<V> {
    Ready(V),
    Pending(V),
}

/// A single-threaded JavaScript environment.
///
/// All methods take `&self`; implementations keep their engine state behind
/// interior mutability and must not hold a borrow across an `.await`, since
/// several requests interleave on the same environment.
///
/// A JavaScript exception surfaces as `BridgeError::JavaScriptExecution`
/// carrying the thrown message.
pub trait JsEnvironment {
    type Value: Clone;

    /// The global API root (what the `browser` handle denotes).
    fn root(&self) -> Result<Self::Value>;

    /// Reads `name` on `target`. `Ok(None)` means the member does not exist.
    fn get_member(&self, target: &Self::Value, name: &str) -> Result<Option<Self::Value>>;

    /// Whether `value` can be the target of [`call`](Self::call).
    fn is_callable(&self, value: &Self::Value) -> bool;

    /// Applies `function` with `this` bound to `this`.
    fn call(
        &self,
        this: &Self::Value,
        function: &Self::Value,
        arguments: Vec<Self::Value>,
    ) -> Result<Self::Value>;

    /// Builds a fresh value from an inline wire argument.
    fn from_wire(&self, value: JsonValue) -> Result<Self::Value>;

    /// A callable that forwards its arguments to the host callback filed
    /// under `reference_id`.
    ///
    /// Repeated calls with the same id return the same function, so a
    /// listener can be removed with the value it was added with.
    fn host_function(
        &self,
        reference_id: &str,
        registry: &Arc<FunctionReferenceRegistry>,
    ) -> Result<Self::Value>;

    /// Drops the cached function built by [`host_function`](Self::host_function)
    /// for `reference_id`. Returns whether one was cached.
    fn release_host_function(&self, reference_id: &str) -> bool;

    /// Converts `value` to wire JSON with `JSON.stringify` semantics.
    fn to_wire(&self, value: &Self::Value) -> Result<JsonValue>;

    /// Tells a promise-like value apart from a finished one.
    fn classify(&self, value: Self::Value) -> Completion<Self::Value>;

    /// Waits for a value classified as [`Completion::Pending`] to resolve or reject.
    fn settle(&self, pending: Self::Value) -> impl Future<Output = Result<Self::Value>>;
}
