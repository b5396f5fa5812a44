//! In-process value model.
//!
//! [`ScriptValue`] is a small dynamic value graph with JavaScript's
//! reference semantics: objects, arrays and functions are shared handles, so
//! a value retained in the reference table is the very same object the API
//! root hands out. Embedders use it to script a fake API surface from Rust;
//! the test suites use it to drive the dispatcher without an engine.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use futures_util::future::{FutureExt, LocalBoxFuture, Shared};
use jsbind_common::{BridgeError, ReferenceId, Result};
use serde_json::Value as JsonValue;

use crate::environment::{Completion, JsEnvironment};
use crate::functions::FunctionReferenceRegistry;

pub type NativeFunction = Rc<dyn Fn(&ScriptValue, Vec<ScriptValue>) -> Result<ScriptValue>>;

/// Builds the error a scripted function returns to model a JavaScript `throw`.
pub fn throw(message: impl Into<String>) -> BridgeError {
    BridgeError::JavaScriptExecution(message.into())
}

#[derive(Clone)]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Rc<RefCell<Vec<ScriptValue>>>),
    Object(Rc<RefCell<BTreeMap<String, ScriptValue>>>),
    Function(NativeFunction),
    Pending(PendingValue),
}

impl std::fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptValue::Undefined => f.write_str("undefined"),
            ScriptValue::Null => f.write_str("null"),
            ScriptValue::Bool(b) => write!(f, "{}", b),
            ScriptValue::Number(n) => write!(f, "{}", n),
            ScriptValue::String(s) => write!(f, "{:?}", s),
            ScriptValue::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            ScriptValue::Object(members) => f.debug_map().entries(members.borrow().iter()).finish(),
            ScriptValue::Function(_) => f.write_str("[function]"),
            ScriptValue::Pending(_) => f.write_str("[pending]"),
        }
    }
}

impl ScriptValue {
    /// A new empty object.
    pub fn object() -> Self {
        ScriptValue::Object(Rc::new(RefCell::new(BTreeMap::new())))
    }

    pub fn array(items: impl IntoIterator<Item = ScriptValue>) -> Self {
        ScriptValue::Array(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    pub fn string(value: impl Into<String>) -> Self {
        ScriptValue::String(value.into())
    }

    pub fn function<F>(function: F) -> Self
    where
        F: Fn(&ScriptValue, Vec<ScriptValue>) -> Result<ScriptValue> + 'static,
    {
        ScriptValue::Function(Rc::new(function))
    }

    /// A value that settles when `future` completes.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<ScriptValue>> + 'static,
    {
        ScriptValue::Pending(PendingValue::new(future))
    }

    /// Sets `name` on an object; chains for building API trees.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::JavaScriptExecution` if `self` is not an object.
    pub fn with(self, name: impl Into<String>, value: ScriptValue) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn set(&self, name: impl Into<String>, value: ScriptValue) -> Result<()> {
        match self {
            ScriptValue::Object(members) => {
                members.borrow_mut().insert(name.into(), value);
                Ok(())
            }
            other => Err(throw(format!("Cannot set property '{}' on {:?}", name.into(), other))),
        }
    }

    /// Reads a member. Arrays and strings expose `length` and array indices.
    pub fn get(&self, name: &str) -> Option<ScriptValue> {
        match self {
            ScriptValue::Object(members) => members.borrow().get(name).cloned(),
            ScriptValue::Array(items) => {
                let items = items.borrow();
                if name == "length" {
                    return Some(ScriptValue::Number(items.len() as f64));
                }
                name.parse::<usize>().ok().and_then(|index| items.get(index).cloned())
            }
            ScriptValue::String(s) if name == "length" => Some(ScriptValue::Number(s.encode_utf16().count() as f64)),
            _ => None,
        }
    }

    pub fn push(&self, value: ScriptValue) -> Result<()> {
        match self {
            ScriptValue::Array(items) => {
                items.borrow_mut().push(value);
                Ok(())
            }
            other => Err(throw(format!("{:?} is not an array", other))),
        }
    }

    /// Identity comparison for shared values, value comparison for primitives.
    pub fn ptr_eq(&self, other: &ScriptValue) -> bool {
        match (self, other) {
            (ScriptValue::Array(a), ScriptValue::Array(b)) => Rc::ptr_eq(a, b),
            (ScriptValue::Object(a), ScriptValue::Object(b)) => Rc::ptr_eq(a, b),
            (ScriptValue::Function(a), ScriptValue::Function(b)) => Rc::ptr_eq(a, b),
            (ScriptValue::Pending(a), ScriptValue::Pending(b)) => Rc::ptr_eq(&a.state, &b.state),
            (ScriptValue::Undefined, ScriptValue::Undefined) | (ScriptValue::Null, ScriptValue::Null) => true,
            (ScriptValue::Bool(a), ScriptValue::Bool(b)) => a == b,
            (ScriptValue::Number(a), ScriptValue::Number(b)) => a == b,
            (ScriptValue::String(a), ScriptValue::String(b)) => a == b,
            _ => false,
        }
    }

    /// Calls a function value.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::JavaScriptExecution` if `self` is not a function,
    /// or whatever the function itself returns.
    pub fn call(&self, this: &ScriptValue, arguments: Vec<ScriptValue>) -> Result<ScriptValue> {
        match self {
            ScriptValue::Function(function) => function(this, arguments),
            other => Err(throw(format!("{:?} is not a function", other))),
        }
    }

    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => ScriptValue::Null,
            JsonValue::Bool(b) => ScriptValue::Bool(b),
            // u64 beyond 2^53 loses precision, as it would in JavaScript
            JsonValue::Number(n) => ScriptValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => ScriptValue::String(s),
            JsonValue::Array(items) => ScriptValue::array(items.into_iter().map(ScriptValue::from_json)),
            JsonValue::Object(members) => ScriptValue::Object(Rc::new(RefCell::new(
                members.into_iter().map(|(k, v)| (k, ScriptValue::from_json(v))).collect(),
            ))),
        }
    }

    /// Converts to JSON the way `JSON.stringify` would: functions and
    /// undefined members are dropped from objects and become null elsewhere,
    /// and non-finite numbers become null.
    pub fn to_json(&self) -> JsonValue {
        match self {
            ScriptValue::Undefined | ScriptValue::Null | ScriptValue::Function(_) => JsonValue::Null,
            ScriptValue::Bool(b) => JsonValue::Bool(*b),
            ScriptValue::Number(n) => number_to_json(*n),
            ScriptValue::String(s) => JsonValue::String(s.clone()),
            ScriptValue::Array(items) => JsonValue::Array(items.borrow().iter().map(ScriptValue::to_json).collect()),
            ScriptValue::Object(members) => JsonValue::Object(
                members
                    .borrow()
                    .iter()
                    .filter(|(_, v)| !matches!(v, ScriptValue::Undefined | ScriptValue::Function(_)))
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            ScriptValue::Pending(_) => JsonValue::Object(serde_json::Map::new()),
        }
    }
}

fn number_to_json(n: f64) -> JsonValue {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return JsonValue::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

type SharedOutcome = Shared<LocalBoxFuture<'static, std::result::Result<ScriptValue, String>>>;

/// A shared, settle-once pending operation.
///
/// Like a promise, every waiter observes the same outcome, whether it starts
/// waiting before or after the operation settled.
#[derive(Clone)]
pub struct PendingValue {
    state: Rc<SharedOutcome>,
}

impl PendingValue {
    fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<ScriptValue>> + 'static,
    {
        let outcome = future.map(|outcome| {
            outcome.map_err(|err| match err {
                BridgeError::JavaScriptExecution(message) => message,
                other => other.to_string(),
            })
        });
        Self {
            state: Rc::new(outcome.boxed_local().shared()),
        }
    }

    /// Waits for the operation. A rejection surfaces as
    /// `BridgeError::JavaScriptExecution` with the rejection message.
    pub async fn settle(&self) -> Result<ScriptValue> {
        SharedOutcome::clone(&self.state).await.map_err(throw)
    }
}

/// A [`JsEnvironment`] over a [`ScriptValue`] graph.
pub struct ScriptEnvironment {
    root: ScriptValue,
    host_functions: RefCell<HashMap<ReferenceId, ScriptValue>>,
}

impl ScriptEnvironment {
    pub fn new(root: ScriptValue) -> Self {
        Self {
            root,
            host_functions: RefCell::new(HashMap::new()),
        }
    }

    /// Number of cached host callback functions.
    pub fn host_function_count(&self) -> usize {
        self.host_functions.borrow().len()
    }
}

impl JsEnvironment for ScriptEnvironment {
    type Value = ScriptValue;

    fn root(&self) -> Result<ScriptValue> {
        Ok(self.root.clone())
    }

    fn get_member(&self, target: &ScriptValue, name: &str) -> Result<Option<ScriptValue>> {
        Ok(target.get(name))
    }

    fn is_callable(&self, value: &ScriptValue) -> bool {
        matches!(value, ScriptValue::Function(_))
    }

    fn call(&self, this: &ScriptValue, function: &ScriptValue, arguments: Vec<ScriptValue>) -> Result<ScriptValue> {
        function.call(this, arguments)
    }

    fn from_wire(&self, value: JsonValue) -> Result<ScriptValue> {
        Ok(ScriptValue::from_json(value))
    }

    fn host_function(&self, reference_id: &str, registry: &Arc<FunctionReferenceRegistry>) -> Result<ScriptValue> {
        if let Some(function) = self.host_functions.borrow().get(reference_id) {
            return Ok(function.clone());
        }

        let id = reference_id.to_string();
        let registry = Arc::clone(registry);
        let function = ScriptValue::function(move |_this, arguments| {
            let arguments = arguments.iter().map(ScriptValue::to_json).collect();
            registry.invoke(&id, arguments).map(ScriptValue::from_json)
        });
        self.host_functions
            .borrow_mut()
            .insert(reference_id.to_string(), function.clone());
        Ok(function)
    }

    fn release_host_function(&self, reference_id: &str) -> bool {
        self.host_functions.borrow_mut().remove(reference_id).is_some()
    }

    fn to_wire(&self, value: &ScriptValue) -> Result<JsonValue> {
        Ok(value.to_json())
    }

    fn classify(&self, value: ScriptValue) -> Completion<ScriptValue> {
        match value {
            ScriptValue::Pending(_) => Completion::Pending(value),
            other => Completion::Ready(other),
        }
    }

    async fn settle(&self, pending: ScriptValue) -> Result<ScriptValue> {
        match pending {
            ScriptValue::Pending(pending) => pending.settle().await,
            ready => Ok(ready),
        }
    }
}
