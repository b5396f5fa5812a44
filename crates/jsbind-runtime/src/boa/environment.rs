// Copyright 2025 JsBind Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use boa_engine::{
    builtins::promise::PromiseState,
    js_string,
    native_function::NativeFunction,
    object::{builtins::JsPromise, FunctionObjectBuilder},
    property::PropertyKey,
    value::JsValue,
    Context, JsError, JsNativeError, Source,
};
use jsbind_common::{BridgeError, ReferenceId, Result};
use serde_json::Value as JsonValue;

use super::conversions::{js_value_to_json, json_to_js_value};
use crate::config::BridgeConfig;
use crate::environment::{Completion, JsEnvironment};
use crate::functions::FunctionReferenceRegistry;

/// A [`JsEnvironment`] backed by a Boa [`Context`].
///
/// The context is not `Send`; create the environment on the thread that
/// will drive it, e.g. inside the factory passed to `BridgeHandle::spawn`.
pub struct BoaEnvironment {
    host_functions: RefCell<HashMap<ReferenceId, JsValue>>,
    context: RefCell<Context>,
    global_root: String,
    poll_interval: Duration,
}

impl BoaEnvironment {
    /// Creates an environment with an empty global scope.
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            host_functions: RefCell::new(HashMap::new()),
            context: RefCell::new(Context::default()),
            global_root: config.global_root.clone(),
            poll_interval: config.settle_poll_interval(),
        }
    }

    /// Number of cached host callback functions.
    pub fn host_function_count(&self) -> usize {
        self.host_functions.borrow().len()
    }

    /// Creates an environment and evaluates `source`, which is expected to
    /// define the API root.
    pub fn from_source(source: &str, config: &BridgeConfig) -> Result<Self> {
        let env = Self::new(config);
        env.load(source)?;
        Ok(env)
    }

    pub fn from_file(path: impl AsRef<Path>, config: &BridgeConfig) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BridgeError::InvalidRequest(format!("Failed to load script {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_source(&source, config)
    }

    /// Evaluates a script for its side effects.
    pub fn load(&self, source: &str) -> Result<()> {
        let mut ctx = self.context.borrow_mut();
        ctx.eval(Source::from_bytes(source)).map_err(|e| {
            BridgeError::JavaScriptExecution(format!("Script evaluation error: {}", thrown(e, &mut ctx)))
        })?;
        ctx.run_jobs().map_err(|e| BridgeError::JavaScriptExecution(thrown(e, &mut ctx)))?;
        Ok(())
    }

    /// Evaluates an expression and converts its value to JSON.
    pub fn eval(&self, source: &str) -> Result<JsonValue> {
        let mut ctx = self.context.borrow_mut();
        let value = ctx
            .eval(Source::from_bytes(source))
            .map_err(|e| BridgeError::JavaScriptExecution(thrown(e, &mut ctx)))?;
        js_value_to_json(&value, &mut ctx)
    }
}

impl JsEnvironment for BoaEnvironment {
    type Value = JsValue;

    fn root(&self) -> Result<JsValue> {
        let mut ctx = self.context.borrow_mut();
        let global = ctx.global_object();
        let root = global
            .get(js_string!(self.global_root.as_str()), &mut *ctx)
            .map_err(|e| BridgeError::JavaScriptExecution(thrown(e, &mut ctx)))?;
        if root.is_null_or_undefined() {
            return Err(BridgeError::MemberNotFound {
                reference_id: "globalThis".to_string(),
                target_path: self.global_root.clone(),
            });
        }
        Ok(root)
    }

    fn get_member(&self, target: &JsValue, name: &str) -> Result<Option<JsValue>> {
        if target.is_null_or_undefined() {
            return Ok(None);
        }
        let mut ctx = self.context.borrow_mut();
        let object = match target.as_object().map(|o| o.clone()) {
            Some(object) => object,
            None => target
                .to_object(&mut ctx)
                .map_err(|e| BridgeError::JavaScriptExecution(thrown(e, &mut ctx)))?,
        };

        let key = PropertyKey::from(js_string!(name));
        let present = object
            .has_property(key.clone(), &mut ctx)
            .map_err(|e| BridgeError::JavaScriptExecution(thrown(e, &mut ctx)))?;
        if !present {
            return Ok(None);
        }
        object
            .get(key, &mut ctx)
            .map(Some)
            .map_err(|e| BridgeError::JavaScriptExecution(thrown(e, &mut ctx)))
    }

    fn is_callable(&self, value: &JsValue) -> bool {
        value.as_object().map_or(false, |o| o.is_callable())
    }

    fn call(&self, this: &JsValue, function: &JsValue, arguments: Vec<JsValue>) -> Result<JsValue> {
        let function = function
            .as_object()
            .map(|o| o.clone())
            .ok_or_else(|| BridgeError::JavaScriptExecution("value is not a function".into()))?;
        let mut ctx = self.context.borrow_mut();
        function
            .call(this, &arguments, &mut ctx)
            .map_err(|e| BridgeError::JavaScriptExecution(thrown(e, &mut ctx)))
    }

    fn from_wire(&self, value: JsonValue) -> Result<JsValue> {
        json_to_js_value(value, &mut self.context.borrow_mut())
    }

    fn host_function(&self, reference_id: &str, registry: &Arc<FunctionReferenceRegistry>) -> Result<JsValue> {
        if let Some(function) = self.host_functions.borrow().get(reference_id) {
            return Ok(function.clone());
        }

        let id = reference_id.to_string();
        let registry = Arc::clone(registry);
        // SAFETY: the closure captures a String and an Arc, neither of which
        // holds GC-managed values, so nothing needs tracing.
        let native = unsafe {
            NativeFunction::from_closure(move |_this, args, context| {
                let mut arguments = Vec::with_capacity(args.len());
                for arg in args {
                    arguments.push(js_value_to_json(arg, context).map_err(native_error)?);
                }
                let result = registry.invoke(&id, arguments).map_err(native_error)?;
                json_to_js_value(result, context).map_err(native_error)
            })
        };

        let function: JsValue = {
            let ctx = self.context.borrow();
            FunctionObjectBuilder::new(ctx.realm(), native)
                .name(js_string!("hostCallback"))
                .length(0)
                .build()
                .into()
        };
        self.host_functions
            .borrow_mut()
            .insert(reference_id.to_string(), function.clone());
        Ok(function)
    }

    fn release_host_function(&self, reference_id: &str) -> bool {
        self.host_functions.borrow_mut().remove(reference_id).is_some()
    }

    fn to_wire(&self, value: &JsValue) -> Result<JsonValue> {
        js_value_to_json(value, &mut self.context.borrow_mut())
    }

    fn classify(&self, value: JsValue) -> Completion<JsValue> {
        let is_promise = value
            .as_object()
            .map_or(false, |o| JsPromise::from_object(o.clone()).is_ok());
        if is_promise {
            Completion::Pending(value)
        } else {
            Completion::Ready(value)
        }
    }

    async fn settle(&self, pending: JsValue) -> Result<JsValue> {
        let promise = pending
            .as_object()
            .map(|o| o.clone())
            .ok_or_else(|| BridgeError::JavaScriptExecution("value is not a promise".into()))
            .and_then(|o| {
                JsPromise::from_object(o).map_err(|e| BridgeError::JavaScriptExecution(e.to_string()))
            })?;

        loop {
            {
                let mut ctx = self.context.borrow_mut();
                ctx.run_jobs()
                    .map_err(|e| BridgeError::JavaScriptExecution(thrown(e, &mut ctx)))?;
                match promise.state() {
                    PromiseState::Pending => {}
                    PromiseState::Fulfilled(value) => return Ok(value),
                    PromiseState::Rejected(reason) => {
                        return Err(BridgeError::JavaScriptExecution(describe(&reason, &mut ctx)));
                    }
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Renders a thrown error the way `String(error)` would.
fn thrown(error: JsError, ctx: &mut Context) -> String {
    let value = error.to_opaque(ctx);
    describe(&value, ctx)
}

fn describe(value: &JsValue, ctx: &mut Context) -> String {
    match value.to_string(ctx) {
        Ok(s) => s.to_std_string_escaped(),
        Err(_) => value.display().to_string(),
    }
}

fn native_error(error: BridgeError) -> JsError {
    JsNativeError::error().with_message(error.to_string()).into()
}
