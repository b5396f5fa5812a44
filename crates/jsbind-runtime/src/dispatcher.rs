//! Invocation dispatcher.
//!
//! Executes one [`InvocationRequest`] against a [`JsEnvironment`]:
//!
//! 1. Resolve the target: the root handle denotes the API root, any other id
//!    is looked up in the object reference table.
//! 2. Walk the dotted `targetPath`; every segment but the last is a member read.
//! 3. Call the final member with the parent as `this`, or read it.
//! 4. Wait for the result if the environment reports it as pending.
//! 5. Retain the result under `returnObjectReferenceId`, or convert it to wire JSON.
//!
//! An empty `targetPath` selects the target itself, so a retained function
//! can be called and a retained object read back by value.

use std::cell::RefCell;
use std::sync::Arc;

use jsbind_common::{Argument, BridgeError, InvocationRequest, InvocationResult, ReferenceId, Result};

use crate::environment::{Completion, JsEnvironment};
use crate::functions::FunctionReferenceRegistry;
use crate::references::ObjectReferenceTable;

// retained values drop before the environment that created them
pub struct Dispatcher<E: JsEnvironment> {
    objects: RefCell<ObjectReferenceTable<E::Value>>,
    functions: Arc<FunctionReferenceRegistry>,
    root_handle: ReferenceId,
    env: E,
}

impl<E: JsEnvironment> Dispatcher<E> {
    /// `root_handle` is the reference id that resolves to `env.root()`.
    pub fn new(env: E, functions: Arc<FunctionReferenceRegistry>, root_handle: impl Into<ReferenceId>) -> Self {
        Self {
            objects: RefCell::new(ObjectReferenceTable::new()),
            functions,
            root_handle: root_handle.into(),
            env,
        }
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn functions(&self) -> &Arc<FunctionReferenceRegistry> {
        &self.functions
    }

    pub fn root_handle(&self) -> &str {
        &self.root_handle
    }

    pub fn objects(&self) -> std::cell::Ref<'_, ObjectReferenceTable<E::Value>> {
        self.objects.borrow()
    }

    /// Files a value under `id` directly, bypassing an invocation.
    pub fn retain(&self, id: impl Into<ReferenceId>, value: E::Value) -> Result<()> {
        self.objects.borrow_mut().insert(id, value)
    }

    /// The value filed under `id`, or the API root for the root handle.
    pub fn resolve(&self, id: &str) -> Result<E::Value> {
        if id == self.root_handle {
            return self.env.root();
        }
        self.objects.borrow().resolve(id).cloned()
    }

    /// Releases `id` as an object reference and as a function reference,
    /// including the environment function built for it.
    ///
    /// Idempotent, and a no-op for the root handle. Returns whether anything
    /// was released.
    pub fn remove_reference(&self, id: &str) -> bool {
        let object = self.objects.borrow_mut().remove(id).is_some();
        if object {
            tracing::debug!("Removed object reference '{}'", id);
        }
        let host_function = self.env.release_host_function(id);
        let callback = self.functions.remove(id);
        if host_function || callback {
            tracing::debug!("Removed function reference '{}'", id);
        }
        object || host_function || callback
    }

    /// Executes `request`.
    ///
    /// # Errors
    ///
    /// - `UnknownReference` if `referenceId` resolves to nothing
    /// - `MemberNotFound` if a path segment, or the function to call, is absent
    /// - `NotCallable` if the function member is not callable
    /// - `DuplicateReference` if `returnObjectReferenceId` is already taken
    /// - `InvocationFailed` if JavaScript throws or a pending result rejects
    pub async fn dispatch(&self, request: &InvocationRequest) -> Result<InvocationResult> {
        self.execute(request).await.map_err(|err| {
            let err = match err {
                BridgeError::JavaScriptExecution(message) => BridgeError::InvocationFailed {
                    reference_id: request.reference_id.clone(),
                    target_path: request.target_path.clone(),
                    arguments: request.describe_arguments(),
                    message,
                },
                other => other,
            };
            tracing::warn!(
                "Invocation of '{}' on '{}' failed: {}",
                request.target_path,
                request.reference_id,
                err
            );
            err
        })
    }

    async fn execute(&self, request: &InvocationRequest) -> Result<InvocationResult> {
        tracing::debug!(
            "Resolving '{}' on '{}' (function: {})",
            request.target_path,
            request.reference_id,
            request.is_function
        );
        let target = self.resolve(&request.reference_id)?;
        let (parent, member) = self.walk(target, request)?;

        let value = if request.is_function {
            let function = member.ok_or_else(|| member_not_found(request))?;
            if !self.env.is_callable(&function) {
                return Err(BridgeError::NotCallable {
                    reference_id: request.reference_id.clone(),
                    target_path: request.target_path.clone(),
                });
            }
            let arguments = self.marshal_arguments(&request.arguments)?;
            tracing::debug!("Calling '{}' with {} argument(s)", request.target_path, arguments.len());
            self.env.call(&parent, &function, arguments)?
        } else {
            match member {
                Some(value) => value,
                None => self.env.from_wire(serde_json::Value::Null)?,
            }
        };

        let value = match self.env.classify(value) {
            Completion::Ready(value) => value,
            Completion::Pending(pending) => {
                tracing::debug!("Awaiting pending result of '{}'", request.target_path);
                self.env.settle(pending).await?
            }
        };

        match &request.return_object_reference_id {
            Some(id) => {
                self.objects.borrow_mut().insert(id.clone(), value)?;
                tracing::debug!("Retained result of '{}' as '{}'", request.target_path, id);
                Ok(InvocationResult::Reference(id.clone()))
            }
            None => Ok(InvocationResult::Value(self.env.to_wire(&value)?)),
        }
    }

    /// Returns the parent of the final segment and the final member, if present.
    fn walk(&self, target: E::Value, request: &InvocationRequest) -> Result<(E::Value, Option<E::Value>)> {
        if request.target_path.is_empty() {
            return Ok((target.clone(), Some(target)));
        }

        let mut segments = request.target_path.split('.');
        let last = segments.next_back().unwrap_or_default();

        let mut parent = target;
        for segment in segments {
            parent = self
                .env
                .get_member(&parent, segment)?
                .ok_or_else(|| member_not_found(request))?;
        }

        let member = self.env.get_member(&parent, last)?;
        Ok((parent, member))
    }

    fn marshal_arguments(&self, arguments: &[Argument]) -> Result<Vec<E::Value>> {
        arguments
            .iter()
            .map(|argument| match argument {
                Argument::Value { value } => self.env.from_wire(value.clone()),
                Argument::FunctionReference { reference_id } => {
                    self.env.host_function(reference_id, &self.functions)
                }
            })
            .collect()
    }
}

fn member_not_found(request: &InvocationRequest) -> BridgeError {
    BridgeError::MemberNotFound {
        reference_id: request.reference_id.clone(),
        target_path: request.target_path.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{throw, ScriptEnvironment, ScriptValue};
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Mutex;

    struct Fixture {
        dispatcher: Dispatcher<ScriptEnvironment>,
        query_calls: Rc<RefCell<Vec<Vec<serde_json::Value>>>>,
        window_calls: Rc<Cell<usize>>,
        window: ScriptValue,
    }

    fn fixture() -> Fixture {
        let query_calls = Rc::new(RefCell::new(Vec::new()));
        let window_calls = Rc::new(Cell::new(0));
        let window = ScriptValue::object()
            .with("id", ScriptValue::Number(1.0)).unwrap()
            .with("focused", ScriptValue::Bool(true)).unwrap();

        let recorded = Rc::clone(&query_calls);
        let tabs = ScriptValue::object()
            .with("query", ScriptValue::function(move |_this, args| {
                recorded.borrow_mut().push(args.iter().map(ScriptValue::to_json).collect());
                Ok(ScriptValue::from_json(json!([{"id": 7, "active": true}])))
            })).unwrap()
            .with("TAB_ID_NONE", ScriptValue::Number(-1.0)).unwrap()
            .with("discard", ScriptValue::function(|_, _| Err(throw("tab is active")))).unwrap();

        let counter = Rc::clone(&window_calls);
        let current = window.clone();
        let windows = ScriptValue::object()
            .with("getCurrent", ScriptValue::function(move |_, _| {
                counter.set(counter.get() + 1);
                let current = current.clone();
                Ok(ScriptValue::pending(async move { Ok(current) }))
            })).unwrap()
            .with("remove", ScriptValue::function(|_, _| {
                Ok(ScriptValue::pending(async { Err(throw("no such window")) }))
            })).unwrap();

        let runtime = ScriptValue::object()
            .with("id", ScriptValue::string("extension@example.com")).unwrap()
            .with("whoAmI", ScriptValue::function(|this, _| {
                Ok(this.get("id").unwrap_or(ScriptValue::Undefined))
            })).unwrap();

        let root = ScriptValue::object()
            .with("tabs", tabs).unwrap()
            .with("windows", windows).unwrap()
            .with("runtime", runtime).unwrap();

        Fixture {
            dispatcher: Dispatcher::new(
                ScriptEnvironment::new(root),
                Arc::new(FunctionReferenceRegistry::new()),
                "browser",
            ),
            query_calls,
            window_calls,
            window,
        }
    }

    #[tokio::test]
    async fn test_function_call_on_root() {
        let f = fixture();
        let request = InvocationRequest::call("browser", "tabs.query").with_argument(json!({"active": true}));

        let result = f.dispatcher.dispatch(&request).await.unwrap();
        assert_eq!(result, InvocationResult::Value(json!([{"id": 7, "active": true}])));
        assert_eq!(*f.query_calls.borrow(), vec![vec![json!({"active": true})]]);
    }

    #[tokio::test]
    async fn test_missing_member_names_path() {
        let f = fixture();
        let err = f
            .dispatcher
            .dispatch(&InvocationRequest::call("browser", "tabs.doesNotExist"))
            .await
            .unwrap_err();
        match err {
            BridgeError::MemberNotFound { reference_id, target_path } => {
                assert_eq!(reference_id, "browser");
                assert_eq!(target_path, "tabs.doesNotExist");
            }
            other => panic!("Expected MemberNotFound, got {:?}", other),
        }

        let err = f
            .dispatcher
            .dispatch(&InvocationRequest::get("browser", "bookmarks.tree"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::MemberNotFound { .. }));
    }

    #[tokio::test]
    async fn test_calling_a_property_is_not_callable() {
        let f = fixture();
        let err = f
            .dispatcher
            .dispatch(&InvocationRequest::call("browser", "tabs.TAB_ID_NONE"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotCallable { ref target_path, .. } if target_path == "tabs.TAB_ID_NONE"));
    }

    #[tokio::test]
    async fn test_property_reads() {
        let f = fixture();
        let id = f.dispatcher.dispatch(&InvocationRequest::get("browser", "runtime.id")).await.unwrap();
        assert_eq!(id.into_wire(), json!("extension@example.com"));

        let absent = f.dispatcher.dispatch(&InvocationRequest::get("browser", "runtime.lastError")).await.unwrap();
        assert_eq!(absent.into_wire(), serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_parent_is_bound_as_this() {
        let f = fixture();
        let result = f.dispatcher.dispatch(&InvocationRequest::call("browser", "runtime.whoAmI")).await.unwrap();
        assert_eq!(result.into_wire(), json!("extension@example.com"));
    }

    #[tokio::test]
    async fn test_pending_result_is_awaited() {
        let f = fixture();
        let result = f.dispatcher.dispatch(&InvocationRequest::call("browser", "windows.getCurrent")).await.unwrap();
        assert_eq!(result.into_wire(), json!({"focused": true, "id": 1}));
    }

    #[tokio::test]
    async fn test_throw_and_rejection_become_invocation_failed() {
        let f = fixture();
        let err = f
            .dispatcher
            .dispatch(&InvocationRequest::call("browser", "tabs.discard").with_argument(json!(7)))
            .await
            .unwrap_err();
        match &err {
            BridgeError::InvocationFailed { reference_id, target_path, arguments, message } => {
                assert_eq!(reference_id, "browser");
                assert_eq!(target_path, "tabs.discard");
                assert!(arguments.contains('7'));
                assert_eq!(message, "tab is active");
            }
            other => panic!("Expected InvocationFailed, got {:?}", other),
        }
        assert_eq!(err.kind(), "UnderlyingOperationFailure");

        let err = f
            .dispatcher
            .dispatch(&InvocationRequest::call("browser", "windows.remove"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvocationFailed { ref message, .. } if message == "no such window"));
    }

    #[tokio::test]
    async fn test_retained_result_is_the_same_value() {
        let f = fixture();
        let request = InvocationRequest::call("browser", "windows.getCurrent").with_return_reference("ref-1");

        let result = f.dispatcher.dispatch(&request).await.unwrap();
        assert_eq!(result, InvocationResult::Reference("ref-1".into()));
        assert_eq!(f.window_calls.get(), 1);

        let retained = f.dispatcher.resolve("ref-1").unwrap();
        assert!(retained.ptr_eq(&f.window));

        let focused = f.dispatcher.dispatch(&InvocationRequest::get("ref-1", "focused")).await.unwrap();
        assert_eq!(focused.into_wire(), json!(true));
        assert_eq!(f.window_calls.get(), 1);
    }

    #[tokio::test]
    async fn test_retained_id_cannot_be_reused() {
        let f = fixture();
        let request = InvocationRequest::get("browser", "tabs").with_return_reference("ref-1");
        f.dispatcher.dispatch(&request).await.unwrap();

        let err = f.dispatcher.dispatch(&request).await.unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateReference(_)));
        assert_eq!(f.dispatcher.objects().count(), 1);
    }

    #[tokio::test]
    async fn test_removed_reference_is_unknown() {
        let f = fixture();
        f.dispatcher
            .dispatch(&InvocationRequest::get("browser", "runtime").with_return_reference("ref-2"))
            .await
            .unwrap();

        assert!(f.dispatcher.remove_reference("ref-2"));
        assert!(!f.dispatcher.remove_reference("ref-2"));

        let err = f.dispatcher.dispatch(&InvocationRequest::get("ref-2", "id")).await.unwrap_err();
        assert!(matches!(err, BridgeError::UnknownReference(ref id) if id == "ref-2"));
    }

    #[tokio::test]
    async fn test_empty_path_selects_target() {
        let f = fixture();
        f.dispatcher.retain("ref-w", f.window.clone()).unwrap();
        let value = f.dispatcher.dispatch(&InvocationRequest::get("ref-w", "")).await.unwrap();
        assert_eq!(value.into_wire(), json!({"focused": true, "id": 1}));
    }

    #[tokio::test]
    async fn test_function_reference_arguments_reach_host() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let functions = Arc::new(FunctionReferenceRegistry::new());
        let sink = Arc::clone(&received);
        let callback = functions.register(move |args| {
            sink.lock().unwrap().push(args);
            Ok(json!("ack"))
        });

        let root = ScriptValue::object()
            .with("alarms", ScriptValue::object()
                .with("fire", ScriptValue::function(|_, args| {
                    let listener = args.into_iter().next().unwrap_or(ScriptValue::Undefined);
                    listener.call(&ScriptValue::Undefined, vec![ScriptValue::Number(1.0), ScriptValue::string("a")])
                })).unwrap()).unwrap();

        let dispatcher = Dispatcher::new(ScriptEnvironment::new(root), functions, "browser");
        let result = dispatcher
            .dispatch(&InvocationRequest::call("browser", "alarms.fire").with_argument(Argument::function(callback)))
            .await
            .unwrap();

        assert_eq!(result.into_wire(), json!("ack"));
        assert_eq!(*received.lock().unwrap(), vec![vec![json!(1), json!("a")]]);
    }

    #[tokio::test]
    async fn test_removing_function_reference_releases_wrapper() {
        let f = fixture();
        let callback = f.dispatcher.functions().register(|_| Ok(json!(null)));
        let request =
            InvocationRequest::call("browser", "tabs.query").with_argument(Argument::function(callback.clone()));
        f.dispatcher.dispatch(&request).await.unwrap();
        assert_eq!(f.dispatcher.env().host_function_count(), 1);

        assert!(f.dispatcher.remove_reference(&callback));
        assert_eq!(f.dispatcher.env().host_function_count(), 0);
        assert!(!f.dispatcher.functions().contains(&callback));
        assert!(!f.dispatcher.remove_reference(&callback));
    }

    #[tokio::test]
    async fn test_concurrent_reads_of_one_pending_property() {
        let (ready, signal) = tokio::sync::oneshot::channel::<()>();
        let runtime = ScriptValue::object()
            .with("ready", ScriptValue::pending(async move {
                signal.await.map_err(|_| throw("cancelled"))?;
                Ok(ScriptValue::string("ready"))
            })).unwrap();
        let dispatcher = Dispatcher::new(
            ScriptEnvironment::new(ScriptValue::object().with("runtime", runtime).unwrap()),
            Arc::new(FunctionReferenceRegistry::new()),
            "browser",
        );

        let request = InvocationRequest::get("browser", "runtime.ready");
        let (first, second, ()) = tokio::join!(dispatcher.dispatch(&request), dispatcher.dispatch(&request), async {
            tokio::task::yield_now().await;
            ready.send(()).unwrap();
        });
        assert_eq!(first.unwrap().into_wire(), json!("ready"));
        assert_eq!(second.unwrap().into_wire(), json!("ready"));
    }
}
