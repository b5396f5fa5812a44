//! A bridge instance: one JavaScript environment plus the tables and
//! diagnostics that belong to it.
//!
//! `Bridge` is single-threaded. Host code on other threads talks to it
//! through a [`BridgeHandle`](crate::BridgeHandle).

use std::cell::RefCell;
use std::sync::Arc;

use jsbind_common::{
    BridgeDiagnostics, BridgeMessage, FunctionInvocation, InvocationRequest, InvocationResult,
    ReferenceRemoval, Result,
};
use serde_json::Value as JsonValue;

use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::environment::JsEnvironment;
use crate::functions::FunctionReferenceRegistry;

pub struct Bridge<E: JsEnvironment> {
    dispatcher: Dispatcher<E>,
    last_result: RefCell<Option<String>>,
    config: BridgeConfig,
}

impl<E: JsEnvironment> Bridge<E> {
    pub fn new(env: E, config: BridgeConfig) -> Self {
        Self::with_functions(env, config, Arc::new(FunctionReferenceRegistry::new()))
    }

    /// Creates a bridge whose function references live in `functions`,
    /// typically a registry the host side also holds.
    pub fn with_functions(env: E, config: BridgeConfig, functions: Arc<FunctionReferenceRegistry>) -> Self {
        let dispatcher = Dispatcher::new(env, functions, config.root_handle.clone());
        Self {
            dispatcher,
            last_result: RefCell::new(None),
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher<E> {
        &self.dispatcher
    }

    pub fn env(&self) -> &E {
        self.dispatcher.env()
    }

    pub fn functions(&self) -> &Arc<FunctionReferenceRegistry> {
        self.dispatcher.functions()
    }

    /// Dispatches `request` and remembers its wire result for diagnostics.
    pub async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationResult> {
        let result = self.dispatcher.dispatch(request).await?;
        let wire = result.clone().into_wire();
        *self.last_result.borrow_mut() = Some(wire.to_string());
        Ok(result)
    }

    /// Delivers a JavaScript -> host callback invocation.
    pub fn invoke_function(&self, invocation: &FunctionInvocation) -> Result<JsonValue> {
        self.functions()
            .invoke(&invocation.reference_id, invocation.arguments.clone())
    }

    /// Releases an object or function reference.
    pub fn remove_reference(&self, removal: &ReferenceRemoval) {
        self.dispatcher.remove_reference(&removal.reference_id);
    }

    pub fn diagnostics(&self) -> BridgeDiagnostics {
        let objects = self.dispatcher.objects();
        BridgeDiagnostics {
            object_reference_count: objects.count(),
            object_reference_ids: objects.ids(),
            function_reference_count: self.functions().count(),
            last_invocation_result: self.last_invocation_result(),
        }
    }

    /// Serialized wire result of the most recent successful invocation.
    pub fn last_invocation_result(&self) -> Option<String> {
        self.last_result.borrow().clone()
    }

    /// Handles one transport message and returns its wire result.
    pub async fn handle(&self, message: BridgeMessage) -> Result<JsonValue> {
        match message {
            BridgeMessage::Invoke(request) => Ok(self.invoke(&request).await?.into_wire()),
            BridgeMessage::InvokeFunction(invocation) => self.invoke_function(&invocation),
            BridgeMessage::RemoveReference(removal) => {
                self.remove_reference(&removal);
                Ok(JsonValue::Null)
            }
            BridgeMessage::GetReferences => Ok(serde_json::to_value(self.diagnostics())?),
            BridgeMessage::GetLastInvocationResult => Ok(self
                .last_invocation_result()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{ScriptEnvironment, ScriptValue};
    use jsbind_common::{BridgeError, ROOT_REFERENCE_ID};
    use serde_json::json;

    fn bridge() -> Bridge<ScriptEnvironment> {
        let root = ScriptValue::object()
            .with("runtime", ScriptValue::object()
                .with("getURL", ScriptValue::function(|_, args| {
                    let path = args.first().map(ScriptValue::to_json).unwrap_or_default();
                    Ok(ScriptValue::string(format!("moz-extension://test/{}", path.as_str().unwrap_or(""))))
                })).unwrap()
                .with("port", ScriptValue::object()).unwrap()).unwrap();
        Bridge::new(ScriptEnvironment::new(root), BridgeConfig::default())
    }

    #[tokio::test]
    async fn test_last_result_tracks_successful_invocations() {
        let bridge = bridge();
        assert!(bridge.last_invocation_result().is_none());

        bridge
            .invoke(&InvocationRequest::call(ROOT_REFERENCE_ID, "runtime.getURL").with_argument(json!("popup.html")))
            .await
            .unwrap();
        assert_eq!(
            bridge.last_invocation_result().as_deref(),
            Some("\"moz-extension://test/popup.html\"")
        );

        bridge
            .invoke(&InvocationRequest::call(ROOT_REFERENCE_ID, "runtime.nothing"))
            .await
            .unwrap_err();
        assert_eq!(
            bridge.last_invocation_result().as_deref(),
            Some("\"moz-extension://test/popup.html\"")
        );
    }

    #[tokio::test]
    async fn test_handle_messages() {
        let bridge = bridge();

        let retained = bridge
            .handle(BridgeMessage::Invoke(
                InvocationRequest::get(ROOT_REFERENCE_ID, "runtime.port").with_return_reference("ref-1"),
            ))
            .await
            .unwrap();
        assert_eq!(retained, json!({"referenceId": "ref-1"}));

        let diagnostics: BridgeDiagnostics =
            serde_json::from_value(bridge.handle(BridgeMessage::GetReferences).await.unwrap()).unwrap();
        assert_eq!(diagnostics.object_reference_count, 1);
        assert_eq!(diagnostics.object_reference_ids, vec!["ref-1".to_string()]);
        assert_eq!(diagnostics.last_invocation_result.as_deref(), Some(r#"{"referenceId":"ref-1"}"#));

        let removal = BridgeMessage::RemoveReference(ReferenceRemoval { reference_id: "ref-1".into() });
        assert_eq!(bridge.handle(removal.clone()).await.unwrap(), JsonValue::Null);
        assert_eq!(bridge.handle(removal).await.unwrap(), JsonValue::Null);
        assert_eq!(bridge.diagnostics().object_reference_count, 0);

        let last = bridge.handle(BridgeMessage::GetLastInvocationResult).await.unwrap();
        assert_eq!(last, json!(r#"{"referenceId":"ref-1"}"#));
    }

    #[tokio::test]
    async fn test_invoke_function_message() {
        let bridge = bridge();
        let id = bridge.functions().register(|args| Ok(json!({"got": args})));

        let result = bridge
            .handle(BridgeMessage::InvokeFunction(FunctionInvocation::new(id, vec![json!(1), json!("a")])))
            .await
            .unwrap();
        assert_eq!(result, json!({"got": [1, "a"]}));

        let err = bridge
            .handle(BridgeMessage::InvokeFunction(FunctionInvocation::new("fn-404", vec![])))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownReference(_)));
    }
}
