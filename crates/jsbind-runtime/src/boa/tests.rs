//! Dispatching against a scripted `browser` object in the Boa engine.

use std::sync::{Arc, Mutex};

use jsbind_common::{Argument, BridgeError, InvocationRequest, InvocationResult, ROOT_REFERENCE_ID};
use serde_json::json;

use super::BoaEnvironment;
use crate::{Bridge, BridgeConfig, BridgeHandle, Dispatcher, FunctionReferenceRegistry, JsEnvironment};

const API: &str = r#"
globalThis.browser = {
    tabs: {
        TAB_ID_NONE: -1,
        calls: 0,
        all: [
            { id: 1, active: true, title: "Inbox" },
            { id: 2, active: false, title: "Docs" },
        ],
        query(filter) {
            this.calls += 1;
            return Promise.resolve(this.all.filter(t => filter.active === undefined || t.active === filter.active));
        },
        remove(id) {
            return Promise.reject(new Error("Invalid tab ID: " + id));
        },
        discard() {
            throw new TypeError("tab is active");
        },
    },
    runtime: {
        id: "extension@example.com",
        getURL(path) {
            return "moz-extension://test/" + path;
        },
        async getPlatformInfo() {
            await null;
            return { os: "linux", arch: "x86-64" };
        },
        connect(name) {
            return {
                name,
                messages: [],
                postMessage(message) { this.messages.push(message); },
            };
        },
        onMessage: {
            listeners: [],
            addListener(listener) { this.listeners.push(listener); },
            removeListener(listener) { this.listeners = this.listeners.filter(l => l !== listener); },
            hasListener(listener) { return this.listeners.includes(listener); },
            emit(...args) { return this.listeners.map(l => l(...args)); },
        },
    },
};
"#;

fn dispatcher() -> Dispatcher<BoaEnvironment> {
    let env = BoaEnvironment::from_source(API, &BridgeConfig::default()).unwrap();
    Dispatcher::new(env, Arc::new(FunctionReferenceRegistry::new()), ROOT_REFERENCE_ID)
}

#[tokio::test]
async fn test_query_is_called_with_argument() {
    let dispatcher = dispatcher();
    let request = InvocationRequest::call(ROOT_REFERENCE_ID, "tabs.query").with_argument(json!({"active": true}));

    let result = dispatcher.dispatch(&request).await.unwrap();
    assert_eq!(
        result,
        InvocationResult::Value(json!([{"id": 1, "active": true, "title": "Inbox"}]))
    );
    assert_eq!(dispatcher.env().eval("browser.tabs.calls").unwrap(), json!(1));
}

#[tokio::test]
async fn test_missing_member() {
    let dispatcher = dispatcher();
    let err = dispatcher
        .dispatch(&InvocationRequest::call(ROOT_REFERENCE_ID, "tabs.doesNotExist"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::MemberNotFound { ref target_path, .. } if target_path == "tabs.doesNotExist"));
    assert!(err.to_string().contains("tabs.doesNotExist"));
}

#[tokio::test]
async fn test_not_callable_and_property_reads() {
    let dispatcher = dispatcher();
    let err = dispatcher
        .dispatch(&InvocationRequest::call(ROOT_REFERENCE_ID, "tabs.TAB_ID_NONE"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::NotCallable { .. }));

    let none = dispatcher
        .dispatch(&InvocationRequest::get(ROOT_REFERENCE_ID, "tabs.TAB_ID_NONE"))
        .await
        .unwrap();
    assert_eq!(none.into_wire(), json!(-1));

    let length = dispatcher
        .dispatch(&InvocationRequest::get(ROOT_REFERENCE_ID, "runtime.id.length"))
        .await
        .unwrap();
    assert_eq!(length.into_wire(), json!(21));

    let absent = dispatcher
        .dispatch(&InvocationRequest::get(ROOT_REFERENCE_ID, "runtime.lastError"))
        .await
        .unwrap();
    assert_eq!(absent.into_wire(), serde_json::Value::Null);
}

#[tokio::test]
async fn test_async_function_is_awaited() {
    let dispatcher = dispatcher();
    let info = dispatcher
        .dispatch(&InvocationRequest::call(ROOT_REFERENCE_ID, "runtime.getPlatformInfo"))
        .await
        .unwrap();
    assert_eq!(info.into_wire(), json!({"os": "linux", "arch": "x86-64"}));
}

#[tokio::test]
async fn test_throw_and_rejection() {
    let dispatcher = dispatcher();
    let err = dispatcher
        .dispatch(&InvocationRequest::call(ROOT_REFERENCE_ID, "tabs.discard"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvocationFailed { ref message, .. } if message.contains("tab is active")));

    let err = dispatcher
        .dispatch(&InvocationRequest::call(ROOT_REFERENCE_ID, "tabs.remove").with_argument(json!(5)))
        .await
        .unwrap_err();
    match err {
        BridgeError::InvocationFailed { target_path, arguments, message, .. } => {
            assert_eq!(target_path, "tabs.remove");
            assert!(arguments.contains('5'));
            assert!(message.contains("Invalid tab ID: 5"));
        }
        other => panic!("Expected InvocationFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_retained_port() {
    let dispatcher = dispatcher();
    let result = dispatcher
        .dispatch(
            &InvocationRequest::call(ROOT_REFERENCE_ID, "runtime.connect")
                .with_argument(json!("sidebar"))
                .with_return_reference("ref-1"),
        )
        .await
        .unwrap();
    assert_eq!(result.into_wire(), json!({"referenceId": "ref-1"}));

    dispatcher
        .dispatch(&InvocationRequest::call("ref-1", "postMessage").with_argument(json!({"hello": 1})))
        .await
        .unwrap();
    let messages = dispatcher.dispatch(&InvocationRequest::get("ref-1", "messages")).await.unwrap();
    assert_eq!(messages.into_wire(), json!([{"hello": 1}]));

    dispatcher.remove_reference("ref-1");
    assert!(matches!(
        dispatcher.dispatch(&InvocationRequest::get("ref-1", "name")).await,
        Err(BridgeError::UnknownReference(_))
    ));
}

#[tokio::test]
async fn test_listener_identity_and_arguments() {
    let dispatcher = dispatcher();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let id = dispatcher.functions().register(move |args| {
        sink.lock().unwrap().push(args);
        Ok(json!("handled"))
    });
    let listener = || Argument::function(id.clone());

    dispatcher
        .dispatch(
            &InvocationRequest::call(ROOT_REFERENCE_ID, "runtime.onMessage.addListener")
                .with_argument(listener()),
        )
        .await
        .unwrap();
    let has = dispatcher
        .dispatch(
            &InvocationRequest::call(ROOT_REFERENCE_ID, "runtime.onMessage.hasListener")
                .with_argument(listener()),
        )
        .await
        .unwrap();
    assert_eq!(has.into_wire(), json!(true));

    let replies = dispatcher
        .dispatch(
            &InvocationRequest::call(ROOT_REFERENCE_ID, "runtime.onMessage.emit")
                .with_argument(json!(1))
                .with_argument(json!("a")),
        )
        .await
        .unwrap();
    assert_eq!(replies.into_wire(), json!(["handled"]));
    assert_eq!(*received.lock().unwrap(), vec![vec![json!(1), json!("a")]]);

    dispatcher
        .dispatch(
            &InvocationRequest::call(ROOT_REFERENCE_ID, "runtime.onMessage.removeListener")
                .with_argument(listener()),
        )
        .await
        .unwrap();
    let has = dispatcher
        .dispatch(
            &InvocationRequest::call(ROOT_REFERENCE_ID, "runtime.onMessage.hasListener")
                .with_argument(listener()),
        )
        .await
        .unwrap();
    assert_eq!(has.into_wire(), json!(false));

    assert_eq!(dispatcher.env().host_function_count(), 1);
    assert!(dispatcher.remove_reference(&id));
    assert_eq!(dispatcher.env().host_function_count(), 0);
    assert_eq!(dispatcher.functions().count(), 0);
    assert!(!dispatcher.remove_reference(&id));
}

#[tokio::test]
async fn test_host_callback_error_is_thrown_in_javascript() {
    let dispatcher = dispatcher();
    let id = dispatcher
        .functions()
        .register(|_| Err(BridgeError::InvalidRequest("host refused".into())));
    dispatcher
        .dispatch(
            &InvocationRequest::call(ROOT_REFERENCE_ID, "runtime.onMessage.addListener")
                .with_argument(Argument::function(id)),
        )
        .await
        .unwrap();

    let err = dispatcher
        .dispatch(&InvocationRequest::call(ROOT_REFERENCE_ID, "runtime.onMessage.emit"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvocationFailed { ref message, .. } if message.contains("host refused")));
}

#[tokio::test]
async fn test_missing_root() {
    let env = BoaEnvironment::from_source("var chrome = {};", &BridgeConfig::default()).unwrap();
    let dispatcher = Dispatcher::new(env, Arc::new(FunctionReferenceRegistry::new()), ROOT_REFERENCE_ID);
    let err = dispatcher
        .dispatch(&InvocationRequest::get(ROOT_REFERENCE_ID, "runtime.id"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::MemberNotFound { ref target_path, .. } if target_path == "browser"));
}

#[tokio::test]
async fn test_custom_global_root() {
    let config = BridgeConfig::default().with_global_root("chrome");
    let env = BoaEnvironment::from_source("var chrome = { runtime: { id: 'abc' } };", &config).unwrap();
    let bridge = Bridge::new(env, config);
    let id = bridge
        .invoke(&InvocationRequest::get(ROOT_REFERENCE_ID, "runtime.id"))
        .await
        .unwrap();
    assert_eq!(id.into_wire(), json!("abc"));
    assert!(bridge.env().root().is_ok());
}

#[test]
fn test_syntax_error_fails_to_load() {
    let err = BoaEnvironment::from_source("this is not valid javascript ))", &BridgeConfig::default());
    assert!(matches!(err, Err(BridgeError::JavaScriptExecution(_))));
}

#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, API.as_bytes()).unwrap();
    let env = BoaEnvironment::from_file(file.path(), &BridgeConfig::default()).unwrap();
    assert_eq!(env.eval("browser.runtime.id").unwrap(), json!("extension@example.com"));

    assert!(BoaEnvironment::from_file("/nonexistent/api.js", &BridgeConfig::default()).is_err());
}

#[tokio::test]
async fn test_spawned_boa_bridge() {
    let bridge = BridgeHandle::spawn(BridgeConfig::default(), |config| BoaEnvironment::from_source(API, config))
        .await
        .unwrap();

    let url: String = bridge
        .invoke(InvocationRequest::call(ROOT_REFERENCE_ID, "runtime.getURL").with_argument(json!("popup.html")))
        .await
        .unwrap();
    assert_eq!(url, "moz-extension://test/popup.html");

    let tabs: Vec<serde_json::Value> = bridge
        .invoke(InvocationRequest::call(ROOT_REFERENCE_ID, "tabs.query").with_argument(json!({})))
        .await
        .unwrap();
    assert_eq!(tabs.len(), 2);

    bridge.shutdown().await.unwrap();
}
