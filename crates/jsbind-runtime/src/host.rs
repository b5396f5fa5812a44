//! Host-side handle to a bridge running on its own JavaScript thread.
//!
//! JavaScript environments are single-threaded and not `Send`, so the bridge
//! lives on a dedicated thread driving a current-thread tokio runtime and a
//! `LocalSet`. Every command is spawned there as a local task: concurrent
//! host calls interleave wherever a call awaits a pending result, while each
//! individual table operation runs uninterrupted.
//!
//! There is no invocation timeout. A JavaScript operation that never settles
//! keeps its caller waiting; wrap calls in `tokio::time::timeout` to bound
//! them. Dropping a call's future does not retract the invocation.

use std::rc::Rc;
use std::sync::Arc;

use jsbind_common::{
    Argument, BridgeDiagnostics, BridgeError, BridgeMessage, FunctionInvocation, InvocationRequest,
    ReferenceId, ReferenceIdGenerator, ReferenceRemoval, Result,
};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::environment::JsEnvironment;
use crate::functions::FunctionReferenceRegistry;

static OBJECT_HANDLE_IDS: ReferenceIdGenerator = ReferenceIdGenerator::new("handle");

#[derive(Debug)]
enum Command {
    Message {
        message: BridgeMessage,
        reply: oneshot::Sender<Result<JsonValue>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable, thread-safe proxy to a bridge instance.
///
/// The bridge shuts down when [`shutdown`](Self::shutdown) is called or the
/// last handle is dropped; its reference tables go with it.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    commands: mpsc::UnboundedSender<Command>,
    functions: Arc<FunctionReferenceRegistry>,
    root_handle: ReferenceId,
}

impl BridgeHandle {
    /// Starts a bridge thread and builds its environment there with `factory`.
    ///
    /// # Errors
    ///
    /// Returns the factory's error if the environment cannot be created,
    /// `BridgeError::Io` if the thread or its runtime cannot be started, and
    /// `BridgeError::BridgeClosed` if the factory panics.
    pub async fn spawn<E, F>(config: BridgeConfig, factory: F) -> Result<Self>
    where
        E: JsEnvironment + 'static,
        F: FnOnce(&BridgeConfig) -> Result<E> + Send + 'static,
    {
        config.validate()?;

        let (commands, receiver) = mpsc::unbounded_channel();
        let (ready, started) = oneshot::channel::<Result<()>>();
        let functions = Arc::new(FunctionReferenceRegistry::new());
        let root_handle = config.root_handle.clone();
        let thread_name = config.thread_name.clone();
        let thread_functions = Arc::clone(&functions);

        std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready.send(Err(e.into()));
                        return;
                    }
                };
                let env = match factory(&config) {
                    Ok(env) => env,
                    Err(e) => {
                        let _ = ready.send(Err(e));
                        return;
                    }
                };

                let bridge = Rc::new(Bridge::with_functions(env, config, thread_functions));
                if ready.send(Ok(())).is_err() {
                    return;
                }

                let local = LocalSet::new();
                local.block_on(&runtime, serve(bridge, receiver));
            })?;

        started.await.map_err(|_| BridgeError::BridgeClosed)??;
        tracing::info!("Bridge started on thread '{}'", thread_name);

        Ok(Self {
            commands,
            functions,
            root_handle,
        })
    }

    /// The reference id that denotes the API root.
    pub fn root_handle(&self) -> &str {
        &self.root_handle
    }

    pub fn functions(&self) -> &Arc<FunctionReferenceRegistry> {
        &self.functions
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Sends a raw message and waits for its wire result.
    pub async fn send(&self, message: BridgeMessage) -> Result<JsonValue> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Message { message, reply })
            .map_err(|_| BridgeError::BridgeClosed)?;
        response.await.map_err(|_| BridgeError::BridgeClosed)?
    }

    /// Dispatches `request` and decodes its result as `T`.
    ///
    /// # Errors
    ///
    /// Besides dispatch errors, returns `BridgeError::Deserialization` with the
    /// raw result attached if it does not decode as `T`.
    pub async fn invoke<T: DeserializeOwned>(&self, request: InvocationRequest) -> Result<T> {
        let result = self.send(BridgeMessage::Invoke(request)).await?;
        decode_result(&result)
    }

    /// Dispatches `request` and discards its result.
    pub async fn invoke_void(&self, request: InvocationRequest) -> Result<()> {
        self.send(BridgeMessage::Invoke(request)).await?;
        Ok(())
    }

    /// Reads the property at `target_path` on `reference_id`.
    pub async fn get_property<T: DeserializeOwned>(
        &self,
        reference_id: impl Into<ReferenceId>,
        target_path: impl Into<String>,
    ) -> Result<T> {
        self.invoke(InvocationRequest::get(reference_id, target_path)).await
    }

    /// Dispatches `request` and keeps its result on the JavaScript side.
    pub async fn invoke_for_reference(&self, request: InvocationRequest) -> Result<ObjectHandle> {
        let reference_id = OBJECT_HANDLE_IDS.next_id();
        self.send(BridgeMessage::Invoke(request.with_return_reference(reference_id.clone())))
            .await?;
        Ok(ObjectHandle {
            bridge: self.clone(),
            reference_id,
        })
    }

    /// Files a host callback; pass the id with [`Argument::function`].
    pub fn register_callback<F>(&self, callback: F) -> ReferenceId
    where
        F: Fn(Vec<JsonValue>) -> Result<JsonValue> + Send + Sync + 'static,
    {
        self.functions.register(callback)
    }

    /// Drops a callback filed with [`register_callback`](Self::register_callback),
    /// along with the function the environment built for it.
    pub async fn remove_callback(&self, reference_id: &str) -> Result<()> {
        self.remove_reference(reference_id).await
    }

    /// Registers `callback` and passes it to `<event_path>.addListener`.
    ///
    /// Returns the callback's reference id, needed to remove the listener.
    pub async fn add_listener<F>(
        &self,
        reference_id: impl Into<ReferenceId>,
        event_path: &str,
        callback: F,
    ) -> Result<ReferenceId>
    where
        F: Fn(Vec<JsonValue>) -> Result<JsonValue> + Send + Sync + 'static,
    {
        let callback_id = self.register_callback(callback);
        let request = InvocationRequest::call(reference_id, format!("{}.addListener", event_path))
            .with_argument(Argument::function(callback_id.clone()));

        if let Err(e) = self.invoke_void(request).await {
            self.functions.remove(&callback_id);
            if let Err(release) = self.remove_reference(callback_id.as_str()).await {
                tracing::debug!("Failed to release callback '{}': {}", callback_id, release);
            }
            return Err(e);
        }
        Ok(callback_id)
    }

    /// Passes the callback to `<event_path>.removeListener` and drops it
    /// from the registry.
    pub async fn remove_listener(
        &self,
        reference_id: impl Into<ReferenceId>,
        event_path: &str,
        callback_id: &str,
    ) -> Result<()> {
        let request = InvocationRequest::call(reference_id, format!("{}.removeListener", event_path))
            .with_argument(Argument::function(callback_id));
        let result = self.invoke_void(request).await;
        self.functions.remove(callback_id);
        result.and(self.remove_reference(callback_id).await)
    }

    /// Releases an object reference. Idempotent.
    pub async fn remove_reference(&self, reference_id: impl Into<ReferenceId>) -> Result<()> {
        self.send(BridgeMessage::RemoveReference(ReferenceRemoval {
            reference_id: reference_id.into(),
        }))
        .await?;
        Ok(())
    }

    /// Delivers a callback invocation that arrived from the JavaScript side.
    pub fn invoke_function(&self, invocation: FunctionInvocation) -> Result<JsonValue> {
        self.functions.invoke(&invocation.reference_id, invocation.arguments)
    }

    pub async fn diagnostics(&self) -> Result<BridgeDiagnostics> {
        let diagnostics = self.send(BridgeMessage::GetReferences).await?;
        Ok(serde_json::from_value(diagnostics)?)
    }

    pub async fn last_invocation_result(&self) -> Result<Option<String>> {
        match self.send(BridgeMessage::GetLastInvocationResult).await? {
            JsonValue::String(result) => Ok(Some(result)),
            _ => Ok(None),
        }
    }

    /// Stops the bridge thread. In-flight calls fail with `BridgeClosed`.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, stopped) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).is_err() {
            return Ok(());
        }
        let _ = stopped.await;
        Ok(())
    }
}

async fn serve<E: JsEnvironment + 'static>(
    bridge: Rc<Bridge<E>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Message { message, reply } => {
                let bridge = Rc::clone(&bridge);
                tokio::task::spawn_local(async move {
                    let _ = reply.send(bridge.handle(message).await);
                });
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
                break;
            }
        }
    }
    tracing::info!("Bridge stopped");
}

fn decode_result<T: DeserializeOwned>(result: &JsonValue) -> Result<T> {
    T::deserialize(result).map_err(|e| {
        let last_result = result.to_string();
        tracing::error!(
            "Failed to decode invocation result as {}: {} (result: {})",
            std::any::type_name::<T>(),
            e,
            last_result
        );
        BridgeError::Deserialization {
            type_name: std::any::type_name::<T>(),
            message: e.to_string(),
            last_result,
        }
    })
}

/// A JavaScript object retained on the bridge.
///
/// The reference stays alive until [`release`](Self::release) is called;
/// dropping the handle does not release it.
#[derive(Debug, Clone)]
pub struct ObjectHandle {
    bridge: BridgeHandle,
    reference_id: ReferenceId,
}

impl ObjectHandle {
    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    /// Calls the function at `target_path` on this object.
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        target_path: impl Into<String>,
        arguments: impl IntoIterator<Item = Argument>,
    ) -> Result<T> {
        let request = InvocationRequest::call(self.reference_id.clone(), target_path).with_arguments(arguments);
        self.bridge.invoke(request).await
    }

    pub async fn get<T: DeserializeOwned>(&self, target_path: impl Into<String>) -> Result<T> {
        self.bridge.get_property(self.reference_id.clone(), target_path).await
    }

    pub async fn release(self) -> Result<()> {
        self.bridge.remove_reference(self.reference_id).await
    }
}
