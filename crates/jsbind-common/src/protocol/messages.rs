use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{FunctionInvocation, InvocationRequest, ReferenceRemoval};

pub type RequestId = u64;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Every operation a transport peer can ask of a bridge instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeMessage {
    Invoke(InvocationRequest),
    InvokeFunction(FunctionInvocation),
    RemoveReference(ReferenceRemoval),
    GetReferences,
    GetLastInvocationResult,
}

/// Unsolicited notification from the bridge to its transport peer.
///
/// Emitted when JavaScript calls a function reference the peer passed in;
/// the peer's callback is not waited for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BridgeEvent {
    FunctionInvoked(FunctionInvocation),
}

/// Envelope pairing a message with the id its `Response` will echo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub message: BridgeMessage,
}

impl Request {
    pub fn new(message: BridgeMessage) -> Self {
        Request {
            id: REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst),
            message,
        }
    }
}
