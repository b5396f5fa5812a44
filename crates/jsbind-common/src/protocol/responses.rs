//! JsBind Response Types
//!
//! Results of dispatching `BridgeMessage`s and the envelope that carries them
//! back over a transport.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use super::{ReferenceId, RequestId};
use crate::BridgeError;

/// Outcome of a successful invocation.
///
/// A result retained on the JavaScript side (via `returnObjectReferenceId`)
/// comes back as its reference id; everything else is copied by value.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    Value(JsonValue),
    Reference(ReferenceId),
}

impl InvocationResult {
    /// Wire form: the value itself, or `{ "referenceId": id }` as a surrogate.
    pub fn into_wire(self) -> JsonValue {
        match self {
            InvocationResult::Value(value) => value,
            InvocationResult::Reference(reference_id) => json!({ "referenceId": reference_id }),
        }
    }

    pub fn into_value(self) -> Option<JsonValue> {
        match self {
            InvocationResult::Value(value) => Some(value),
            InvocationResult::Reference(_) => None,
        }
    }
}

/// Live reference table contents, for hunting leaked references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BridgeDiagnostics {
    pub object_reference_count: usize,
    pub object_reference_ids: Vec<ReferenceId>,
    pub function_reference_count: usize,
    pub last_invocation_result: Option<String>,
}

/// A response returned by the bridge to the transport peer.
///
/// # Fields
///
/// - `id`: The request ID this response corresponds to
/// - `result`: The wire result (present on success)
/// - `error`: Error message (present on failure)
/// - `error_kind`: Taxonomy name of the error (present on failure)
/// - `success`: Whether the request succeeded
///
/// # Example
///
/// ```
/// use jsbind_common::protocol::responses::Response;
/// use serde_json::json;
///
/// let success = Response::success(7, json!([{"id": 1}]));
/// assert!(success.success);
///
/// let error = Response::error(7, "UnknownReference", "Unknown reference 'ref-9'");
/// assert_eq!(error.error_kind.as_deref(), Some("UnknownReference"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: RequestId,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    #[serde(default)]
    pub error_kind: Option<String>,
    pub success: bool,
}

impl Response {
    /// A successful response carrying `result`.
    pub fn success(id: RequestId, result: JsonValue) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
            error_kind: None,
            success: true,
        }
    }

    pub fn error(id: RequestId, kind: impl Into<String>, error: impl Into<String>) -> Self {
        Response {
            id,
            result: None,
            error: Some(error.into()),
            error_kind: Some(kind.into()),
            success: false,
        }
    }

    pub fn from_result(id: RequestId, result: crate::Result<JsonValue>) -> Self {
        match result {
            Ok(value) => Response::success(id, value),
            Err(err) => Response::from_error(id, &err),
        }
    }

    pub fn from_error(id: RequestId, err: &BridgeError) -> Self {
        Response::error(id, err.kind(), err.to_string())
    }
}
