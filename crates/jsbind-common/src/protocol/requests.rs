use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};

pub type ReferenceId = String;

/// Well-known reference id that denotes the global API root.
pub const ROOT_REFERENCE_ID: &str = "browser";

/// One marshaled argument of an invocation.
///
/// Function-typed arguments never travel by value: the host keeps the
/// callback in its FunctionReferenceRegistry and only the id crosses the
/// boundary, as `{ "kind": "functionReference", "referenceId": "fn-1" }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Argument {
    Value {
        value: JsonValue,
    },
    FunctionReference {
        #[serde(rename = "referenceId")]
        reference_id: ReferenceId,
    },
}

impl Argument {
    /// Serializes any host value into a by-value argument.
    pub fn value<T: Serialize>(value: &T) -> crate::Result<Self> {
        Ok(Argument::Value {
            value: serde_json::to_value(value)?,
        })
    }

    pub fn function(reference_id: impl Into<ReferenceId>) -> Self {
        Argument::FunctionReference {
            reference_id: reference_id.into(),
        }
    }
}

impl From<JsonValue> for Argument {
    fn from(value: JsonValue) -> Self {
        Argument::Value { value }
    }
}

/// A single-shot description of a member access or call on a JavaScript object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    pub reference_id: ReferenceId,
    pub target_path: String,
    pub is_function: bool,
    #[serde(default)]
    pub return_object_reference_id: Option<ReferenceId>,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

impl InvocationRequest {
    /// Calls the function at `target_path` on the object behind `reference_id`.
    pub fn call(reference_id: impl Into<ReferenceId>, target_path: impl Into<String>) -> Self {
        InvocationRequest {
            reference_id: reference_id.into(),
            target_path: target_path.into(),
            is_function: true,
            return_object_reference_id: None,
            arguments: Vec::new(),
        }
    }

    /// Reads the property at `target_path` on the object behind `reference_id`.
    pub fn get(reference_id: impl Into<ReferenceId>, target_path: impl Into<String>) -> Self {
        InvocationRequest {
            is_function: false,
            ..InvocationRequest::call(reference_id, target_path)
        }
    }

    pub fn with_argument(mut self, argument: impl Into<Argument>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    pub fn with_arguments(mut self, arguments: impl IntoIterator<Item = Argument>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    /// Keeps the result on the JavaScript side under `reference_id` instead of
    /// copying it back by value.
    pub fn with_return_reference(mut self, reference_id: impl Into<ReferenceId>) -> Self {
        self.return_object_reference_id = Some(reference_id.into());
        self
    }

    /// Renders the arguments for error messages.
    pub fn describe_arguments(&self) -> String {
        serde_json::to_string(&self.arguments).unwrap_or_else(|_| "<unprintable>".to_string())
    }
}

/// JavaScript -> host invocation of a registered callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInvocation {
    pub reference_id: ReferenceId,
    #[serde(default)]
    pub arguments: Vec<JsonValue>,
}

impl FunctionInvocation {
    pub fn new(reference_id: impl Into<ReferenceId>, arguments: Vec<JsonValue>) -> Self {
        FunctionInvocation {
            reference_id: reference_id.into(),
            arguments,
        }
    }
}

/// Releases an object reference. Removing twice is not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRemoval {
    pub reference_id: ReferenceId,
}

/// Allocates monotonically increasing, never reused reference ids.
#[derive(Debug)]
pub struct ReferenceIdGenerator {
    prefix: &'static str,
    next: AtomicU64,
}

impl ReferenceIdGenerator {
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ReferenceId {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}
