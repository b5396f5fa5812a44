use thiserror::Error;

/// Errors produced while crossing the host/JavaScript boundary.
///
/// Every variant is scoped to the single invocation that raised it. None of
/// them leaves the reference tables in an inconsistent state.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Unknown reference '{0}'")]
    UnknownReference(String),

    #[error("Reference id '{0}' is already in use or was released")]
    DuplicateReference(String),

    #[error("Unable to find member '{target_path}' on object '{reference_id}'")]
    MemberNotFound {
        reference_id: String,
        target_path: String,
    },

    #[error("Member '{target_path}' on object '{reference_id}' is not a function")]
    NotCallable {
        reference_id: String,
        target_path: String,
    },

    #[error("No variant of '{type_name}' matches JSON {shape}")]
    NoMatchingVariant {
        type_name: &'static str,
        shape: &'static str,
    },

    #[error("Invalid enum value of '{literal}' for type '{type_name}'")]
    UnknownEnumLiteral {
        literal: String,
        type_name: &'static str,
    },

    #[error("Failed to execute function {target_path} on object '{reference_id}' with arguments {arguments}: {message}")]
    InvocationFailed {
        reference_id: String,
        target_path: String,
        arguments: String,
        message: String,
    },

    #[error("JavaScript execution error: {0}")]
    JavaScriptExecution(String),

    #[error("Failed to deserialize result as {type_name}: {message} (last invocation result: {last_result})")]
    Deserialization {
        type_name: &'static str,
        message: String,
        last_result: String,
    },

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bridge is closed")]
    BridgeClosed,
}

impl BridgeError {
    /// Names the taxonomy entry of this error, used in wire responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::UnknownReference(_) => "UnknownReference",
            BridgeError::DuplicateReference(_) => "DuplicateReference",
            BridgeError::MemberNotFound { .. } => "MemberNotFound",
            BridgeError::NotCallable { .. } => "NotCallable",
            BridgeError::NoMatchingVariant { .. } => "NoMatchingVariant",
            BridgeError::UnknownEnumLiteral { .. } => "UnknownEnumLiteral",
            BridgeError::InvocationFailed { .. } => "UnderlyingOperationFailure",
            BridgeError::JavaScriptExecution(_) => "JavaScriptExecution",
            BridgeError::Deserialization { .. } => "Deserialization",
            BridgeError::JsonSerialization(_) => "JsonSerialization",
            BridgeError::InvalidRequest(_) => "InvalidRequest",
            BridgeError::Io(_) => "Io",
            BridgeError::BridgeClosed => "BridgeClosed",
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
