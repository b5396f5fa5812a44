pub mod error;
pub mod messages;
pub mod requests;
pub mod responses;


pub use error::{BridgeError, Result};
pub use messages::{BridgeEvent, BridgeMessage, Request, RequestId};
pub use requests::{
    Argument, FunctionInvocation, InvocationRequest, ReferenceId, ReferenceIdGenerator,
    ReferenceRemoval, ROOT_REFERENCE_ID,
};
pub use responses::{BridgeDiagnostics, InvocationResult, Response};
