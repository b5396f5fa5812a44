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

//! JsBind Common Types and Codecs
//!
//! This crate provides the protocol definitions and value codecs shared by
//! both halves of the JsBind bridge: the host process and the JavaScript
//! environment it drives.
//!
//! # Overview
//!
//! JsBind lets strongly typed host code call into a JavaScript API surface
//! (for example the `browser.*` WebExtension APIs) through a small,
//! single-shot invocation protocol:
//!
//! - **Protocol Layer**: `InvocationRequest`, function-reference arguments,
//!   reference removal, the error taxonomy
//! - **Codec Layer**: `EnumCodec` for string enums, `MultiTypeCodec` for
//!   union values
//! - **Transport Layer**: newline-delimited JSON framing of envelopes
//!
//! # Example
//!
//! ```
//! use jsbind_common::{InvocationRequest, ROOT_REFERENCE_ID};
//! use serde_json::json;
//!
//! let request = InvocationRequest::call(ROOT_REFERENCE_ID, "tabs.query")
//!     .with_argument(json!({"active": true}))
//!     .with_return_reference("ref-1");
//! assert!(request.is_function);
//! ```

pub mod codec;
pub mod protocol;
pub mod transport;

pub use protocol::*;

#[doc(hidden)]
pub mod __private {
    pub use serde;
    pub use serde_json;
}
