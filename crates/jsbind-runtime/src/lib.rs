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

//! JsBind runtime
//!
//! This crate executes bridge invocations against a JavaScript environment:
//! path resolution, argument marshalling, promise settlement and the object
//! and function reference tables. Two environments are provided, the Boa
//! engine and an in-process script model used by tests and embedders.

pub mod boa;
pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod environment;
pub mod functions;
pub mod host;
pub mod references;
pub mod script;
pub mod stdio;

pub use boa::BoaEnvironment;
pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use dispatcher::Dispatcher;
pub use environment::{Completion, JsEnvironment};
pub use functions::{FunctionReferenceRegistry, HostCallback};
pub use host::{BridgeHandle, ObjectHandle};
pub use references::ObjectReferenceTable;
pub use script::{ScriptEnvironment, ScriptValue};
pub use stdio::StdioServer;
