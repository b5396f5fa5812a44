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

//! # JsBind
//!
//! Typed host bindings for JavaScript APIs. `common` holds the wire protocol
//! and value codecs, `runtime` executes invocations against a JavaScript
//! environment.

pub use jsbind_common as common;
pub use jsbind_runtime as runtime;
