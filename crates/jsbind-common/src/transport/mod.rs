//! JsBind Transport Layer
//!
//! The exact transport between a host and its JavaScript environment belongs
//! to the embedding (a native-messaging pipe, a child process, a test
//! harness). This module only fixes the framing used by the stdio bridge:
//!
//! - **Codec**: JSON serialization of `Request` / `Response` envelopes
//! - **Wire Format**: one JSON document per line (`\n` terminated)
//! - **Max Message Size**: 64 MB per line

pub mod codec;

pub use codec::{JsonLineCodec, MAX_MESSAGE_SIZE};
