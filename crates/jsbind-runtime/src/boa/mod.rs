//! Boa JavaScript engine environment.
//!
//! The API root is a global object (`globalThis.browser` by default)
//! defined by a loaded script. Promises are the pending variant; they are
//! settled by draining Boa's job queue between cooperative yields.

pub mod conversions;
mod environment;

#[cfg(test)]
mod tests;

pub use environment::BoaEnvironment;
