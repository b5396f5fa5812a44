//! Bridge configuration.
//!
//! Every field has a default, so a configuration file only needs to name the
//! settings it changes.

use std::path::Path;
use std::time::Duration;

use jsbind_common::{BridgeError, Result, ROOT_REFERENCE_ID};
use serde::Deserialize;

/// Configuration of one bridge instance.
///
/// # Fields
///
/// - `root_handle` - Reference id that denotes the API root (default: `"browser"`)
/// - `global_root` - Global property the script environment exposes as the API root (default: `"browser"`)
/// - `settle_poll_interval_ms` - Delay between job-queue drains while a promise is pending (default: 1 ms)
/// - `thread_name` - Name of the dedicated JavaScript thread (default: `"jsbind-js"`)
///
/// # Example
///
/// ```
/// use jsbind_runtime::BridgeConfig;
/// use std::time::Duration;
///
/// let config = BridgeConfig::new()
///     .with_global_root("chrome")
///     .with_settle_poll_interval(Duration::from_millis(5));
/// assert_eq!(config.root_handle, "browser");
/// assert_eq!(config.settle_poll_interval(), Duration::from_millis(5));
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    pub root_handle: String,
    pub global_root: String,
    pub settle_poll_interval_ms: u64,
    pub thread_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            root_handle: ROOT_REFERENCE_ID.to_string(),
            global_root: "browser".to_string(),
            settle_poll_interval_ms: 1,
            thread_name: "jsbind-js".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Io` if the file cannot be read, `BridgeError::JsonSerialization`
    /// if it is not valid JSON, and `BridgeError::InvalidRequest` if it fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: BridgeConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        tracing::debug!("Loaded bridge config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn with_root_handle(mut self, root_handle: impl Into<String>) -> Self {
        self.root_handle = root_handle.into();
        self
    }

    pub fn with_global_root(mut self, global_root: impl Into<String>) -> Self {
        self.global_root = global_root.into();
        self
    }

    pub fn with_settle_poll_interval(mut self, interval: Duration) -> Self {
        self.settle_poll_interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    pub fn settle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.settle_poll_interval_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the root handle or global root is empty, or if the
    /// root handle contains a `.` (it would be indistinguishable from a path).
    pub fn validate(&self) -> Result<()> {
        if self.root_handle.is_empty() {
            return Err(BridgeError::InvalidRequest("root handle must not be empty".into()));
        }
        if self.root_handle.contains('.') {
            return Err(BridgeError::InvalidRequest(format!(
                "root handle must not contain '.' (got '{}')",
                self.root_handle
            )));
        }
        if self.global_root.is_empty() {
            return Err(BridgeError::InvalidRequest("global root must not be empty".into()));
        }
        Ok(())
    }
}
