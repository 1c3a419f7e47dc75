//! Router configuration
//!
//! `SignalConfig` is plain serde data so hosts can ship it as a TOML file next to
//! the app bundle, or build it in code with the `with_*` helpers.
//!
//! ```rust
//! use pushcall_core::config::{FullScreenPolicy, SignalConfig};
//! use std::time::Duration;
//!
//! let config = SignalConfig::new()
//!     .with_ring_timeout(Duration::from_secs(45))
//!     .with_full_screen(FullScreenPolicy::Always);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.ring_timeout(), Duration::from_secs(45));
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{Result, SignalError};

/// Default ring window, matching the notification timeout of the Android wrapper
pub const DEFAULT_RING_TIMEOUT_SECS: u64 = 60;

/// Placeholder shown when a payload carries no caller name
pub const DEFAULT_CALLER_NAME: &str = "Unknown";

const MAX_RING_TIMEOUT_SECS: u64 = 600;

/// When the ringing UI should additionally take over the screen.
///
/// A notification is always posted; this only governs the full-screen surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullScreenPolicy {
    /// Always request the full-screen call UI
    Always,
    /// Only when the host app is not in the foreground
    WhenBackground,
    /// Never; notification only
    Never,
}

impl FullScreenPolicy {
    pub fn wants_full_screen(self, app_in_foreground: bool) -> bool {
        match self {
            FullScreenPolicy::Always => true,
            FullScreenPolicy::WhenBackground => !app_in_foreground,
            FullScreenPolicy::Never => false,
        }
    }
}

impl Default for FullScreenPolicy {
    fn default() -> Self {
        FullScreenPolicy::WhenBackground
    }
}

/// Configuration for `SignalRouter`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Seconds a call may ring before it is timed out
    pub ring_timeout_secs: u64,
    /// Caller name used when the payload has none
    pub default_caller_name: String,
    /// Full-screen presentation policy
    pub full_screen: FullScreenPolicy,
    /// How many recently resolved call ids are remembered for duplicate suppression
    pub dedup_capacity: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            ring_timeout_secs: DEFAULT_RING_TIMEOUT_SECS,
            default_caller_name: DEFAULT_CALLER_NAME.to_string(),
            full_screen: FullScreenPolicy::default(),
            dedup_capacity: 32,
        }
    }
}

impl SignalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ring window. Sub-second precision is dropped.
    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_default_caller_name(mut self, name: impl Into<String>) -> Self {
        self.default_caller_name = name.into();
        self
    }

    pub fn with_full_screen(mut self, policy: FullScreenPolicy) -> Self {
        self.full_screen = policy;
        self
    }

    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    pub fn ring_timeout(&self) -> Duration {
        Duration::from_secs(self.ring_timeout_secs)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.ring_timeout_secs == 0 || self.ring_timeout_secs > MAX_RING_TIMEOUT_SECS {
            return Err(SignalError::config(format!(
                "ring_timeout_secs must be between 1 and {}, got {}",
                MAX_RING_TIMEOUT_SECS, self.ring_timeout_secs
            )));
        }
        if self.default_caller_name.trim().is_empty() {
            return Err(SignalError::config("default_caller_name must not be empty"));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: SignalConfig = toml::from_str(source)
            .map_err(|e| SignalError::config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            SignalError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }
}
