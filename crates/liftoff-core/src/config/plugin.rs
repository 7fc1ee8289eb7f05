//! Plugin startup configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Plugin startup configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Plugin names that are dropped before registration.
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Upper bound for every initialize/finalize hook, in seconds. `0` disables it.
    #[serde(default)]
    pub hook_timeout_seconds: u64,
}

impl PluginConfig {
    /// Returns whether the named plugin is disabled.
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d == name)
    }

    /// Returns the hook timeout, if one is configured.
    pub fn hook_timeout(&self) -> Option<Duration> {
        (self.hook_timeout_seconds > 0).then(|| Duration::from_secs(self.hook_timeout_seconds))
    }
}
