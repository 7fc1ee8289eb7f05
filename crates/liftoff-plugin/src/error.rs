//! Plugin runtime error types.
//!
//! Every variant names the plugin, event, or phase involved so a failed
//! startup can be diagnosed from the message alone.

use std::fmt;

use liftoff_core::error::{AppError, ErrorKind};
use thiserror::Error;

/// Error type returned by plugin-authored hooks and bus listeners.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias for the plugin runtime.
pub type PluginResult<T> = Result<T, PluginError>;

/// Lifecycle hook that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// The registration hook (receives the bus).
    Register,
    /// The initialize hook.
    Initialize,
    /// The finalize (post-init) hook.
    Finalize,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register => write!(f, "register"),
            Self::Initialize => write!(f, "initialize"),
            Self::Finalize => write!(f, "finalize"),
        }
    }
}

/// Errors raised while registering, ordering, initializing, or finalizing plugins.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Two descriptors in the same run share a name.
    #[error("plugin '{name}' is registered more than once")]
    DuplicateName { name: String },

    /// A required dependency is not part of the plugin set.
    #[error("plugin '{plugin}': depends on '{dependency}' which is not registered")]
    MissingDependency { plugin: String, dependency: String },

    /// A dependency cycle was found while ordering.
    #[error("circular dependency detected: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    /// A subscription condition is malformed for its kind.
    #[error("invalid {kind} condition over [{}]: {reason}", .events.join(", "))]
    InvalidCondition {
        kind: String,
        events: Vec<String>,
        reason: String,
    },

    /// A subscription names a condition kind other than single/any/all.
    #[error("unknown condition kind '{kind}', expected one of: single, any, all")]
    UnknownCondition { kind: String },

    /// A plugin hook returned an error.
    #[error("plugin '{plugin}': {stage} hook failed: {source}")]
    Hook {
        plugin: String,
        stage: HookStage,
        #[source]
        source: HookError,
    },

    /// A plugin hook did not complete within its timeout.
    #[error("plugin '{plugin}': {stage} hook timed out after {timeout_ms}ms")]
    HookTimedOut {
        plugin: String,
        stage: HookStage,
        timeout_ms: u128,
    },

    /// A bus listener returned an error while an event was delivered.
    #[error("listener for '{event}' failed: {source}")]
    Listener {
        event: String,
        #[source]
        source: HookError,
    },

    /// A coordinator phase was entered out of order.
    #[error("cannot enter {attempted} phase while in {current} phase")]
    PhaseViolation { current: String, attempted: String },

    /// A plugin table lookup found no such plugin.
    #[error("plugin '{name}' is not registered")]
    PluginNotFound { name: String },

    /// The plugin exists but has not exported any state.
    #[error("plugin '{name}' has not exported any state")]
    ExportMissing { name: String },

    /// The exported state is not of the requested type.
    #[error("plugin '{name}' exports a different type than '{expected}'")]
    ExportTypeMismatch { name: String, expected: &'static str },

    /// A plugin tried to export state twice.
    #[error("plugin '{name}' has already exported its state")]
    ExportAlreadySet { name: String },
}

impl PluginError {
    /// Wrap a hook failure with the plugin and stage it came from.
    pub fn hook(plugin: impl Into<String>, stage: HookStage, source: HookError) -> Self {
        Self::Hook {
            plugin: plugin.into(),
            stage,
            source,
        }
    }

    /// Create an invalid condition error.
    pub fn invalid_condition(
        kind: impl fmt::Display,
        events: &[String],
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidCondition {
            kind: kind.to_string(),
            events: events.to_vec(),
            reason: reason.into(),
        }
    }

    /// Create a phase violation error.
    pub fn phase(current: impl fmt::Display, attempted: impl fmt::Display) -> Self {
        Self::PhaseViolation {
            current: current.to_string(),
            attempted: attempted.to_string(),
        }
    }

    /// Name of the plugin this error concerns, when there is one.
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            Self::DuplicateName { name }
            | Self::PluginNotFound { name }
            | Self::ExportMissing { name }
            | Self::ExportTypeMismatch { name, .. }
            | Self::ExportAlreadySet { name } => Some(name.as_str()),
            Self::MissingDependency { plugin, .. }
            | Self::Hook { plugin, .. }
            | Self::HookTimedOut { plugin, .. } => Some(plugin.as_str()),
            _ => None,
        }
    }
}

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        let kind = match &err {
            PluginError::HookTimedOut { .. } => ErrorKind::Timeout,
            PluginError::PluginNotFound { .. } => ErrorKind::NotFound,
            PluginError::InvalidCondition { .. } | PluginError::UnknownCondition { .. } => {
                ErrorKind::Validation
            }
            _ => ErrorKind::Plugin,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}
