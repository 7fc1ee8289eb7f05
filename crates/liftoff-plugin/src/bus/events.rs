//! Lifecycle event names emitted by the coordinator.

/// Emitted once every descriptor has been registered.
pub const CORE_REGISTERED: &str = "core.registered";

/// Emitted before the first plugin initializes.
pub const CORE_INITIALIZING: &str = "core.initializing";

/// Emitted after the last finalize hook; the whole system is up.
pub const CORE_INITIALIZED: &str = "core.initialized";

/// Emitted right before a plugin's initialize hook runs.
pub fn plugin_initializing(name: &str) -> String {
    format!("plugin.{name}.initializing")
}

/// Emitted once a plugin's initialize hook has completed.
pub fn plugin_initialized(name: &str) -> String {
    format!("plugin.{name}.initialized")
}
