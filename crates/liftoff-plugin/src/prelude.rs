//! Prelude for convenient imports.

pub use async_trait::async_trait;

pub use crate::bus::events;
pub use crate::bus::{Condition, ConditionKind, EventBus, ListenerContext};
pub use crate::descriptor::{Dependency, Plugin, PluginContext, PluginDescriptor};
pub use crate::error::{HookError, PluginError, PluginResult};
pub use crate::manager::{PluginManager, StartupReport};
pub use crate::registry::PluginStatus;
