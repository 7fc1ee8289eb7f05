//! # liftoff-plugin
//!
//! Plugin startup coordination. Provides:
//!
//! - An event bus with memory: listeners on single events or `any`/`all`
//!   combinations, each run exactly once, late subscribers still delivered
//! - Dependency resolution with required and optional dependencies,
//!   cycle detection, and stable ordering
//! - A two-phase lifecycle (initialize in dependency order, finalize in
//!   reverse) driven by [`PluginManager`]
//! - Typed state exported between plugins

pub mod bus;
pub mod descriptor;
pub mod error;
pub mod manager;
pub mod prelude;
pub mod registry;
pub mod resolver;

pub use bus::{Condition, ConditionKind, EventBus};
pub use descriptor::{Dependency, Plugin, PluginContext, PluginDescriptor};
pub use error::{HookError, HookStage, PluginError, PluginResult};
pub use manager::{Phase, PluginManager, StartupReport};
pub use registry::{PluginInfo, PluginStatus, PluginTable};
pub use resolver::{Resolution, SkippedDependency, resolve_load_order};
