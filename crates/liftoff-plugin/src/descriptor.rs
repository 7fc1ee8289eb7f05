//! Plugin descriptors: the identity, dependency declarations, and
//! lifecycle hooks a caller hands to the coordinator.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::bus::EventBus;
use crate::error::{HookError, HookStage, PluginError, PluginResult};
use crate::registry::{PluginEntry, PluginTable};

/// A declared dependency on another plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Name of the plugin depended on.
    pub name: String,
    /// Absent optional dependencies are skipped with a warning.
    #[serde(default)]
    pub optional: bool,
}

impl Dependency {
    /// A dependency that must be present.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }

    /// A dependency that is ordered first when present and ignored otherwise.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
        }
    }
}

/// Registration hook: receives the bus to subscribe listeners.
pub type RegisterHook = Box<dyn Fn(&EventBus) -> Result<(), HookError> + Send + Sync>;

/// Initialize / finalize hook.
pub type LifecycleHook =
    Box<dyn Fn(PluginContext) -> BoxFuture<'static, Result<(), HookError>> + Send + Sync>;

/// Handle given to initialize and finalize hooks.
#[derive(Clone)]
pub struct PluginContext {
    /// The plugin's own table entry.
    entry: Arc<PluginEntry>,
    /// Shared bus.
    bus: Arc<EventBus>,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin", &self.entry.name())
            .finish()
    }
}

impl PluginContext {
    pub(crate) fn new(entry: Arc<PluginEntry>, bus: Arc<EventBus>) -> Self {
        Self { entry, bus }
    }

    /// Name of the plugin this context belongs to.
    pub fn name(&self) -> &str {
        self.entry.name()
    }

    /// The shared event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// All registered plugins.
    pub fn plugins(&self) -> &PluginTable {
        self.bus.plugins()
    }

    /// Publishes this plugin's state for other plugins to read. Allowed once.
    pub fn export<T: Any + Send + Sync>(&self, value: T) -> PluginResult<()> {
        self.entry.set_export(Arc::new(value))
    }

    /// Reads another plugin's exported state.
    pub fn dependency<T: Any + Send + Sync>(&self, name: &str) -> PluginResult<Arc<T>> {
        self.plugins().export::<T>(name)
    }
}

/// Trait form of a plugin, for plugins written as types.
///
/// Every hook has a no-op default. A descriptor built from a `Plugin`
/// always carries all three hooks.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Unique plugin name.
    fn name(&self) -> &str;

    /// Declared dependencies.
    fn depends_on(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Subscribe listeners on the bus.
    fn register(&self, _bus: &EventBus) -> Result<(), HookError> {
        Ok(())
    }

    /// Called once, after every dependency has initialized.
    async fn initialize(&self, _ctx: PluginContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Called once every plugin has initialized, in reverse dependency order.
    async fn finalize(&self, _ctx: PluginContext) -> Result<(), HookError> {
        Ok(())
    }
}

/// Identity, dependencies, and optional hooks of one plugin.
pub struct PluginDescriptor {
    name: String,
    depends_on: Vec<Dependency>,
    register: Option<RegisterHook>,
    initialize: Option<LifecycleHook>,
    finalize: Option<LifecycleHook>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("register", &self.register.as_ref().map(|_| "<hook>"))
            .field("initialize", &self.initialize.as_ref().map(|_| "<hook>"))
            .field("finalize", &self.finalize.as_ref().map(|_| "<hook>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PluginDescriptor {
    /// A descriptor with no dependencies and no hooks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            register: None,
            initialize: None,
            finalize: None,
            timeout: None,
        }
    }

    /// Wraps a [`Plugin`] implementation.
    pub fn from_plugin<P: Plugin>(plugin: Arc<P>) -> Self {
        let reg = plugin.clone();
        let init = plugin.clone();
        let fin = plugin.clone();

        Self::new(plugin.name())
            .with_dependencies(plugin.depends_on())
            .on_register(move |bus| reg.register(bus))
            .on_initialize(move |ctx| {
                let plugin = init.clone();
                async move { plugin.initialize(ctx).await }
            })
            .on_finalize(move |ctx| {
                let plugin = fin.clone();
                async move { plugin.finalize(ctx).await }
            })
    }

    /// Adds a required dependency.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(Dependency::required(name));
        self
    }

    /// Adds an optional dependency.
    pub fn optionally_depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(Dependency::optional(name));
        self
    }

    /// Appends dependencies, keeping declaration order.
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = Dependency>) -> Self {
        self.depends_on.extend(deps);
        self
    }

    /// Sets the registration hook.
    pub fn on_register<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EventBus) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.register = Some(Box::new(hook));
        self
    }

    /// Sets the initialize hook.
    pub fn on_initialize<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.initialize = Some(Box::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Sets the finalize hook.
    pub fn on_finalize<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.finalize = Some(Box::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Bounds the initialize and finalize hooks; exceeding it fails the run.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The plugin's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared dependencies, in declaration order.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.depends_on
    }

    /// Whether an initialize hook is present.
    pub fn has_initialize(&self) -> bool {
        self.initialize.is_some()
    }

    /// Whether a finalize hook is present.
    pub fn has_finalize(&self) -> bool {
        self.finalize.is_some()
    }

    /// Hook timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn run_register(&self, bus: &EventBus) -> PluginResult<()> {
        match &self.register {
            Some(hook) => {
                hook(bus).map_err(|source| PluginError::hook(&self.name, HookStage::Register, source))
            }
            None => Ok(()),
        }
    }

    pub(crate) async fn run_initialize(&self, ctx: PluginContext) -> PluginResult<()> {
        match &self.initialize {
            Some(hook) => self.run_lifecycle(HookStage::Initialize, hook, ctx).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn run_finalize(&self, ctx: PluginContext) -> PluginResult<()> {
        match &self.finalize {
            Some(hook) => self.run_lifecycle(HookStage::Finalize, hook, ctx).await,
            None => Ok(()),
        }
    }

    async fn run_lifecycle(
        &self,
        stage: HookStage,
        hook: &LifecycleHook,
        ctx: PluginContext,
    ) -> PluginResult<()> {
        let fut = hook(ctx);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                PluginError::HookTimedOut {
                    plugin: self.name.clone(),
                    stage,
                    timeout_ms: limit.as_millis(),
                }
            })?,
            None => fut.await,
        };
        result.map_err(|source| PluginError::hook(&self.name, stage, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Metrics;

    #[async_trait]
    impl Plugin for Metrics {
        fn name(&self) -> &str {
            "metrics"
        }

        fn depends_on(&self) -> Vec<Dependency> {
            vec![Dependency::required("config"), Dependency::optional("tracing")]
        }
    }

    #[test]
    fn test_builder_keeps_declaration_order() {
        let desc = PluginDescriptor::new("api")
            .depends_on("config")
            .optionally_depends_on("cache")
            .depends_on("database");

        let names: Vec<&str> = desc.dependencies().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["config", "cache", "database"]);
        assert!(desc.dependencies()[1].optional);
        assert!(!desc.has_initialize());
        assert!(!desc.has_finalize());
    }

    #[test]
    fn test_from_plugin_carries_all_hooks() {
        let desc = PluginDescriptor::from_plugin(Arc::new(Metrics));
        assert_eq!(desc.name(), "metrics");
        assert_eq!(desc.dependencies().len(), 2);
        assert!(desc.has_initialize());
        assert!(desc.has_finalize());
    }

    #[test]
    fn test_dependency_deserializes_with_default_optional() {
        let dep: Dependency = serde_json::from_str(r#"{"name":"config"}"#).expect("deserialize");
        assert_eq!(dep, Dependency::required("config"));
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_error() {
        let table = Arc::new(PluginTable::new());
        let entry = Arc::new(PluginEntry::new("slow", Vec::new()));
        let bus = Arc::new(EventBus::new(table));
        let desc = PluginDescriptor::new("slow")
            .on_initialize(|_ctx| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .with_timeout(Duration::from_millis(10));

        let err = desc
            .run_initialize(PluginContext::new(entry, bus))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::HookTimedOut {
                stage: HookStage::Initialize,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_hook_error_is_wrapped_with_plugin_name() {
        let bus = Arc::new(EventBus::default());
        let entry = Arc::new(PluginEntry::new("db", Vec::new()));
        let desc = PluginDescriptor::new("db").on_finalize(|_ctx| async { Err("disk full".into()) });

        let err = desc
            .run_finalize(PluginContext::new(entry, bus))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "plugin 'db': finalize hook failed: disk full");
    }
}
