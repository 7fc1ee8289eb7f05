//! Plugin manager. Drives one coordination run through registration,
//! dependency ordering, initialization, and finalization.
//!
//! Phases move strictly forward:
//! `Empty → Registering → Ordering → Initializing → Finalizing → Done`.
//! Any error moves the run to `Failed`, which is terminal. There is no
//! retry and no rollback; plugins that already initialized stay that way.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use liftoff_core::config::plugin::PluginConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::bus::events::{self, CORE_INITIALIZED, CORE_INITIALIZING, CORE_REGISTERED};
use crate::descriptor::{PluginContext, PluginDescriptor};
use crate::error::{PluginError, PluginResult};
use crate::registry::{PluginEntry, PluginStatus, PluginTable};
use crate::resolver::{self, Resolution, SkippedDependency};

/// Coordinator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Nothing has happened yet.
    Empty,
    /// Descriptors are being added and their registration hooks run.
    Registering,
    /// The resolver is ordering the plugin set.
    Ordering,
    /// Initialize hooks run in dependency order.
    Initializing,
    /// Finalize hooks run in reverse dependency order.
    Finalizing,
    /// Every phase completed.
    Done,
    /// A phase failed; the run cannot continue.
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Registering => write!(f, "registering"),
            Self::Ordering => write!(f, "ordering"),
            Self::Initializing => write!(f, "initializing"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupReport {
    /// Identifier of the coordination run.
    pub run_id: Uuid,
    /// Resolved initialization order.
    pub load_order: Vec<String>,
    /// Plugins whose initialize hook ran, in order.
    pub initialized: Vec<String>,
    /// Plugins whose finalize hook ran, in order.
    pub finalized: Vec<String>,
    /// Absent optional dependencies.
    pub skipped: Vec<SkippedDependency>,
    /// When registration started.
    pub started_at: DateTime<Utc>,
    /// When finalization completed.
    pub finished_at: DateTime<Utc>,
}

/// Owns the bus and plugin table for one coordination run.
#[derive(Debug)]
pub struct PluginManager {
    /// Run identifier, attached to every log line.
    run_id: Uuid,
    /// Current phase.
    phase: Phase,
    /// Plugin table shared with the bus.
    plugins: Arc<PluginTable>,
    /// Event bus handed to every hook.
    bus: Arc<EventBus>,
    /// Descriptors in registration order.
    descriptors: Vec<PluginDescriptor>,
    /// Name → index into `descriptors`.
    index: HashMap<String, usize>,
    /// Resolver output.
    resolution: Option<Resolution>,
    /// Plugins whose initialize hook completed.
    initialized: Vec<String>,
    /// Plugins whose finalize hook completed.
    finalized: Vec<String>,
    /// Disabled plugins and the default hook timeout.
    config: PluginConfig,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl PluginManager {
    /// Creates a manager with an empty plugin table and a fresh bus.
    pub fn new() -> Self {
        let plugins = Arc::new(PluginTable::new());
        let bus = Arc::new(EventBus::new(plugins.clone()));

        Self {
            run_id: Uuid::new_v4(),
            phase: Phase::Empty,
            plugins,
            bus,
            descriptors: Vec::new(),
            index: HashMap::new(),
            resolution: None,
            initialized: Vec::new(),
            finalized: Vec::new(),
            config: PluginConfig::default(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Applies the `disabled` list and default hook timeout from configuration.
    pub fn with_config(mut self, config: &PluginConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Runs every phase and returns the startup report.
    pub async fn run<I>(&mut self, descriptors: I) -> PluginResult<StartupReport>
    where
        I: IntoIterator<Item = PluginDescriptor>,
    {
        self.register_all(descriptors)?;
        self.resolve()?;
        self.initialize().await?;
        self.finalize().await?;
        self.report().ok_or_else(|| PluginError::phase(self.phase, Phase::Done))
    }

    /// Registers every descriptor and invokes its registration hook with the bus.
    ///
    /// Names are checked for duplicates before any hook runs. Emits
    /// `core.registered` once all descriptors are in the table.
    pub fn register_all<I>(&mut self, descriptors: I) -> PluginResult<()>
    where
        I: IntoIterator<Item = PluginDescriptor>,
    {
        self.enter(Phase::Empty, Phase::Registering)?;
        self.started_at = Some(Utc::now());

        let result = self.register_inner(descriptors);
        self.check(result)
    }

    /// Orders the registered plugins.
    pub fn resolve(&mut self) -> PluginResult<&Resolution> {
        self.enter(Phase::Registering, Phase::Ordering)?;

        let result = resolver::resolve_load_order(&self.descriptors);
        let resolution = self.check(result)?;

        info!(
            run_id = %self.run_id,
            order = ?resolution.order,
            skipped = resolution.skipped.len(),
            "Plugin load order resolved"
        );
        Ok(self.resolution.insert(resolution))
    }

    /// Runs initialize hooks in dependency order, one at a time.
    pub async fn initialize(&mut self) -> PluginResult<()> {
        self.enter(Phase::Ordering, Phase::Initializing)?;

        let result = self.initialize_inner().await;
        self.check(result)
    }

    /// Runs finalize hooks in reverse dependency order, then emits
    /// `core.initialized`.
    pub async fn finalize(&mut self) -> PluginResult<()> {
        self.enter(Phase::Initializing, Phase::Finalizing)?;

        let result = self.finalize_inner().await;
        self.check(result)?;

        self.phase = Phase::Done;
        self.finished_at = Some(Utc::now());
        info!(
            run_id = %self.run_id,
            plugins = self.descriptors.len(),
            "All plugins initialized"
        );
        Ok(())
    }

    /// The shared event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The plugin table.
    pub fn plugins(&self) -> &Arc<PluginTable> {
        &self.plugins
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run identifier.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Resolver output, once the ordering phase has completed.
    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    /// Startup report, available once the run is `Done`.
    pub fn report(&self) -> Option<StartupReport> {
        if self.phase != Phase::Done {
            return None;
        }
        let resolution = self.resolution.as_ref()?;
        Some(StartupReport {
            run_id: self.run_id,
            load_order: resolution.order.clone(),
            initialized: self.initialized.clone(),
            finalized: self.finalized.clone(),
            skipped: resolution.skipped.clone(),
            started_at: self.started_at?,
            finished_at: self.finished_at?,
        })
    }

    fn register_inner<I>(&mut self, descriptors: I) -> PluginResult<()>
    where
        I: IntoIterator<Item = PluginDescriptor>,
    {
        let mut accepted = Vec::new();
        let mut seen = HashSet::new();
        for desc in descriptors {
            if !seen.insert(desc.name().to_string()) {
                return Err(PluginError::DuplicateName {
                    name: desc.name().to_string(),
                });
            }
            if self.config.is_disabled(desc.name()) {
                info!(run_id = %self.run_id, plugin = %desc.name(), "Plugin disabled by configuration");
                continue;
            }
            accepted.push(desc);
        }

        for mut desc in accepted {
            if let (None, Some(limit)) = (desc.timeout(), self.config.hook_timeout()) {
                desc = desc.with_timeout(limit);
            }

            let entry = self
                .plugins
                .insert(PluginEntry::new(desc.name(), desc.dependencies().to_vec()))?;

            info!(
                run_id = %self.run_id,
                plugin = %desc.name(),
                dependencies = desc.dependencies().len(),
                "Registering plugin"
            );

            if let Err(e) = desc.run_register(&self.bus) {
                entry.set_status(PluginStatus::Failed);
                return Err(e);
            }

            self.index.insert(desc.name().to_string(), self.descriptors.len());
            self.descriptors.push(desc);
        }

        self.bus.emit(CORE_REGISTERED)
    }

    async fn initialize_inner(&mut self) -> PluginResult<()> {
        self.bus.emit(CORE_INITIALIZING)?;

        let order = self
            .resolution
            .as_ref()
            .map(|r| r.order.clone())
            .unwrap_or_default();

        for name in order {
            let desc = &self.descriptors[self.index[&name]];
            let entry = self.entry(&name)?;

            if !desc.has_initialize() {
                debug!(run_id = %self.run_id, plugin = %name, "No initialize hook");
                entry.set_status(PluginStatus::Initialized);
                continue;
            }

            entry.set_status(PluginStatus::Initializing);
            self.bus.emit(&events::plugin_initializing(&name))?;
            info!(run_id = %self.run_id, plugin = %name, "Initializing plugin");

            let ctx = PluginContext::new(entry.clone(), self.bus.clone());
            if let Err(e) = desc.run_initialize(ctx).await {
                entry.set_status(PluginStatus::Failed);
                return Err(e);
            }

            entry.set_status(PluginStatus::Initialized);
            self.initialized.push(name.clone());
            self.bus.emit(&events::plugin_initialized(&name))?;
            info!(run_id = %self.run_id, plugin = %name, "Plugin initialized");
        }

        Ok(())
    }

    async fn finalize_inner(&mut self) -> PluginResult<()> {
        let order = self
            .resolution
            .as_ref()
            .map(Resolution::finalize_order)
            .unwrap_or_default();

        for name in order {
            let desc = &self.descriptors[self.index[&name]];
            let entry = self.entry(&name)?;

            if desc.has_finalize() {
                info!(run_id = %self.run_id, plugin = %name, "Finalizing plugin");
                let ctx = PluginContext::new(entry.clone(), self.bus.clone());
                if let Err(e) = desc.run_finalize(ctx).await {
                    entry.set_status(PluginStatus::Failed);
                    return Err(e);
                }
                self.finalized.push(name.clone());
            }
            entry.set_status(PluginStatus::Finalized);
        }

        self.bus.emit(CORE_INITIALIZED)
    }

    fn entry(&self, name: &str) -> PluginResult<Arc<PluginEntry>> {
        self.plugins.get(name).ok_or_else(|| PluginError::PluginNotFound {
            name: name.to_string(),
        })
    }

    fn enter(&mut self, expected: Phase, next: Phase) -> PluginResult<()> {
        if self.phase != expected {
            return Err(PluginError::phase(self.phase, next));
        }
        debug!(run_id = %self.run_id, from = %self.phase, to = %next, "Entering phase");
        self.phase = next;
        Ok(())
    }

    /// Moves the run to `Failed` if `result` is an error.
    fn check<T>(&mut self, result: PluginResult<T>) -> PluginResult<T> {
        if let Err(e) = &result {
            error!(run_id = %self.run_id, phase = %self.phase, error = %e, "Plugin startup failed");
            self.phase = Phase::Failed;
        }
        result
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn tracked(name: &str, log: &Log) -> PluginDescriptor {
        let init_log = log.clone();
        let fin_log = log.clone();
        PluginDescriptor::new(name)
            .on_initialize(move |ctx| {
                let log = init_log.clone();
                async move {
                    log.lock().unwrap().push(format!("init:{}", ctx.name()));
                    Ok(())
                }
            })
            .on_finalize(move |ctx| {
                let log = fin_log.clone();
                async move {
                    log.lock().unwrap().push(format!("fin:{}", ctx.name()));
                    Ok(())
                }
            })
    }

    #[tokio::test]
    async fn test_phases_must_run_in_order() {
        let mut manager = PluginManager::new();
        let err = manager.initialize().await.unwrap_err();
        assert!(matches!(err, PluginError::PhaseViolation { .. }));
        assert_eq!(manager.phase(), Phase::Empty);

        manager.register_all(Vec::new()).unwrap();
        assert!(manager.finalize().await.is_err());
        manager.resolve().unwrap();
        assert!(manager.register_all(Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_failure_is_terminal() {
        let mut manager = PluginManager::new();
        let err = manager
            .run(vec![PluginDescriptor::new("a").depends_on("missing")])
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::MissingDependency { .. }));
        assert_eq!(manager.phase(), Phase::Failed);
        assert!(manager.report().is_none());
        assert!(matches!(
            manager.initialize().await,
            Err(PluginError::PhaseViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_hookless_plugins_emit_no_plugin_events() {
        let mut manager = PluginManager::new();
        let report = manager.run(vec![PluginDescriptor::new("quiet")]).await.unwrap();

        assert_eq!(report.load_order, vec!["quiet"]);
        assert!(report.initialized.is_empty());
        assert!(!manager.bus().is_fired("plugin.quiet.initializing"));
        assert_eq!(
            manager.bus().fired_events(),
            vec![CORE_REGISTERED, CORE_INITIALIZING, CORE_INITIALIZED]
        );
        assert_eq!(
            manager.plugins().status("quiet"),
            Some(PluginStatus::Finalized)
        );
    }

    #[tokio::test]
    async fn test_disabled_plugins_are_not_registered() {
        let log = Log::default();
        let config = PluginConfig {
            disabled: vec!["metrics".into()],
            hook_timeout_seconds: 0,
        };
        let mut manager = PluginManager::new().with_config(&config);
        let report = manager
            .run(vec![
                tracked("metrics", &log),
                tracked("api", &log).optionally_depends_on("metrics"),
            ])
            .await
            .unwrap();

        assert_eq!(report.load_order, vec!["api"]);
        assert_eq!(report.skipped.len(), 1);
        assert!(!manager.plugins().contains("metrics"));
        assert_eq!(log.lock().unwrap().clone(), vec!["init:api", "fin:api"]);
    }

    #[tokio::test]
    async fn test_disabled_duplicates_are_still_rejected() {
        let log = Log::default();
        let config = PluginConfig {
            disabled: vec!["metrics".into()],
            hook_timeout_seconds: 0,
        };
        let mut manager = PluginManager::new().with_config(&config);
        let err = manager
            .register_all(vec![
                tracked("metrics", &log),
                tracked("api", &log),
                tracked("metrics", &log),
            ])
            .unwrap_err();

        assert!(matches!(err, PluginError::DuplicateName { ref name } if name == "metrics"));
        assert!(manager.plugins().is_empty());
        assert_eq!(manager.phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn test_initialize_failure_marks_plugin_failed() {
        let log = Log::default();
        let mut manager = PluginManager::new();
        let err = manager
            .run(vec![
                tracked("config", &log),
                PluginDescriptor::new("db")
                    .depends_on("config")
                    .on_initialize(|_ctx| async { Err("connection refused".into()) }),
                tracked("api", &log).depends_on("db"),
            ])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("connection refused"));
        assert_eq!(manager.plugins().status("config"), Some(PluginStatus::Initialized));
        assert_eq!(manager.plugins().status("db"), Some(PluginStatus::Failed));
        assert_eq!(manager.plugins().status("api"), Some(PluginStatus::Registered));
        assert_eq!(log.lock().unwrap().clone(), vec!["init:config"]);
        assert!(!manager.bus().is_fired(CORE_INITIALIZED));
    }

    #[tokio::test]
    async fn test_finalize_error_does_not_roll_back() {
        let log = Log::default();
        let mut manager = PluginManager::new();
        let err = manager
            .run(vec![
                tracked("config", &log),
                PluginDescriptor::new("db")
                    .depends_on("config")
                    .on_finalize(|_ctx| async { Err("flush failed".into()) }),
                tracked("api", &log).depends_on("db"),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::Hook { ref plugin, .. } if plugin == "db"));
        assert_eq!(manager.plugins().status("api"), Some(PluginStatus::Finalized));
        assert_eq!(manager.plugins().status("db"), Some(PluginStatus::Failed));
        assert_eq!(
            log.lock().unwrap().clone(),
            vec!["init:config", "init:api", "fin:api"]
        );
    }

    #[tokio::test]
    async fn test_register_hook_error_stops_registration() {
        let mut manager = PluginManager::new();
        let err = manager
            .register_all(vec![
                PluginDescriptor::new("broken").on_register(|_bus| Err("bad manifest".into())),
                PluginDescriptor::new("later"),
            ])
            .unwrap_err();

        assert!(err.to_string().contains("register hook failed"));
        assert!(!manager.plugins().contains("later"));
        assert!(!manager.bus().is_fired(CORE_REGISTERED));
        assert_eq!(manager.phase(), Phase::Failed);
    }
}
