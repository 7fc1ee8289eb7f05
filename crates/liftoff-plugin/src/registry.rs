//! Plugin table: registered plugins, their lifecycle status, and the
//! state they export to each other.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::Dependency;
use crate::error::{PluginError, PluginResult};

/// Where a plugin is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    /// Added to the table; registration hook has run.
    Registered,
    /// Initialize hook is running.
    Initializing,
    /// Initialize hook completed (or there was none).
    Initialized,
    /// Finalize hook completed (or there was none).
    Finalized,
    /// A hook of this plugin failed.
    Failed,
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered => write!(f, "registered"),
            Self::Initializing => write!(f, "initializing"),
            Self::Initialized => write!(f, "initialized"),
            Self::Finalized => write!(f, "finalized"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Read-only summary of a registered plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name.
    pub name: String,
    /// Declared dependencies.
    pub dependencies: Vec<Dependency>,
    /// Current lifecycle status.
    pub status: PluginStatus,
    /// Whether the plugin has exported state.
    pub exported: bool,
}

/// One row of the plugin table.
pub struct PluginEntry {
    name: String,
    dependencies: Vec<Dependency>,
    status: Mutex<PluginStatus>,
    export: OnceLock<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("status", &self.status())
            .field("exported", &self.export.get().is_some())
            .finish()
    }
}

impl PluginEntry {
    /// Creates an entry in the `Registered` state.
    pub fn new(name: impl Into<String>, dependencies: Vec<Dependency>) -> Self {
        Self {
            name: name.into(),
            dependencies,
            status: Mutex::new(PluginStatus::Registered),
            export: OnceLock::new(),
        }
    }

    /// Plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared dependencies.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Current lifecycle status.
    pub fn status(&self) -> PluginStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_status(&self, status: PluginStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub(crate) fn set_export(&self, value: Arc<dyn Any + Send + Sync>) -> PluginResult<()> {
        self.export
            .set(value)
            .map_err(|_| PluginError::ExportAlreadySet {
                name: self.name.clone(),
            })?;
        debug!(plugin = %self.name, "Plugin exported state");
        Ok(())
    }

    /// Exported state, downcast to `T`.
    pub fn export<T: Any + Send + Sync>(&self) -> PluginResult<Arc<T>> {
        let value = self.export.get().ok_or_else(|| PluginError::ExportMissing {
            name: self.name.clone(),
        })?;
        value
            .clone()
            .downcast::<T>()
            .map_err(|_| PluginError::ExportTypeMismatch {
                name: self.name.clone(),
                expected: type_name::<T>(),
            })
    }

    /// Snapshot of this entry.
    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name.clone(),
            dependencies: self.dependencies.clone(),
            status: self.status(),
            exported: self.export.get().is_some(),
        }
    }
}

/// Mapping from plugin name to entry.
#[derive(Debug, Default)]
pub struct PluginTable {
    entries: DashMap<String, Arc<PluginEntry>>,
}

impl PluginTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Adds an entry. Names are unique.
    pub fn insert(&self, entry: PluginEntry) -> PluginResult<Arc<PluginEntry>> {
        let entry = Arc::new(entry);
        match self.entries.entry(entry.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(PluginError::DuplicateName {
                name: entry.name.clone(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                Ok(entry)
            }
        }
    }

    /// Looks up an entry.
    pub fn get(&self, name: &str) -> Option<Arc<PluginEntry>> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    /// Whether a plugin with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Lifecycle status of a plugin.
    pub fn status(&self, name: &str) -> Option<PluginStatus> {
        self.get(name).map(|e| e.status())
    }

    /// Snapshots of every entry, sorted by name.
    pub fn list(&self) -> Vec<PluginInfo> {
        let mut infos: Vec<PluginInfo> = self.entries.iter().map(|e| e.value().info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Typed accessor for another plugin's exported state.
    pub fn export<T: Any + Send + Sync>(&self, name: &str) -> PluginResult<Arc<T>> {
        self.get(name)
            .ok_or_else(|| PluginError::PluginNotFound {
                name: name.to_string(),
            })?
            .export::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct DbHandle {
        url: String,
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let table = PluginTable::new();
        table.insert(PluginEntry::new("db", Vec::new())).unwrap();
        let err = table.insert(PluginEntry::new("db", Vec::new())).unwrap_err();
        assert!(matches!(err, PluginError::DuplicateName { ref name } if name == "db"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_typed_export_roundtrip() {
        let table = PluginTable::new();
        let entry = table.insert(PluginEntry::new("db", Vec::new())).unwrap();

        assert!(matches!(
            table.export::<DbHandle>("db"),
            Err(PluginError::ExportMissing { .. })
        ));

        entry
            .set_export(Arc::new(DbHandle {
                url: "postgres://localhost".into(),
            }))
            .unwrap();

        let handle = table.export::<DbHandle>("db").unwrap();
        assert_eq!(handle.url, "postgres://localhost");
        assert!(table.list()[0].exported);
    }

    #[test]
    fn test_export_type_mismatch_is_an_error() {
        let table = PluginTable::new();
        let entry = table.insert(PluginEntry::new("db", Vec::new())).unwrap();
        entry.set_export(Arc::new(42_u32)).unwrap();

        let err = table.export::<String>("db").unwrap_err();
        assert!(matches!(err, PluginError::ExportTypeMismatch { .. }));
        assert!(err.to_string().contains("String"));

        assert!(matches!(
            table.export::<u32>("cache"),
            Err(PluginError::PluginNotFound { .. })
        ));
    }

    #[test]
    fn test_export_only_once() {
        let entry = PluginEntry::new("db", Vec::new());
        entry.set_export(Arc::new(1_u8)).unwrap();
        assert!(matches!(
            entry.set_export(Arc::new(2_u8)),
            Err(PluginError::ExportAlreadySet { .. })
        ));
        assert_eq!(*entry.export::<u8>().unwrap(), 1);
    }

    #[test]
    fn test_status_transitions() {
        let table = PluginTable::new();
        let entry = table.insert(PluginEntry::new("api", Vec::new())).unwrap();
        assert_eq!(table.status("api"), Some(PluginStatus::Registered));
        entry.set_status(PluginStatus::Initialized);
        assert_eq!(table.status("api"), Some(PluginStatus::Initialized));
        assert_eq!(table.status("missing"), None);
    }
}
