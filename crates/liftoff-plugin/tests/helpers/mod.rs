//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use liftoff_plugin::prelude::*;

/// Ordered record of hook invocations, shared between plugins.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    /// Snapshot of everything recorded so far
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Entries starting with `prefix`, with the prefix stripped
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }
}

/// A descriptor whose register, initialize, and finalize hooks all record
/// `register:<name>`, `init:<name>`, and `fin:<name>`.
pub fn recording_plugin(name: &str, recorder: &Recorder) -> PluginDescriptor {
    let reg = recorder.clone();
    let init = recorder.clone();
    let fin = recorder.clone();
    let plugin = name.to_string();

    PluginDescriptor::new(name)
        .on_register(move |_bus| {
            reg.push(format!("register:{plugin}"));
            Ok(())
        })
        .on_initialize(move |ctx| {
            let recorder = init.clone();
            async move {
                recorder.push(format!("init:{}", ctx.name()));
                Ok(())
            }
        })
        .on_finalize(move |ctx| {
            let recorder = fin.clone();
            async move {
                recorder.push(format!("fin:{}", ctx.name()));
                Ok(())
            }
        })
}

/// Settings exported by the `Config` plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub listen_port: u16,
}

/// Pool handle exported by the `Database` plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub url: String,
}

/// The Config → Database → Api trio, registered in reverse order.
pub fn service_stack(recorder: &Recorder) -> Vec<PluginDescriptor> {
    let config_rec = recorder.clone();
    let db_rec = recorder.clone();

    let config = recording_plugin("Config", recorder).on_initialize(move |ctx| {
        let recorder = config_rec.clone();
        async move {
            ctx.export(Settings {
                database_url: "postgres://localhost/app".into(),
                listen_port: 8080,
            })?;
            recorder.push("init:Config");
            Ok::<_, HookError>(())
        }
    });

    let database = recording_plugin("Database", recorder)
        .depends_on("Config")
        .on_initialize(move |ctx| {
            let recorder = db_rec.clone();
            async move {
                let settings = ctx.dependency::<Settings>("Config")?;
                ctx.export(Pool {
                    url: settings.database_url.clone(),
                })?;
                recorder.push("init:Database");
                Ok::<_, HookError>(())
            }
        });

    let api = recording_plugin("Api", recorder)
        .depends_on("Config")
        .depends_on("Database");

    vec![api, database, config]
}
