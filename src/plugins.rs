//! Bundled service plugins.
//!
//! `config` publishes settings, `database` opens a pool from them, `api`
//! binds a listener once both are up, and `metrics` is an optional extra
//! that `api` reports to when present.

use std::sync::Arc;
use std::time::Duration;

use liftoff_plugin::bus::events;
use liftoff_plugin::prelude::*;

/// Settings published by the `config` plugin.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub listen_addr: String,
}

/// Connection pool published by the `database` plugin.
#[derive(Debug)]
pub struct Pool {
    pub url: String,
    pub size: usize,
}

/// Counter sink published by the `metrics` plugin.
#[derive(Debug, Default)]
pub struct Metrics {
    pub prefix: String,
}

struct ConfigPlugin;

#[async_trait]
impl Plugin for ConfigPlugin {
    fn name(&self) -> &str {
        "config"
    }

    async fn initialize(&self, ctx: PluginContext) -> Result<(), HookError> {
        ctx.export(Settings {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/liftoff".to_string()),
            listen_addr: "0.0.0.0:8080".to_string(),
        })?;
        Ok(())
    }
}

struct DatabasePlugin;

#[async_trait]
impl Plugin for DatabasePlugin {
    fn name(&self) -> &str {
        "database"
    }

    fn depends_on(&self) -> Vec<Dependency> {
        vec![Dependency::required("config")]
    }

    async fn initialize(&self, ctx: PluginContext) -> Result<(), HookError> {
        let settings = ctx.dependency::<Settings>("config")?;
        // Stand-in for connection setup latency.
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.export(Pool {
            url: settings.database_url.clone(),
            size: 8,
        })?;
        tracing::info!(url = %settings.database_url, "Database pool ready");
        Ok(())
    }

    async fn finalize(&self, ctx: PluginContext) -> Result<(), HookError> {
        let pool = ctx.plugins().export::<Pool>(ctx.name())?;
        tracing::debug!(size = pool.size, "Database pool warmed");
        Ok(())
    }
}

/// Descriptor list, in registration order.
pub fn bundled() -> Vec<PluginDescriptor> {
    let metrics = PluginDescriptor::new("metrics").on_initialize(|ctx| async move {
        ctx.export(Metrics {
            prefix: "liftoff".to_string(),
        })?;
        Ok::<_, HookError>(())
    });

    let api = PluginDescriptor::new("api")
        .depends_on("config")
        .depends_on("database")
        .optionally_depends_on("metrics")
        .on_register(|bus| {
            bus.when_all(
                [
                    events::plugin_initialized("database"),
                    events::plugin_initialized("api"),
                ],
                |ctx| {
                    tracing::info!(plugins = ctx.plugins().len(), "Api is serving traffic");
                    Ok(())
                },
            )?;
            Ok(())
        })
        .on_initialize(|ctx| async move {
            let settings = ctx.dependency::<Settings>("config")?;
            let pool = ctx.dependency::<Pool>("database")?;
            match ctx.dependency::<Metrics>("metrics") {
                Ok(metrics) => tracing::info!(prefix = %metrics.prefix, "Reporting metrics"),
                Err(e) => tracing::debug!(error = %e, "Metrics unavailable"),
            }
            tracing::info!(addr = %settings.listen_addr, pool = %pool.url, "Api listening");
            Ok::<_, HookError>(())
        })
        .on_finalize(|ctx| async move {
            ctx.bus().emit("api.ready")?;
            Ok::<_, HookError>(())
        });

    let audit = PluginDescriptor::new("audit").on_register(|bus| {
        bus.when_any([events::CORE_INITIALIZED, "api.ready"], |_ctx| {
            tracing::info!("Audit trail opened");
            Ok(())
        })?;
        Ok(())
    });

    vec![
        api,
        PluginDescriptor::from_plugin(Arc::new(DatabasePlugin)),
        PluginDescriptor::from_plugin(Arc::new(ConfigPlugin)),
        metrics,
        audit,
    ]
}
