//! Liftoff: plugin startup coordinator
//!
//! Loads configuration, registers the bundled service plugins, and runs
//! them through registration, ordering, initialization, and finalization.

mod plugins;

use tracing_subscriber::{EnvFilter, fmt};

use liftoff_core::config::AppConfig;
use liftoff_core::error::AppError;
use liftoff_core::result::AppResult;
use liftoff_plugin::PluginManager;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Startup failed: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and the environment
fn load_configuration() -> AppResult<AppConfig> {
    let env = std::env::var("LIFTOFF_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Run the bundled plugins to completion
async fn run(config: AppConfig) -> AppResult<()> {
    tracing::info!("Starting Liftoff v{}", env!("CARGO_PKG_VERSION"));

    let mut manager = PluginManager::new().with_config(&config.plugins);
    tracing::info!(run_id = %manager.run_id(), "Coordinating plugin startup");

    let report = manager.run(plugins::bundled()).await?;

    tracing::info!(
        run_id = %report.run_id,
        order = ?report.load_order,
        skipped = report.skipped.len(),
        elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "Startup complete"
    );

    let summary = serde_json::to_string_pretty(&report)
        .map_err(|e| AppError::internal(format!("Failed to serialize report: {}", e)))?;
    println!("{summary}");

    Ok(())
}
