//! Entry point for the compliance-scanning pipeline daemon.

mod shutdown;

use clap::Parser;
use compliscan_browser::{BrowserPool, Launcher};
use compliscan_core::AppConfig;
use compliscan_events::EventBus;
use compliscan_plugins::plugins::{
    CollectorHttpPlugin, DetectorRulesPlugin, DiscoveryMemoryPlugin, HandlerLogPlugin,
};
use compliscan_plugins::{PluginManager, PluginRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Compliance-scanning pipeline for network-exposed workloads.
#[derive(Parser, Debug)]
#[command(name = "compliscan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            // Tracing isn't initialised yet; this is a startup failure the
            // operator needs on stderr regardless of log configuration.
            eprintln!("failed to load configuration from {:?}: {e}", cli.config);
            std::process::exit(1);
        }
    };

    init_tracing(cli.log_level.as_deref().unwrap_or(config.logging.level.as_tracing_level()));

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let bus = EventBus::new(config.event_bus.buffer_size);
    let browser_pool = BrowserPool::new(config.browser_pool.clone(), Launcher::detect());

    let mut registry = PluginRegistry::new();
    registry.register("discovery.memory", || Arc::new(DiscoveryMemoryPlugin));
    registry.register("detector.rules", || Arc::new(DetectorRulesPlugin));
    registry.register("handler.log", || Arc::new(HandlerLogPlugin));
    {
        let pool = browser_pool.clone();
        registry.register("collector.http", move || {
            Arc::new(CollectorHttpPlugin::new(pool.clone()))
        });
    }

    let manager = PluginManager::new(bus.clone(), config.manager.clone());
    manager.load_plugins(&registry, config.plugins.clone());

    let start_report = manager.start_all().await;
    tracing::info!(
        started = ?start_report.started,
        failed = ?start_report.failed,
        "plugin startup complete"
    );

    shutdown::wait_for_shutdown_signal().await;

    let stop_report = manager.stop_all().await;
    tracing::info!(
        stopped = ?stop_report.stopped,
        failed = ?stop_report.failed,
        "plugin shutdown complete"
    );

    browser_pool.close().await;

    Ok(())
}
