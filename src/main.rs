//! Hercules GW - Rust implementation
//!
//! Gateway from Hercules DJ Console hardware to application controls.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hercules_gw::config::{watcher::ConfigWatcher, AppConfig, DriverKind};
use hercules_gw::paths::AppPaths;
use hercules_gw::session::manager::SessionManager;
use hercules_gw::sink::ConsoleSink;
use hercules_gw::sniffer;

/// Hercules GW - Hercules DJ Console jog, pitch and mixer decoding
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: ./config.yaml, then the user config dir)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Override the configured device driver
    #[arg(short, long, value_enum)]
    driver: Option<DriverKind>,

    /// Print raw console events instead of running sessions
    #[arg(long)]
    sniff: bool,

    /// List detected consoles and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn apply_overrides(&self, mut config: AppConfig) -> AppConfig {
        if let Some(driver) = self.driver {
            config.device.driver = driver;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting Hercules GW...");

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => {
            let paths = AppPaths::detect();
            paths.ensure_config().await?;
            paths.config.to_string_lossy().into_owned()
        }
    };
    info!("Configuration file: {}", config_path);

    // Load configuration with hot-reload watcher
    let (config_watcher, initial_config) = ConfigWatcher::new(config_path).await?;
    let config = args.apply_overrides(initial_config);

    if args.list_devices {
        return sniffer::list_devices(&config.device).await;
    }

    if args.sniff {
        return sniffer::run_sniffer(&config.device).await;
    }

    info!("Configuration loaded successfully with hot-reload enabled");
    run_app(&args, config, config_watcher, shutdown_signal()).await?;

    info!("Hercules GW shutdown complete");
    Ok(())
}

async fn run_app(
    args: &Args,
    config: AppConfig,
    mut config_watcher: ConfigWatcher,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    info!("Starting main application loop (driver: {})...", config.device.driver);

    let mut rescan = tokio::time::interval(Duration::from_millis(
        config.session.rescan_interval_ms.max(1),
    ));
    let mut manager = SessionManager::new(config, Arc::new(ConsoleSink::new("console")));

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = rescan.tick() => {
                if let Err(e) = manager.scan().await {
                    warn!("⚠️ Device scan failed: {:#}", e);
                }
            }

            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, reloading...");
                let new_config = args.apply_overrides(new_config);

                let interval = Duration::from_millis(new_config.session.rescan_interval_ms.max(1));
                if interval != rescan.period() {
                    rescan = tokio::time::interval(interval);
                }

                manager.update_config(new_config).await;
                info!("✅ Configuration applied");
            }

            _ = &mut shutdown => {
                info!("Shutting down...");
                break;
            }
        }
    }

    manager.shutdown_all().await;
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
