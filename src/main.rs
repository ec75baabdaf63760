use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use service_envelope::config::validation::validate_config;
use service_envelope::config::{load_config, ConfigError, ServiceConfig};
use service_envelope::observability::{logging, metrics};
use service_envelope::{HttpTransport, LifecycleManager};

#[derive(Parser)]
#[command(name = "service-envelope")]
#[command(about = "HTTP service with graceful lifecycle and JSON envelopes", long_about = None)]
struct Cli {
    /// TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override `observability.log_level`.
    #[arg(short, long)]
    log_level: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<ServiceConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = %config.version.number,
        bind_address = %config.listener.bind_address,
        grace_period_secs = config.shutdown.grace_period_secs,
        "service-envelope starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let transport = Arc::new(HttpTransport::from_config(&config));
    let manager = LifecycleManager::from_config(transport, &config.shutdown);
    let result = manager.run().await;

    if let Some(report) = manager.report() {
        tracing::info!(
            reason = report.reason.as_str(),
            outcome = report.outcome.as_str(),
            "Shutdown complete"
        );
    }
    result?;
    Ok(())
}
