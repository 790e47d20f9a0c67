mod config;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use payment_router::config::ValidationError;
use payment_router::errors::GatewayError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "twinpay", about = "Payment gateway with processor failover")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the gateway
    Run(ConfigArgs),
    /// Validate a config file and exit
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid config: {0}")]
    Validation(#[from] ValidationError),
    #[error("could not install metrics exporter: {0}")]
    Metrics(String),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli_main(cli) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn cli_main(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        CliCommand::CheckConfig(args) => {
            load_config(&args)?;
            println!("{}: ok", args.config_path.display());
            Ok(())
        }
        CliCommand::Run(args) => {
            let config = load_config(&args)?;

            let _sentry = init_logging(config.common.logging.as_ref());
            if let Some(metrics_config) = &config.common.metrics {
                init_metrics(metrics_config)?;
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(payment_router::run(config.gateway))?;
            Ok(())
        }
    }
}

fn load_config(args: &ConfigArgs) -> Result<Config, CliError> {
    let config = Config::from_file(&args.config_path)?;
    config.gateway.validate()?;
    Ok(config)
}

/// Installs the fmt subscriber, plus the Sentry layer when a DSN is configured.
/// The returned guard flushes Sentry on drop.
fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = logging.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some("twinpay"))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(payment_router::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Reporting metrics to statsd"
    );
    Ok(())
}
