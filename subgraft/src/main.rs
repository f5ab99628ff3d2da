mod config;

use clap::{Args, Parser};
use config::{Config, ConfigError, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(version, about = "Merges subscription feeds into a Clash template")]
enum CliCommand {
    /// Run the conversion server
    Run(RunArgs),
    /// Validate a config file and exit
    CheckConfig(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, default_value = "subgraft.yaml")]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] converter::config::ValidationError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error(transparent)]
    Converter(#[from] converter::errors::ConverterError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    let result = match cli {
        CliCommand::Run(args) => run(&args),
        CliCommand::CheckConfig(args) => check_config(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "exiting");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn check_config(args: &RunArgs) -> Result<(), CliError> {
    let config = Config::from_file(&args.config)?;
    config.converter.validate()?;
    println!("{}: ok", args.config.display());
    Ok(())
}

fn run(args: &RunArgs) -> Result<(), CliError> {
    let config = Config::from_file(&args.config)?;

    // Held for the life of the process; dropping it flushes pending events.
    let sentry_guard = config.sentry_dsn().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    init_logging(sentry_guard.is_some());

    if let Some(metrics) = &config.common.metrics {
        init_metrics(metrics)?;
    }

    tracing::info!(config = %args.config.display(), "starting subgraft");
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(converter::run(config.converter))?;
    Ok(())
}

fn init_logging(with_sentry: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let sentry_layer = with_sentry.then(sentry::integrations::tracing::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some("subgraft"))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(converter::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = config.statsd_host.as_str(),
        port = config.statsd_port,
        "reporting metrics to statsd"
    );
    Ok(())
}
