use anyhow::Result;
use clap::Parser;
use kubecap_mgmt::cli::Cli;
use kubecap_mgmt::{AppConfig, LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Plain => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.needs_config() {
        Some(AppConfig::from_file(&cli.config)?)
    } else {
        None
    };
    init_tracing(config.as_ref().map(|c| &c.logging).unwrap_or(&LoggingConfig::default()));

    tracing::debug!(config = %cli.config.display(), "kcap starting");
    cli.run(config).await
}
