use anyhow::Result;
use clap::Parser;
use filestate_cli::cli::Cli;
use filestate_cli::LogFormat;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, found) = cli.load_config()?;

    match config.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .init(),
    }

    if !found {
        tracing::warn!("Config file not found, using defaults: {}", cli.config.display());
    }
    tracing::debug!(
        manifest = %config.manifest.display(),
        state = %config.state.display(),
        key_env = %config.key_env,
        "Filestate starting"
    );

    cli.run(&config)
}
