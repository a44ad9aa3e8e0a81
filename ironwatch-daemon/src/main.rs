use anyhow::{Context, Result};
use clap::Parser;

use ironwatch_core::IronwatchConfig;
use ironwatch_daemon::cli::DaemonCli;
use ironwatch_daemon::logging::init_tracing;
use ironwatch_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = IronwatchConfig::load(&cli.config)
        .await
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "ironwatch-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("ironwatch-daemon shut down");
    Ok(())
}
