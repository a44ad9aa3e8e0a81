//! Command handlers -- one module per subcommand

pub mod alerts;
pub mod config;
pub mod hosts;
pub mod logs;
pub mod replay;
pub mod rules;
pub mod status;

use std::path::Path;
use std::time::Duration;

use ironwatch_core::config::IronwatchConfig;
use ironwatch_storage::Storage;

use crate::cli::Commands;
use crate::error::CliError;
use crate::output::OutputWriter;

/// Dispatch a parsed subcommand.
pub async fn run(
    command: Commands,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match command {
        Commands::Status => status::execute(config_path, writer).await,
        Commands::Hosts => hosts::execute(config_path, writer).await,
        Commands::Alerts(args) => alerts::execute(args, config_path, writer).await,
        Commands::Logs(args) => logs::execute(args, config_path, writer).await,
        Commands::Rules(args) => rules::execute(args, config_path, writer).await,
        Commands::Config(args) => config::execute(args, config_path, writer).await,
        Commands::Replay(args) => replay::execute(args, config_path, writer).await,
    }
}

/// Load `ironwatch.toml` with environment overrides and validation.
pub async fn load_config(config_path: &Path) -> Result<IronwatchConfig, CliError> {
    Ok(IronwatchConfig::load(config_path).await?)
}

/// Open the configured database.
///
/// Read-only commands pass `create = false` so a typo in `data_dir` is
/// reported instead of silently creating an empty database.
pub fn open_storage(config: &IronwatchConfig, create: bool) -> Result<Storage, CliError> {
    let path = config.storage_path();
    if !create && !path.exists() {
        return Err(CliError::Storage(format!(
            "database not found: {}",
            path.display()
        )));
    }
    let busy_timeout = Duration::from_millis(config.storage.busy_timeout_ms);
    Ok(Storage::open(&path, busy_timeout)?)
}
