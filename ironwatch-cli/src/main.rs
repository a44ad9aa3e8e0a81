use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ironwatch_cli::cli::Cli;
use ironwatch_cli::commands;
use ironwatch_cli::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout carries command output only.
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let writer = OutputWriter::new(cli.output);
    match commands::run(cli.command, &cli.config, &writer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
