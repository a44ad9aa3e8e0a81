//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Ironwatch -- log collection and detection, operator commands.
///
/// Use `ironwatch <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "ironwatch", version, about, long_about = None)]
pub struct Cli {
    /// Path to the ironwatch.toml configuration file.
    #[arg(short, long, global = true, default_value = "/etc/ironwatch/ironwatch.toml")]
    pub config: PathBuf,

    /// Log level for CLI diagnostics on stderr (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show daemon and module status from the status snapshot.
    Status,

    /// List known hosts with log and alert counts.
    Hosts,

    /// List or resolve alerts.
    Alerts(AlertsArgs),

    /// Query stored log entries.
    Logs(LogsArgs),

    /// Manage detection rules.
    Rules(RulesArgs),

    /// Manage configuration.
    Config(ConfigArgs),

    /// Re-dispatch records from an overflow NDJSON file into storage.
    Replay(ReplayArgs),
}

// ---- alerts ----

#[derive(Args, Debug)]
pub struct AlertsArgs {
    #[command(subcommand)]
    pub action: AlertsAction,
}

#[derive(Subcommand, Debug)]
pub enum AlertsAction {
    /// List alerts, newest first.
    List(AlertListArgs),
    /// Mark an alert as resolved.
    Resolve {
        /// Alert id.
        id: i64,
    },
}

#[derive(Args, Debug, Default)]
pub struct AlertListArgs {
    /// Only this severity (info, low, medium, high, critical).
    #[arg(long)]
    pub severity: Option<String>,

    /// Only resolved alerts.
    #[arg(long, conflicts_with = "unresolved")]
    pub resolved: bool,

    /// Only unresolved alerts.
    #[arg(long)]
    pub unresolved: bool,

    /// Only alerts for this host id.
    #[arg(long)]
    pub host: Option<i64>,

    /// Maximum number of rows.
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Rows to skip.
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

// ---- logs ----

#[derive(Args, Debug, Default)]
pub struct LogsArgs {
    /// Only this kind (linux, nginx, windows, unknown).
    #[arg(long)]
    pub kind: Option<String>,

    /// Only entries for this host id.
    #[arg(long)]
    pub host: Option<i64>,

    /// Received at or after (RFC 3339).
    #[arg(long)]
    pub since: Option<String>,

    /// Received at or before (RFC 3339).
    #[arg(long)]
    pub until: Option<String>,

    /// Maximum number of rows.
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Rows to skip.
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

// ---- rules ----

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List rules stored in the rule table.
    List,
    /// Import every YAML rule in a directory (upsert by name).
    Import {
        /// Directory containing YAML rule files.
        dir: PathBuf,
    },
    /// Validate rule files without importing them.
    Validate {
        /// Directory containing YAML rule files.
        dir: PathBuf,
    },
    /// Enable a rule.
    Enable {
        /// Rule id.
        id: i64,
    },
    /// Disable a rule.
    Disable {
        /// Rule id.
        id: i64,
    },
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, listener, batch, storage, detection, extraction, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}

// ---- replay ----

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Overflow NDJSON file to replay.
    pub file: PathBuf,
}
