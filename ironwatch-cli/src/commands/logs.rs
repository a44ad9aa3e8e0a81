//! `ironwatch logs` command handler

use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use chrono::DateTime;
use serde::Serialize;

use ironwatch_core::types::LogKind;
use ironwatch_storage::{LogFilter, Storage, StoredEntry};

use crate::cli::LogsArgs;
use crate::commands::{load_config, open_storage};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, rfc3339, truncate};

/// Execute the `logs` command.
pub async fn execute(
    args: LogsArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let storage = open_storage(&config, false)?;
    writer.render(&build_log_list(&storage, &args)?)?;
    Ok(())
}

/// Translate command-line flags into a storage filter.
pub fn log_filter(args: &LogsArgs) -> Result<LogFilter, CliError> {
    let kind = args
        .kind
        .as_deref()
        .map(|k| {
            LogKind::from_str_loose(k).ok_or_else(|| CliError::Command(format!("unknown kind '{k}'")))
        })
        .transpose()?;
    let since = args.since.as_deref().map(parse_time).transpose()?;
    let until = args.until.as_deref().map(parse_time).transpose()?;
    if let (Some(since), Some(until)) = (since, until) {
        if since > until {
            return Err(CliError::Command("--since is later than --until".to_owned()));
        }
    }

    Ok(LogFilter {
        kind,
        host_id: args.host,
        since,
        until,
        limit: args.limit,
        offset: args.offset,
    })
}

fn parse_time(value: &str) -> Result<SystemTime, CliError> {
    DateTime::parse_from_rfc3339(value)
        .map(SystemTime::from)
        .map_err(|e| CliError::Command(format!("invalid RFC 3339 time '{value}': {e}")))
}

pub fn build_log_list(storage: &Storage, args: &LogsArgs) -> Result<LogListReport, CliError> {
    let entries: Vec<LogRow> = storage
        .query_logs(&log_filter(args)?)?
        .into_iter()
        .map(LogRow::from)
        .collect();
    Ok(LogListReport {
        total: entries.len(),
        entries,
    })
}

#[derive(Debug, Serialize)]
pub struct LogListReport {
    pub total: usize,
    pub entries: Vec<LogRow>,
}

#[derive(Debug, Serialize)]
pub struct LogRow {
    pub id: i64,
    pub received_at: String,
    pub event_time: String,
    pub host_id: i64,
    pub hostname: String,
    pub kind: String,
    pub source_ip: String,
    pub raw: String,
    pub processed: bool,
    pub extracted: bool,
}

impl From<StoredEntry> for LogRow {
    fn from(e: StoredEntry) -> Self {
        Self {
            id: e.id,
            received_at: rfc3339(e.received_at),
            event_time: rfc3339(e.event_time),
            host_id: e.host_id,
            hostname: e.hostname,
            kind: e.kind.as_str().to_owned(),
            source_ip: e.source_ip,
            raw: e.raw,
            processed: e.processed,
            extracted: e.extracted,
        }
    }
}

impl Render for LogListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Log entries ({} shown):", self.total.to_string().bold())?;
        for e in &self.entries {
            writeln!(
                w,
                "{:<8} {} {:<20} {:<8} {}",
                e.id,
                e.received_at,
                truncate(&e.hostname, 20),
                e.kind,
                truncate(e.raw.trim_end(), 100).dimmed()
            )?;
        }
        Ok(())
    }
}
