//! `ironwatch alerts` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use ironwatch_core::types::Severity;
use ironwatch_storage::{AlertFilter, AlertRecord, Storage};

use crate::cli::{AlertListArgs, AlertsAction, AlertsArgs};
use crate::commands::{load_config, open_storage};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, rfc3339, truncate};

/// Execute the `alerts` command.
pub async fn execute(
    args: AlertsArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let storage = open_storage(&config, false)?;

    match args.action {
        AlertsAction::List(list) => writer.render(&build_alert_list(&storage, &list)?),
        AlertsAction::Resolve { id } => writer.render(&resolve(&storage, id)?),
    }
}

/// Translate command-line flags into a storage filter.
pub fn alert_filter(args: &AlertListArgs) -> Result<AlertFilter, CliError> {
    let severity = args
        .severity
        .as_deref()
        .map(|s| {
            Severity::from_str_loose(s)
                .ok_or_else(|| CliError::Command(format!("unknown severity '{s}'")))
        })
        .transpose()?;
    let resolved = match (args.resolved, args.unresolved) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };

    Ok(AlertFilter {
        severity,
        resolved,
        host_id: args.host,
        limit: args.limit,
        offset: args.offset,
    })
}

pub fn build_alert_list(
    storage: &Storage,
    args: &AlertListArgs,
) -> Result<AlertListReport, CliError> {
    let alerts: Vec<AlertRow> = storage
        .query_alerts(&alert_filter(args)?)?
        .into_iter()
        .map(AlertRow::from)
        .collect();
    Ok(AlertListReport {
        total: alerts.len(),
        alerts,
    })
}

pub fn resolve(storage: &Storage, id: i64) -> Result<ResolveReport, CliError> {
    if !storage.resolve_alert(id)? {
        return Err(CliError::Command(format!("alert {id} not found")));
    }
    Ok(ResolveReport { id, resolved: true })
}

#[derive(Debug, Serialize)]
pub struct AlertListReport {
    pub total: usize,
    pub alerts: Vec<AlertRow>,
}

#[derive(Debug, Serialize)]
pub struct AlertRow {
    pub id: i64,
    pub created_at: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub hostname: Option<String>,
    pub host_id: i64,
    pub log_entry_id: i64,
    pub rule_id: Option<i64>,
    pub resolved: bool,
    pub metadata: serde_json::Value,
}

impl From<AlertRecord> for AlertRow {
    fn from(a: AlertRecord) -> Self {
        Self {
            id: a.id,
            created_at: rfc3339(a.created_at),
            severity: a.severity.as_str().to_owned(),
            title: a.title,
            description: a.description,
            hostname: a.hostname,
            host_id: a.host_id,
            log_entry_id: a.log_entry_id,
            rule_id: a.rule_id,
            resolved: a.resolved,
            metadata: a.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResolveReport {
    pub id: i64,
    pub resolved: bool,
}

impl Render for AlertListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Alerts ({} shown):", self.total.to_string().bold())?;
        if self.alerts.is_empty() {
            return Ok(());
        }
        writeln!(
            w,
            "{:<6} {:<20} {:<9} {:<20} {:<9} Title",
            "ID", "Created", "Severity", "Host", "State"
        )?;
        writeln!(w, "{}", "-".repeat(100))?;
        for a in &self.alerts {
            let severity = match a.severity.as_str() {
                "critical" | "high" => a.severity.red().bold(),
                "medium" => a.severity.yellow(),
                _ => a.severity.normal(),
            };
            let state = if a.resolved {
                "resolved".dimmed()
            } else {
                "open".normal()
            };
            writeln!(
                w,
                "{:<6} {:<20} {:<9} {:<20} {:<9} {}",
                a.id,
                a.created_at,
                severity,
                truncate(a.hostname.as_deref().unwrap_or("-"), 20),
                state,
                truncate(&a.title, 48)
            )?;
        }
        Ok(())
    }
}

impl Render for ResolveReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Alert {} resolved", self.id)
    }
}
