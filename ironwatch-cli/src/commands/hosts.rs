//! `ironwatch hosts` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use ironwatch_storage::{HostSummary, Storage};

use crate::commands::{load_config, open_storage};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, rfc3339};

/// Execute the `hosts` command.
pub async fn execute(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let storage = open_storage(&config, false)?;
    writer.render(&build_host_list(&storage)?)?;
    Ok(())
}

pub fn build_host_list(storage: &Storage) -> Result<HostListReport, CliError> {
    let hosts: Vec<HostRow> = storage.list_hosts()?.into_iter().map(HostRow::from).collect();
    Ok(HostListReport {
        total: hosts.len(),
        hosts,
    })
}

#[derive(Debug, Serialize)]
pub struct HostListReport {
    pub total: usize,
    pub hosts: Vec<HostRow>,
}

#[derive(Debug, Serialize)]
pub struct HostRow {
    pub id: i64,
    pub hostname: String,
    pub ip_address: String,
    pub kind: String,
    pub first_seen: String,
    pub last_seen: String,
    pub log_count: u64,
    pub alert_count: u64,
    pub unresolved_alerts: u64,
}

impl From<HostSummary> for HostRow {
    fn from(h: HostSummary) -> Self {
        Self {
            id: h.id,
            hostname: h.hostname,
            ip_address: h.ip_address,
            kind: h.kind.as_str().to_owned(),
            first_seen: rfc3339(h.first_seen),
            last_seen: rfc3339(h.last_seen),
            log_count: h.log_count,
            alert_count: h.alert_count,
            unresolved_alerts: h.unresolved_alerts,
        }
    }
}

impl Render for HostListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Hosts ({} total):", self.total.to_string().bold())?;
        if self.hosts.is_empty() {
            return Ok(());
        }
        writeln!(
            w,
            "{:<6} {:<24} {:<16} {:<8} {:>8} {:>8} Last seen",
            "ID", "Hostname", "IP", "Kind", "Logs", "Alerts"
        )?;
        writeln!(w, "{}", "-".repeat(100))?;
        for h in &self.hosts {
            let alerts = if h.unresolved_alerts > 0 {
                format!("{}/{}", h.unresolved_alerts, h.alert_count).red()
            } else {
                h.alert_count.to_string().normal()
            };
            writeln!(
                w,
                "{:<6} {:<24} {:<16} {:<8} {:>8} {:>8} {}",
                h.id, h.hostname, h.ip_address, h.kind, h.log_count, alerts, h.last_seen
            )?;
        }
        Ok(())
    }
}
