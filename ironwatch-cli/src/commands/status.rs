//! `ironwatch status` command handler

use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, warn};

use ironwatch_core::config::IronwatchConfig;
use ironwatch_core::pipeline::HealthStatus;
use ironwatch_core::status::{DaemonStatus, ModuleStatus};
use ironwatch_storage::CountSummary;

use crate::commands::{load_config, open_storage};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// A snapshot older than this is reported as stale.
pub const STALE_AFTER_SECS: u64 = 30;

/// Execute the `status` command.
pub async fn execute(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let report = build_status_report(&config).await?;
    writer.render(&report)?;
    Ok(())
}

/// Collect PID liveness, the last status snapshot and store counts.
///
/// Missing pieces are reported as absent rather than as errors: a stopped
/// daemon still leaves a readable database behind.
pub async fn build_status_report(config: &IronwatchConfig) -> Result<StatusReport, CliError> {
    let pid = read_pid(&config.general.pid_file);
    let daemon_running = pid.is_some_and(is_process_alive);

    let snapshot_path = config.status_path();
    let snapshot = match DaemonStatus::read(&snapshot_path).await {
        Ok(status) => Some(status),
        Err(e) => {
            debug!(path = %snapshot_path.display(), error = %e, "no status snapshot");
            None
        }
    };
    let stale = snapshot
        .as_ref()
        .is_some_and(|s| unix_now().saturating_sub(s.written_at) > STALE_AFTER_SECS);

    let counts = if config.storage_path().exists() {
        Some(open_storage(config, false)?.count_summary()?)
    } else {
        None
    };

    Ok(StatusReport {
        daemon_running,
        pid,
        stale,
        uptime_secs: snapshot.as_ref().map(|s| s.uptime_secs),
        health: snapshot.as_ref().map(|s| s.health.clone()),
        modules: snapshot.map(|s| s.modules).unwrap_or_default(),
        counts,
    })
}

fn read_pid(pid_file: &str) -> Option<u32> {
    if pid_file.is_empty() {
        return None;
    }
    let content = match std::fs::read_to_string(pid_file) {
        Ok(content) => content,
        Err(e) => {
            debug!(pid_file, error = %e, "pid file not readable");
            return None;
        }
    };
    match content.trim().parse::<u32>() {
        Ok(pid) => Some(pid),
        Err(e) => {
            warn!(pid_file, error = %e, "failed to parse pid");
            None
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Check if a process with the given PID is alive.
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use std::io::ErrorKind;

    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) with signal 0 performs only the existence check
    let result = unsafe { libc::kill(pid, 0) };

    if result == 0 {
        true
    } else {
        // Process exists but we can't signal it
        std::io::Error::last_os_error().kind() == ErrorKind::PermissionDenied
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    warn!("process liveness check not supported on this platform");
    false
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub daemon_running: bool,
    pub pid: Option<u32>,
    /// The snapshot was not refreshed recently.
    pub stale: bool,
    pub uptime_secs: Option<u64>,
    pub health: Option<HealthStatus>,
    pub modules: Vec<ModuleStatus>,
    pub counts: Option<CountSummary>,
}

impl Render for StatusReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match (self.daemon_running, self.pid) {
            (true, Some(pid)) => writeln!(
                w,
                "Daemon: {} (pid {pid}, uptime: {})",
                "running".green().bold(),
                self.uptime_secs
                    .map(|s| format!("{s}s"))
                    .unwrap_or_else(|| "unknown".to_owned())
            )?,
            _ => writeln!(w, "Daemon: {}", "not running".red().bold())?,
        }

        if let Some(health) = &self.health {
            let text = health.to_string();
            let colored = if health.is_healthy() {
                text.green()
            } else if health.is_unhealthy() {
                text.red()
            } else {
                text.yellow()
            };
            writeln!(w, "Health: {colored}")?;
        }
        if self.stale {
            writeln!(
                w,
                "{}",
                format!("status snapshot is older than {STALE_AFTER_SECS}s").yellow()
            )?;
        }

        if !self.modules.is_empty() {
            writeln!(w)?;
            writeln!(w, "{:<12} {:<9} Health", "Module", "Running")?;
            writeln!(w, "{}", "-".repeat(60))?;
            for m in &self.modules {
                let running = if m.running { "yes" } else { "no" };
                writeln!(w, "{:<12} {:<9} {}", m.name, running, m.health)?;
                let counters: Vec<String> =
                    m.counters.iter().map(|(k, v)| format!("{k}={v}")).collect();
                if !counters.is_empty() {
                    writeln!(w, "  {}", counters.join(" ").dimmed())?;
                }
            }
        }

        if let Some(c) = &self.counts {
            writeln!(w)?;
            writeln!(w, "Hosts:        {}", c.hosts)?;
            writeln!(w, "Log entries:  {}", c.entries)?;
            writeln!(
                w,
                "Alerts:       {} ({} unresolved)",
                c.alerts, c.unresolved_alerts
            )?;
            writeln!(w, "Rules:        {}", c.rules)?;
            writeln!(w, "Unprocessed:  {}", c.unprocessed)?;
            writeln!(w, "Unextracted:  {}", c.unextracted)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_pid_ignores_empty_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ironwatch.pid");
        assert_eq!(read_pid(""), None);
        assert_eq!(read_pid(path.to_str().unwrap()), None);

        std::fs::write(&path, "not-a-pid").unwrap();
        assert_eq!(read_pid(path.to_str().unwrap()), None);

        std::fs::write(&path, "4242\n").unwrap();
        assert_eq!(read_pid(path.to_str().unwrap()), Some(4242));
    }

    #[cfg(unix)]
    #[test]
    fn current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn render_not_running_without_snapshot() {
        let report = StatusReport {
            daemon_running: false,
            pid: None,
            stale: false,
            uptime_secs: None,
            health: None,
            modules: vec![],
            counts: None,
        };
        let mut out = Vec::new();
        report.render_text(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("not running"));
        assert!(!text.contains("Module"));
    }
}
