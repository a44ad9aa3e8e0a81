//! `ironwatch replay` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use ironwatch_core::types::LogEntry;
use ironwatch_log_pipeline::{Dispatched, OverflowFile, ParserRouter};
use ironwatch_storage::Storage;

use crate::cli::ReplayArgs;
use crate::commands::{load_config, open_storage};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, truncate};

/// Failures listed individually; the rest are only counted.
const MAX_LISTED_FAILURES: usize = 20;

/// Execute the `replay` command.
pub async fn execute(
    args: ReplayArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let storage = open_storage(&config, true)?;
    let report = replay_file(&storage, &args.file, config.batch.batch_size).await?;
    writer.render(&report)?;
    Ok(())
}

/// Re-dispatch every overflow record and insert the parsed entries.
///
/// Records the dispatcher rejects again are stored as `unknown` entries with
/// the raw text kept, and counted as `unparsed`. Lines that fail to decode
/// and batches the store refuses are counted as failed. The file itself is
/// left untouched.
pub async fn replay_file(
    storage: &Storage,
    path: &Path,
    batch_size: usize,
) -> Result<ReplayReport, CliError> {
    info!(path = %path.display(), "replaying overflow file");

    let lines = OverflowFile::new(path).read_all().await?;
    let router = ParserRouter::with_defaults();
    let mut report = ReplayReport {
        file: path.display().to_string(),
        total: lines.len(),
        replayed: 0,
        unparsed: 0,
        failed: 0,
        failures: Vec::new(),
    };

    let mut entries: Vec<LogEntry> = Vec::with_capacity(lines.len());
    for line in lines {
        let raw = line.record.and_then(|record| record.to_raw_record());
        match raw {
            Ok(raw) => match router.dispatch(&raw) {
                Dispatched::Entry(entry) => entries.push(entry),
                Dispatched::Rejected { entry, reason, .. } => {
                    warn!(line = line.line_no, reason = %reason, "record stored as unknown");
                    report.unparsed += 1;
                    entries.push(entry);
                }
            },
            Err(e) => report.fail(line.line_no, e.to_string()),
        }
    }

    for chunk in entries.chunks(batch_size.max(1)) {
        match storage.insert_entries(chunk) {
            Ok(saved) => report.replayed += saved,
            Err(e) => {
                warn!(error = %e, count = chunk.len(), "replay batch insert failed");
                report.failed += chunk.len();
            }
        }
    }

    info!(
        replayed = report.replayed,
        unparsed = report.unparsed,
        failed = report.failed,
        "overflow replay finished"
    );
    Ok(report)
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub file: String,
    /// Lines in the file
    pub total: usize,
    pub replayed: usize,
    /// Replayed records that no parser accepted, stored as `unknown`
    pub unparsed: usize,
    pub failed: usize,
    pub failures: Vec<ReplayFailure>,
}

impl ReplayReport {
    fn fail(&mut self, line: usize, reason: String) {
        self.failed += 1;
        if self.failures.len() < MAX_LISTED_FAILURES {
            self.failures.push(ReplayFailure { line, reason });
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReplayFailure {
    pub line: usize,
    pub reason: String,
}

impl Render for ReplayReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Overflow Replay: {}", self.file.bold())?;
        writeln!(
            w,
            "  Lines: {}, Replayed: {} ({} as unknown), Failed: {}",
            self.total,
            self.replayed.to_string().green(),
            self.unparsed,
            if self.failed > 0 {
                self.failed.to_string().red()
            } else {
                self.failed.to_string().normal()
            }
        )?;
        for f in &self.failures {
            writeln!(w, "  line {}: {}", f.line, truncate(&f.reason, 100))?;
        }
        Ok(())
    }
}
