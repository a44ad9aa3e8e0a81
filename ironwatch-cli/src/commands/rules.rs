//! `ironwatch rules` command handler

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use ironwatch_log_pipeline::rule::RuleLoader;
use ironwatch_storage::{RuleRecord, Storage};

use crate::cli::{RulesAction, RulesArgs};
use crate::commands::{load_config, open_storage};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, rfc3339, truncate};

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        RulesAction::Validate { dir } => {
            let report = validate_directory(&dir).await?;
            writer.render(&report)?;
            if report.invalid > 0 {
                return Err(CliError::Rule(format!("{} invalid rule files", report.invalid)));
            }
            Ok(())
        }
        RulesAction::List => {
            let config = load_config(config_path).await?;
            let storage = open_storage(&config, false)?;
            writer.render(&build_rule_list(&storage)?)
        }
        RulesAction::Import { dir } => {
            let config = load_config(config_path).await?;
            let storage = open_storage(&config, true)?;
            writer.render(&import(&storage, &dir).await?)
        }
        RulesAction::Enable { id } => {
            let config = load_config(config_path).await?;
            let storage = open_storage(&config, false)?;
            writer.render(&set_enabled(&storage, id, true)?)
        }
        RulesAction::Disable { id } => {
            let config = load_config(config_path).await?;
            let storage = open_storage(&config, false)?;
            writer.render(&set_enabled(&storage, id, false)?)
        }
    }
}

pub fn build_rule_list(storage: &Storage) -> Result<RuleListReport, CliError> {
    let rules: Vec<RuleEntry> = storage.list_rules()?.into_iter().map(RuleEntry::from).collect();
    Ok(RuleListReport {
        total: rules.len(),
        rules,
    })
}

/// Parse every rule file in `dir` and report per-file problems.
///
/// A name that already appeared in an earlier file counts as invalid: the
/// import would silently skip it.
pub async fn validate_directory(dir: &Path) -> Result<RuleValidationReport, CliError> {
    info!(dir = %dir.display(), "validating detection rules");

    let reports = RuleLoader::scan_directory(dir).await?;
    let mut seen = HashSet::new();
    let mut errors = Vec::new();
    for report in &reports {
        let file = report.path.display().to_string();
        match &report.result {
            Ok(rule) if !seen.insert(rule.name.clone()) => errors.push(RuleError {
                file,
                error: format!("duplicate rule name '{}'", rule.name),
            }),
            Ok(_) => {}
            Err(e) => errors.push(RuleError {
                file,
                error: e.to_string(),
            }),
        }
    }

    Ok(RuleValidationReport {
        path: dir.display().to_string(),
        total_files: reports.len(),
        valid: reports.len() - errors.len(),
        invalid: errors.len(),
        errors,
    })
}

/// Upsert every valid rule file into the rule table.
pub async fn import(storage: &Storage, dir: &Path) -> Result<RuleImportReport, CliError> {
    let validation = validate_directory(dir).await?;
    let summary = RuleLoader::import_directory(storage, dir).await?;
    Ok(RuleImportReport {
        path: dir.display().to_string(),
        imported: summary.imported,
        failed: summary.failed,
        skipped: validation.errors,
    })
}

pub fn set_enabled(storage: &Storage, id: i64, enabled: bool) -> Result<RuleToggleReport, CliError> {
    if !storage.set_rule_enabled(id, enabled)? {
        return Err(CliError::Rule(format!("rule {id} not found")));
    }
    Ok(RuleToggleReport { id, enabled })
}

#[derive(Debug, Serialize)]
pub struct RuleListReport {
    pub total: usize,
    pub rules: Vec<RuleEntry>,
}

#[derive(Debug, Serialize)]
pub struct RuleEntry {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Log kind the rule applies to, `any` for every kind.
    pub source_kind: String,
    pub severity: String,
    pub enabled: bool,
    pub updated_at: String,
}

impl From<RuleRecord> for RuleEntry {
    fn from(r: RuleRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            source_kind: r
                .source_kind
                .map_or_else(|| "any".to_owned(), |k| k.as_str().to_owned()),
            severity: r.severity.as_str().to_owned(),
            enabled: r.enabled,
            updated_at: rfc3339(r.updated_at),
        }
    }
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Detection Rules ({} total):", self.total.to_string().bold())?;
        writeln!(
            w,
            "{:<6} {:<30} {:<9} {:<8} {:<9} Description",
            "ID", "Name", "Severity", "Kind", "Status"
        )?;
        writeln!(w, "{}", "-".repeat(90))?;

        for r in &self.rules {
            let status = if r.enabled {
                "enabled".green()
            } else {
                "disabled".yellow()
            };
            writeln!(
                w,
                "{:<6} {:<30} {:<9} {:<8} {:<9} {}",
                r.id,
                truncate(&r.name, 30),
                r.severity,
                r.source_kind,
                status,
                truncate(&r.description, 40)
            )?;
        }

        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RuleValidationReport {
    pub path: String,
    pub total_files: usize,
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<RuleError>,
}

#[derive(Debug, Serialize)]
pub struct RuleError {
    pub file: String,
    pub error: String,
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Validation: {}", self.path.bold())?;
        writeln!(w, "  Total files: {}", self.total_files)?;
        writeln!(
            w,
            "  Valid: {}, Invalid: {}",
            self.valid.to_string().green(),
            if self.invalid > 0 {
                self.invalid.to_string().red()
            } else {
                self.invalid.to_string().normal()
            }
        )?;

        if !self.errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "  Errors:")?;
            for e in &self.errors {
                writeln!(w, "  {}: {}", e.file.red(), e.error)?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RuleImportReport {
    pub path: String,
    pub imported: usize,
    pub failed: usize,
    /// Files left out of the import.
    pub skipped: Vec<RuleError>,
}

impl Render for RuleImportReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Import: {}", self.path.bold())?;
        writeln!(
            w,
            "  Imported: {}, Failed: {}, Skipped files: {}",
            self.imported.to_string().green(),
            self.failed,
            self.skipped.len()
        )?;
        for e in &self.skipped {
            writeln!(w, "  {}: {}", e.file.yellow(), e.error)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RuleToggleReport {
    pub id: i64,
    pub enabled: bool,
}

impl Render for RuleToggleReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let state = if self.enabled { "enabled" } else { "disabled" };
        writeln!(w, "Rule {} {state}", self.id)
    }
}
