//! `ironwatch config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use ironwatch_core::config::IronwatchConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Section names accepted by `config show --section`.
pub const SECTIONS: [&str; 7] = [
    "general",
    "listener",
    "batch",
    "storage",
    "detection",
    "extraction",
    "metrics",
];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => {
            let report = validate(config_path).await;
            writer.render(&report)?;
            if !report.valid {
                return Err(CliError::Config("configuration is invalid".to_owned()));
            }
            Ok(())
        }
        ConfigAction::Show { section } => {
            info!(path = %config_path.display(), "loading configuration");
            let config = IronwatchConfig::load(config_path).await?;
            let report = build_config_report(config_path, &config, section.as_deref())?;
            writer.render(&report)
        }
    }
}

/// Load and validate the configuration file, collecting the error if any.
pub async fn validate(config_path: &Path) -> ConfigValidationReport {
    info!(path = %config_path.display(), "validating configuration");

    let errors = match IronwatchConfig::load(config_path).await {
        Ok(_) => Vec::new(),
        Err(e) => vec![e.to_string()],
    };
    ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: errors.is_empty(),
        errors,
    }
}

/// Effective configuration (file + env overrides + defaults), whole or one section.
pub fn build_config_report(
    config_path: &Path,
    config: &IronwatchConfig,
    section: Option<&str>,
) -> Result<ConfigReport, CliError> {
    let (config_toml, config_json) = match section {
        None => render_section(config)?,
        Some("general") => render_section(&config.general)?,
        Some("listener") => render_section(&config.listener)?,
        Some("batch") => render_section(&config.batch)?,
        Some("storage") => render_section(&config.storage)?,
        Some("detection") => render_section(&config.detection)?,
        Some("extraction") => render_section(&config.extraction)?,
        Some("metrics") => render_section(&config.metrics)?,
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: {})",
                SECTIONS.join(", ")
            )));
        }
    };

    Ok(ConfigReport {
        source: config_path.display().to_string(),
        section: section.map(str::to_owned),
        config: config_json,
        config_toml,
    })
}

fn render_section<T: Serialize>(value: &T) -> Result<(String, serde_json::Value), CliError> {
    let text = toml::to_string_pretty(value)
        .map_err(|e| CliError::Command(format!("failed to serialize config: {e}")))?;
    Ok((text, serde_json::to_value(value)?))
}

/// Configuration display report.
///
/// Text output prints the TOML form; JSON output carries the same values
/// under `config`.
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub source: String,
    /// None = full config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub config: serde_json::Value,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(section) = &self.section {
            let section_label = format!("[{section}]");
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Debug, Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Empty if valid
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_report_full_config() {
        let config = IronwatchConfig::default();
        let report = build_config_report(Path::new("test.toml"), &config, None).unwrap();

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("test.toml"), "should contain source filename");
        assert!(output.contains("[listener]"), "should contain every section");
        assert!(output.contains("poll_interval_secs"));
        assert!(report.config["batch"]["batch_size"].is_number());
    }

    #[test]
    fn test_config_report_every_section() {
        let config = IronwatchConfig::default();
        for section in SECTIONS {
            let report =
                build_config_report(Path::new("test.toml"), &config, Some(section)).unwrap();
            assert_eq!(report.section.as_deref(), Some(section));
            assert!(report.config.is_object(), "{section} should be a table");
        }
    }

    #[test]
    fn test_config_report_specific_section_text() {
        let config = IronwatchConfig::default();
        let report =
            build_config_report(Path::new("/etc/ironwatch.toml"), &config, Some("detection"))
                .unwrap();

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("[detection]"), "should show section name");
        assert!(output.contains("max_per_cycle"), "should show section content");
        assert!(!output.contains("batch_timeout_ms"), "should omit other sections");
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        let config = IronwatchConfig::default();
        let err =
            build_config_report(Path::new("test.toml"), &config, Some("alerts")).unwrap_err();
        assert!(err.to_string().contains("unknown section: alerts"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_config_report_json_omits_toml_text() {
        let config = IronwatchConfig::default();
        let report =
            build_config_report(Path::new("test.toml"), &config, Some("metrics")).unwrap();

        let parsed = serde_json::to_value(&report).unwrap();
        assert_eq!(parsed["source"], "test.toml");
        assert_eq!(parsed["section"], "metrics");
        assert!(parsed.get("config_toml").is_none());
        assert!(parsed["config"]["enabled"].is_boolean());
    }

    #[test]
    fn test_config_validation_report_invalid() {
        let report = ConfigValidationReport {
            source: "bad.toml".to_owned(),
            valid: false,
            errors: vec!["invalid value for 'detection.poll_interval_secs'".to_owned()],
        };

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("INVALID"));
        assert!(output.contains("poll_interval_secs"));
    }

    #[tokio::test]
    async fn test_validate_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = validate(&dir.path().join("absent.toml")).await;
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
    }
}
