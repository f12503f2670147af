//! Output formatting for run reports
//!
//! This module provides:
//! - Text output for human-readable display
//! - JSON output for machine processing

mod json;
mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;

use crate::backup::BackupSummary;
use crate::domain::RunReport;
use std::io::Write;
use std::path::PathBuf;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for machine processing
    Json,
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Summary line only
    Quiet,
    #[default]
    Normal,
    /// Adds per-artifact detail
    Verbose,
}

/// Configuration for output formatting
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub verbosity: Verbosity,
    pub dry_run: bool,
    /// Whether to use colors (when supported)
    pub color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            verbosity: Verbosity::default(),
            dry_run: false,
            color: true,
        }
    }
}

impl OutputConfig {
    pub fn new(format: OutputFormat, verbosity: Verbosity, dry_run: bool) -> Self {
        Self {
            format,
            verbosity,
            dry_run,
            color: true,
        }
    }

    /// Create configuration from CLI arguments
    pub fn from_cli(json: bool, verbose: bool, quiet: bool, dry_run: bool) -> Self {
        let format = if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        };

        let verbosity = if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        };

        Self::new(format, verbosity, dry_run)
    }

    /// Progress bars only make sense for interactive text output
    pub fn shows_progress(&self) -> bool {
        self.format == OutputFormat::Text && self.verbosity != Verbosity::Quiet
    }
}

/// Trait for output formatters
pub trait OutputFormatter {
    /// Format and write a run report
    fn format(&self, report: &RunReport, writer: &mut dyn Write) -> std::io::Result<()>;

    /// Format and write the `--list-backups` listing
    fn format_backups(
        &self,
        backups: &[BackupSummary],
        writer: &mut dyn Write,
    ) -> std::io::Result<()>;

    /// Format and write the outcome of `--restore`
    fn format_restore(
        &self,
        run_id: &str,
        restored: &[PathBuf],
        writer: &mut dyn Write,
    ) -> std::io::Result<()>;
}

/// Create an output formatter based on configuration
pub fn create_formatter(config: OutputConfig) -> Box<dyn OutputFormatter> {
    match config.format {
        OutputFormat::Text => Box::new(TextFormatter::with_color(
            config.verbosity,
            config.dry_run,
            config.color,
        )),
        OutputFormat::Json => Box::new(JsonFormatter::new(config.verbosity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_config_default() {
        let config = OutputConfig::default();
        assert_eq!(config.format, OutputFormat::Text);
        assert_eq!(config.verbosity, Verbosity::Normal);
        assert!(!config.dry_run);
        assert!(config.color);
    }

    #[test]
    fn test_output_config_from_cli_json() {
        let config = OutputConfig::from_cli(true, false, false, false);
        assert_eq!(config.format, OutputFormat::Json);
        assert!(!config.shows_progress());
    }

    #[test]
    fn test_output_config_from_cli_verbosity() {
        assert_eq!(
            OutputConfig::from_cli(false, true, false, false).verbosity,
            Verbosity::Verbose
        );
        let quiet = OutputConfig::from_cli(false, false, true, true);
        assert_eq!(quiet.verbosity, Verbosity::Quiet);
        assert!(quiet.dry_run);
        assert!(!quiet.shows_progress());
    }

    #[test]
    fn test_text_shows_progress() {
        assert!(OutputConfig::from_cli(false, false, false, false).shows_progress());
    }
}
