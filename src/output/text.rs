//! Text output formatter for human-readable display
//!
//! This module provides:
//! - One status line per package, aligned by name
//! - Per-artifact actions in verbose mode
//! - A summary with counts by status and the backup location

use crate::backup::BackupSummary;
use crate::domain::{format_size, RunReport, UpdateResult, UpdateStatus};
use crate::output::{OutputFormatter, Verbosity};
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;

/// Text formatter for human-readable output
pub struct TextFormatter {
    verbosity: Verbosity,
    dry_run: bool,
    color: bool,
}

impl TextFormatter {
    pub fn new(verbosity: Verbosity, dry_run: bool) -> Self {
        Self::with_color(verbosity, dry_run, true)
    }

    pub fn with_color(verbosity: Verbosity, dry_run: bool, color: bool) -> Self {
        Self {
            verbosity,
            dry_run,
            color,
        }
    }

    fn dry_run_prefix(&self) -> String {
        match (self.dry_run, self.color) {
            (false, _) => String::new(),
            (true, true) => format!("{} ", "(dry-run)".cyan()),
            (true, false) => "(dry-run) ".to_string(),
        }
    }

    fn status_label(&self, status: UpdateStatus) -> String {
        let label = status.to_string();
        if !self.color {
            return label;
        }
        match status {
            UpdateStatus::Success => label.green().bold().to_string(),
            UpdateStatus::Failed => label.red().bold().to_string(),
            UpdateStatus::Preview => label.cyan().to_string(),
        }
    }

    fn format_result_line(
        &self,
        result: &UpdateResult,
        max_name_len: usize,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        let name = format!("{:width$}", result.package, width = max_name_len);
        let status = self.status_label(result.status);
        let version = result.installed_version.as_deref().unwrap_or("-");
        let size = format!("({})", format_size(result.total_size));

        match &result.error {
            Some(error) => {
                let detail = format!("{}: {}", error.kind, error.message);
                if self.color {
                    writeln!(writer, "  {} {} {}", name, status, detail.dimmed())?;
                } else {
                    writeln!(writer, "  {} {} {}", name, status, detail)?;
                }
            }
            None if self.color => {
                writeln!(
                    writer,
                    "  {} {} {} {}",
                    name,
                    status,
                    version.bright_white().bold(),
                    size.dimmed()
                )?;
            }
            None => writeln!(writer, "  {} {} {} {}", name, status, version, size)?,
        }

        if self.verbosity == Verbosity::Verbose {
            for artifact in &result.artifacts {
                if self.color {
                    writeln!(writer, "      {}", artifact.to_string().dimmed())?;
                } else {
                    writeln!(writer, "      {}", artifact)?;
                }
            }
        }
        Ok(())
    }

    fn format_summary(&self, report: &RunReport, writer: &mut dyn Write) -> std::io::Result<()> {
        let prefix = self.dry_run_prefix();
        let counts = report.counts();

        if self.verbosity == Verbosity::Quiet {
            return writeln!(
                writer,
                "{}{} succeeded, {} failed, {} previewed",
                prefix, counts.success, counts.failed, counts.preview
            );
        }

        if self.color {
            writeln!(writer, "{}{}:", prefix, "Summary".bold())?;
            writeln!(
                writer,
                "  {} package(s): {} succeeded, {} failed, {} previewed",
                report.total_packages(),
                counts.success.to_string().green(),
                counts.failed.to_string().red(),
                counts.preview.to_string().cyan()
            )?;
        } else {
            writeln!(writer, "{}Summary:", prefix)?;
            writeln!(
                writer,
                "  {} package(s): {} succeeded, {} failed, {} previewed",
                report.total_packages(),
                counts.success,
                counts.failed,
                counts.preview
            )?;
        }
        writeln!(
            writer,
            "  {} artifact(s) replaced",
            report.total_artifacts_replaced()
        )?;
        if report.total_size() > 0 {
            writeln!(writer, "  total size: {}", format_size(report.total_size()))?;
        }
        writeln!(writer, "  run id: {}", report.run_id)?;
        if let Some(ref dir) = report.backup_dir {
            writeln!(writer, "  backups: {}", dir.display())?;
        }
        if !report.missing_artifacts.is_empty() {
            let missing = report.missing_artifacts.join(", ");
            if self.color {
                writeln!(writer, "  {} {}", "missing:".yellow(), missing)?;
            } else {
                writeln!(writer, "  missing: {}", missing)?;
            }
        }
        Ok(())
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, report: &RunReport, writer: &mut dyn Write) -> std::io::Result<()> {
        if self.verbosity != Verbosity::Quiet && !report.results.is_empty() {
            let target = report.target_dir.display().to_string();
            if self.color {
                writeln!(writer, "{}{}", self.dry_run_prefix(), target.bold())?;
            } else {
                writeln!(writer, "{}{}", self.dry_run_prefix(), target)?;
            }
            let max_name_len = report
                .results
                .iter()
                .map(|r| r.package.len())
                .max()
                .unwrap_or(0)
                .max(20);
            for result in &report.results {
                self.format_result_line(result, max_name_len, writer)?;
            }
            writeln!(writer)?;
        }

        self.format_summary(report, writer)
    }

    fn format_backups(
        &self,
        backups: &[BackupSummary],
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        if backups.is_empty() {
            return writeln!(writer, "No backups found");
        }
        for backup in backups {
            let created = backup.created_at.format("%Y/%m/%d %H:%M:%S").to_string();
            if self.color {
                writeln!(
                    writer,
                    "{} {} {} artifact(s) {}",
                    backup.run_id.bold(),
                    created.dimmed(),
                    backup.artifacts,
                    backup.target_dir.display().to_string().dimmed()
                )?;
            } else {
                writeln!(
                    writer,
                    "{} {} {} artifact(s) {}",
                    backup.run_id,
                    created,
                    backup.artifacts,
                    backup.target_dir.display()
                )?;
            }
        }
        Ok(())
    }

    fn format_restore(
        &self,
        run_id: &str,
        restored: &[PathBuf],
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        if self.verbosity != Verbosity::Quiet {
            for path in restored {
                writeln!(writer, "  {}", path.display())?;
            }
        }
        writeln!(
            writer,
            "Restored {} artifact(s) from {}",
            restored.len(),
            run_id
        )
    }
}
