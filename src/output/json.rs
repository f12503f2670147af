//! JSON output formatter for machine processing

use crate::backup::BackupSummary;
use crate::domain::{ArtifactOutcome, FailureInfo, RunReport, UpdateResult, UpdateStatus};
use crate::output::{OutputFormatter, Verbosity};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// JSON formatter for machine-readable output
pub struct JsonFormatter {
    /// Per-artifact detail is only emitted in verbose mode
    verbosity: Verbosity,
}

impl JsonFormatter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    fn result_to_json<'a>(&self, result: &'a UpdateResult) -> JsonResult<'a> {
        JsonResult {
            package: &result.package,
            status: result.status,
            installed_version: result.installed_version.as_deref(),
            artifacts_replaced: result.artifacts_replaced,
            total_size: result.total_size,
            error: result.error.as_ref(),
            artifacts: if self.verbosity == Verbosity::Verbose {
                result.artifacts.iter().collect()
            } else {
                Vec::new()
            },
        }
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    run_id: &'a str,
    dry_run: bool,
    target_dir: &'a Path,
    backup_dir: Option<&'a Path>,
    exit_code: u8,
    summary: JsonSummary,
    results: Vec<JsonResult<'a>>,
    #[serde(skip_serializing_if = "no_entries")]
    missing_artifacts: &'a [String],
}

#[derive(Serialize)]
struct JsonSummary {
    packages: usize,
    success: usize,
    failed: usize,
    preview: usize,
    artifacts_replaced: usize,
    total_size: u64,
}

#[derive(Serialize)]
struct JsonResult<'a> {
    package: &'a str,
    status: UpdateStatus,
    installed_version: Option<&'a str>,
    artifacts_replaced: usize,
    total_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a FailureInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    artifacts: Vec<&'a ArtifactOutcome>,
}

#[derive(Serialize)]
struct JsonRestore<'a> {
    run_id: &'a str,
    restored: &'a [PathBuf],
}

fn no_entries(entries: &&[String]) -> bool {
    entries.is_empty()
}

fn write_pretty<T: Serialize>(value: &T, writer: &mut dyn Write) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    writeln!(writer, "{}", json)
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, report: &RunReport, writer: &mut dyn Write) -> std::io::Result<()> {
        let counts = report.counts();
        let output = JsonOutput {
            run_id: &report.run_id,
            dry_run: report.dry_run,
            target_dir: &report.target_dir,
            backup_dir: report.backup_dir.as_deref(),
            exit_code: report.exit_code(),
            summary: JsonSummary {
                packages: report.total_packages(),
                success: counts.success,
                failed: counts.failed,
                preview: counts.preview,
                artifacts_replaced: report.total_artifacts_replaced(),
                total_size: report.total_size(),
            },
            results: report
                .results
                .iter()
                .map(|r| self.result_to_json(r))
                .collect(),
            missing_artifacts: &report.missing_artifacts,
        };
        write_pretty(&output, writer)
    }

    fn format_backups(
        &self,
        backups: &[BackupSummary],
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        write_pretty(&backups, writer)
    }

    fn format_restore(
        &self,
        run_id: &str,
        restored: &[PathBuf],
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        write_pretty(&JsonRestore { run_id, restored }, writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactAction, FrameworkMoniker, PackageVersion};
    use crate::error::MigrationError;

    fn sample_report() -> RunReport {
        let artifact = ArtifactOutcome {
            filename: "LibA.dll".to_string(),
            version: PackageVersion::parse("2.0.0").unwrap(),
            moniker: FrameworkMoniker::parse("net8.0").unwrap(),
            action: ArtifactAction::WouldReplace,
            size: 4096,
        };
        let missing = MigrationError::version_not_found("LibC", "9.9.9", "memory", vec![]);
        RunReport {
            run_id: "run-1".to_string(),
            dry_run: true,
            target_dir: PathBuf::from("dll"),
            backup_dir: None,
            results: vec![
                UpdateResult::preview("LibA", "2.0.0", vec![artifact]),
                UpdateResult::failed(&missing),
            ],
            missing_artifacts: Vec::new(),
        }
    }

    fn render(verbosity: Verbosity) -> serde_json::Value {
        let mut out = Vec::new();
        JsonFormatter::new(verbosity)
            .format(&sample_report(), &mut out)
            .unwrap();
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn test_json_report_shape() {
        let json = render(Verbosity::Normal);
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["dry_run"], true);
        assert_eq!(json["exit_code"], 4);
        assert_eq!(json["summary"]["packages"], 2);
        assert_eq!(json["summary"]["preview"], 1);
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["results"][0]["status"], "PREVIEW");
        assert_eq!(json["results"][0]["installed_version"], "2.0.0");
        assert_eq!(json["results"][0]["total_size"], 4096);
        assert_eq!(json["summary"]["total_size"], 4096);
        assert_eq!(json["results"][1]["installed_version"], "9.9.9");
        assert_eq!(json["results"][1]["total_size"], 0);
        assert!(json["results"][0].get("artifacts").is_none());
        assert_eq!(json["results"][1]["error"]["kind"], "version_not_found");
        assert_eq!(json["results"][1]["error"]["retryable"], false);
        assert!(json.get("missing_artifacts").is_none());
    }

    #[test]
    fn test_json_verbose_includes_artifacts() {
        let json = render(Verbosity::Verbose);
        let artifact = &json["results"][0]["artifacts"][0];
        assert_eq!(artifact["filename"], "LibA.dll");
        assert_eq!(artifact["action"], "would_replace");
        assert_eq!(artifact["moniker"], "net8.0");
    }

    #[test]
    fn test_json_restore() {
        let mut out = Vec::new();
        JsonFormatter::new(Verbosity::Normal)
            .format_restore("run-1", &[PathBuf::from("dll/LibA.dll")], &mut out)
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["restored"][0], "dll/LibA.dll");
    }
}
