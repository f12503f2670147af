//! Aggregation of per-package results into a run report

use crate::context::RunContext;
use crate::domain::{RunReport, UpdateResult};
use std::path::PathBuf;

/// Collects one result per package, in any order
#[derive(Debug)]
pub struct ReportBuilder {
    run_id: String,
    dry_run: bool,
    target_dir: PathBuf,
    backup_dir: Option<PathBuf>,
    results: Vec<UpdateResult>,
    missing_artifacts: Vec<String>,
}

impl ReportBuilder {
    pub fn new(ctx: &RunContext) -> Self {
        Self {
            run_id: ctx.run_id.clone(),
            dry_run: ctx.dry_run,
            target_dir: ctx.target_dir.clone(),
            backup_dir: ctx.backup_dir.clone(),
            results: Vec::new(),
            missing_artifacts: Vec::new(),
        }
    }

    pub fn add(&mut self, result: UpdateResult) {
        self.results.push(result);
    }

    /// Take the run id and backup directory as they ended up after the run
    pub fn sync_context(&mut self, ctx: &RunContext) {
        self.run_id = ctx.run_id.clone();
        self.backup_dir = ctx.backup_dir.clone();
    }

    pub fn set_missing_artifacts(&mut self, missing: Vec<String>) {
        self.missing_artifacts = missing;
    }

    /// Finish the report with results ordered by package name
    pub fn build(mut self) -> RunReport {
        self.results.sort_by(|a, b| {
            a.package
                .to_lowercase()
                .cmp(&b.package.to_lowercase())
                .then_with(|| a.package.cmp(&b.package))
        });
        RunReport {
            run_id: self.run_id,
            dry_run: self.dry_run,
            target_dir: self.target_dir,
            backup_dir: self.backup_dir,
            results: self.results,
            missing_artifacts: self.missing_artifacts,
        }
    }
}
