//! Run-level summary types

use super::{UpdateResult, UpdateStatus};
use crate::error::exit_code;
use serde::Serialize;
use std::path::PathBuf;

/// Per-status tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub success: usize,
    pub failed: usize,
    pub preview: usize,
}

/// Final summary of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub dry_run: bool,
    pub target_dir: PathBuf,
    /// Backup directory used by this run, if one was created
    pub backup_dir: Option<PathBuf>,
    /// One result per package, ordered by package name
    pub results: Vec<UpdateResult>,
    /// Required artifacts absent from the target after the run
    pub missing_artifacts: Vec<String>,
}

impl RunReport {
    /// Returns the total number of packages processed
    pub fn total_packages(&self) -> usize {
        self.results.len()
    }

    pub fn counts(&self) -> StatusCounts {
        self.results
            .iter()
            .fold(StatusCounts::default(), |mut counts, result| {
                match result.status {
                    UpdateStatus::Success => counts.success += 1,
                    UpdateStatus::Failed => counts.failed += 1,
                    UpdateStatus::Preview => counts.preview += 1,
                }
                counts
            })
    }

    /// Returns the total number of artifacts written across packages
    pub fn total_artifacts_replaced(&self) -> usize {
        self.results.iter().map(|r| r.artifacts_replaced).sum()
    }

    /// Bytes of every artifact written (or previewed) in the run
    pub fn total_size(&self) -> u64 {
        self.results.iter().map(|r| r.total_size).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.is_failed())
    }

    /// Exit code of the most severe failure, or success
    pub fn exit_code(&self) -> u8 {
        self.results
            .iter()
            .filter_map(|r| r.failure_kind())
            .max()
            .map(|kind| kind.exit_code())
            .unwrap_or(exit_code::SUCCESS)
    }
}
