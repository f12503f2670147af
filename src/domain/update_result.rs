//! Per-package outcome of a run

use super::{ArtifactAction, ArtifactOutcome};
use crate::error::{FailureKind, MigrationError};
use serde::Serialize;
use std::fmt;

/// Final status of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    /// Artifacts were installed
    Success,
    /// The package failed at some stage; see the error
    Failed,
    /// Dry run: nothing was written
    Preview,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateStatus::Success => write!(f, "SUCCESS"),
            UpdateStatus::Failed => write!(f, "FAILED"),
            UpdateStatus::Preview => write!(f, "PREVIEW"),
        }
    }
}

/// Flattened failure carried by a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureInfo {
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
}

impl From<&MigrationError> for FailureInfo {
    fn from(error: &MigrationError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Result of migrating a single package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateResult {
    pub package: String,
    /// Version that was (or would be) installed; for failures, the version
    /// attempted when it was known
    pub installed_version: Option<String>,
    /// Artifacts written to the target directory
    pub artifacts_replaced: usize,
    /// Bytes across `artifacts`
    pub total_size: u64,
    pub status: UpdateStatus,
    pub error: Option<FailureInfo>,
    pub artifacts: Vec<ArtifactOutcome>,
}

fn total_size(artifacts: &[ArtifactOutcome]) -> u64 {
    artifacts.iter().map(|a| a.size).sum()
}

impl UpdateResult {
    /// Creates a Success result from the written artifacts
    pub fn success(package: impl Into<String>, version: impl Into<String>, artifacts: Vec<ArtifactOutcome>) -> Self {
        let written = artifacts.iter().filter(|a| !a.action.is_preview()).count();
        Self {
            package: package.into(),
            installed_version: Some(version.into()),
            artifacts_replaced: written,
            total_size: total_size(&artifacts),
            status: UpdateStatus::Success,
            error: None,
            artifacts,
        }
    }

    /// Creates a Preview result; nothing counts as replaced
    pub fn preview(package: impl Into<String>, version: impl Into<String>, artifacts: Vec<ArtifactOutcome>) -> Self {
        Self {
            package: package.into(),
            installed_version: Some(version.into()),
            artifacts_replaced: 0,
            total_size: total_size(&artifacts),
            status: UpdateStatus::Preview,
            error: None,
            artifacts,
        }
    }

    /// Creates a Failed result
    pub fn failed(error: &MigrationError) -> Self {
        Self {
            package: error.package().to_string(),
            installed_version: error.version().map(str::to_string),
            artifacts_replaced: 0,
            total_size: 0,
            status: UpdateStatus::Failed,
            error: Some(FailureInfo::from(error)),
            artifacts: Vec::new(),
        }
    }

    /// Failed, but some artifacts were already written before the error
    pub fn failed_after(error: &MigrationError, artifacts: Vec<ArtifactOutcome>) -> Self {
        let mut result = Self::failed(error);
        result.artifacts_replaced = artifacts
            .iter()
            .filter(|a| matches!(a.action, ArtifactAction::Replaced | ArtifactAction::Created))
            .count();
        result.total_size = total_size(&artifacts);
        result.artifacts = artifacts;
        result
    }

    pub fn is_success(&self) -> bool {
        self.status == UpdateStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == UpdateStatus::Failed
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

impl fmt::Display for UpdateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.error) {
            (UpdateStatus::Failed, Some(error)) => {
                write!(f, "{}: FAILED ({})", self.package, error.kind)
            }
            _ => write!(
                f,
                "{}: {} {}",
                self.package,
                self.status,
                self.installed_version.as_deref().unwrap_or("-")
            ),
        }
    }
}
