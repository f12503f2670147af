//! Library artifacts found in package archives

use super::{FrameworkMoniker, PackageVersion};
use serde::Serialize;
use std::fmt;

/// One `lib/<moniker>/<file>` entry of a package archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactCandidate {
    /// Path of the entry inside the archive
    pub archive_entry_path: String,
    /// File name the artifact is installed under
    pub target_filename: String,
    pub framework_moniker: FrameworkMoniker,
}

impl ArtifactCandidate {
    pub fn new(
        archive_entry_path: impl Into<String>,
        target_filename: impl Into<String>,
        framework_moniker: FrameworkMoniker,
    ) -> Self {
        Self {
            archive_entry_path: archive_entry_path.into(),
            target_filename: target_filename.into(),
            framework_moniker,
        }
    }
}

/// A selected candidate with its bytes read out of the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArtifact {
    pub candidate: ArtifactCandidate,
    pub contents: Vec<u8>,
}

impl ExtractedArtifact {
    pub fn filename(&self) -> &str {
        &self.candidate.target_filename
    }

    /// Size of the artifact in bytes
    pub fn size(&self) -> u64 {
        self.contents.len() as u64
    }
}

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Human-readable size: `512 B`, `12.5 KB`, `3.4 MB`
pub fn format_size(bytes: u64) -> String {
    let value = bytes as f64;
    if value >= MIB {
        format!("{:.1} MB", value / MIB)
    } else if value >= KIB {
        format!("{:.1} KB", value / KIB)
    } else {
        format!("{} B", bytes)
    }
}

/// What happened (or would happen) to a target file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactAction {
    Replaced,
    Created,
    WouldReplace,
    WouldCreate,
}

impl ArtifactAction {
    pub fn is_preview(&self) -> bool {
        matches!(self, ArtifactAction::WouldReplace | ArtifactAction::WouldCreate)
    }
}

impl fmt::Display for ArtifactAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArtifactAction::Replaced => "replaced",
            ArtifactAction::Created => "created",
            ArtifactAction::WouldReplace => "would replace",
            ArtifactAction::WouldCreate => "would create",
        };
        write!(f, "{}", label)
    }
}

/// Per-artifact entry of an update result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactOutcome {
    pub filename: String,
    pub version: PackageVersion,
    pub moniker: FrameworkMoniker,
    pub action: ArtifactAction,
    /// Bytes written, or that would be written on a dry run
    pub size: u64,
}

impl fmt::Display for ArtifactOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}, {}, {})",
            self.action,
            self.filename,
            self.version,
            self.moniker,
            format_size(self.size)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_preview() {
        assert!(ArtifactAction::WouldReplace.is_preview());
        assert!(ArtifactAction::WouldCreate.is_preview());
        assert!(!ArtifactAction::Replaced.is_preview());
    }

    #[test]
    fn test_outcome_display() {
        let outcome = ArtifactOutcome {
            filename: "LibA.dll".to_string(),
            version: PackageVersion::parse("2.0.0").unwrap(),
            moniker: FrameworkMoniker::parse("net8.0").unwrap(),
            action: ArtifactAction::WouldReplace,
            size: 2048,
        };
        assert_eq!(outcome.to_string(), "would replace LibA.dll (2.0.0, net8.0, 2.0 KB)");
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let outcome = ArtifactOutcome {
            filename: "LibA.dll".to_string(),
            version: PackageVersion::parse("2.0.0").unwrap(),
            moniker: FrameworkMoniker::parse("netstandard2.0").unwrap(),
            action: ArtifactAction::Created,
            size: 10,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["size"], 10);
        assert_eq!(json["version"], "2.0.0");
        assert_eq!(json["moniker"], "netstandard2.0");
        assert_eq!(json["action"], "created");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024 + 200 * 1024), "5.2 MB");
    }
}
