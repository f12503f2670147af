//! Core domain models for libmigrate
//!
//! This module contains the fundamental types used throughout the application:
//! - Package requests, resolutions and version ordering
//! - Target framework monikers and the platform filter
//! - Archive checksums
//! - Artifact candidates and per-artifact outcomes
//! - Per-package results and the run summary

mod artifact;
mod checksum;
mod moniker;
mod package;
mod summary;
mod update_result;
mod version;

pub use artifact::{format_size, ArtifactAction, ArtifactCandidate, ArtifactOutcome, ExtractedArtifact};
pub use checksum::{Checksum, ChecksumAlgorithm};
pub use moniker::{FrameworkFamily, FrameworkMoniker, PlatformFilter};
pub use package::{ManagedPackage, PackageSpec, ResolvedPackage};
pub use summary::{RunReport, StatusCounts};
pub use update_result::{FailureInfo, UpdateResult, UpdateStatus};
pub use version::{PackageVersion, VersionParseError};
