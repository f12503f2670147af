//! Application error types using thiserror
//!
//! Error hierarchy:
//! - MigrationError: per-package pipeline failures, reported in the run report
//! - RegistryError: transport-level failures talking to a package registry
//! - ConfigError: bad CLI flags or config files
//! - IoError: file system failures outside the per-package pipeline

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Process exit codes
pub mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const CONFIG: u8 = 1;
    /// Emitted by clap itself on usage errors
    pub const USAGE: u8 = 2;
    pub const NETWORK: u8 = 3;
    pub const VERSION_NOT_FOUND: u8 = 4;
    pub const ARTIFACT_NOT_FOUND: u8 = 5;
    pub const FILESYSTEM: u8 = 6;
    pub const ABORTED: u8 = 130;
}

/// Failures of a single package's migration
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Requested version is not published
    #[error("version {version} of '{package}' not found in {registry}{}", available_hint(.available))]
    VersionNotFound {
        package: String,
        version: String,
        registry: String,
        available: Vec<String>,
    },

    /// Version listing could not be retrieved
    #[error("registry unavailable for '{package}'{}: {source}", version_suffix(.version))]
    RegistryUnavailable {
        package: String,
        version: Option<String>,
        #[source]
        source: RegistryError,
    },

    /// Archive download failed or did not verify
    #[error("failed to download '{package}' {version}: {message}")]
    Download {
        package: String,
        version: String,
        message: String,
    },

    /// No artifact in the archive suits the target platform
    #[error("no '{library}' artifact for {target} in '{package}' {version} (available: {})", list_or_none(.available))]
    ArtifactNotFound {
        package: String,
        version: String,
        library: String,
        target: String,
        available: Vec<String>,
    },

    /// Existing artifacts could not be backed up
    #[error("failed to back up '{package}'{} at {path}: {source}", version_suffix(.version))]
    Backup {
        package: String,
        version: Option<String>,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// New artifact could not be written; restore from the run's backup
    #[error("failed to replace {path} for '{package}' {version}: {message}")]
    Replacement {
        package: String,
        version: String,
        path: PathBuf,
        message: String,
    },

    /// Run interrupted by the user
    #[error("'{package}'{} aborted before {stage}", version_suffix(.version))]
    Aborted {
        package: String,
        version: Option<String>,
        stage: String,
    },
}

fn available_hint(available: &[String]) -> String {
    if available.is_empty() {
        String::new()
    } else {
        format!(" (latest available: {})", available.join(", "))
    }
}

fn version_suffix(version: &Option<String>) -> String {
    match version {
        Some(version) => format!(" {}", version),
        None => String::new(),
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Coarse classification of a [`MigrationError`], ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RegistryUnavailable,
    Download,
    VersionNotFound,
    ArtifactNotFound,
    Backup,
    Replacement,
    Aborted,
}

impl FailureKind {
    /// Exit code for a run whose most severe failure is this kind
    pub fn exit_code(&self) -> u8 {
        match self {
            FailureKind::RegistryUnavailable | FailureKind::Download => exit_code::NETWORK,
            FailureKind::VersionNotFound => exit_code::VERSION_NOT_FOUND,
            FailureKind::ArtifactNotFound => exit_code::ARTIFACT_NOT_FOUND,
            FailureKind::Backup | FailureKind::Replacement => exit_code::FILESYSTEM,
            FailureKind::Aborted => exit_code::ABORTED,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::RegistryUnavailable => "RegistryUnavailable",
            FailureKind::Download => "Download",
            FailureKind::VersionNotFound => "VersionNotFound",
            FailureKind::ArtifactNotFound => "ArtifactNotFound",
            FailureKind::Backup => "Backup",
            FailureKind::Replacement => "Replacement",
            FailureKind::Aborted => "Aborted",
        };
        write!(f, "{}", name)
    }
}

/// Errors related to package registry communication
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Package not found in registry
    #[error("package '{package}' not found in {registry}")]
    PackageNotFound { package: String, registry: String },

    /// Network request failed
    #[error("failed to fetch package '{package}' from {registry}: {message}")]
    NetworkError {
        package: String,
        registry: String,
        message: String,
    },

    /// Rate limit exceeded
    #[error("rate limit exceeded for {registry}")]
    RateLimitExceeded { registry: String },

    /// Invalid response from registry
    #[error("invalid response from {registry} for '{package}': {message}")]
    InvalidResponse {
        package: String,
        registry: String,
        message: String,
    },

    /// Timeout
    #[error("timeout while fetching '{package}' from {registry}")]
    Timeout { package: String, registry: String },
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Malformed `--package` value or config entry
    #[error("invalid package spec '{value}': {message}")]
    InvalidPackageSpec { value: String, message: String },

    /// Unrecognized target framework
    #[error("invalid framework '{value}': expected a moniker like 'net8.0', 'netstandard2.0' or 'net462'")]
    InvalidFramework { value: String },

    /// Unknown selection policy
    #[error("invalid policy '{value}': expected 'newest' or 'exact'")]
    InvalidPolicy { value: String },

    /// Malformed checksum in a config entry
    #[error("invalid checksum for '{package}': {value}")]
    InvalidChecksum { package: String, value: String },

    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected schema
    #[error("failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    /// Conflicting options
    #[error("conflicting options: {message}")]
    ConflictingOptions { message: String },
}

/// Errors related to IO operations
#[derive(Error, Debug)]
pub enum IoError {
    /// Directory not found
    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// Run id that is not a single directory name
    #[error("invalid run id '{run_id}': expected a backup directory name such as 20250101T000000.000Z")]
    InvalidRunId { run_id: String },

    /// No complete backup with the given run id
    #[error("no backup '{run_id}' under {root}")]
    BackupNotFound { run_id: String, root: PathBuf },

    /// Backup manifest is unreadable
    #[error("invalid backup manifest {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    /// Generic IO error
    #[error("IO error at {path}: {source}")]
    Generic {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MigrationError {
    /// Creates a new VersionNotFound error
    pub fn version_not_found(
        package: impl Into<String>,
        version: impl Into<String>,
        registry: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        MigrationError::VersionNotFound {
            package: package.into(),
            version: version.into(),
            registry: registry.into(),
            available,
        }
    }

    /// Creates a new RegistryUnavailable error
    pub fn registry_unavailable(
        package: impl Into<String>,
        version: Option<String>,
        source: RegistryError,
    ) -> Self {
        MigrationError::RegistryUnavailable {
            package: package.into(),
            version,
            source,
        }
    }

    /// Creates a new Download error
    pub fn download(
        package: impl Into<String>,
        version: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrationError::Download {
            package: package.into(),
            version: version.into(),
            message: message.into(),
        }
    }

    /// Creates a new Backup error
    pub fn backup(
        package: impl Into<String>,
        version: Option<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        MigrationError::Backup {
            package: package.into(),
            version,
            path: path.into(),
            source,
        }
    }

    /// Creates a new Replacement error
    pub fn replacement(
        package: impl Into<String>,
        version: impl Into<String>,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        MigrationError::Replacement {
            package: package.into(),
            version: version.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new Aborted error
    pub fn aborted(
        package: impl Into<String>,
        version: Option<String>,
        stage: impl Into<String>,
    ) -> Self {
        MigrationError::Aborted {
            package: package.into(),
            version,
            stage: stage.into(),
        }
    }

    /// Name of the package this failure belongs to
    pub fn package(&self) -> &str {
        match self {
            MigrationError::VersionNotFound { package, .. }
            | MigrationError::RegistryUnavailable { package, .. }
            | MigrationError::Download { package, .. }
            | MigrationError::ArtifactNotFound { package, .. }
            | MigrationError::Backup { package, .. }
            | MigrationError::Replacement { package, .. }
            | MigrationError::Aborted { package, .. } => package,
        }
    }

    /// Version that was being installed, when known
    pub fn version(&self) -> Option<&str> {
        match self {
            MigrationError::VersionNotFound { version, .. }
            | MigrationError::Download { version, .. }
            | MigrationError::ArtifactNotFound { version, .. }
            | MigrationError::Replacement { version, .. } => Some(version),
            MigrationError::RegistryUnavailable { version, .. }
            | MigrationError::Backup { version, .. }
            | MigrationError::Aborted { version, .. } => version.as_deref(),
        }
    }

    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MigrationError::RegistryUnavailable { .. } | MigrationError::Download { .. }
        )
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            MigrationError::VersionNotFound { .. } => FailureKind::VersionNotFound,
            MigrationError::RegistryUnavailable { .. } => FailureKind::RegistryUnavailable,
            MigrationError::Download { .. } => FailureKind::Download,
            MigrationError::ArtifactNotFound { .. } => FailureKind::ArtifactNotFound,
            MigrationError::Backup { .. } => FailureKind::Backup,
            MigrationError::Replacement { .. } => FailureKind::Replacement,
            MigrationError::Aborted { .. } => FailureKind::Aborted,
        }
    }
}

impl RegistryError {
    /// Creates a new PackageNotFound error
    pub fn package_not_found(package: impl Into<String>, registry: impl Into<String>) -> Self {
        RegistryError::PackageNotFound {
            package: package.into(),
            registry: registry.into(),
        }
    }

    /// Creates a new NetworkError
    pub fn network_error(
        package: impl Into<String>,
        registry: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        RegistryError::NetworkError {
            package: package.into(),
            registry: registry.into(),
            message: message.into(),
        }
    }

    /// Creates a new RateLimitExceeded error
    pub fn rate_limit_exceeded(registry: impl Into<String>) -> Self {
        RegistryError::RateLimitExceeded {
            registry: registry.into(),
        }
    }

    /// Creates a new InvalidResponse error
    pub fn invalid_response(
        package: impl Into<String>,
        registry: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        RegistryError::InvalidResponse {
            package: package.into(),
            registry: registry.into(),
            message: message.into(),
        }
    }

    /// Creates a new Timeout error
    pub fn timeout(package: impl Into<String>, registry: impl Into<String>) -> Self {
        RegistryError::Timeout {
            package: package.into(),
            registry: registry.into(),
        }
    }

    /// Transport failures that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistryError::NetworkError { .. }
                | RegistryError::RateLimitExceeded { .. }
                | RegistryError::Timeout { .. }
        )
    }
}

impl ConfigError {
    /// Creates a new InvalidPackageSpec error
    pub fn invalid_package_spec(value: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidPackageSpec {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Creates a new ParseError
    pub fn parse_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ConfigError::ParseError {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl IoError {
    /// Creates a new DirectoryNotFound error
    pub fn directory_not_found(path: impl Into<PathBuf>) -> Self {
        IoError::DirectoryNotFound { path: path.into() }
    }

    /// Creates a new InvalidRunId error
    pub fn invalid_run_id(run_id: impl Into<String>) -> Self {
        IoError::InvalidRunId {
            run_id: run_id.into(),
        }
    }

    /// Creates a new BackupNotFound error
    pub fn backup_not_found(run_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        IoError::BackupNotFound {
            run_id: run_id.into(),
            root: root.into(),
        }
    }

    /// Creates a new InvalidManifest error
    pub fn invalid_manifest(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        IoError::InvalidManifest {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new Generic IO error
    pub fn generic(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IoError::Generic {
            path: path.into(),
            source,
        }
    }
}
