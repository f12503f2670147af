//! Run configuration
//!
//! Settings come from three layers, later ones winning:
//! 1. Built-in defaults (nuget.org, `net8.0`, the Analysis Services package set)
//! 2. An optional TOML file passed with `--config`
//! 3. Command line flags
//!
//! Example config file:
//!
//! ```toml
//! registry = "https://api.nuget.org/v3-flatcontainer"
//! framework = "net8.0"
//! policy = "newest"
//!
//! [[package]]
//! name = "Microsoft.AnalysisServices"
//! version = "19.84.1"
//! libraries = ["Microsoft.AnalysisServices.dll", "Microsoft.AnalysisServices.Core.dll"]
//! ```

use crate::cli::CliArgs;
use crate::domain::{Checksum, FrameworkMoniker, ManagedPackage, PackageSpec, PlatformFilter};
use crate::error::ConfigError;
use crate::extractor::PolicyKind;
use crate::fetcher::FetchPolicy;
use crate::registry::NUGET_FLAT_CONTAINER_URL;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Framework used when neither the config nor the CLI names one
pub const DEFAULT_FRAMEWORK: &str = "net8.0";

/// Log file name inside the backup root
pub const LOG_FILE_NAME: &str = "libmigrate.log";

/// `[[package]]` entry of the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageEntry {
    pub name: String,
    pub version: Option<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
    pub source: Option<String>,
    pub checksum: Option<String>,
}

/// Top level of the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub registry: Option<String>,
    pub framework: Option<String>,
    pub policy: Option<String>,
    pub backup_root: Option<PathBuf>,
    pub allow_windows_only: Option<bool>,
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageEntry>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::parse_error(path, e.to_string()))
    }
}

/// Packages managed when no list is given
pub fn default_packages() -> Vec<ManagedPackage> {
    vec![
        ManagedPackage::new(PackageSpec::new("Microsoft.AnalysisServices.AdomdClient")),
        ManagedPackage::new(PackageSpec::new("Microsoft.AnalysisServices")).with_libraries([
            "Microsoft.AnalysisServices.dll",
            "Microsoft.AnalysisServices.Core.dll",
            "Microsoft.AnalysisServices.Runtime.Core.dll",
            "Microsoft.AnalysisServices.Tabular.dll",
        ]),
    ]
}

/// Backups live next to the target directory: `dll` -> `dll-backups`
pub fn default_backup_root(target_dir: &Path) -> PathBuf {
    let name = target_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "libraries".to_string());
    target_dir.with_file_name(format!("{}-backups", name))
}

/// Fully resolved settings for a run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target_dir: PathBuf,
    pub backup_root: PathBuf,
    pub packages: Vec<ManagedPackage>,
    pub registry: String,
    pub filter: PlatformFilter,
    pub policy: PolicyKind,
    pub include_prerelease: bool,
    pub dry_run: bool,
    pub jobs: usize,
    pub retries: u32,
    pub timeout: Duration,
    pub log_file: PathBuf,
}

impl RunConfig {
    /// A config with defaults for everything but the directories
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        let target_dir = target_dir.into();
        let backup_root = default_backup_root(&target_dir);
        Self {
            log_file: backup_root.join(LOG_FILE_NAME),
            target_dir,
            backup_root,
            packages: default_packages(),
            registry: NUGET_FLAT_CONTAINER_URL.to_string(),
            filter: PlatformFilter::default(),
            policy: PolicyKind::default(),
            include_prerelease: false,
            dry_run: false,
            jobs: 1,
            retries: crate::registry::MAX_RETRIES,
            timeout: crate::registry::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_packages(mut self, packages: Vec<ManagedPackage>) -> Self {
        self.packages = packages;
        self
    }

    pub fn with_backup_root(mut self, backup_root: impl Into<PathBuf>) -> Self {
        self.backup_root = backup_root.into();
        self.log_file = self.backup_root.join(LOG_FILE_NAME);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Merge the config file (if any) and the CLI flags
    pub fn from_cli(args: &CliArgs) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::from_parts(args, file)
    }

    fn from_parts(args: &CliArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let mut config = Self::new(&args.target_dir);

        if let Some(root) = args.backup_root.clone().or(file.backup_root) {
            config = config.with_backup_root(root);
        }
        if let Some(log_file) = &args.log_file {
            config.log_file = log_file.clone();
        }

        if let Some(registry) = args.registry.clone().or(file.registry) {
            config.registry = registry;
        }

        let framework = args
            .framework
            .clone()
            .or(file.framework)
            .unwrap_or_else(|| DEFAULT_FRAMEWORK.to_string());
        let target = FrameworkMoniker::parse(&framework)
            .ok_or(ConfigError::InvalidFramework { value: framework })?;
        let allow_windows_only = args.allow_windows_only || file.allow_windows_only.unwrap_or(false);
        config.filter = PlatformFilter::new(target).with_windows_only(allow_windows_only);

        config.policy = match (args.policy, file.policy) {
            (Some(policy), _) => policy,
            (None, Some(name)) => name
                .parse()
                .map_err(|_| ConfigError::InvalidPolicy { value: name })?,
            (None, None) => PolicyKind::default(),
        };

        let mut packages = if !args.packages.is_empty() {
            args.packages.iter().cloned().map(ManagedPackage::new).collect()
        } else if !file.packages.is_empty() {
            file.packages
                .into_iter()
                .map(package_from_entry)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            default_packages()
        };

        if let Some(pin) = &args.pin_version {
            for package in &mut packages {
                if package.spec.requested_version.is_none() {
                    package.spec.requested_version = Some(pin.clone());
                }
            }
        }
        config.packages = dedup_packages(packages)?;

        config.include_prerelease = args.prerelease;
        config.dry_run = args.dry_run;
        config.jobs = args.jobs.max(1) as usize;
        config.retries = args.retries;
        config.timeout = Duration::from_secs(args.timeout.max(1));
        Ok(config)
    }

    /// Every library file the run manages, in package order
    pub fn required_libraries(&self) -> Vec<String> {
        self.packages
            .iter()
            .flat_map(|p| p.libraries.iter().cloned())
            .collect()
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy::with_retries(self.retries)
    }
}

fn package_from_entry(entry: PackageEntry) -> Result<ManagedPackage, ConfigError> {
    let spec = PackageSpec::parse(&entry.name)
        .map_err(|message| ConfigError::invalid_package_spec(&entry.name, message))?;
    if spec.requested_version.is_some() && entry.version.is_some() {
        return Err(ConfigError::invalid_package_spec(
            &entry.name,
            "version given both inline and in the 'version' key",
        ));
    }
    let spec = match entry.version {
        Some(version) => PackageSpec::pinned(spec.name, version),
        None => spec,
    };

    let mut package = ManagedPackage::new(spec).with_libraries(entry.libraries);
    if let Some(source) = entry.source {
        package = package.with_source(source);
    }
    if let Some(checksum) = entry.checksum {
        let parsed = Checksum::parse_tagged(&checksum).ok_or_else(|| ConfigError::InvalidChecksum {
            package: entry.name.clone(),
            value: checksum.clone(),
        })?;
        package = package.with_checksum(parsed);
    }
    Ok(package)
}

/// Reject a package listed twice; two entries would fight over the same files
fn dedup_packages(packages: Vec<ManagedPackage>) -> Result<Vec<ManagedPackage>, ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for package in &packages {
        if !seen.insert(package.name().to_lowercase()) {
            return Err(ConfigError::invalid_package_spec(package.name(), "package listed more than once"));
        }
    }
    Ok(packages)
}
