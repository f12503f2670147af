//! CLI argument parsing module for libmigrate

use crate::domain::PackageSpec;
use crate::extractor::PolicyKind;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Parse `NAME` or `NAME@VERSION`
fn parse_package_spec(s: &str) -> Result<PackageSpec, String> {
    PackageSpec::parse(s)
}

fn parse_policy(s: &str) -> Result<PolicyKind, String> {
    s.parse()
}

/// Migrates versioned native libraries from a package registry
#[derive(Parser, Debug, Clone)]
#[command(
    name = "libmigrate",
    version,
    disable_version_flag = true,
    about = "Resolve, download and swap in versioned library artifacts with rollback"
)]
pub struct CliArgs {
    /// Directory holding the managed libraries
    #[arg(default_value = "dll")]
    pub target_dir: PathBuf,

    // Package selection
    /// Package to migrate as NAME or NAME@VERSION (can be specified multiple times)
    #[arg(short, long = "package", action = ArgAction::Append, value_parser = parse_package_spec)]
    pub packages: Vec<PackageSpec>,

    /// Pin every package without its own version to this version
    #[arg(long = "version", value_name = "VERSION")]
    pub pin_version: Option<String>,

    /// TOML config file with registry settings and the package list
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Include pre-release versions when resolving "latest"
    #[arg(long)]
    pub prerelease: bool,

    // Platform selection
    /// Target framework moniker, e.g. net8.0 or netstandard2.0
    #[arg(long, value_name = "TFM")]
    pub framework: Option<String>,

    /// Accept Windows-only builds such as net8.0-windows
    #[arg(long)]
    pub allow_windows_only: bool,

    /// Artifact selection policy: newest or exact
    #[arg(long, value_parser = parse_policy)]
    pub policy: Option<PolicyKind>,

    // Registry
    /// NuGet v3 flat container base URL
    #[arg(long, value_name = "URL")]
    pub registry: Option<String>,

    /// Maximum concurrent downloads
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=32))]
    pub jobs: u32,

    /// Retries after a failed request
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    pub timeout: u64,

    // Backups
    /// Where run backups are kept (default: <TARGET_DIR>-backups)
    #[arg(long, value_name = "DIR")]
    pub backup_root: Option<PathBuf>,

    /// List complete backups and exit
    #[arg(long, conflicts_with_all = ["restore", "dry_run"])]
    pub list_backups: bool,

    /// Restore the target directory from a run's backup and exit
    #[arg(long, value_name = "RUN_ID", conflicts_with = "dry_run")]
    pub restore: Option<String>,

    // General options
    /// Dry run mode - show what would be installed without making changes
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable quiet mode - minimal output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output results in JSON format
    #[arg(long)]
    pub json: bool,

    /// Append the run log to this file (default: <BACKUP_ROOT>/libmigrate.log)
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Print version
    #[arg(short = 'V', long = "print-version")]
    pub print_version: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_args() {
        let args = CliArgs::parse_from(["libmigrate"]);
        assert_eq!(args.target_dir, PathBuf::from("dll"));
        assert!(args.packages.is_empty());
        assert!(args.pin_version.is_none());
        assert!(args.config.is_none());
        assert!(!args.prerelease);
        assert!(args.framework.is_none());
        assert!(!args.allow_windows_only);
        assert!(args.policy.is_none());
        assert_eq!(args.jobs, 1);
        assert_eq!(args.retries, 3);
        assert_eq!(args.timeout, 30);
        assert!(!args.dry_run);
        assert!(!args.verbose);
        assert!(!args.quiet);
        assert!(!args.json);
        assert!(!args.list_backups);
        assert!(args.restore.is_none());
    }

    #[test]
    fn test_target_dir_argument() {
        let args = CliArgs::parse_from(["libmigrate", "/opt/app/dll"]);
        assert_eq!(args.target_dir, PathBuf::from("/opt/app/dll"));
    }

    #[test]
    fn test_package_multiple() {
        let args = CliArgs::parse_from(["libmigrate", "-p", "LibA@2.0.0", "--package", "LibB"]);
        assert_eq!(
            args.packages,
            vec![PackageSpec::pinned("LibA", "2.0.0"), PackageSpec::new("LibB")]
        );
    }

    #[test]
    fn test_invalid_package_rejected() {
        assert!(CliArgs::try_parse_from(["libmigrate", "-p", "@1.0"]).is_err());
    }

    #[test]
    fn test_version_is_a_pin() {
        let args = CliArgs::parse_from(["libmigrate", "--version", "19.84.1"]);
        assert_eq!(args.pin_version.as_deref(), Some("19.84.1"));
        assert!(!args.print_version);
    }

    #[test]
    fn test_print_version_flag() {
        let args = CliArgs::parse_from(["libmigrate", "-V"]);
        assert!(args.print_version);
    }

    #[test]
    fn test_dry_run_flags() {
        assert!(CliArgs::parse_from(["libmigrate", "-n"]).dry_run);
        assert!(CliArgs::parse_from(["libmigrate", "--dry-run"]).dry_run);
    }

    #[test]
    fn test_policy_values() {
        let args = CliArgs::parse_from(["libmigrate", "--policy", "exact"]);
        assert_eq!(args.policy, Some(PolicyKind::Exact));
        assert!(CliArgs::try_parse_from(["libmigrate", "--policy", "oldest"]).is_err());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(CliArgs::try_parse_from(["libmigrate", "-q", "--verbose"]).is_err());
    }

    #[test]
    fn test_restore_conflicts_with_dry_run() {
        assert!(CliArgs::try_parse_from(["libmigrate", "--restore", "x", "-n"]).is_err());
        assert!(CliArgs::try_parse_from(["libmigrate", "--list-backups", "--restore", "x"]).is_err());
    }

    #[test]
    fn test_jobs_range() {
        assert_eq!(CliArgs::parse_from(["libmigrate", "-j", "4"]).jobs, 4);
        assert!(CliArgs::try_parse_from(["libmigrate", "-j", "0"]).is_err());
    }

    #[test]
    fn test_platform_flags() {
        let args = CliArgs::parse_from([
            "libmigrate",
            "--framework",
            "net6.0",
            "--allow-windows-only",
        ]);
        assert_eq!(args.framework.as_deref(), Some("net6.0"));
        assert!(args.allow_windows_only);
    }
}
