//! Run orchestrator coordinating the whole migration workflow
//!
//! This module provides:
//! - Phase 1: resolve → fetch → extract, with at most `jobs` packages in flight
//! - Phase 2: backup → replace, strictly sequential in input order
//! - Cancellation checks between steps
//! - Pre/post verification of the target directory

use crate::backup::BackupManager;
use crate::config::RunConfig;
use crate::context::{CancelFlag, RunContext};
use crate::domain::{
    ExtractedArtifact, ManagedPackage, PlatformFilter, ResolvedPackage, RunReport, UpdateResult,
};
use crate::error::{MigrationError, RegistryError};
use crate::extractor::ArchiveExtractor;
use crate::fetcher::PackageFetcher;
use crate::progress::Progress;
use crate::registry::{HttpClient, PackageRegistry, RegistryPool};
use crate::replace::{ApplyFailure, ReplacementEngine};
use crate::report::ReportBuilder;
use crate::resolver::VersionResolver;
use crate::verify;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Failures that prevent a run from starting at all
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[from] RegistryError),

    #[error("failed to create work directory: {0}")]
    WorkDir(#[from] io::Error),
}

/// Output of phase 1 for one package
#[derive(Debug)]
struct Prepared {
    resolved: ResolvedPackage,
    artifacts: Vec<ExtractedArtifact>,
}

/// Everything a phase 1 task owns
struct PrepareJob {
    package: ManagedPackage,
    registry: Arc<dyn PackageRegistry>,
    resolver: VersionResolver,
    fetcher: Arc<PackageFetcher>,
    extractor: ArchiveExtractor,
    filter: PlatformFilter,
    cancel: CancelFlag,
}

impl PrepareJob {
    async fn run(self) -> Result<Prepared, MigrationError> {
        let name = self.package.name().to_string();
        if self.cancel.is_cancelled() {
            let pin = self.package.spec.requested_version.clone();
            return Err(MigrationError::aborted(&name, pin, "resolve"));
        }

        let resolved = self
            .resolver
            .resolve(&self.package.spec, self.registry.as_ref())
            .await?;
        let resolved = match self.package.checksum.clone() {
            Some(pinned) => resolved.with_checksum(Some(pinned)),
            None => resolved,
        };
        info!(package = %name, version = %resolved.version, url = %resolved.download_url, "resolved");

        if self.cancel.is_cancelled() {
            let version = Some(resolved.version.to_string());
            return Err(MigrationError::aborted(&name, version, "download"));
        }
        let archive = self.fetcher.fetch(&resolved, self.registry.as_ref()).await?;

        let extractor = self.extractor;
        let libraries = self.package.libraries.clone();
        let filter = self.filter;
        let version = resolved.version.clone();
        let task_name = name.clone();
        let artifacts = tokio::task::spawn_blocking(move || {
            extractor.extract(&archive.path, &libraries, &filter, &task_name, &version)
        })
        .await
        .map_err(|e| {
            MigrationError::download(&name, resolved.version.to_string(), format!("extraction task failed: {}", e))
        })??;

        Ok(Prepared { resolved, artifacts })
    }
}

/// Setup failure remembered so every later package reports it too
struct SetupFailure {
    path: PathBuf,
    kind: io::ErrorKind,
    message: String,
}

/// Orchestrator for one migration run
pub struct Orchestrator {
    config: RunConfig,
    pool: RegistryPool,
    resolver: VersionResolver,
    extractor: ArchiveExtractor,
    backups: BackupManager,
    engine: ReplacementEngine,
    cancel: CancelFlag,
    show_progress: bool,
}

impl Orchestrator {
    /// Create an orchestrator talking to the configured registry over HTTP
    pub fn new(config: RunConfig) -> Result<Self, OrchestratorError> {
        let client = HttpClient::with_timeout(config.timeout)?.with_max_retries(config.retries);
        let pool = RegistryPool::new(client, config.registry.clone());
        Ok(Self::with_pool(config, pool))
    }

    /// Create an orchestrator with a prepared registry pool
    pub fn with_pool(config: RunConfig, pool: RegistryPool) -> Self {
        Self {
            resolver: VersionResolver::new().with_prerelease(config.include_prerelease),
            extractor: ArchiveExtractor::new(config.policy.build()),
            config,
            pool,
            backups: BackupManager::new(),
            engine: ReplacementEngine::new(),
            cancel: CancelFlag::new(),
            show_progress: false,
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every package through both phases and report the outcome
    pub async fn run(mut self) -> Result<RunReport, OrchestratorError> {
        let mut ctx = RunContext::new(
            &self.config.target_dir,
            &self.config.backup_root,
            self.config.dry_run,
        )
        .with_cancel_flag(self.cancel.clone());
        info!(
            run_id = %ctx.run_id,
            target = %ctx.target_dir.display(),
            dry_run = ctx.dry_run,
            packages = self.config.packages.len(),
            policy = self.extractor.policy().name(),
            "starting run"
        );

        let required = self.config.required_libraries();
        match verify::inspect(&ctx.target_dir, &required) {
            Ok(state) => debug!(present = ?state.present, missing = ?state.missing, extra = ?state.extra, "target before run"),
            Err(e) => warn!(error = %e, "cannot inspect target directory"),
        }

        let work_dir = tempfile::Builder::new().prefix("libmigrate-").tempdir()?;
        let prepared = self.prepare_all(work_dir.path()).await;

        let mut report = ReportBuilder::new(&ctx);
        let mut progress = Progress::new(self.show_progress);
        progress.start(prepared.len() as u64, "Installing");
        let mut setup_failure = None;
        for (package, outcome) in self.config.packages.iter().zip(prepared) {
            progress.set_message(package.name());
            let result = match outcome {
                Ok(prepared) => self.apply_one(&mut ctx, package, prepared, &mut setup_failure),
                Err(e) => UpdateResult::failed(&e),
            };
            if let Some(failure) = &result.error {
                error!(package = %result.package, kind = %failure.kind, error = %failure.message, "package failed");
            }
            report.add(result);
            progress.inc();
        }
        progress.finish_and_clear();

        if !ctx.dry_run {
            match verify::inspect(&ctx.target_dir, &required) {
                Ok(state) => {
                    for name in &state.missing {
                        warn!(artifact = %name, "required artifact missing after run");
                    }
                    report.set_missing_artifacts(state.missing);
                }
                Err(e) => warn!(error = %e, "cannot inspect target directory"),
            }
        }

        report.sync_context(&ctx);
        self.pool.shutdown();
        let report = report.build();
        let counts = report.counts();
        info!(
            run_id = %report.run_id,
            success = counts.success,
            failed = counts.failed,
            preview = counts.preview,
            replaced = report.total_artifacts_replaced(),
            "run finished"
        );
        Ok(report)
    }

    /// Phase 1 for every package, results in input order
    async fn prepare_all(&mut self, work_dir: &Path) -> Vec<Result<Prepared, MigrationError>> {
        let total = self.config.packages.len();
        let fetcher = Arc::new(PackageFetcher::new(work_dir, self.config.fetch_policy()));
        let semaphore = Arc::new(Semaphore::new(self.config.jobs.max(1)));
        let mut tasks = JoinSet::new();

        for (index, package) in self.config.packages.iter().enumerate() {
            let job = PrepareJob {
                registry: self.pool.get(package.source.as_deref()),
                package: package.clone(),
                resolver: self.resolver,
                fetcher: Arc::clone(&fetcher),
                extractor: self.extractor.clone(),
                filter: self.config.filter.clone(),
                cancel: self.cancel.clone(),
            };
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let name = job.package.name().to_string();
                let pin = job.package.spec.requested_version.clone();
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => job.run().await,
                    Err(_) => Err(MigrationError::aborted(name, pin, "resolve")),
                };
                (index, outcome)
            });
        }

        let mut progress = Progress::new(self.show_progress);
        progress.start(total as u64, "Resolving");
        let mut slots: Vec<Option<Result<Prepared, MigrationError>>> =
            (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!(error = %e, "package task failed to complete"),
            }
            progress.inc();
        }
        progress.finish_and_clear();

        slots
            .into_iter()
            .zip(&self.config.packages)
            .map(|(slot, package)| {
                slot.unwrap_or_else(|| {
                    Err(MigrationError::aborted(
                        package.name(),
                        package.spec.requested_version.clone(),
                        "resolve",
                    ))
                })
            })
            .collect()
    }

    /// Phase 2 for a single package
    fn apply_one(
        &self,
        ctx: &mut RunContext,
        package: &ManagedPackage,
        prepared: Prepared,
        setup_failure: &mut Option<SetupFailure>,
    ) -> UpdateResult {
        let name = package.name();
        let version = &prepared.resolved.version;
        let version_label = version.to_string();

        if ctx.dry_run {
            return match self.engine.apply(ctx, name, version, &prepared.artifacts, &[]) {
                Ok(outcomes) => {
                    for outcome in &outcomes {
                        info!(package = %name, "{}", outcome);
                    }
                    UpdateResult::preview(name, version_label, outcomes)
                }
                Err(ApplyFailure { error, completed }) => UpdateResult::failed_after(&error, completed),
            };
        }

        if ctx.is_cancelled() {
            let error = MigrationError::aborted(name, Some(version_label), "backup");
            return UpdateResult::failed(&error);
        }
        if let Err(e) = Self::ensure_run_dirs(ctx, name, &version_label, setup_failure) {
            return UpdateResult::failed(&e);
        }

        let backups = match self
            .backups
            .snapshot(ctx, name, Some(&version_label), &package.libraries)
        {
            Ok(records) => records,
            Err(e) => return UpdateResult::failed(&e),
        };

        if ctx.is_cancelled() {
            let error = MigrationError::aborted(name, Some(version_label), "replace");
            return UpdateResult::failed(&error);
        }
        match self.engine.apply(ctx, name, version, &prepared.artifacts, &backups) {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    info!(package = %name, "{}", outcome);
                }
                UpdateResult::success(name, version_label, outcomes)
            }
            Err(ApplyFailure { error, completed }) => UpdateResult::failed_after(&error, completed),
        }
    }

    /// Create the target and backup run directories before the first mutation
    fn ensure_run_dirs(
        ctx: &mut RunContext,
        package: &str,
        version: &str,
        setup_failure: &mut Option<SetupFailure>,
    ) -> Result<(), MigrationError> {
        if let Some(failure) = setup_failure {
            return Err(MigrationError::backup(
                package,
                Some(version.to_string()),
                failure.path.clone(),
                io::Error::new(failure.kind, failure.message.clone()),
            ));
        }
        if ctx.backup_dir.is_some() {
            return Ok(());
        }

        let attempt = match std::fs::create_dir_all(&ctx.target_dir) {
            Err(e) => Err((ctx.target_dir.clone(), e)),
            Ok(()) => {
                let planned = ctx.planned_backup_dir();
                ctx.prepare_backup_dir().map_err(|e| (planned, e))
            }
        };

        match attempt {
            Ok(dir) => {
                info!(run_id = %ctx.run_id, backup_dir = %dir.display(), "backup directory ready");
                Ok(())
            }
            Err((path, e)) => {
                error!(path = %path.display(), error = %e, "cannot prepare run directories, no package will be modified");
                *setup_failure = Some(SetupFailure {
                    path: path.clone(),
                    kind: e.kind(),
                    message: e.to_string(),
                });
                Err(MigrationError::backup(package, Some(version.to_string()), path, e))
            }
        }
    }
}
