//! Package archive retrieval
//!
//! Downloads go into a run-scoped work directory. Every attempt rewrites the
//! archive file from scratch, so a failed attempt never leaves a partial file
//! that a later attempt appends to.

use crate::domain::ResolvedPackage;
use crate::error::{MigrationError, RegistryError};
use crate::registry::{backoff_delay, PackageRegistry, BASE_DELAY_MS, MAX_DELAY, MAX_RETRIES};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry settings for downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl FetchPolicy {
    /// `retries` extra attempts after the first
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES + 1,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            max_delay: MAX_DELAY,
        }
    }
}

/// A downloaded, verified archive on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArchive {
    pub path: PathBuf,
    pub size: u64,
}

/// Downloads package archives into a work directory
#[derive(Debug, Clone)]
pub struct PackageFetcher {
    work_dir: PathBuf,
    policy: FetchPolicy,
}

impl PackageFetcher {
    pub fn new(work_dir: impl Into<PathBuf>, policy: FetchPolicy) -> Self {
        Self {
            work_dir: work_dir.into(),
            policy,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn archive_path(&self, resolved: &ResolvedPackage) -> PathBuf {
        self.work_dir.join(format!(
            "{}.{}.nupkg",
            resolved.name.to_lowercase(),
            resolved.version.normalized()
        ))
    }

    /// Download and verify the archive for `resolved`, retrying transient failures
    pub async fn fetch(
        &self,
        resolved: &ResolvedPackage,
        registry: &dyn PackageRegistry,
    ) -> Result<LocalArchive, MigrationError> {
        let path = self.archive_path(resolved);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.fetch_once(resolved, registry, &path).await {
                Ok(archive) => {
                    info!(package = %resolved.name, version = %resolved.version, size = archive.size, "fetched archive");
                    return Ok(archive);
                }
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = backoff_delay(attempt, self.policy.base_delay, self.policy.max_delay);
                    warn!(package = %resolved.name, attempt = attempt + 1, ?delay, error = %e, "download failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(e);
                }
            }
        }
    }

    async fn fetch_once(
        &self,
        resolved: &ResolvedPackage,
        registry: &dyn PackageRegistry,
        path: &Path,
    ) -> Result<LocalArchive, MigrationError> {
        let version = resolved.version.to_string();
        debug!(url = %resolved.download_url, "downloading");

        let payload = registry
            .fetch_archive(&resolved.name, &resolved.version)
            .await
            .map_err(|e| match e {
                RegistryError::PackageNotFound { .. } => MigrationError::version_not_found(
                    &resolved.name,
                    &version,
                    registry.registry_name(),
                    Vec::new(),
                ),
                other => MigrationError::download(&resolved.name, &version, other.to_string()),
            })?;

        // A pinned checksum takes precedence over the registry's
        if let Some(expected) = resolved.checksum.as_ref().or(payload.checksum.as_ref()) {
            if !expected.matches(&payload.bytes) {
                return Err(MigrationError::download(
                    &resolved.name,
                    &version,
                    format!("checksum mismatch (expected {})", expected),
                ));
            }
            debug!(package = %resolved.name, algorithm = %expected.algorithm(), "checksum verified");
        }

        tokio::fs::write(path, &payload.bytes).await.map_err(|e| {
            MigrationError::download(
                &resolved.name,
                &version,
                format!("failed to write {}: {}", path.display(), e),
            )
        })?;

        Ok(LocalArchive {
            path: path.to_path_buf(),
            size: payload.bytes.len() as u64,
        })
    }
}
