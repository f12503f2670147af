//! Backups of artifacts about to be overwritten
//!
//! Layout of a run's backup directory:
//!
//! ```text
//! <backup_root>/<run_id>/
//!     manifest.json
//!     <package>/<file>
//! ```
//!
//! Copies for a package are made in a `.staging-<package>` directory and
//! renamed into place only after every copy succeeded. The manifest is
//! rewritten atomically after each package, and only what it lists is ever
//! restored.

use crate::context::RunContext;
use crate::error::{IoError, MigrationError};
use crate::replace::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the per-run manifest
pub const MANIFEST_FILE: &str = "manifest.json";

const STAGING_PREFIX: &str = ".staging-";

/// Attempts at finding a free run directory name
const MAX_RUN_DIR_ATTEMPTS: u32 = 1000;

/// One artifact copied out of the target directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub package: String,
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub run_id: String,
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub target_dir: PathBuf,
    pub records: Vec<BackupRecord>,
    /// Artifacts the run added that did not exist before it
    #[serde(default)]
    pub created: Vec<PathBuf>,
}

/// A complete backup found under a backup root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSummary {
    pub run_id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub target_dir: PathBuf,
    pub artifacts: usize,
}

/// Create `<root>/<run_id>` exclusively, suffixing the id on collision
pub fn prepare_run_dir(root: &Path, run_id: &str) -> io::Result<(String, PathBuf)> {
    std::fs::create_dir_all(root)?;
    for attempt in 0..MAX_RUN_DIR_ATTEMPTS {
        let id = if attempt == 0 {
            run_id.to_string()
        } else {
            format!("{}-{}", run_id, attempt)
        };
        let dir = root.join(&id);
        match std::fs::create_dir(&dir) {
            Ok(()) => {
                info!(path = %dir.display(), "created backup directory");
                return Ok((id, dir));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free backup directory for run {}", run_id),
    ))
}

/// Files in `target_dir`, keyed by lowercase file name
pub fn existing_artifacts(target_dir: &Path) -> io::Result<HashMap<String, PathBuf>> {
    let mut found = HashMap::new();
    let entries = match std::fs::read_dir(target_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                found.insert(name.to_lowercase(), entry.path());
            }
        }
    }
    Ok(found)
}

/// A run id names exactly one directory directly under the backup root
fn is_plain_run_id(run_id: &str) -> bool {
    if run_id.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(run_id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn read_manifest(run_dir: &Path) -> Result<BackupManifest, IoError> {
    let path = run_dir.join(MANIFEST_FILE);
    let bytes = std::fs::read(&path).map_err(|e| IoError::generic(&path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| IoError::invalid_manifest(&path, e.to_string()))
}

fn write_manifest(run_dir: &Path, manifest: &BackupManifest) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(manifest).map_err(io::Error::other)?;
    write_atomic(run_dir, &run_dir.join(MANIFEST_FILE), &bytes)
}

/// Takes and restores backups
#[derive(Debug, Clone, Copy, Default)]
pub struct BackupManager;

impl BackupManager {
    pub fn new() -> Self {
        Self
    }

    /// Copy every existing artifact named in `libraries` into the run's backup
    ///
    /// Either all matching artifacts are backed up and listed in the manifest,
    /// or nothing is and `Backup` is returned. An artifact an earlier package
    /// of the run already backed up or created is not copied again: its
    /// existing record is returned instead, so the manifest keeps the
    /// pre-run copy.
    pub fn snapshot(
        &self,
        ctx: &mut RunContext,
        package: &str,
        version: Option<&str>,
        libraries: &[String],
    ) -> Result<Vec<BackupRecord>, MigrationError> {
        let fail = |path: &Path, e: io::Error| {
            MigrationError::backup(package, version.map(str::to_string), path, e)
        };

        let existing = existing_artifacts(&ctx.target_dir).map_err(|e| fail(&ctx.target_dir, e))?;
        let mut reused = Vec::new();
        let mut to_copy = Vec::new();
        let mut to_create = Vec::new();
        for library in libraries {
            if let Some(record) = ctx.backup_of(library) {
                debug!(
                    package,
                    library = %library,
                    by = %record.package,
                    "already backed up in this run"
                );
                reused.push(record.clone());
                continue;
            }
            if ctx.is_created(library) {
                debug!(package, library = %library, "added earlier in this run");
                continue;
            }
            match existing.get(&library.to_lowercase()) {
                Some(path) => to_copy.push(path.clone()),
                None => to_create.push(ctx.target_dir.join(library)),
            }
        }

        let planned = ctx.planned_backup_dir();
        let run_dir = ctx.prepare_backup_dir().map_err(|e| fail(&planned, e))?;
        let package_dir = free_package_dir(&run_dir, package);
        let staging = run_dir.join(format!("{}{}", STAGING_PREFIX, package));

        let staged = if to_copy.is_empty() {
            Ok(Vec::new())
        } else {
            stage_copies(&staging, &package_dir, &to_copy)
        };
        let records = match staged {
            Ok(copied) => copied
                .into_iter()
                .map(|(original_path, backup_path)| BackupRecord {
                    package: package.to_string(),
                    original_path,
                    backup_path,
                    run_id: ctx.run_id.clone(),
                })
                .collect::<Vec<_>>(),
            Err((path, e)) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        warn!(path = %staging.display(), error = %cleanup, "failed to remove staging directory");
                    }
                }
                return Err(fail(&path, e));
            }
        };

        let mut manifest = BackupManifest {
            run_id: ctx.run_id.clone(),
            created_at: ctx.started_at,
            target_dir: ctx.target_dir.clone(),
            records: ctx.records.clone(),
            created: ctx.created.clone(),
        };
        manifest.records.extend(records.iter().cloned());
        manifest.created.extend(to_create.iter().cloned());

        if let Err(e) = write_manifest(&run_dir, &manifest) {
            // Unlisted copies are not a recovery point; drop them
            if let Err(cleanup) = std::fs::remove_dir_all(&package_dir) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(
                        path = %package_dir.display(),
                        error = %cleanup,
                        "failed to remove unlisted backup copies"
                    );
                }
            }
            return Err(fail(&run_dir.join(MANIFEST_FILE), e));
        }

        for record in &records {
            info!(
                package,
                from = %record.original_path.display(),
                to = %record.backup_path.display(),
                "backed up"
            );
        }
        ctx.records.extend(records.iter().cloned());
        ctx.created.extend(to_create);
        reused.extend(records);
        Ok(reused)
    }

    /// Complete backups under `backup_root`, newest first
    pub fn list_backups(&self, backup_root: &Path) -> Result<Vec<BackupSummary>, IoError> {
        let entries = match std::fs::read_dir(backup_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IoError::generic(backup_root, e)),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| IoError::generic(backup_root, e))?;
            let path = entry.path();
            if !path.join(MANIFEST_FILE).is_file() {
                continue;
            }
            match read_manifest(&path) {
                Ok(manifest) => backups.push(BackupSummary {
                    run_id: manifest.run_id,
                    path,
                    created_at: manifest.created_at,
                    target_dir: manifest.target_dir,
                    artifacts: manifest.records.len(),
                }),
                Err(e) => warn!(error = %e, "skipping unreadable backup"),
            }
        }

        backups.sort_by(|a, b| b.run_id.cmp(&a.run_id));
        Ok(backups)
    }

    /// Copy a run's backed-up artifacts back into `target_dir`
    ///
    /// Artifacts the run created are removed, so the directory ends up with
    /// the artifact set it had before the run. Returns the restored paths.
    pub fn restore(&self, backup_root: &Path, run_id: &str, target_dir: &Path) -> Result<Vec<PathBuf>, IoError> {
        if !is_plain_run_id(run_id) {
            return Err(IoError::invalid_run_id(run_id));
        }
        let run_dir = backup_root.join(run_id);
        if !run_dir.join(MANIFEST_FILE).is_file() {
            return Err(IoError::backup_not_found(run_id, backup_root));
        }
        let manifest = read_manifest(&run_dir)?;

        std::fs::create_dir_all(target_dir).map_err(|e| IoError::generic(target_dir, e))?;

        let mut restored = Vec::with_capacity(manifest.records.len());
        for record in &manifest.records {
            let Some(name) = record.original_path.file_name() else {
                return Err(IoError::invalid_manifest(
                    run_dir.join(MANIFEST_FILE),
                    format!("record without a file name: {}", record.original_path.display()),
                ));
            };
            let dest = target_dir.join(name);
            let bytes = std::fs::read(&record.backup_path).map_err(|e| IoError::generic(&record.backup_path, e))?;
            write_atomic(target_dir, &dest, &bytes).map_err(|e| IoError::generic(&dest, e))?;
            info!(path = %dest.display(), "restored");
            restored.push(dest);
        }

        for created in &manifest.created {
            let Some(name) = created.file_name() else { continue };
            let dest = target_dir.join(name);
            match std::fs::remove_file(&dest) {
                Ok(()) => info!(path = %dest.display(), "removed artifact added by run"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(IoError::generic(&dest, e)),
            }
        }

        debug!(run_id, count = restored.len(), "restore complete");
        Ok(restored)
    }
}

/// `<run_dir>/<package>`, suffixed if the package was already backed up this run
fn free_package_dir(run_dir: &Path, package: &str) -> PathBuf {
    let mut candidate = run_dir.join(package);
    let mut n = 1;
    while candidate.exists() {
        candidate = run_dir.join(format!("{}-{}", package, n));
        n += 1;
    }
    candidate
}

/// Copy `sources` into `staging`, then rename it to `final_dir`
fn stage_copies(
    staging: &Path,
    final_dir: &Path,
    sources: &[PathBuf],
) -> Result<Vec<(PathBuf, PathBuf)>, (PathBuf, io::Error)> {
    if staging.exists() {
        std::fs::remove_dir_all(staging).map_err(|e| (staging.to_path_buf(), e))?;
    }
    std::fs::create_dir(staging).map_err(|e| (staging.to_path_buf(), e))?;

    let mut copied = Vec::with_capacity(sources.len());
    for source in sources {
        let Some(name) = source.file_name() else {
            continue;
        };
        std::fs::copy(source, staging.join(name)).map_err(|e| (source.clone(), e))?;
        copied.push((source.clone(), final_dir.join(name)));
    }

    std::fs::rename(staging, final_dir).map_err(|e| (final_dir.to_path_buf(), e))?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        target: PathBuf,
        backups: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = TempDir::new().unwrap();
        let target = root.path().join("dll");
        let backups = root.path().join("dll-backups");
        std::fs::create_dir(&target).unwrap();
        Fixture {
            _root: root,
            target,
            backups,
        }
    }

    fn libs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prepare_run_dir_suffixes_on_collision() {
        let root = TempDir::new().unwrap();
        let (id1, dir1) = prepare_run_dir(root.path(), "20250101T000000.000Z").unwrap();
        let (id2, dir2) = prepare_run_dir(root.path(), "20250101T000000.000Z").unwrap();
        assert_eq!(id1, "20250101T000000.000Z");
        assert_eq!(id2, "20250101T000000.000Z-1");
        assert_ne!(dir1, dir2);
    }

    #[test]
    fn test_existing_artifacts_case_insensitive() {
        let f = fixture();
        std::fs::write(f.target.join("LibA.dll"), b"a").unwrap();
        std::fs::create_dir(f.target.join("subdir")).unwrap();
        let found = existing_artifacts(&f.target).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("liba.dll"));
        assert!(existing_artifacts(&f.target.join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_copies_byte_identical() {
        let f = fixture();
        std::fs::write(f.target.join("LibA.dll"), b"old A").unwrap();
        std::fs::write(f.target.join("Unrelated.dll"), b"keep").unwrap();
        let mut ctx = RunContext::new(&f.target, &f.backups, false);

        let records = BackupManager::new()
            .snapshot(&mut ctx, "LibA", Some("2.0.0"), &libs(&["liba.dll", "LibA.Core.dll"]))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(std::fs::read(&records[0].backup_path).unwrap(), b"old A");
        assert_eq!(records[0].run_id, ctx.run_id);
        assert_eq!(ctx.records.len(), 1);
        assert_eq!(ctx.created, vec![f.target.join("LibA.Core.dll")]);

        let run_dir = ctx.backup_dir.clone().unwrap();
        assert!(!run_dir.join(".staging-LibA").exists());
        let manifest = read_manifest(&run_dir).unwrap();
        assert_eq!(manifest.records, records);
    }

    #[test]
    fn test_snapshot_accumulates_manifest() {
        let f = fixture();
        std::fs::write(f.target.join("LibA.dll"), b"a").unwrap();
        std::fs::write(f.target.join("LibB.dll"), b"b").unwrap();
        let mut ctx = RunContext::new(&f.target, &f.backups, false);
        let manager = BackupManager::new();

        manager.snapshot(&mut ctx, "LibA", None, &libs(&["LibA.dll"])).unwrap();
        manager.snapshot(&mut ctx, "LibB", None, &libs(&["LibB.dll"])).unwrap();

        let manifest = read_manifest(ctx.backup_dir.as_ref().unwrap()).unwrap();
        assert_eq!(manifest.records.len(), 2);
    }

    #[test]
    fn test_shared_artifact_backed_up_once() {
        let f = fixture();
        std::fs::write(f.target.join("Common.dll"), b"orig common").unwrap();
        let mut ctx = RunContext::new(&f.target, &f.backups, false);
        let manager = BackupManager::new();

        let first = manager
            .snapshot(&mut ctx, "LibA", Some("1.0.0"), &libs(&["LibA.dll", "Common.dll"]))
            .unwrap();
        std::fs::write(f.target.join("Common.dll"), b"A common").unwrap();
        std::fs::write(f.target.join("LibA.dll"), b"A").unwrap();

        let second = manager
            .snapshot(&mut ctx, "LibB", Some("1.0.0"), &libs(&["common.dll", "LibA.dll"]))
            .unwrap();
        assert_eq!(second, first);
        std::fs::write(f.target.join("Common.dll"), b"B common").unwrap();

        let manifest = read_manifest(ctx.backup_dir.as_ref().unwrap()).unwrap();
        assert_eq!(manifest.records.len(), 1);
        assert_eq!(manifest.created, vec![f.target.join("LibA.dll")]);
        assert!(!ctx.backup_dir.as_ref().unwrap().join("LibB").exists());

        manager.restore(&f.backups, &ctx.run_id, &f.target).unwrap();
        assert_eq!(std::fs::read(f.target.join("Common.dll")).unwrap(), b"orig common");
        assert!(!f.target.join("LibA.dll").exists());
    }

    #[test]
    fn test_staging_rename_failure_is_reported() {
        let f = fixture();
        std::fs::write(f.target.join("LibA.dll"), b"a").unwrap();
        let mut ctx = RunContext::new(&f.target, &f.backups, false);
        let run_dir = ctx.prepare_backup_dir().unwrap();

        // Occupy the package directory with a file so the rename fails
        let mut blocked = run_dir.join("LibA");
        std::fs::create_dir(&blocked).unwrap();
        blocked.push("occupied");
        std::fs::write(&blocked, b"x").unwrap();

        let staging = run_dir.join(".staging-LibA");
        let result = stage_copies(&staging, &run_dir.join("LibA"), &[f.target.join("LibA.dll")]);
        assert!(result.is_err());
        assert!(ctx.records.is_empty());
        assert!(!run_dir.join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_snapshot_unwritable_backup_root_fails() {
        let f = fixture();
        std::fs::write(f.target.join("LibA.dll"), b"a").unwrap();
        // A file where the backup root directory should go
        let blocker = f.target.parent().unwrap().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let mut ctx = RunContext::new(&f.target, blocker.join("backups"), false);

        let err = BackupManager::new()
            .snapshot(&mut ctx, "LibA", None, &libs(&["LibA.dll"]))
            .unwrap_err();
        assert!(matches!(err, MigrationError::Backup { .. }));
        assert!(ctx.records.is_empty());
    }

    #[test]
    fn test_list_backups_newest_first() {
        let f = fixture();
        std::fs::write(f.target.join("LibA.dll"), b"a").unwrap();
        let manager = BackupManager::new();

        let mut first = RunContext::new(&f.target, &f.backups, false);
        first.run_id = "20250101T000000.000Z".to_string();
        manager.snapshot(&mut first, "LibA", None, &libs(&["LibA.dll"])).unwrap();

        let mut second = RunContext::new(&f.target, &f.backups, false);
        second.run_id = "20250202T000000.000Z".to_string();
        manager.snapshot(&mut second, "LibA", None, &libs(&["LibA.dll"])).unwrap();

        // Incomplete run: no manifest
        std::fs::create_dir(f.backups.join("20250303T000000.000Z")).unwrap();

        let backups = manager.list_backups(&f.backups).unwrap();
        let ids: Vec<&str> = backups.iter().map(|b| b.run_id.as_str()).collect();
        assert_eq!(ids, vec!["20250202T000000.000Z", "20250101T000000.000Z"]);
        assert_eq!(backups[0].artifacts, 1);
    }

    #[test]
    fn test_list_backups_missing_root() {
        let f = fixture();
        assert!(BackupManager::new().list_backups(&f.backups).unwrap().is_empty());
    }

    #[test]
    fn test_restore_reproduces_pre_run_set() {
        let f = fixture();
        std::fs::write(f.target.join("LibA.dll"), b"old A").unwrap();
        let manager = BackupManager::new();
        let mut ctx = RunContext::new(&f.target, &f.backups, false);
        manager
            .snapshot(&mut ctx, "LibA", None, &libs(&["LibA.dll", "LibA.Core.dll"]))
            .unwrap();

        // Simulate the replacement
        std::fs::write(f.target.join("LibA.dll"), b"new A").unwrap();
        std::fs::write(f.target.join("LibA.Core.dll"), b"new core").unwrap();

        let restored = manager.restore(&f.backups, &ctx.run_id, &f.target).unwrap();
        assert_eq!(restored, vec![f.target.join("LibA.dll")]);
        assert_eq!(std::fs::read(f.target.join("LibA.dll")).unwrap(), b"old A");
        assert!(!f.target.join("LibA.Core.dll").exists());
    }

    #[test]
    fn test_restore_rejects_paths_outside_root() {
        let f = fixture();
        let manager = BackupManager::new();
        for run_id in ["../x", "..", ".", "", "a/b", "a\\b", "/tmp/run"] {
            let err = manager.restore(&f.backups, run_id, &f.target).unwrap_err();
            assert!(matches!(err, IoError::InvalidRunId { .. }), "{:?} accepted", run_id);
        }
        assert!(is_plain_run_id("20250101T000000.000Z-1"));
    }

    #[test]
    fn test_restore_unknown_run() {
        let f = fixture();
        let err = BackupManager::new()
            .restore(&f.backups, "nope", &f.target)
            .unwrap_err();
        assert!(matches!(err, IoError::BackupNotFound { .. }));
    }
}
