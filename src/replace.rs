//! Atomic replacement of artifacts in the target directory

use crate::backup::{existing_artifacts, BackupRecord};
use crate::context::RunContext;
use crate::domain::{ArtifactAction, ArtifactOutcome, ExtractedArtifact, PackageVersion};
use crate::error::MigrationError;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// Write `bytes` to `dest` through a synced temp file in `dir` and a rename
///
/// `dir` must be on the same filesystem as `dest`.
pub(crate) fn write_atomic(dir: &Path, dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".libmigrate-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// A replacement that stopped part-way
#[derive(Debug)]
pub struct ApplyFailure {
    pub error: MigrationError,
    /// Artifacts written before the failure
    pub completed: Vec<ArtifactOutcome>,
}

/// Writes extracted artifacts into the target directory
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplacementEngine;

impl ReplacementEngine {
    pub fn new() -> Self {
        Self
    }

    /// Install `artifacts`, or describe what would be installed on a dry run
    pub fn apply(
        &self,
        ctx: &RunContext,
        package: &str,
        version: &PackageVersion,
        artifacts: &[ExtractedArtifact],
        backups: &[BackupRecord],
    ) -> Result<Vec<ArtifactOutcome>, ApplyFailure> {
        let mut completed = Vec::with_capacity(artifacts.len());
        let fail = |error: MigrationError, completed: Vec<ArtifactOutcome>| ApplyFailure { error, completed };

        let existing = match existing_artifacts(&ctx.target_dir) {
            Ok(existing) => existing,
            Err(e) => {
                let error = MigrationError::replacement(package, version.to_string(), &ctx.target_dir, e.to_string());
                return Err(fail(error, completed));
            }
        };

        for artifact in artifacts {
            let filename = artifact.filename();
            let current = existing.get(&filename.to_lowercase());
            let dest = current.cloned().unwrap_or_else(|| ctx.target_dir.join(filename));

            let action = match (ctx.dry_run, current.is_some()) {
                (true, true) => ArtifactAction::WouldReplace,
                (true, false) => ArtifactAction::WouldCreate,
                (false, true) => ArtifactAction::Replaced,
                (false, false) => ArtifactAction::Created,
            };

            if !ctx.dry_run {
                if ctx.is_cancelled() {
                    let stage = format!("writing {}", filename);
                    let error = MigrationError::aborted(package, Some(version.to_string()), stage);
                    return Err(fail(error, completed));
                }

                let backed_up = backups.iter().any(|b| b.original_path == dest);
                if current.is_some() && !backed_up && !ctx.is_created(filename) {
                    let error = MigrationError::replacement(
                        package,
                        version.to_string(),
                        &dest,
                        "refusing to overwrite an artifact that was not backed up",
                    );
                    return Err(fail(error, completed));
                }

                if let Err(e) = write_atomic(&ctx.target_dir, &dest, &artifact.contents) {
                    let error = MigrationError::replacement(package, version.to_string(), &dest, e.to_string());
                    return Err(fail(error, completed));
                }
            }

            info!(
                package,
                %version,
                file = %dest.display(),
                moniker = %artifact.candidate.framework_moniker,
                action = %action,
                "artifact"
            );
            completed.push(ArtifactOutcome {
                filename: filename.to_string(),
                version: version.clone(),
                moniker: artifact.candidate.framework_moniker.clone(),
                action,
                size: artifact.size(),
            });
        }

        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupManager;
    use crate::domain::{ArtifactCandidate, FrameworkMoniker};
    use tempfile::TempDir;

    fn artifact(name: &str, contents: &[u8]) -> ExtractedArtifact {
        ExtractedArtifact {
            candidate: ArtifactCandidate::new(
                format!("lib/net8.0/{}", name),
                name,
                FrameworkMoniker::parse("net8.0").unwrap(),
            ),
            contents: contents.to_vec(),
        }
    }

    fn v() -> PackageVersion {
        PackageVersion::parse("2.0.0").unwrap()
    }

    fn setup() -> (TempDir, RunContext) {
        let root = TempDir::new().unwrap();
        let target = root.path().join("dll");
        std::fs::create_dir(&target).unwrap();
        let ctx = RunContext::new(&target, root.path().join("backups"), false);
        (root, ctx)
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("LibA.dll");
        std::fs::write(&dest, b"old").unwrap();
        write_atomic(dir.path(), &dest, b"new").unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
        // No temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_apply_replaces_backed_up_and_creates_new() {
        let (_root, mut ctx) = setup();
        std::fs::write(ctx.target_dir.join("LibA.dll"), b"old").unwrap();
        let libraries = vec!["LibA.dll".to_string(), "LibA.Core.dll".to_string()];
        let backups = BackupManager::new()
            .snapshot(&mut ctx, "LibA", Some("2.0.0"), &libraries)
            .unwrap();

        let outcomes = ReplacementEngine::new()
            .apply(
                &ctx,
                "LibA",
                &v(),
                &[artifact("LibA.dll", b"new"), artifact("LibA.Core.dll", b"core")],
                &backups,
            )
            .unwrap();

        assert_eq!(outcomes[0].action, ArtifactAction::Replaced);
        assert_eq!(outcomes[1].action, ArtifactAction::Created);
        assert_eq!(outcomes[0].size, 3);
        assert_eq!(outcomes[1].size, 4);
        assert_eq!(std::fs::read(ctx.target_dir.join("LibA.dll")).unwrap(), b"new");
        assert_eq!(std::fs::read(ctx.target_dir.join("LibA.Core.dll")).unwrap(), b"core");
    }

    #[test]
    fn test_apply_keeps_existing_file_name_case() {
        let (_root, mut ctx) = setup();
        std::fs::write(ctx.target_dir.join("liba.dll"), b"old").unwrap();
        let backups = BackupManager::new()
            .snapshot(&mut ctx, "LibA", None, &["LibA.dll".to_string()])
            .unwrap();

        ReplacementEngine::new()
            .apply(&ctx, "LibA", &v(), &[artifact("LibA.dll", b"new")], &backups)
            .unwrap();
        assert_eq!(std::fs::read(ctx.target_dir.join("liba.dll")).unwrap(), b"new");
        assert_eq!(std::fs::read_dir(&ctx.target_dir).unwrap().count(), 1);
    }

    #[test]
    fn test_apply_refuses_without_backup() {
        let (_root, ctx) = setup();
        std::fs::write(ctx.target_dir.join("LibA.dll"), b"old").unwrap();

        let failure = ReplacementEngine::new()
            .apply(&ctx, "LibA", &v(), &[artifact("LibA.dll", b"new")], &[])
            .unwrap_err();
        assert!(matches!(failure.error, MigrationError::Replacement { .. }));
        assert_eq!(std::fs::read(ctx.target_dir.join("LibA.dll")).unwrap(), b"old");
    }

    #[test]
    fn test_apply_overwrites_artifact_added_earlier_in_run() {
        let (_root, mut ctx) = setup();
        let manager = BackupManager::new();
        let common = vec!["Common.dll".to_string()];
        let engine = ReplacementEngine::new();

        let first = manager.snapshot(&mut ctx, "LibA", None, &common).unwrap();
        engine
            .apply(&ctx, "LibA", &v(), &[artifact("Common.dll", b"A")], &first)
            .unwrap();

        let second = manager.snapshot(&mut ctx, "LibB", None, &common).unwrap();
        assert!(second.is_empty());
        let outcomes = engine
            .apply(&ctx, "LibB", &v(), &[artifact("Common.dll", b"B")], &second)
            .unwrap();
        assert_eq!(outcomes[0].action, ArtifactAction::Replaced);
        assert_eq!(std::fs::read(ctx.target_dir.join("Common.dll")).unwrap(), b"B");
    }

    #[test]
    fn test_dry_run_never_writes() {
        let (_root, mut ctx) = setup();
        ctx.dry_run = true;
        std::fs::write(ctx.target_dir.join("LibA.dll"), b"old").unwrap();

        let outcomes = ReplacementEngine::new()
            .apply(
                &ctx,
                "LibA",
                &v(),
                &[artifact("LibA.dll", b"new"), artifact("LibA.Core.dll", b"core")],
                &[],
            )
            .unwrap();

        assert_eq!(outcomes[0].action, ArtifactAction::WouldReplace);
        assert_eq!(outcomes[1].action, ArtifactAction::WouldCreate);
        assert_eq!(outcomes[0].version.to_string(), "2.0.0");
        assert_eq!(std::fs::read(ctx.target_dir.join("LibA.dll")).unwrap(), b"old");
        assert!(!ctx.target_dir.join("LibA.Core.dll").exists());
    }

    #[test]
    fn test_cancel_stops_before_write() {
        let (_root, ctx) = setup();
        ctx.cancel.cancel();

        let failure = ReplacementEngine::new()
            .apply(&ctx, "LibA", &v(), &[artifact("LibA.dll", b"new")], &[])
            .unwrap_err();
        assert!(matches!(failure.error, MigrationError::Aborted { .. }));
        assert!(failure.completed.is_empty());
        assert!(!ctx.target_dir.join("LibA.dll").exists());
    }
}
