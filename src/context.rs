//! Per-run state threaded through the pipeline

use crate::backup::{prepare_run_dir, BackupRecord};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Run ids are UTC timestamps with millisecond precision
pub const RUN_ID_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

fn has_file_name(path: &Path, name: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.eq_ignore_ascii_case(name))
}

/// Shared flag set when the user interrupts the run
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State owned by a single run
#[derive(Debug)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub target_dir: PathBuf,
    pub backup_root: PathBuf,
    /// Created lazily before the first mutation
    pub backup_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub cancel: CancelFlag,
    /// Every backup taken so far in this run
    pub records: Vec<BackupRecord>,
    /// Artifacts this run adds that did not exist before it
    pub created: Vec<PathBuf>,
}

impl RunContext {
    pub fn new(target_dir: impl Into<PathBuf>, backup_root: impl Into<PathBuf>, dry_run: bool) -> Self {
        let started_at = Utc::now();
        Self {
            run_id: started_at.format(RUN_ID_FORMAT).to_string(),
            started_at,
            target_dir: target_dir.into(),
            backup_root: backup_root.into(),
            backup_dir: None,
            dry_run,
            cancel: CancelFlag::new(),
            records: Vec::new(),
            created: Vec::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Where this run's backups would go; the id may still gain a suffix
    pub fn planned_backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.backup_root.join(&self.run_id))
    }

    /// Create the run's backup directory on first use
    ///
    /// A collision with an existing run directory adopts a suffixed id, which
    /// becomes this run's id from then on.
    pub fn prepare_backup_dir(&mut self) -> std::io::Result<PathBuf> {
        if let Some(dir) = &self.backup_dir {
            return Ok(dir.clone());
        }
        let (run_id, dir) = prepare_run_dir(&self.backup_root, &self.run_id)?;
        self.run_id = run_id;
        self.backup_dir = Some(dir.clone());
        Ok(dir)
    }

    /// The backup already taken of `filename` in this run
    ///
    /// Each artifact is backed up at most once per run, by the first package
    /// that lists it.
    pub fn backup_of(&self, filename: &str) -> Option<&BackupRecord> {
        self.records
            .iter()
            .find(|r| has_file_name(&r.original_path, filename))
    }

    /// Whether `filename` was absent before the run and is added by it
    pub fn is_created(&self, filename: &str) -> bool {
        self.created.iter().any(|p| has_file_name(p, filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_id_format() {
        let ctx = RunContext::new("dll", "backups", false);
        assert_eq!(ctx.run_id.len(), "20250101T000000.000Z".len());
        assert!(ctx.run_id.ends_with('Z'));
        assert_eq!(&ctx.run_id[8..9], "T");
    }

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let ctx = RunContext::new("dll", "backups", false).with_cancel_flag(flag.clone());
        assert!(!ctx.is_cancelled());
        flag.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_prepare_backup_dir_is_lazy_and_stable() {
        let root = TempDir::new().unwrap();
        let mut ctx = RunContext::new("dll", root.path().join("backups"), false);
        assert!(ctx.backup_dir.is_none());
        assert_eq!(ctx.planned_backup_dir(), root.path().join("backups").join(&ctx.run_id));

        let first = ctx.prepare_backup_dir().unwrap();
        let second = ctx.prepare_backup_dir().unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
        assert!(first.ends_with(&ctx.run_id));
    }

    #[test]
    fn test_lookups_ignore_file_name_case() {
        let mut ctx = RunContext::new("dll", "backups", false);
        ctx.records.push(BackupRecord {
            package: "LibA".to_string(),
            original_path: PathBuf::from("dll/Common.dll"),
            backup_path: PathBuf::from("backups/run/LibA/Common.dll"),
            run_id: ctx.run_id.clone(),
        });
        ctx.created.push(PathBuf::from("dll/LibA.Core.dll"));

        assert!(ctx.backup_of("common.DLL").is_some());
        assert!(ctx.backup_of("LibA.Core.dll").is_none());
        assert!(ctx.is_created("liba.core.dll"));
        assert!(!ctx.is_created("Common.dll"));
    }

    #[test]
    fn test_two_runs_same_instant_get_distinct_dirs() {
        let root = TempDir::new().unwrap();
        let mut a = RunContext::new("dll", root.path(), false);
        let mut b = RunContext::new("dll", root.path(), false);
        b.run_id = a.run_id.clone();

        let dir_a = a.prepare_backup_dir().unwrap();
        let dir_b = b.prepare_backup_dir().unwrap();
        assert_ne!(dir_a, dir_b);
        assert_ne!(a.run_id, b.run_id);
    }
}
