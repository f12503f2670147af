//! Archive extraction and artifact selection
//!
//! A package archive is a zip file whose libraries live under
//! `lib/<moniker>/<file>`. For each required library the extractor collects
//! the candidates whose moniker the target can load and lets a
//! [`SelectionPolicy`] pick one.

use crate::domain::{ArtifactCandidate, ExtractedArtifact, FrameworkMoniker, PackageVersion, PlatformFilter};
use crate::error::MigrationError;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Strategy for choosing one artifact among compatible candidates
pub trait SelectionPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Pick one of `candidates`, all of which `filter` already accepts
    fn select<'a>(
        &self,
        candidates: &[&'a ArtifactCandidate],
        filter: &PlatformFilter,
    ) -> Option<&'a ArtifactCandidate>;
}

fn newest_key(candidate: &ArtifactCandidate) -> ((u8, u32, u32, u32), bool, u8) {
    let moniker = &candidate.framework_moniker;
    (moniker.rank(), moniker.is_cross_platform(), moniker.specificity())
}

/// Highest compatible moniker wins (the default)
///
/// At equal rank a cross-platform build beats a platform-specific one, then
/// the more specific platform suffix wins, then the lexically first entry path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewestCompatible;

impl SelectionPolicy for NewestCompatible {
    fn name(&self) -> &'static str {
        "newest"
    }

    fn select<'a>(
        &self,
        candidates: &[&'a ArtifactCandidate],
        _filter: &PlatformFilter,
    ) -> Option<&'a ArtifactCandidate> {
        candidates
            .iter()
            .copied()
            .min_by(|a, b| {
                newest_key(b)
                    .cmp(&newest_key(a))
                    .then_with(|| a.archive_entry_path.cmp(&b.archive_entry_path))
            })
    }
}

/// Only a build for exactly the target moniker is accepted
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMoniker;

impl SelectionPolicy for ExactMoniker {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn select<'a>(
        &self,
        candidates: &[&'a ArtifactCandidate],
        filter: &PlatformFilter,
    ) -> Option<&'a ArtifactCandidate> {
        candidates
            .iter()
            .copied()
            .filter(|c| c.framework_moniker.matches_exactly(&filter.target))
            .min_by(|a, b| a.archive_entry_path.cmp(&b.archive_entry_path))
    }
}

/// Policy names accepted on the command line and in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    #[default]
    Newest,
    Exact,
}

impl PolicyKind {
    pub fn build(&self) -> Arc<dyn SelectionPolicy> {
        match self {
            PolicyKind::Newest => Arc::new(NewestCompatible),
            PolicyKind::Exact => Arc::new(ExactMoniker),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newest" | "newest-compatible" => Ok(PolicyKind::Newest),
            "exact" | "exact-moniker" => Ok(PolicyKind::Exact),
            other => Err(format!("unknown policy '{}'", other)),
        }
    }
}

/// Split `lib/<moniker>/<file>` into moniker and file name
fn parse_entry(path: &str) -> Option<(&str, &str)> {
    let mut parts = path.split('/');
    let (root, moniker, file) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || !root.eq_ignore_ascii_case("lib") || file.is_empty() {
        return None;
    }
    Some((moniker, file))
}

/// Opens package archives and picks the artifacts to install
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    policy: Arc<dyn SelectionPolicy>,
}

impl ArchiveExtractor {
    pub fn new(policy: Arc<dyn SelectionPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &dyn SelectionPolicy {
        self.policy.as_ref()
    }

    /// Select and read one artifact per required library
    pub fn extract(
        &self,
        archive_path: &Path,
        required: &[String],
        filter: &PlatformFilter,
        package: &str,
        version: &PackageVersion,
    ) -> Result<Vec<ExtractedArtifact>, MigrationError> {
        let corrupt = |message: String| MigrationError::download(package, version.to_string(), message);

        let file = File::open(archive_path)
            .map_err(|e| corrupt(format!("cannot open {}: {}", archive_path.display(), e)))?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| corrupt(format!("invalid package archive: {}", e)))?;

        let candidates = Self::enumerate(&archive);
        let mut grouped: HashMap<String, Vec<&ArtifactCandidate>> = HashMap::new();
        for candidate in &candidates {
            grouped
                .entry(candidate.target_filename.to_lowercase())
                .or_default()
                .push(candidate);
        }

        let mut selected = Vec::with_capacity(required.len());
        for library in required {
            let all = grouped.get(&library.to_lowercase()).map(Vec::as_slice).unwrap_or(&[]);
            let compatible: Vec<&ArtifactCandidate> = all
                .iter()
                .copied()
                .filter(|c| filter.is_compatible(&c.framework_moniker))
                .collect();
            debug!(
                package,
                library = %library,
                found = all.len(),
                compatible = compatible.len(),
                policy = self.policy.name(),
                "artifact candidates"
            );

            let chosen = self.policy.select(&compatible, filter).ok_or_else(|| {
                let mut available: Vec<String> =
                    all.iter().map(|c| c.framework_moniker.to_string()).collect();
                available.sort();
                available.dedup();
                MigrationError::ArtifactNotFound {
                    package: package.to_string(),
                    version: version.to_string(),
                    library: library.clone(),
                    target: filter.target.to_string(),
                    available,
                }
            })?;

            debug!(package, entry = %chosen.archive_entry_path, "selected artifact");
            selected.push(ArtifactCandidate::new(
                chosen.archive_entry_path.clone(),
                library.clone(),
                chosen.framework_moniker.clone(),
            ));
        }

        let mut artifacts = Vec::with_capacity(selected.len());
        for candidate in selected {
            let mut entry = archive
                .by_name(&candidate.archive_entry_path)
                .map_err(|e| corrupt(format!("cannot read {}: {}", candidate.archive_entry_path, e)))?;
            let mut contents = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut contents)
                .map_err(|e| corrupt(format!("cannot read {}: {}", candidate.archive_entry_path, e)))?;
            artifacts.push(ExtractedArtifact { candidate, contents });
        }

        Ok(artifacts)
    }

    fn enumerate(archive: &zip::ZipArchive<File>) -> Vec<ArtifactCandidate> {
        archive
            .file_names()
            .filter_map(|name| {
                let (moniker, file) = parse_entry(name)?;
                match FrameworkMoniker::parse(moniker) {
                    Some(moniker) => Some(ArtifactCandidate::new(name, file, moniker)),
                    None => {
                        debug!(entry = name, "skipping entry with unknown framework folder");
                        None
                    }
                }
            })
            .collect()
    }
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::new(Arc::new(NewestCompatible))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn build_archive(dir: &Path, entries: &[(&str, &[u8])]) -> std::path::PathBuf {
        let path = dir.join("package.nupkg");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        for (name, contents) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    fn candidate(path: &str) -> ArtifactCandidate {
        let (moniker, file) = parse_entry(path).unwrap();
        ArtifactCandidate::new(path, file, FrameworkMoniker::parse(moniker).unwrap())
    }

    fn filter(target: &str) -> PlatformFilter {
        PlatformFilter::new(FrameworkMoniker::parse(target).unwrap())
    }

    fn v() -> PackageVersion {
        PackageVersion::parse("2.0.0").unwrap()
    }

    #[test]
    fn test_parse_entry() {
        assert_eq!(parse_entry("lib/net8.0/LibA.dll"), Some(("net8.0", "LibA.dll")));
        assert_eq!(parse_entry("Lib/net8.0/LibA.dll"), Some(("net8.0", "LibA.dll")));
        assert_eq!(parse_entry("lib/net8.0/"), None);
        assert_eq!(parse_entry("lib/LibA.dll"), None);
        assert_eq!(parse_entry("ref/net8.0/LibA.dll"), None);
        assert_eq!(parse_entry("lib/net8.0/sub/LibA.dll"), None);
    }

    #[test]
    fn test_newest_prefers_highest_rank() {
        let a = candidate("lib/netstandard2.0/LibA.dll");
        let b = candidate("lib/net6.0/LibA.dll");
        let c = candidate("lib/net8.0/LibA.dll");
        let chosen = NewestCompatible.select(&[&a, &c, &b], &filter("net8.0")).unwrap();
        assert_eq!(chosen.archive_entry_path, "lib/net8.0/LibA.dll");
    }

    #[test]
    fn test_newest_prefers_cross_platform_at_equal_rank() {
        let windows = candidate("lib/net8.0-windows7.0/LibA.dll");
        let portable = candidate("lib/net8.0/LibA.dll");
        let chosen = NewestCompatible
            .select(&[&windows, &portable], &filter("net8.0-windows"))
            .unwrap();
        assert_eq!(chosen.archive_entry_path, "lib/net8.0/LibA.dll");
    }

    #[test]
    fn test_newest_prefers_specific_platform_version() {
        let plain = candidate("lib/net8.0-windows/LibA.dll");
        let versioned = candidate("lib/net8.0-windows7.0/LibA.dll");
        let chosen = NewestCompatible
            .select(&[&plain, &versioned], &filter("net8.0-windows"))
            .unwrap();
        assert_eq!(chosen.archive_entry_path, "lib/net8.0-windows7.0/LibA.dll");
    }

    #[test]
    fn test_newest_ties_broken_by_path() {
        let upper = candidate("lib/NET8.0/LibA.dll");
        let lower = candidate("lib/net8.0/LibA.dll");
        let chosen = NewestCompatible.select(&[&lower, &upper], &filter("net8.0")).unwrap();
        assert_eq!(chosen.archive_entry_path, "lib/NET8.0/LibA.dll");
    }

    #[test]
    fn test_exact_requires_same_moniker() {
        let a = candidate("lib/net6.0/LibA.dll");
        let b = candidate("lib/netstandard2.0/LibA.dll");
        assert!(ExactMoniker.select(&[&a, &b], &filter("net8.0")).is_none());
        assert_eq!(
            ExactMoniker.select(&[&a, &b], &filter("net6.0")).unwrap().archive_entry_path,
            "lib/net6.0/LibA.dll"
        );
    }

    #[test]
    fn test_policy_kind_from_str() {
        assert_eq!("newest".parse::<PolicyKind>().unwrap(), PolicyKind::Newest);
        assert_eq!("EXACT".parse::<PolicyKind>().unwrap(), PolicyKind::Exact);
        assert!("random".parse::<PolicyKind>().is_err());
        assert_eq!(PolicyKind::default().build().name(), "newest");
    }

    #[test]
    fn test_extract_selects_and_reads() {
        let dir = TempDir::new().unwrap();
        let archive = build_archive(
            dir.path(),
            &[
                ("lib/net462/LibA.dll", b"framework"),
                ("lib/netstandard2.0/LibA.dll", b"standard"),
                ("lib/net8.0/LibA.dll", b"modern"),
                ("lib/net8.0/LibA.Core.dll", b"core"),
                ("LibA.nuspec", b"<package/>"),
            ],
        );

        let artifacts = ArchiveExtractor::default()
            .extract(
                &archive,
                &["LibA.dll".to_string(), "liba.core.dll".to_string()],
                &filter("net8.0"),
                "LibA",
                &v(),
            )
            .unwrap();

        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].contents, b"modern");
        assert_eq!(artifacts[0].filename(), "LibA.dll");
        assert_eq!(artifacts[1].contents, b"core");
        assert_eq!(artifacts[1].filename(), "liba.core.dll");
    }

    #[test]
    fn test_extract_missing_platform_lists_monikers() {
        let dir = TempDir::new().unwrap();
        let archive = build_archive(dir.path(), &[("lib/net462/LibA.dll", b"framework")]);

        let err = ArchiveExtractor::default()
            .extract(&archive, &["LibA.dll".to_string()], &filter("net8.0"), "LibA", &v())
            .unwrap_err();
        match err {
            MigrationError::ArtifactNotFound { library, available, .. } => {
                assert_eq!(library, "LibA.dll");
                assert_eq!(available, vec!["net462".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extract_windows_only_allowed() {
        let dir = TempDir::new().unwrap();
        let archive = build_archive(dir.path(), &[("lib/net8.0-windows7.0/LibA.dll", b"win")]);
        let extractor = ArchiveExtractor::default();

        assert!(extractor
            .extract(&archive, &["LibA.dll".to_string()], &filter("net8.0"), "LibA", &v())
            .is_err());

        let allowed = filter("net8.0").with_windows_only(true);
        let artifacts = extractor
            .extract(&archive, &["LibA.dll".to_string()], &allowed, "LibA", &v())
            .unwrap();
        assert_eq!(artifacts[0].contents, b"win");
    }

    #[test]
    fn test_extract_corrupt_archive_is_download_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.nupkg");
        std::fs::write(&path, b"not a zip").unwrap();

        let err = ArchiveExtractor::default()
            .extract(&path, &["LibA.dll".to_string()], &filter("net8.0"), "LibA", &v())
            .unwrap_err();
        assert!(matches!(err, MigrationError::Download { .. }));
    }
}
