//! In-memory registry
//!
//! Serves archives registered up front. Used by the test suites and for
//! offline runs against archives that are already on hand.

use crate::domain::{Checksum, ChecksumAlgorithm, PackageVersion};
use crate::error::RegistryError;
use crate::registry::{ArchivePayload, PackageRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
struct Entry {
    version: String,
    archive: Option<Vec<u8>>,
    checksum: Option<Checksum>,
}

/// Registry backed by a map of package name to published versions
#[derive(Debug)]
pub struct MemoryRegistry {
    name: String,
    packages: HashMap<String, Vec<Entry>>,
    unavailable: bool,
    failing_downloads: AtomicUsize,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            packages: HashMap::new(),
            unavailable: false,
            failing_downloads: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    fn entries_mut(&mut self, package: &str) -> &mut Vec<Entry> {
        self.packages.entry(package.to_lowercase()).or_default()
    }

    /// Publish an archive; its SHA-512 is published alongside
    pub fn with_package(mut self, package: &str, version: &str, archive: Vec<u8>) -> Self {
        let checksum = Some(Checksum::compute(ChecksumAlgorithm::Sha512, &archive));
        self.entries_mut(package).push(Entry {
            version: version.to_string(),
            archive: Some(archive),
            checksum,
        });
        self
    }

    /// List a version that has no downloadable archive
    pub fn with_listed_version(mut self, package: &str, version: &str) -> Self {
        self.entries_mut(package).push(Entry {
            version: version.to_string(),
            archive: None,
            checksum: None,
        });
        self
    }

    /// Override the published checksum of a version (`None` publishes none)
    pub fn with_checksum(mut self, package: &str, version: &str, checksum: Option<Checksum>) -> Self {
        if let Some(entry) = self
            .entries_mut(package)
            .iter_mut()
            .find(|e| e.version == version)
        {
            entry.checksum = checksum;
        }
        self
    }

    /// Every listing fails with a network error
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// The next `count` downloads fail with a network error
    pub fn fail_downloads(self, count: usize) -> Self {
        self.failing_downloads.store(count, Ordering::SeqCst);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn find(&self, package: &str, version: &PackageVersion) -> Option<&Entry> {
        self.packages
            .get(&package.to_lowercase())?
            .iter()
            .find(|e| PackageVersion::parse(&e.version).is_ok_and(|v| &v == version))
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PackageRegistry for MemoryRegistry {
    fn registry_name(&self) -> &str {
        &self.name
    }

    fn download_url(&self, package: &str, version: &PackageVersion) -> String {
        format!("memory://{}/{}/{}", self.name, package.to_lowercase(), version)
    }

    async fn list_versions(&self, package: &str) -> Result<Vec<String>, RegistryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(RegistryError::network_error(package, &self.name, "registry offline"));
        }
        self.packages
            .get(&package.to_lowercase())
            .map(|entries| entries.iter().map(|e| e.version.clone()).collect())
            .ok_or_else(|| RegistryError::package_not_found(package, &self.name))
    }

    async fn fetch_archive(
        &self,
        package: &str,
        version: &PackageVersion,
    ) -> Result<ArchivePayload, RegistryError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failing_downloads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(RegistryError::network_error(package, &self.name, "connection reset"));
        }

        let entry = self
            .find(package, version)
            .ok_or_else(|| RegistryError::package_not_found(package, &self.name))?;
        let bytes = entry
            .archive
            .clone()
            .ok_or_else(|| RegistryError::package_not_found(package, &self.name))?;

        Ok(ArchivePayload {
            bytes,
            checksum: entry.checksum.clone(),
        })
    }
}
