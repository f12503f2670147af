//! Registry adapters for listing and downloading packages
//!
//! This module provides:
//! - HTTP client shared foundation with retry logic
//! - NuGet v3 flat container adapter
//! - In-memory registry for tests and offline runs
//! - A pool of adapter handles keyed by registry URL

mod client;
mod memory;
mod nuget;
mod pool;

pub use client::{backoff_delay, HttpClient, BASE_DELAY_MS, DEFAULT_TIMEOUT, MAX_DELAY, MAX_RETRIES};
pub use memory::MemoryRegistry;
pub use nuget::{NuGetRegistry, NUGET_FLAT_CONTAINER_URL};
pub use pool::RegistryPool;

use crate::domain::{Checksum, PackageVersion};
use crate::error::RegistryError;
use async_trait::async_trait;

/// Raw package archive as returned by a registry
#[derive(Debug, Clone)]
pub struct ArchivePayload {
    pub bytes: Vec<u8>,
    /// Digest published by the registry, if any
    pub checksum: Option<Checksum>,
}

/// Trait for package registries
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Get the registry name used in messages
    fn registry_name(&self) -> &str;

    /// URL the archive for `package` at `version` is downloaded from
    fn download_url(&self, package: &str, version: &PackageVersion) -> String;

    /// Fetch every published version string for a package
    async fn list_versions(&self, package: &str) -> Result<Vec<String>, RegistryError>;

    /// Download the archive in a single attempt
    async fn fetch_archive(
        &self,
        package: &str,
        version: &PackageVersion,
    ) -> Result<ArchivePayload, RegistryError>;
}
