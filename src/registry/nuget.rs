//! NuGet registry adapter
//!
//! Uses the v3 flat container, which needs no service index lookup:
//! - `{base}/{id}/index.json` lists versions
//! - `{base}/{id}/{version}/{id}.{version}.nupkg` is the archive
//! - `{base}/{id}/{version}/{id}.{version}.nupkg.sha512` is its base64 digest
//!
//! Ids and versions are lowercased in every path.

use crate::domain::{Checksum, PackageVersion};
use crate::error::RegistryError;
use crate::registry::{ArchivePayload, HttpClient, PackageRegistry};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// nuget.org flat container base URL
pub const NUGET_FLAT_CONTAINER_URL: &str = "https://api.nuget.org/v3-flatcontainer";

/// NuGet flat container adapter
pub struct NuGetRegistry {
    client: HttpClient,
    base_url: String,
}

/// `index.json` response
#[derive(Debug, Deserialize)]
struct VersionIndex {
    versions: Vec<String>,
}

impl NuGetRegistry {
    /// Create an adapter for nuget.org
    pub fn new(client: HttpClient) -> Self {
        Self::with_base_url(client, NUGET_FLAT_CONTAINER_URL)
    }

    /// Create an adapter for another flat container
    pub fn with_base_url(client: HttpClient, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn index_url(&self, package: &str) -> String {
        format!("{}/{}/index.json", self.base_url, package.to_lowercase())
    }

    fn checksum_url(&self, package: &str, version: &PackageVersion) -> String {
        format!("{}.sha512", self.download_url(package, version))
    }
}

#[async_trait]
impl PackageRegistry for NuGetRegistry {
    fn registry_name(&self) -> &str {
        &self.base_url
    }

    fn download_url(&self, package: &str, version: &PackageVersion) -> String {
        let id = package.to_lowercase();
        let version = version.normalized().to_lowercase();
        format!("{}/{}/{}/{}.{}.nupkg", self.base_url, id, version, id, version)
    }

    async fn list_versions(&self, package: &str) -> Result<Vec<String>, RegistryError> {
        let url = self.index_url(package);
        let index: VersionIndex = self
            .client
            .get_json(&url, package, self.registry_name())
            .await?;
        debug!(package, count = index.versions.len(), "listed versions");
        Ok(index.versions)
    }

    async fn fetch_archive(
        &self,
        package: &str,
        version: &PackageVersion,
    ) -> Result<ArchivePayload, RegistryError> {
        let url = self.download_url(package, version);
        let bytes = self
            .client
            .get_bytes(&url, package, self.registry_name())
            .await?;

        // A missing or malformed sidecar only means there is nothing to verify
        let checksum = self
            .client
            .get_optional_text(&self.checksum_url(package, version), package, self.registry_name())
            .await?
            .and_then(|text| Checksum::from_base64(&text));

        debug!(package, %version, size = bytes.len(), has_checksum = checksum.is_some(), "downloaded archive");
        Ok(ArchivePayload { bytes, checksum })
    }
}
