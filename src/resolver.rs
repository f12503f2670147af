//! Version resolution
//!
//! Turns a [`PackageSpec`] into a concrete [`ResolvedPackage`] by consulting
//! the registry's version listing. Nothing is downloaded here.

use crate::domain::{PackageSpec, PackageVersion, ResolvedPackage};
use crate::error::{MigrationError, RegistryError};
use crate::registry::PackageRegistry;
use tracing::{debug, info};

/// How many of the newest versions to mention when a pin is missing
const AVAILABLE_HINT_LEN: usize = 5;

/// Resolves requested versions against a registry listing
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionResolver {
    include_prerelease: bool,
}

impl VersionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let "latest" pick pre-release versions
    pub fn with_prerelease(mut self, include: bool) -> Self {
        self.include_prerelease = include;
        self
    }

    /// Pick the version to install for `spec`
    pub async fn resolve(
        &self,
        spec: &PackageSpec,
        registry: &dyn PackageRegistry,
    ) -> Result<ResolvedPackage, MigrationError> {
        let listing = registry.list_versions(&spec.name).await.map_err(|e| match e {
            RegistryError::PackageNotFound { .. } => MigrationError::version_not_found(
                &spec.name,
                spec.requested_version.as_deref().unwrap_or("latest"),
                registry.registry_name(),
                Vec::new(),
            ),
            other => MigrationError::registry_unavailable(&spec.name, spec.requested_version.clone(), other),
        })?;

        let mut versions: Vec<(PackageVersion, &str)> = Vec::with_capacity(listing.len());
        for raw in &listing {
            match PackageVersion::parse(raw) {
                Ok(version) => versions.push((version, raw.as_str())),
                Err(e) => debug!(package = %spec.name, error = %e, "skipping unparsable version"),
            }
        }

        let version = match &spec.requested_version {
            Some(requested) => self.select_pinned(spec, requested, &versions, registry)?,
            None => self.select_latest(spec, &versions, registry)?,
        };

        let download_url = registry.download_url(&spec.name, &version);
        info!(package = %spec.name, %version, "resolved");
        Ok(ResolvedPackage::new(&spec.name, version, download_url))
    }

    fn select_pinned(
        &self,
        spec: &PackageSpec,
        requested: &str,
        versions: &[(PackageVersion, &str)],
        registry: &dyn PackageRegistry,
    ) -> Result<PackageVersion, MigrationError> {
        // An unparsable pin matches nothing and is reported as not found
        let found = PackageVersion::parse(requested)
            .ok()
            .and_then(|wanted| versions.iter().find(|(v, _)| *v == wanted).map(|(v, _)| v.clone()));

        found.ok_or_else(|| {
            let mut newest: Vec<&PackageVersion> = versions.iter().map(|(v, _)| v).collect();
            newest.sort_unstable_by(|a, b| b.cmp(a));
            let available = newest
                .into_iter()
                .take(AVAILABLE_HINT_LEN)
                .map(|v| v.to_string())
                .collect();
            MigrationError::version_not_found(&spec.name, requested, registry.registry_name(), available)
        })
    }

    fn select_latest(
        &self,
        spec: &PackageSpec,
        versions: &[(PackageVersion, &str)],
        registry: &dyn PackageRegistry,
    ) -> Result<PackageVersion, MigrationError> {
        versions
            .iter()
            .map(|(v, _)| v)
            .filter(|v| self.include_prerelease || !v.is_prerelease())
            .max()
            .cloned()
            .ok_or_else(|| {
                MigrationError::version_not_found(&spec.name, "latest", registry.registry_name(), Vec::new())
            })
    }
}
