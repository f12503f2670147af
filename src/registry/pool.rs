//! Shared registry handles for a run

use crate::registry::{HttpClient, NuGetRegistry, PackageRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Maps a registry base URL to a shared adapter handle
///
/// Handles are created on first use and released together by
/// [`RegistryPool::shutdown`] at the end of a run.
pub struct RegistryPool {
    client: HttpClient,
    default_source: String,
    handles: HashMap<String, Arc<dyn PackageRegistry>>,
}

fn pool_key(source: &str) -> String {
    source.trim_end_matches('/').to_lowercase()
}

impl RegistryPool {
    pub fn new(client: HttpClient, default_source: impl Into<String>) -> Self {
        Self {
            client,
            default_source: default_source.into(),
            handles: HashMap::new(),
        }
    }

    /// Register a pre-built adapter under `source`
    pub fn with_registry(mut self, source: &str, registry: Arc<dyn PackageRegistry>) -> Self {
        self.handles.insert(pool_key(source), registry);
        self
    }

    pub fn default_source(&self) -> &str {
        &self.default_source
    }

    /// Handle for `source` (or the default), creating a NuGet adapter on miss
    pub fn get(&mut self, source: Option<&str>) -> Arc<dyn PackageRegistry> {
        let source = source.unwrap_or(&self.default_source).to_string();
        let client = &self.client;
        self.handles
            .entry(pool_key(&source))
            .or_insert_with(|| {
                debug!(%source, "creating registry handle");
                Arc::new(NuGetRegistry::with_base_url(client.clone(), source.clone()))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Release every handle; returns how many were held
    pub fn shutdown(&mut self) -> usize {
        let released = self.handles.len();
        self.handles.clear();
        info!(released, "registry pool shut down");
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;

    fn pool() -> RegistryPool {
        RegistryPool::new(HttpClient::new().unwrap(), "https://example.test/flat")
    }

    #[test]
    fn test_get_reuses_handles() {
        let mut pool = pool();
        let first = pool.get(None);
        let second = pool.get(Some("https://example.test/flat/"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_get_creates_per_source() {
        let mut pool = pool();
        pool.get(None);
        let other = pool.get(Some("https://mirror.test/flat"));
        assert_eq!(other.registry_name(), "https://mirror.test/flat");
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_with_registry_overrides_default() {
        let fake: Arc<dyn PackageRegistry> = Arc::new(MemoryRegistry::named("fake"));
        let mut pool = pool().with_registry("https://example.test/flat", fake);
        assert_eq!(pool.get(None).registry_name(), "fake");
    }

    #[test]
    fn test_shutdown_releases_all() {
        let mut pool = pool();
        pool.get(None);
        pool.get(Some("https://mirror.test/flat"));
        assert_eq!(pool.shutdown(), 2);
        assert!(pool.is_empty());
    }
}
