//! Package requests and resolutions

use super::{Checksum, PackageVersion};
use serde::Serialize;
use std::fmt;

/// A package as requested by the caller: a name and an optional pin
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackageSpec {
    pub name: String,
    /// `None` means "latest"
    pub requested_version: Option<String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requested_version: None,
        }
    }

    pub fn pinned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requested_version: Some(version.into()),
        }
    }

    /// Parse `Name` or `Name@Version`
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        let (name, version) = match input.split_once('@') {
            Some((name, version)) => (name.trim(), Some(version.trim())),
            None => (input, None),
        };

        if name.is_empty() {
            return Err(format!("missing package name in '{}'", input));
        }
        if name.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
            return Err(format!("invalid package name '{}'", name));
        }

        match version {
            Some("") => Err(format!("missing version after '@' in '{}'", input)),
            Some(version) => Ok(Self::pinned(name, version)),
            None => Ok(Self::new(name)),
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.requested_version.is_some()
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requested_version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A package plus the library files that must be installed from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedPackage {
    pub spec: PackageSpec,
    /// File names inside the target directory, e.g. `Foo.Core.dll`
    pub libraries: Vec<String>,
    /// Registry base URL overriding the run default
    pub source: Option<String>,
    /// Expected archive digest; replaces the one the registry publishes
    pub checksum: Option<Checksum>,
}

impl ManagedPackage {
    /// A package whose only library is `<name>.dll`
    pub fn new(spec: PackageSpec) -> Self {
        let main = format!("{}.dll", spec.name);
        Self {
            spec,
            libraries: vec![main],
            source: None,
            checksum: None,
        }
    }

    pub fn with_libraries<I, S>(mut self, libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let libraries: Vec<String> = libraries.into_iter().map(Into::into).collect();
        if !libraries.is_empty() {
            self.libraries = libraries;
        }
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// Output of version resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: PackageVersion,
    pub download_url: String,
    pub checksum: Option<Checksum>,
}

impl ResolvedPackage {
    pub fn new(name: impl Into<String>, version: PackageVersion, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version,
            download_url: download_url.into(),
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: Option<Checksum>) -> Self {
        self.checksum = checksum;
        self
    }
}

impl fmt::Display for ResolvedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}
