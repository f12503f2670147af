//! Comparable package versions
//!
//! Registry listings use NuGet-flavoured version strings:
//! - `1.2.3`, `v1.2.3`, `1.2` (missing components are zero)
//! - `19.84.1.0` (a fourth "revision" component)
//! - `2.0.0-preview.1` (pre-release, sorts below the release)
//! - `1.0.0+sha.abc` (build metadata, ignored for ordering)

use semver::Prerelease;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a version string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version '{input}': {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: String,
}

impl VersionParseError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A concrete package version
#[derive(Debug, Clone)]
pub struct PackageVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    pre: Prerelease,
    raw: String,
}

impl PackageVersion {
    /// Parse a version string leniently
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let trimmed = input.trim();
        let unprefixed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        // Build metadata never participates in ordering
        let without_build = unprefixed.split('+').next().unwrap_or(unprefixed);
        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (without_build, None),
        };

        if core.is_empty() {
            return Err(VersionParseError::new(input, "empty version"));
        }

        let mut parts = [0u64; 4];
        let mut count = 0;
        for component in core.split('.') {
            if count == parts.len() {
                return Err(VersionParseError::new(input, "more than four components"));
            }
            parts[count] = component
                .parse()
                .map_err(|_| VersionParseError::new(input, format!("'{}' is not a number", component)))?;
            count += 1;
        }

        let pre = match pre {
            // NuGet compares pre-release labels case-insensitively
            Some(tag) => Prerelease::new(&tag.to_ascii_lowercase())
                .map_err(|e| VersionParseError::new(input, e.to_string()))?,
            None => Prerelease::EMPTY,
        };

        Ok(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            revision: parts[3],
            pre,
            raw: trimmed.to_string(),
        })
    }

    /// The string exactly as the registry or user supplied it
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Normalized form used in download URLs and reports
    pub fn normalized(&self) -> String {
        self.to_string()
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    fn core(&self) -> (u64, u64, u64, u64) {
        (self.major, self.minor, self.patch, self.revision)
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // semver's Prerelease ordering already ranks the empty tag above any tag
        self.core()
            .cmp(&other.core())
            .then_with(|| self.pre.cmp(&other.pre))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision != 0 {
            write!(f, ".{}", self.revision)?;
        }
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        Ok(())
    }
}

impl FromStr for PackageVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_three_components() {
        let version = v("19.84.1");
        assert_eq!(version.to_string(), "19.84.1");
        assert_eq!(version.as_str(), "19.84.1");
        assert!(!version.is_prerelease());
    }

    #[test]
    fn test_parse_pads_missing_components() {
        assert_eq!(v("2").to_string(), "2.0.0");
        assert_eq!(v("2.1").to_string(), "2.1.0");
        assert_eq!(v("2.1"), v("2.1.0"));
    }

    #[test]
    fn test_parse_revision_component() {
        let version = v("1.2.3.4");
        assert_eq!(version.to_string(), "1.2.3.4");
        assert!(v("1.2.3.4") > v("1.2.3"));
        assert_eq!(v("1.2.3.0").to_string(), "1.2.3");
    }

    #[test]
    fn test_parse_v_prefix_and_build() {
        assert_eq!(v("v1.0.0"), v("1.0.0"));
        assert_eq!(v("1.0.0+build.7"), v("1.0.0"));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(PackageVersion::parse("").is_err());
        assert!(PackageVersion::parse("abc").is_err());
        assert!(PackageVersion::parse("1.2.3.4.5").is_err());
        assert!(PackageVersion::parse("1..2").is_err());
    }

    #[test]
    fn test_prerelease_sorts_below_release() {
        assert!(v("2.0.0-beta") < v("2.0.0"));
        assert!(v("2.0.0-alpha") < v("2.0.0-beta"));
        assert!(v("2.0.0-beta") > v("1.9.9"));
        assert!(v("2.0.0-preview.1").is_prerelease());
    }

    #[test]
    fn test_ordering_is_numeric() {
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("10.0.0") > v("9.99.99"));
    }

    #[test]
    fn test_max_of_listing() {
        let versions = ["1.0.0", "3.1.4", "3.1.4-rc.1", "2.9.0"];
        let max = versions.iter().map(|s| v(s)).max().unwrap();
        assert_eq!(max.to_string(), "3.1.4");
    }

    #[test]
    fn test_display_lowercases_prerelease() {
        assert_eq!(v("1.0.0-Preview").to_string(), "1.0.0-preview");
    }

    #[test]
    fn test_serde_roundtrip_as_string() {
        let json = serde_json::to_string(&v("3.1.4")).unwrap();
        assert_eq!(json, "\"3.1.4\"");
        let parsed: PackageVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, v("3.1.4"));
    }
}
