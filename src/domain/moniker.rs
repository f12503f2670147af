//! Target framework monikers and platform filtering
//!
//! Packages ship one folder per target framework under `lib/`:
//! - `net8.0`, `net6.0` (modern .NET, cross-platform)
//! - `netcoreapp3.1` (.NET Core)
//! - `netstandard2.0` (portable surface)
//! - `net462`, `net48` (.NET Framework, Windows-only)
//! - `net8.0-windows7.0` (platform-specific modern .NET)

use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Framework family of a moniker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameworkFamily {
    /// `netstandardX.Y`
    NetStandard,
    /// `net4xx`
    NetFramework,
    /// `netcoreappX.Y` and `net5.0` onwards
    NetCore,
}

impl FrameworkFamily {
    pub fn display_name(&self) -> &'static str {
        match self {
            FrameworkFamily::NetStandard => ".NET Standard",
            FrameworkFamily::NetFramework => ".NET Framework",
            FrameworkFamily::NetCore => ".NET",
        }
    }
}

/// A parsed target framework moniker
#[derive(Debug, Clone)]
pub struct FrameworkMoniker {
    family: FrameworkFamily,
    version: (u32, u32, u32),
    platform: Option<String>,
    platform_version: Option<String>,
    raw: String,
}

/// `net8.0`, `netstandard2.1`, `net462`, `net8.0-windows7.0`
static MONIKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(netstandard|netcoreapp|net)(\d+(?:\.\d+)*)(?:-([a-z]+)(\d+(?:\.\d+)*)?)?$")
        .unwrap()
});

fn dotted_version(input: &str) -> Option<(u32, u32, u32)> {
    let mut parts = [0u32; 3];
    for (index, part) in input.split('.').enumerate() {
        if index >= parts.len() {
            break;
        }
        parts[index] = part.parse().ok()?;
    }
    Some((parts[0], parts[1], parts[2]))
}

/// `net462` style versions: one digit per component
fn compact_version(input: &str) -> Option<(u32, u32, u32)> {
    let digits: Vec<u32> = input.chars().map(|c| c.to_digit(10)).collect::<Option<_>>()?;
    match digits.as_slice() {
        [major, minor] => Some((*major, *minor, 0)),
        [major, minor, patch] => Some((*major, *minor, *patch)),
        _ => None,
    }
}

impl FrameworkMoniker {
    /// Parse a moniker folder name, returning `None` for unrecognized folders
    pub fn parse(input: &str) -> Option<Self> {
        let lower = input.trim().to_ascii_lowercase();
        let captures = MONIKER_RE.captures(&lower)?;

        let prefix = captures.get(1)?.as_str();
        let number = captures.get(2)?.as_str();
        let platform = captures.get(3).map(|m| m.as_str().to_string());
        let platform_version = captures.get(4).map(|m| m.as_str().to_string());

        let (family, version) = match prefix {
            "netstandard" => (FrameworkFamily::NetStandard, dotted_version(number)?),
            "netcoreapp" => (FrameworkFamily::NetCore, dotted_version(number)?),
            _ if !number.contains('.') => (FrameworkFamily::NetFramework, compact_version(number)?),
            _ => {
                let version = dotted_version(number)?;
                if version.0 >= 5 {
                    (FrameworkFamily::NetCore, version)
                } else {
                    (FrameworkFamily::NetFramework, version)
                }
            }
        };

        // Platform suffixes only exist on net5.0+
        if platform.is_some() && family != FrameworkFamily::NetCore {
            return None;
        }

        Some(Self {
            family,
            version,
            platform,
            platform_version,
            raw: input.trim().to_string(),
        })
    }

    pub fn family(&self) -> FrameworkFamily {
        self.family
    }

    pub fn version(&self) -> (u32, u32, u32) {
        self.version
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the artifact only loads on Windows
    pub fn is_windows_only(&self) -> bool {
        self.family == FrameworkFamily::NetFramework || self.platform.as_deref() == Some("windows")
    }

    /// True when the artifact carries no platform restriction
    pub fn is_cross_platform(&self) -> bool {
        self.family != FrameworkFamily::NetFramework && self.platform.is_none()
    }

    /// Ordering key: portable surfaces rank below runtime-specific ones
    pub fn rank(&self) -> (u8, u32, u32, u32) {
        let tier = match self.family {
            FrameworkFamily::NetStandard => 0,
            FrameworkFamily::NetFramework => 1,
            FrameworkFamily::NetCore => 2,
        };
        (tier, self.version.0, self.version.1, self.version.2)
    }

    /// 0 = no platform, 1 = platform, 2 = platform with version
    pub fn specificity(&self) -> u8 {
        match (&self.platform, &self.platform_version) {
            (None, _) => 0,
            (Some(_), None) => 1,
            (Some(_), Some(_)) => 2,
        }
    }

    /// Same family, version and platform, regardless of spelling
    pub fn matches_exactly(&self, other: &FrameworkMoniker) -> bool {
        self.family == other.family
            && self.version == other.version
            && self.platform == other.platform
            && self.platform_version == other.platform_version
    }
}

impl fmt::Display for FrameworkMoniker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for FrameworkMoniker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unrecognized framework moniker '{}'", s))
    }
}

impl PartialEq for FrameworkMoniker {
    fn eq(&self, other: &Self) -> bool {
        self.matches_exactly(other)
    }
}

impl Eq for FrameworkMoniker {}

impl Serialize for FrameworkMoniker {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Which artifact variants the target runtime can load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformFilter {
    pub target: FrameworkMoniker,
    pub allow_windows_only: bool,
}

impl PlatformFilter {
    pub fn new(target: FrameworkMoniker) -> Self {
        Self {
            target,
            allow_windows_only: false,
        }
    }

    pub fn with_windows_only(mut self, allow: bool) -> Self {
        self.allow_windows_only = allow;
        self
    }

    /// Check whether an artifact built for `candidate` can be used on the target
    pub fn is_compatible(&self, candidate: &FrameworkMoniker) -> bool {
        if let Some(platform) = candidate.platform() {
            let same_platform = self.target.platform() == Some(platform);
            let windows_allowed = platform == "windows" && self.allow_windows_only;
            if !same_platform && !windows_allowed {
                return false;
            }
        }

        let target = &self.target;
        match (target.family, candidate.family) {
            (FrameworkFamily::NetCore, FrameworkFamily::NetCore) => {
                candidate.version <= target.version
            }
            (FrameworkFamily::NetCore, FrameworkFamily::NetStandard) => {
                candidate.version <= (2, 1, 0)
            }
            (FrameworkFamily::NetStandard, FrameworkFamily::NetStandard) => {
                candidate.version <= target.version
            }
            (FrameworkFamily::NetFramework, FrameworkFamily::NetFramework) => {
                candidate.version <= target.version
            }
            (FrameworkFamily::NetFramework, FrameworkFamily::NetStandard) => {
                candidate.version <= (2, 0, 0)
            }
            _ => false,
        }
    }
}

impl Default for PlatformFilter {
    fn default() -> Self {
        Self::new(FrameworkMoniker {
            family: FrameworkFamily::NetCore,
            version: (8, 0, 0),
            platform: None,
            platform_version: None,
            raw: "net8.0".to_string(),
        })
    }
}

impl fmt::Display for PlatformFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.allow_windows_only {
            write!(f, "{} (windows-only allowed)", self.target)
        } else {
            write!(f, "{}", self.target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> FrameworkMoniker {
        FrameworkMoniker::parse(s).unwrap()
    }

    #[test]
    fn test_parse_modern_net() {
        let moniker = m("net8.0");
        assert_eq!(moniker.family(), FrameworkFamily::NetCore);
        assert_eq!(moniker.version(), (8, 0, 0));
        assert!(moniker.is_cross_platform());
        assert!(!moniker.is_windows_only());
    }

    #[test]
    fn test_parse_framework_compact() {
        let moniker = m("net462");
        assert_eq!(moniker.family(), FrameworkFamily::NetFramework);
        assert_eq!(moniker.version(), (4, 6, 2));
        assert!(moniker.is_windows_only());

        assert_eq!(m("net48").version(), (4, 8, 0));
    }

    #[test]
    fn test_parse_standard_and_coreapp() {
        assert_eq!(m("netstandard2.0").family(), FrameworkFamily::NetStandard);
        assert_eq!(m("netcoreapp3.1").family(), FrameworkFamily::NetCore);
        assert_eq!(m("netcoreapp3.1").version(), (3, 1, 0));
    }

    #[test]
    fn test_parse_platform_suffix() {
        let moniker = m("net8.0-windows7.0");
        assert_eq!(moniker.platform(), Some("windows"));
        assert_eq!(moniker.specificity(), 2);
        assert!(moniker.is_windows_only());
        assert!(!moniker.is_cross_platform());
        assert_eq!(m("net8.0-windows").specificity(), 1);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(m("NET8.0"), m("net8.0"));
        assert_eq!(m("NET8.0").as_str(), "NET8.0");
    }

    #[test]
    fn test_parse_unknown_folders() {
        assert!(FrameworkMoniker::parse("portable-net45+win8").is_none());
        assert!(FrameworkMoniker::parse("_._").is_none());
        assert!(FrameworkMoniker::parse("monoandroid10").is_none());
        assert!(FrameworkMoniker::parse("net462-windows").is_none());
    }

    #[test]
    fn test_rank_orders_families() {
        assert!(m("net8.0").rank() > m("net6.0").rank());
        assert!(m("net6.0").rank() > m("netcoreapp3.1").rank());
        assert!(m("netcoreapp3.1").rank() > m("netstandard2.1").rank());
        assert_eq!(m("net8.0").rank(), m("net8.0-windows").rank());
    }

    #[test]
    fn test_filter_modern_target() {
        let filter = PlatformFilter::new(m("net8.0"));
        assert!(filter.is_compatible(&m("net8.0")));
        assert!(filter.is_compatible(&m("net6.0")));
        assert!(filter.is_compatible(&m("netstandard2.0")));
        assert!(filter.is_compatible(&m("netstandard2.1")));
        assert!(!filter.is_compatible(&m("net9.0")));
        assert!(!filter.is_compatible(&m("net462")));
        assert!(!filter.is_compatible(&m("net8.0-windows")));
    }

    #[test]
    fn test_filter_windows_only_allowed() {
        let filter = PlatformFilter::new(m("net8.0")).with_windows_only(true);
        assert!(filter.is_compatible(&m("net8.0-windows7.0")));
        assert!(!filter.is_compatible(&m("net8.0-android")));
        // .NET Framework assemblies never load on the modern runtime
        assert!(!filter.is_compatible(&m("net48")));
    }

    #[test]
    fn test_filter_platform_target() {
        let filter = PlatformFilter::new(m("net8.0-windows"));
        assert!(filter.is_compatible(&m("net8.0-windows7.0")));
        assert!(filter.is_compatible(&m("net8.0")));
    }

    #[test]
    fn test_filter_framework_target() {
        let filter = PlatformFilter::new(m("net472"));
        assert!(filter.is_compatible(&m("net462")));
        assert!(!filter.is_compatible(&m("net48")));
        assert!(filter.is_compatible(&m("netstandard2.0")));
        assert!(!filter.is_compatible(&m("netstandard2.1")));
        assert!(!filter.is_compatible(&m("net6.0")));
    }

    #[test]
    fn test_filter_standard_target() {
        let filter = PlatformFilter::new(m("netstandard2.0"));
        assert!(filter.is_compatible(&m("netstandard1.3")));
        assert!(!filter.is_compatible(&m("netstandard2.1")));
        assert!(!filter.is_compatible(&m("net6.0")));
    }

    #[test]
    fn test_default_filter() {
        let filter = PlatformFilter::default();
        assert_eq!(filter.target.as_str(), "net8.0");
        assert!(!filter.allow_windows_only);
    }
}
