//! Archive checksums
//!
//! NuGet publishes a base64 SHA-512 digest next to every package; config
//! files usually carry hex digests prefixed with the algorithm name.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            ChecksumAlgorithm::Sha256 => 32,
            ChecksumAlgorithm::Sha512 => 64,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }

    fn from_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(ChecksumAlgorithm::Sha256),
            64 => Some(ChecksumAlgorithm::Sha512),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Some(ChecksumAlgorithm::Sha256),
            "sha512" | "sha-512" => Some(ChecksumAlgorithm::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Expected digest of a package archive
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    algorithm: ChecksumAlgorithm,
    digest: Vec<u8>,
}

impl Checksum {
    /// Build from a hex digest; the algorithm is inferred from the length
    pub fn from_hex(input: &str) -> Option<Self> {
        let digest = hex::decode(input.trim()).ok()?;
        let algorithm = ChecksumAlgorithm::from_len(digest.len())?;
        Some(Self { algorithm, digest })
    }

    /// Build from a base64 digest (the `.nupkg.sha512` sidecar format)
    pub fn from_base64(input: &str) -> Option<Self> {
        let digest = STANDARD.decode(input.trim()).ok()?;
        let algorithm = ChecksumAlgorithm::from_len(digest.len())?;
        Some(Self { algorithm, digest })
    }

    /// Accept either hex or base64, hex first
    pub fn parse(input: &str) -> Option<Self> {
        Self::from_hex(input).or_else(|| Self::from_base64(input))
    }

    /// Parse `sha512:<digest>`; untagged input falls back to [`Checksum::parse`]
    pub fn parse_tagged(input: &str) -> Option<Self> {
        match input.split_once(':') {
            Some((name, digest)) => {
                let algorithm = ChecksumAlgorithm::from_name(name)?;
                let checksum = Self::parse(digest)?;
                (checksum.algorithm == algorithm).then_some(checksum)
            }
            None => Self::parse(input),
        }
    }

    /// Digest `bytes` with the given algorithm
    pub fn compute(algorithm: ChecksumAlgorithm, bytes: &[u8]) -> Self {
        let digest = match algorithm {
            ChecksumAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            ChecksumAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
        };
        Self { algorithm, digest }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }

    /// True when `bytes` hash to this digest
    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::compute(self.algorithm, bytes).digest == self.digest
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
