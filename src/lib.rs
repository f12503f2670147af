//! libmigrate - versioned library migration
//!
//! Resolves package versions from a NuGet-style registry, downloads and
//! verifies the archives, picks the artifact matching the target platform,
//! backs up what is on disk and swaps the new files in atomically.
//!
//! Pipeline per package:
//! - [`resolver`]: requested version or latest stable
//! - [`fetcher`]: download with retries and checksum verification
//! - [`extractor`]: platform-aware artifact selection
//! - [`backup`]: per-run recovery point with a manifest
//! - [`replace`]: atomic writes into the target directory
//!
//! [`orchestrator`] drives the pipeline and [`report`] aggregates results.

pub mod backup;
pub mod cli;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod logging;
pub mod orchestrator;
pub mod output;
pub mod progress;
pub mod registry;
pub mod replace;
pub mod report;
pub mod resolver;
pub mod verify;
