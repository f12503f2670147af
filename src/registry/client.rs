//! HTTP client shared foundation
//!
//! This module provides a shared HTTP client with:
//! - Configurable timeout and User-Agent
//! - Exponential backoff retry logic, capped per delay
//! - Rate limit error handling

use crate::error::RegistryError;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for HTTP requests (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default User-Agent header
const DEFAULT_USER_AGENT: &str = concat!("libmigrate/", env!("CARGO_PKG_VERSION"));

/// Maximum number of retry attempts
pub const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
pub const BASE_DELAY_MS: u64 = 100;

/// Upper bound for a single backoff delay
pub const MAX_DELAY: Duration = Duration::from_secs(5);

/// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    base.saturating_mul(factor).min(cap)
}

/// HTTP client wrapper with retry logic
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_config(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT)
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(timeout: Duration, user_agent: &str) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                RegistryError::network_error(
                    "",
                    "HTTP client",
                    format!("failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            max_delay: MAX_DELAY,
        })
    }

    /// Create a client with the given request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, RegistryError> {
        Self::with_config(timeout, DEFAULT_USER_AGENT)
    }

    /// Set the maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base delay and cap
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Perform a single GET request and classify the status
    async fn send_once(
        &self,
        url: &str,
        package: &str,
        registry: &str,
    ) -> Result<reqwest::Response, RegistryError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::timeout(package, registry)
            } else {
                RegistryError::network_error(package, registry, e.to_string())
            }
        })?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(RegistryError::rate_limit_exceeded(registry)),
            StatusCode::NOT_FOUND => Err(RegistryError::package_not_found(package, registry)),
            status if !status.is_success() => Err(RegistryError::network_error(
                package,
                registry,
                format!("HTTP {}", status),
            )),
            _ => Ok(response),
        }
    }

    /// Perform a GET request with retry logic and error context
    pub async fn get_with_context(
        &self,
        url: &str,
        package: &str,
        registry: &str,
    ) -> Result<reqwest::Response, RegistryError> {
        let mut attempt = 0;
        loop {
            debug!(url, attempt, "GET");
            match self.send_once(url, package, registry).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = backoff_delay(attempt, self.base_delay, self.max_delay);
                    warn!(url, attempt, ?delay, error = %e, "request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Perform a GET request and parse the JSON body
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        package: &str,
        registry: &str,
    ) -> Result<T, RegistryError> {
        let response = self.get_with_context(url, package, registry).await?;
        response.json::<T>().await.map_err(|e| {
            RegistryError::invalid_response(package, registry, format!("failed to parse JSON: {}", e))
        })
    }

    /// Perform a GET request for a text body; a 404 yields `None`
    pub async fn get_optional_text(
        &self,
        url: &str,
        package: &str,
        registry: &str,
    ) -> Result<Option<String>, RegistryError> {
        match self.get_with_context(url, package, registry).await {
            Ok(response) => response.text().await.map(Some).map_err(|e| {
                RegistryError::invalid_response(
                    package,
                    registry,
                    format!("failed to get text response: {}", e),
                )
            }),
            Err(RegistryError::PackageNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Download a body in a single attempt; callers own the retry loop
    pub async fn get_bytes(
        &self,
        url: &str,
        package: &str,
        registry: &str,
    ) -> Result<Vec<u8>, RegistryError> {
        let response = self.send_once(url, package, registry).await?;
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::timeout(package, registry)
            } else {
                RegistryError::network_error(package, registry, format!("body read failed: {}", e))
            }
        })?;
        Ok(bytes.to_vec())
    }
}
