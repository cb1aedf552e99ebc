//! Client configuration.

use std::time::Duration;

use thiserror::Error;

pub const ENV_API_URL: &str = "BODEGA_API_URL";
pub const ENV_API_TOKEN: &str = "BODEGA_API_TOKEN";
pub const ENV_TIMEOUT_SECS: &str = "BODEGA_TIMEOUT_SECS";
pub const ENV_STORE_CODE: &str = "BODEGA_STORE_CODE";

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_STORE_CODE: &str = "default";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

/// Connection settings for the commerce backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL without trailing slash, e.g. `https://shop.example.com`.
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    /// Store view used in REST paths (`/rest/{store_code}/V1/...`).
    pub store_code: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            store_code: DEFAULT_STORE_CODE.to_string(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_store_code(mut self, store_code: impl Into<String>) -> Self {
        self.store_code = store_code.into();
        self
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = var(ENV_API_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ClientError::MissingVar(ENV_API_URL))?;
        let mut config = Self::new(base_url.trim());

        config.token = var(ENV_API_TOKEN).filter(|v| !v.trim().is_empty());
        if config.token.is_none() {
            tracing::warn!("{ENV_API_TOKEN} not set; requests will be unauthenticated");
        }

        if let Some(raw) = var(ENV_TIMEOUT_SECS) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ClientError::InvalidVar {
                    name: ENV_TIMEOUT_SECS,
                    reason: e.to_string(),
                })?;
            config.timeout = Duration::from_secs(secs);
        }

        match var(ENV_STORE_CODE).filter(|v| !v.trim().is_empty()) {
            Some(store) => config.store_code = store.trim().to_string(),
            None => tracing::debug!("{ENV_STORE_CODE} not set; using '{DEFAULT_STORE_CODE}'"),
        }

        Ok(config)
    }

    /// Absolute URL of a `V1` REST resource.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/rest/{}/V1/{}",
            self.base_url,
            self.store_code,
            path.trim_start_matches('/')
        )
    }
}
