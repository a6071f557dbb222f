//! Weather-specific error types.

use std::time::Duration;

use thiserror::Error;

/// Failures of the data-acquisition pipeline.
///
/// Transient upstream failures never surface directly: the API client retries
/// them and reports `UpstreamUnavailable` once the budget is spent.
#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by upstream")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Upstream rejected request ({status}): {detail}")]
    BadRequest { status: u16, detail: String },

    #[error("Upstream unavailable after {attempts} attempts: {last_error}")]
    UpstreamUnavailable { attempts: u32, last_error: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected upstream response: {0}")]
    Upstream(String),
}

impl WeatherError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(msg) => format!("Invalid location: {}", msg),
            Self::NotFound(_) => "Location not found. Check and try again.".to_string(),
            Self::RateLimited {
                retry_after: Some(wait),
            } => format!(
                "Too many requests. Please wait {} seconds.",
                wait.as_secs().max(1)
            ),
            Self::RateLimited { retry_after: None } => {
                "Too many requests. Please wait and try again.".to_string()
            }
            Self::BadRequest { .. } => "Weather request was rejected.".to_string(),
            Self::UpstreamUnavailable { .. } => {
                "Weather service unavailable. Please try again later.".to_string()
            }
            Self::Network(_) => "Network error. Check your connection.".to_string(),
            Self::Upstream(_) => "Weather service returned unexpected data.".to_string(),
        }
    }

    /// Whether the caller may reasonably retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::UpstreamUnavailable { .. } | Self::Network(_)
        )
    }
}

/// Failure of a single HTTP exchange, before any status classification.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

pub type WeatherResult<T> = Result<T, WeatherError>;
