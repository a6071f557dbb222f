//! Shared configuration and logging bootstrap for Skycast.

pub mod config;
pub mod error;

pub use config::{
    is_valid_postal_code, ApiConfig, CacheConfig, Config, GeocodingConfig, RefreshConfig,
    RetrySettings, TtlPolicyConfig, ValidationResult,
};
pub use error::ConfigError;

use anyhow::Result;

/// Initialize logging. Honors `RUST_LOG`, defaulting to `info`.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::info!("Skycast core initialized");
    Ok(())
}
