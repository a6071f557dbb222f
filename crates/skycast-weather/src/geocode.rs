//! Postal code geocoding: convert a 5-digit US ZIP code to coordinates.
//! Uses Zippopotam.us - free, no API key required.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use skycast_core::{is_valid_postal_code, GeocodingConfig};
use tracing::instrument;

use crate::cache::TtlCache;
use crate::cache_key::CacheKey;
use crate::error::{WeatherError, WeatherResult};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::Coordinates;

#[derive(Debug, Deserialize)]
struct ZipResponse {
    #[serde(default)]
    places: Vec<ZipPlace>,
}

#[derive(Debug, Deserialize)]
struct ZipPlace {
    latitude: String,
    longitude: String,
    #[serde(rename = "place name")]
    place_name: Option<String>,
}

pub struct GeocodingClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    user_agent: String,
    cache: Arc<TtlCache>,
    ttl: Duration,
}

impl GeocodingClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        user_agent: impl Into<String>,
        cache: Arc<TtlCache>,
        ttl: Duration,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
            cache,
            ttl,
        }
    }

    pub fn from_config(
        config: &GeocodingConfig,
        user_agent: &str,
        cache: Arc<TtlCache>,
        ttl: Duration,
    ) -> WeatherResult<Self> {
        let transport =
            ReqwestTransport::new(user_agent, Duration::from_secs(config.timeout_secs))
                .map_err(|e| WeatherError::Network(e.to_string()))?;
        Ok(Self::new(
            Arc::new(transport),
            config.base_url.clone(),
            user_agent,
            cache,
            ttl,
        ))
    }

    /// Resolve a postal code to coordinates.
    ///
    /// Successful lookups are cached; failures are not, so the next call
    /// goes back upstream.
    #[instrument(skip(self), level = "info")]
    pub async fn geocode(&self, postal_code: &str) -> WeatherResult<Coordinates> {
        let code = postal_code.trim();
        if !is_valid_postal_code(code) {
            return Err(WeatherError::invalid_input(format!(
                "{:?} is not a 5-digit postal code",
                postal_code
            )));
        }

        let key = CacheKey::geocode(code);
        self.cache
            .get_or_fetch_json(&key, self.ttl, || self.lookup(code))
            .await
    }

    async fn lookup(&self, code: &str) -> WeatherResult<Coordinates> {
        let url = format!("{}/{}", self.base_url, code);
        let response = self
            .transport
            .get(&url, &[("User-Agent", self.user_agent.as_str())])
            .await
            .map_err(|e| WeatherError::Network(e.to_string()))?;

        match response.status {
            StatusCode::NOT_FOUND => {
                return Err(WeatherError::not_found(format!("postal code {}", code)))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(WeatherError::RateLimited {
                    retry_after: response.retry_after(),
                })
            }
            status if !status.is_success() => {
                return Err(WeatherError::upstream(format!(
                    "geocoder returned {} for {}",
                    status, code
                )))
            }
            _ => {}
        }

        let body: ZipResponse = serde_json::from_str(&response.body)
            .map_err(|e| WeatherError::upstream(format!("geocoder response: {}", e)))?;
        let place = body
            .places
            .into_iter()
            .next()
            .ok_or_else(|| WeatherError::not_found(format!("postal code {}", code)))?;

        let latitude = parse_degrees(&place.latitude)?;
        let longitude = parse_degrees(&place.longitude)?;
        let coords = Coordinates::new(latitude, longitude);
        coords
            .validate()
            .map_err(|e| WeatherError::upstream(format!("geocoder returned {}", e)))?;

        tracing::info!(
            "Geocoded {} to {:.4},{:.4} ({})",
            code,
            latitude,
            longitude,
            place.place_name.as_deref().unwrap_or("unnamed place")
        );
        Ok(coords)
    }
}

fn parse_degrees(raw: &str) -> WeatherResult<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| WeatherError::upstream(format!("unparseable coordinate {:?}", raw)))
}
