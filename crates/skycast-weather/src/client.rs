//! Weather API client with retry/backoff and error classification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use skycast_core::{ApiConfig, RetrySettings};
use tracing::instrument;

use crate::error::{WeatherError, WeatherResult};
use crate::retry::{is_retryable_status, with_retry, AttemptError, RetryConfig, RetryDecision};
use crate::transport::{HttpResponse, HttpTransport, ReqwestTransport, ACCEPT_GEO_JSON};
use crate::types::*;

/// Counters for upstream traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    /// Logical requests (a retried request counts once)
    pub requests: u64,
    pub retries: u64,
    pub rate_limited: u64,
}

#[derive(Debug, Default)]
struct RequestCounters {
    requests: AtomicU64,
    retries: AtomicU64,
    rate_limited: AtomicU64,
}

pub struct WeatherApiClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    user_agent: String,
    retry: RetryConfig,
    counters: RequestCounters,
}

impl WeatherApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        user_agent: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
            retry,
            counters: RequestCounters::default(),
        }
    }

    /// Build a client over a `reqwest` transport
    pub fn from_config(api: &ApiConfig, retry: &RetrySettings) -> WeatherResult<Self> {
        let transport = ReqwestTransport::new(&api.user_agent, api.timeout())
            .map_err(|e| WeatherError::Network(e.to_string()))?;
        Ok(Self::new(
            Arc::new(transport),
            api.base_url.clone(),
            api.user_agent.clone(),
            RetryConfig::from(retry),
        ))
    }

    pub fn stats(&self) -> RequestStats {
        RequestStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
        }
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    /// GET an endpoint (path relative to the base URL, or absolute URL) and
    /// return its JSON body. Transient failures are retried internally.
    #[instrument(skip(self), level = "debug")]
    pub async fn request(&self, endpoint: &str) -> WeatherResult<serde_json::Value> {
        let url = self.url_for(endpoint);
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        let headers = [("User-Agent", self.user_agent.as_str()), ACCEPT_GEO_JSON];
        let outcome = with_retry(&self.retry, || async {
            match self.transport.get(&url, &headers).await {
                Ok(response) => self.classify(response),
                Err(e) => Err(AttemptError::Transient {
                    reason: e.to_string(),
                    retry_after: None,
                }),
            }
        })
        .await;

        self.counters
            .retries
            .fetch_add(u64::from(outcome.retries), Ordering::Relaxed);
        outcome.result
    }

    fn classify(&self, response: HttpResponse) -> Result<serde_json::Value, AttemptError> {
        let status = response.status;

        if status.is_success() {
            return serde_json::from_str(&response.body).map_err(|e| {
                AttemptError::Fatal(WeatherError::upstream(format!("invalid JSON body: {}", e)))
            });
        }

        let problem: ProblemDetail = serde_json::from_str(&response.body).unwrap_or_default();
        let detail = problem.summary(&response.body);

        if status == StatusCode::TOO_MANY_REQUESTS {
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            let retry_after = response.retry_after();
            tracing::warn!("Rate limited by upstream (retry after {:?})", retry_after);
            return Err(AttemptError::Fatal(WeatherError::RateLimited { retry_after }));
        }

        if is_retryable_status(status) == RetryDecision::Retry {
            return Err(AttemptError::Transient {
                reason: format!("{}: {}", status, detail),
                retry_after: response.retry_after(),
            });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(AttemptError::Fatal(WeatherError::NotFound(detail)));
        }

        Err(AttemptError::Fatal(WeatherError::BadRequest {
            status: status.as_u16(),
            detail,
        }))
    }

    async fn request_as<T: DeserializeOwned>(&self, endpoint: &str) -> WeatherResult<T> {
        let body = self.request(endpoint).await?;
        serde_json::from_value(body).map_err(|e| {
            WeatherError::upstream(format!("unexpected response shape from {}: {}", endpoint, e))
        })
    }

    /// Resolve coordinates to a forecast grid point.
    #[instrument(skip(self), level = "info")]
    pub async fn get_point(&self, coords: Coordinates) -> WeatherResult<PointData> {
        coords.validate()?;
        let endpoint = format!("/points/{:.4},{:.4}", coords.latitude, coords.longitude);
        let feature: Feature<PointProperties> = self.request_as(&endpoint).await?;
        Ok(PointData::from(feature.properties))
    }

    #[instrument(skip(self), level = "info")]
    pub async fn get_forecast(&self, grid: &GridPoint) -> WeatherResult<Vec<ForecastPeriod>> {
        self.get_periods(&grid.forecast_endpoint()).await
    }

    #[instrument(skip(self), level = "info")]
    pub async fn get_hourly_forecast(
        &self,
        grid: &GridPoint,
    ) -> WeatherResult<Vec<ForecastPeriod>> {
        self.get_periods(&grid.hourly_endpoint()).await
    }

    async fn get_periods(&self, endpoint: &str) -> WeatherResult<Vec<ForecastPeriod>> {
        let feature: Feature<ForecastProperties> = self.request_as(endpoint).await?;
        let mut periods = feature.properties.periods;
        periods.sort_by_key(|p| p.start_time);
        Ok(periods)
    }

    /// Observation stations for a grid point, nearest first.
    #[instrument(skip(self), level = "info")]
    pub async fn get_stations(&self, grid: &GridPoint) -> WeatherResult<Vec<Station>> {
        let collection: FeatureCollection<Station> =
            self.request_as(&grid.stations_endpoint()).await?;
        Ok(collection
            .features
            .into_iter()
            .map(|f| f.properties)
            .collect())
    }

    #[instrument(skip(self), level = "info")]
    pub async fn get_latest_observation(&self, station_id: &str) -> WeatherResult<Observation> {
        if station_id.trim().is_empty() {
            return Err(WeatherError::invalid_input("station id is empty"));
        }
        let endpoint = format!("/stations/{}/observations/latest", station_id);
        let feature: Feature<Observation> = self.request_as(&endpoint).await?;
        let mut observation = feature.properties;
        observation.station_id = Some(station_id.to_string());
        Ok(observation)
    }

    #[instrument(skip(self), level = "info")]
    pub async fn get_active_alerts(&self, coords: Coordinates) -> WeatherResult<Vec<Alert>> {
        coords.validate()?;
        let endpoint = format!(
            "/alerts/active?point={:.4},{:.4}",
            coords.latitude, coords.longitude
        );
        let collection: FeatureCollection<Alert> = self.request_as(&endpoint).await?;
        Ok(collection
            .features
            .into_iter()
            .map(|f| f.properties)
            .collect())
    }
}
