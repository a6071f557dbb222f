//! Weather service: assembles a complete weather package from several
//! dependent upstream calls, caching each constituent under its own TTL.
//!
//! Load-bearing dependencies (point, forecast, hourly forecast) fail the
//! whole request. Stations, observation and alerts degrade instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use skycast_core::{Config, TtlPolicyConfig};

use crate::cache::{CacheOptions, CacheStats, TtlCache, TtlStatus};
use crate::cache_key::CacheKey;
use crate::client::WeatherApiClient;
use crate::error::{WeatherError, WeatherResult};
use crate::geocode::GeocodingClient;
use crate::types::*;

/// TTL per data kind
#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub points: Duration,
    pub forecast: Duration,
    pub observation: Duration,
    pub station: Duration,
    pub geocode: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self::from(&TtlPolicyConfig::default())
    }
}

impl From<&TtlPolicyConfig> for CacheTtls {
    fn from(policy: &TtlPolicyConfig) -> Self {
        Self {
            points: Duration::from_secs(policy.points_secs),
            forecast: Duration::from_secs(policy.forecast_secs),
            observation: Duration::from_secs(policy.observation_secs),
            station: Duration::from_secs(policy.station_secs),
            geocode: Duration::from_secs(policy.geocode_secs),
        }
    }
}

pub struct WeatherService {
    client: Arc<WeatherApiClient>,
    geocoder: Arc<GeocodingClient>,
    cache: Arc<TtlCache>,
    ttls: CacheTtls,
    /// Grid point behind each points key ever resolved, so targeted
    /// clearing still finds the grid keys after the point entry is gone
    grids: Mutex<HashMap<String, GridPoint>>,
}

impl WeatherService {
    pub fn new(
        client: Arc<WeatherApiClient>,
        geocoder: Arc<GeocodingClient>,
        cache: Arc<TtlCache>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            client,
            geocoder,
            cache,
            ttls,
            grids: Mutex::new(HashMap::new()),
        }
    }

    /// Wire up clients and one shared cache from configuration.
    pub fn from_config(config: &Config) -> WeatherResult<Self> {
        let cache = Arc::new(TtlCache::new(CacheOptions::from(&config.cache)));
        let ttls = CacheTtls::from(&config.cache.ttl);
        let client = WeatherApiClient::from_config(&config.api, &config.retry)?;
        let geocoder = GeocodingClient::from_config(
            &config.geocoding,
            &config.api.user_agent,
            cache.clone(),
            ttls.geocode,
        )?;
        Ok(Self::new(
            Arc::new(client),
            Arc::new(geocoder),
            cache,
            ttls,
        ))
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn client(&self) -> &WeatherApiClient {
        &self.client
    }

    pub async fn geocode(&self, postal_code: &str) -> WeatherResult<Coordinates> {
        self.geocoder.geocode(postal_code).await
    }

    pub async fn get_point_data(&self, latitude: f64, longitude: f64) -> WeatherResult<PointData> {
        let coords = Coordinates::new(latitude, longitude);
        coords.validate()?;
        let key = CacheKey::points(latitude, longitude);
        let point: PointData = self
            .cache
            .get_or_fetch_json(&key, self.ttls.points, || self.client.get_point(coords))
            .await?;
        self.grids.lock().insert(key, point.grid_point.clone());
        Ok(point)
    }

    pub async fn get_forecast(&self, grid: &GridPoint) -> WeatherResult<Vec<ForecastPeriod>> {
        let key = CacheKey::forecast(grid);
        self.cache
            .get_or_fetch_json(&key, self.ttls.forecast, || self.client.get_forecast(grid))
            .await
    }

    pub async fn get_hourly_forecast(
        &self,
        grid: &GridPoint,
    ) -> WeatherResult<Vec<ForecastPeriod>> {
        let key = CacheKey::hourly(grid);
        self.cache
            .get_or_fetch_json(&key, self.ttls.forecast, || {
                self.client.get_hourly_forecast(grid)
            })
            .await
    }

    pub async fn get_stations(&self, grid: &GridPoint) -> WeatherResult<Vec<Station>> {
        let key = CacheKey::stations(grid);
        self.cache
            .get_or_fetch_json(&key, self.ttls.station, || self.client.get_stations(grid))
            .await
    }

    pub async fn get_latest_observation(&self, station_id: &str) -> WeatherResult<Observation> {
        let key = CacheKey::observation(station_id);
        self.cache
            .get_or_fetch_json(&key, self.ttls.observation, || {
                self.client.get_latest_observation(station_id)
            })
            .await
    }

    /// Alerts are never cached.
    pub async fn get_active_alerts(&self, latitude: f64, longitude: f64) -> WeatherResult<Vec<Alert>> {
        self.client
            .get_active_alerts(Coordinates::new(latitude, longitude))
            .await
    }

    /// Latest observation from the station nearest to the coordinates.
    pub async fn get_current_conditions(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> WeatherResult<Observation> {
        let point = self.get_point_data(latitude, longitude).await?;
        self.observation_for_grid(&point.grid_point).await
    }

    async fn observation_for_grid(&self, grid: &GridPoint) -> WeatherResult<Observation> {
        let stations = self.get_stations(grid).await?;
        let station = stations.first().ok_or_else(|| {
            WeatherError::not_found(format!(
                "no observation stations for {}/{},{}",
                grid.office, grid.grid_x, grid.grid_y
            ))
        })?;
        self.get_latest_observation(&station.station_identifier)
            .await
    }

    /// Assemble the full weather package for a coordinate pair.
    pub async fn get_weather_data(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> WeatherResult<WeatherPackage> {
        self.assemble(Coordinates::new(latitude, longitude), None)
            .await
    }

    /// Geocode a postal code, then assemble its weather package.
    pub async fn get_weather_for_postal_code(
        &self,
        postal_code: &str,
    ) -> WeatherResult<WeatherPackage> {
        let coords = self.geocoder.geocode(postal_code).await?;
        self.assemble(coords, Some(postal_code.trim().to_string()))
            .await
    }

    /// Run the full orchestration purely to populate the cache.
    pub async fn prefetch_weather_data(&self, latitude: f64, longitude: f64) -> WeatherResult<()> {
        self.get_weather_data(latitude, longitude).await?;
        tracing::debug!("Prefetched weather for {:.4},{:.4}", latitude, longitude);
        Ok(())
    }

    async fn assemble(
        &self,
        coords: Coordinates,
        postal_code: Option<String>,
    ) -> WeatherResult<WeatherPackage> {
        coords.validate()?;
        let (latitude, longitude) = (coords.latitude, coords.longitude);

        let point = self.get_point_data(latitude, longitude).await?;
        let grid = &point.grid_point;

        let (forecast, hourly, observation, alerts) = tokio::join!(
            self.get_forecast(grid),
            self.get_hourly_forecast(grid),
            self.observation_for_grid(grid),
            self.get_active_alerts(latitude, longitude),
        );

        let forecast = forecast?;
        let hourly = hourly?;

        let current_observation = match observation {
            Ok(observation) => Some(observation),
            Err(e) => {
                tracing::warn!(
                    "Current observation unavailable for {:.4},{:.4}: {}",
                    latitude,
                    longitude,
                    e
                );
                None
            }
        };

        let alerts = alerts.unwrap_or_else(|e| {
            tracing::warn!(
                "Active alerts unavailable for {:.4},{:.4}: {}",
                latitude,
                longitude,
                e
            );
            Vec::new()
        });

        let fetched_at = Utc::now();
        let cache_expiry =
            self.cache_expiry(fetched_at, coords, grid, current_observation.as_ref());

        Ok(WeatherPackage {
            location: PackageLocation {
                postal_code,
                coordinates: coords,
                display_name: point.display_name(),
                grid_point: grid.clone(),
                time_zone: point.time_zone.clone(),
            },
            forecast,
            hourly,
            current_observation,
            alerts,
            fetched_at,
            cache_expiry,
        })
    }

    /// Earliest moment a cached constituent of the package goes stale,
    /// from the cache's actual remaining lifetimes.
    fn cache_expiry(
        &self,
        fetched_at: DateTime<Utc>,
        coords: Coordinates,
        grid: &GridPoint,
        observation: Option<&Observation>,
    ) -> DateTime<Utc> {
        let mut constituents = vec![
            (CacheKey::points(coords.latitude, coords.longitude), self.ttls.points),
            (CacheKey::forecast(grid), self.ttls.forecast),
            (CacheKey::hourly(grid), self.ttls.forecast),
        ];
        if let Some(station_id) = observation.and_then(|o| o.station_id.as_deref()) {
            constituents.push((CacheKey::observation(station_id), self.ttls.observation));
        }

        let shortest = constituents
            .iter()
            .filter_map(|(key, nominal)| match self.cache.get_ttl(key) {
                Some(TtlStatus::Remaining(remaining)) => Some(remaining),
                Some(TtlStatus::NoExpiry) => None,
                None => Some(*nominal),
            })
            .min()
            .unwrap_or(self.ttls.forecast);

        chrono::Duration::from_std(shortest)
            .ok()
            .and_then(|d| fetched_at.checked_add_signed(d))
            .unwrap_or(fetched_at)
    }

    pub fn clear_cache(&self) {
        self.cache.flush();
        self.grids.lock().clear();
        tracing::info!("Weather cache cleared");
    }

    /// Remove the point, forecast, hourly and station entries derived from
    /// these coordinates. Other locations stay cached. The grid keys are
    /// found even when the point entry itself has already expired or been
    /// evicted.
    pub fn clear_location_cache(&self, latitude: f64, longitude: f64) -> usize {
        let points_key = CacheKey::points(latitude, longitude);

        let cached_grid = self
            .cache
            .entry(&points_key)
            .and_then(|entry| serde_json::from_value::<PointData>(entry.value).ok())
            .map(|point| point.grid_point);
        let recorded_grid = self.grids.lock().remove(&points_key);

        let mut keys = vec![points_key];
        if let Some(grid) = cached_grid.or(recorded_grid) {
            keys.push(CacheKey::forecast(&grid));
            keys.push(CacheKey::hourly(&grid));
            keys.push(CacheKey::stations(&grid));
        }

        let removed = self.cache.del_multiple(&keys);
        tracing::info!(
            "Cleared {} cache entries for {:.4},{:.4}",
            removed,
            latitude,
            longitude
        );
        removed
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls_follow_policy_table() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.points, Duration::from_secs(24 * 3600));
        assert_eq!(ttls.forecast, Duration::from_secs(3600));
        assert_eq!(ttls.observation, Duration::from_secs(600));
        assert_eq!(ttls.station, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(ttls.geocode, Duration::from_secs(24 * 3600));
    }
}
