//! Shared fixtures for the integration tests: a mock upstream that serves
//! point, forecast, station, observation, alert and geocoder endpoints.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use skycast_weather::{
    CacheOptions, CacheTtls, GeocodingClient, HttpTransport, ReqwestTransport, RetryConfig,
    TtlCache, WeatherApiClient, WeatherService,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const UA: &str = "skycast-test/0.1 (test@example.com)";

pub struct Location {
    pub postal_code: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub office: &'static str,
    pub grid_x: i64,
    pub grid_y: i64,
    pub station: &'static str,
    pub city: &'static str,
    pub state: &'static str,
}

pub const MELISSA: Location = Location {
    postal_code: "75454",
    latitude: 33.1581,
    longitude: -96.5989,
    office: "FWD",
    grid_x: 89,
    grid_y: 121,
    station: "KTKI",
    city: "Melissa",
    state: "TX",
};

pub const NEW_YORK: Location = Location {
    postal_code: "10001",
    latitude: 40.7484,
    longitude: -73.9967,
    office: "OKX",
    grid_x: 33,
    grid_y: 37,
    station: "KNYC",
    city: "New York",
    state: "NY",
};

impl Location {
    pub fn point_path(&self) -> String {
        format!("/points/{:.4},{:.4}", self.latitude, self.longitude)
    }

    pub fn grid_path(&self, suffix: &str) -> String {
        format!(
            "/gridpoints/{}/{},{}/{}",
            self.office, self.grid_x, self.grid_y, suffix
        )
    }

    pub fn observation_path(&self) -> String {
        format!("/stations/{}/observations/latest", self.station)
    }

    pub fn geocode_path(&self) -> String {
        format!("/zip/{}", self.postal_code)
    }
}

fn periods(name: &str, hours: i64) -> serde_json::Value {
    let periods: Vec<serde_json::Value> = (0..3)
        .rev()
        .map(|i| {
            let start = 6 + i * hours;
            serde_json::json!({
                "number": i + 1,
                "name": format!("{} {}", name, i + 1),
                "startTime": format!("2026-10-18T{:02}:00:00-05:00", start),
                "endTime": format!("2026-10-18T{:02}:00:00-05:00", start + hours),
                "isDaytime": true,
                "temperature": 70 + i,
                "temperatureUnit": "F",
                "shortForecast": "Sunny"
            })
        })
        .collect();
    serde_json::json!({ "properties": { "periods": periods } })
}

/// Mount every upstream endpoint for a location with default priority, so
/// tests can override one of them with a higher-priority mock.
pub async fn mount_location(server: &MockServer, loc: &Location) {
    Mock::given(method("GET"))
        .and(path(loc.point_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "properties": {
                "gridId": loc.office,
                "gridX": loc.grid_x,
                "gridY": loc.grid_y,
                "timeZone": "America/Chicago",
                "relativeLocation": {"properties": {"city": loc.city, "state": loc.state}}
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(loc.grid_path("forecast")))
        .respond_with(ResponseTemplate::new(200).set_body_json(periods("Day", 4)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(loc.grid_path("forecast/hourly")))
        .respond_with(ResponseTemplate::new(200).set_body_json(periods("Hour", 1)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(loc.grid_path("stations")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "features": [
                {"properties": {"stationIdentifier": loc.station, "name": "Nearest"}},
                {"properties": {"stationIdentifier": "KXXX", "name": "Farther"}}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(loc.observation_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "properties": {
                "timestamp": "2026-10-18T15:53:00+00:00",
                "textDescription": "Clear",
                "temperature": {"unitCode": "wmoUnit:degC", "value": 22.8}
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/alerts/active"))
        .and(query_param(
            "point",
            format!("{:.4},{:.4}", loc.latitude, loc.longitude),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "features": [{"properties": {"event": "Wind Advisory", "severity": "Minor"}}]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(loc.geocode_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "post code": loc.postal_code,
            "places": [{
                "place name": loc.city,
                "latitude": format!("{:.4}", loc.latitude),
                "longitude": format!("{:.4}", loc.longitude)
            }]
        })))
        .mount(server)
        .await;
}

/// Service over the mock server with fast retries. The geocoder lives
/// under `/zip` on the same server.
pub fn service(server: &MockServer, ttls: CacheTtls) -> WeatherService {
    let cache = Arc::new(TtlCache::new(CacheOptions::default()));
    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new(UA, Duration::from_secs(5)).unwrap());
    let client = WeatherApiClient::new(
        transport.clone(),
        server.uri(),
        UA,
        RetryConfig::new(3, 10, 40),
    );
    let geocoder = GeocodingClient::new(
        transport,
        format!("{}/zip", server.uri()),
        UA,
        cache.clone(),
        ttls.geocode,
    );
    WeatherService::new(Arc::new(client), Arc::new(geocoder), cache, ttls)
}

/// Number of requests the mock server received for a path
pub async fn hits(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}
