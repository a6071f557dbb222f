use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{WeatherError, WeatherResult};

/// Geographic coordinates in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Reject non-finite or out-of-range coordinates.
    pub fn validate(&self) -> WeatherResult<()> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(WeatherError::invalid_input("coordinates must be finite"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(WeatherError::invalid_input(format!(
                "latitude {} out of range",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(WeatherError::invalid_input(format!(
                "longitude {} out of range",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// Forecast office grid cell addressing a location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPoint {
    pub office: String,
    pub grid_x: i64,
    pub grid_y: i64,
}

impl GridPoint {
    pub fn forecast_endpoint(&self) -> String {
        format!("/gridpoints/{}/{},{}/forecast", self.office, self.grid_x, self.grid_y)
    }

    pub fn hourly_endpoint(&self) -> String {
        format!(
            "/gridpoints/{}/{},{}/forecast/hourly",
            self.office, self.grid_x, self.grid_y
        )
    }

    pub fn stations_endpoint(&self) -> String {
        format!("/gridpoints/{}/{},{}/stations", self.office, self.grid_x, self.grid_y)
    }
}

/// Resolved point metadata: grid cell plus descriptive fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointData {
    pub grid_point: GridPoint,
    pub time_zone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl PointData {
    /// "City, ST" when both parts are known
    pub fn display_name(&self) -> Option<String> {
        match (&self.city, &self.state) {
            (Some(city), Some(state)) => Some(format!("{}, {}", city, state)),
            (Some(city), None) => Some(city.clone()),
            (None, Some(state)) => Some(state.clone()),
            (None, None) => None,
        }
    }
}

/// A measured value with its unit, e.g. `{"unitCode": "wmoUnit:degC", "value": 21.1}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantitativeValue {
    #[serde(default)]
    pub unit_code: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

/// One period of a 7-day or hourly forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPeriod {
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub is_daytime: bool,
    // Plain number in most responses, a QuantitativeValue in some
    #[serde(default, deserialize_with = "number_or_quantity")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub temperature_unit: Option<String>,
    #[serde(default)]
    pub probability_of_precipitation: Option<QuantitativeValue>,
    #[serde(default)]
    pub wind_speed: Option<String>,
    #[serde(default)]
    pub wind_direction: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub short_forecast: String,
    #[serde(default)]
    pub detailed_forecast: String,
}

fn number_or_quantity<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::Object(obj)) => obj.get("value").and_then(|v| v.as_f64()),
        _ => None,
    })
}

/// Observation station near a grid point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub station_identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

/// Latest observation reported by a station
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(default)]
    pub station_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub text_description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub temperature: QuantitativeValue,
    #[serde(default)]
    pub dewpoint: QuantitativeValue,
    #[serde(default)]
    pub relative_humidity: QuantitativeValue,
    #[serde(default)]
    pub wind_speed: QuantitativeValue,
    #[serde(default)]
    pub wind_direction: QuantitativeValue,
    #[serde(default)]
    pub wind_gust: QuantitativeValue,
    #[serde(default)]
    pub barometric_pressure: QuantitativeValue,
    #[serde(default)]
    pub visibility: QuantitativeValue,
    #[serde(default)]
    pub heat_index: QuantitativeValue,
    #[serde(default)]
    pub wind_chill: QuantitativeValue,
}

/// Active weather alert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub certainty: Option<String>,
    #[serde(default)]
    pub area_desc: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub effective: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender_name: Option<String>,
}

/// Where an assembled package applies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageLocation {
    pub postal_code: Option<String>,
    pub coordinates: Coordinates,
    pub display_name: Option<String>,
    pub grid_point: GridPoint,
    pub time_zone: Option<String>,
}

/// Complete weather bundle for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherPackage {
    pub location: PackageLocation,
    /// 7-day periods, chronological
    pub forecast: Vec<ForecastPeriod>,
    /// Hourly periods, chronological
    pub hourly: Vec<ForecastPeriod>,
    /// `None` when the station list or observation could not be fetched
    pub current_observation: Option<Observation>,
    pub alerts: Vec<Alert>,
    pub fetched_at: DateTime<Utc>,
    /// Earliest moment any cached constituent goes stale
    pub cache_expiry: DateTime<Utc>,
}

// Upstream wire shapes (GeoJSON-like)

#[derive(Debug, Deserialize)]
pub(crate) struct Feature<P> {
    pub properties: P,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeatureCollection<P> {
    #[serde(default = "Vec::new")]
    pub features: Vec<Feature<P>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PointProperties {
    pub grid_id: String,
    pub grid_x: i64,
    pub grid_y: i64,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub relative_location: Option<Feature<RelativeLocation>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RelativeLocation {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl From<PointProperties> for PointData {
    fn from(props: PointProperties) -> Self {
        let (city, state) = props
            .relative_location
            .map(|f| (f.properties.city, f.properties.state))
            .unwrap_or((None, None));
        Self {
            grid_point: GridPoint {
                office: props.grid_id,
                grid_x: props.grid_x,
                grid_y: props.grid_y,
            },
            time_zone: props.time_zone,
            city,
            state,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForecastProperties {
    #[serde(default)]
    pub periods: Vec<ForecastPeriod>,
}

/// Error body returned by the upstream API
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProblemDetail {
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub status: Option<u16>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ProblemDetail {
    /// Best human-readable summary: detail, then title, then the raw body
    pub fn summary(&self, raw: &str) -> String {
        let text = self
            .detail
            .clone()
            .or_else(|| self.title.clone())
            .unwrap_or_else(|| raw.chars().take(200).collect());
        match &self.correlation_id {
            Some(id) => format!("{} (correlation id {})", text, id),
            None => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_validation() {
        assert!(Coordinates::new(33.1581, -96.5989).validate().is_ok());
        assert!(Coordinates::new(90.0, 180.0).validate().is_ok());
        assert!(matches!(
            Coordinates::new(91.0, 0.0).validate(),
            Err(WeatherError::InvalidInput(_))
        ));
        assert!(matches!(
            Coordinates::new(0.0, -180.5).validate(),
            Err(WeatherError::InvalidInput(_))
        ));
        assert!(Coordinates::new(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_grid_point_endpoints() {
        let grid = GridPoint {
            office: "FWD".to_string(),
            grid_x: 89,
            grid_y: 121,
        };
        assert_eq!(grid.forecast_endpoint(), "/gridpoints/FWD/89,121/forecast");
        assert_eq!(grid.hourly_endpoint(), "/gridpoints/FWD/89,121/forecast/hourly");
        assert_eq!(grid.stations_endpoint(), "/gridpoints/FWD/89,121/stations");
    }

    #[test]
    fn test_forecast_period_temperature_shapes() {
        let plain: ForecastPeriod = serde_json::from_value(serde_json::json!({
            "number": 1,
            "name": "Tonight",
            "startTime": "2026-10-18T18:00:00-05:00",
            "endTime": "2026-10-19T06:00:00-05:00",
            "isDaytime": false,
            "temperature": 61,
            "temperatureUnit": "F",
            "shortForecast": "Clear"
        }))
        .unwrap();
        assert_eq!(plain.temperature, Some(61.0));
        assert_eq!(plain.start_time.to_rfc3339(), "2026-10-18T23:00:00+00:00");

        let quantity: ForecastPeriod = serde_json::from_value(serde_json::json!({
            "startTime": "2026-10-18T18:00:00Z",
            "endTime": "2026-10-18T19:00:00Z",
            "temperature": {"unitCode": "wmoUnit:degC", "value": 16.5}
        }))
        .unwrap();
        assert_eq!(quantity.temperature, Some(16.5));
    }

    #[test]
    fn test_point_data_from_properties() {
        let feature: Feature<PointProperties> = serde_json::from_value(serde_json::json!({
            "properties": {
                "gridId": "FWD",
                "gridX": 89,
                "gridY": 121,
                "timeZone": "America/Chicago",
                "relativeLocation": {
                    "properties": {"city": "Farmersville", "state": "TX"}
                }
            }
        }))
        .unwrap();
        let point = PointData::from(feature.properties);
        assert_eq!(point.grid_point.office, "FWD");
        assert_eq!(point.display_name().as_deref(), Some("Farmersville, TX"));
        assert_eq!(point.time_zone.as_deref(), Some("America/Chicago"));
    }

    #[test]
    fn test_problem_detail_summary() {
        let problem: ProblemDetail = serde_json::from_value(serde_json::json!({
            "correlationId": "abc123",
            "title": "Invalid Parameter",
            "status": 400,
            "detail": "Parameter \"point\" is invalid"
        }))
        .unwrap();
        let summary = problem.summary("");
        assert!(summary.contains("is invalid"));
        assert!(summary.contains("abc123"));

        assert_eq!(ProblemDetail::default().summary("plain body"), "plain body");
    }
}
