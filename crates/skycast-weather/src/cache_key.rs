//! Deterministic cache keys of the form `<dataType>:<params>`.
//!
//! The data-type tag is always part of the key, so different kinds of data
//! never collide even when their parameters do.

use crate::types::GridPoint;

/// Kind of cached data, used as the key prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Points,
    Forecast7Day,
    ForecastHourly,
    Stations,
    Observation,
    Geocode,
}

impl DataType {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Forecast7Day => "forecast-7day",
            Self::ForecastHourly => "forecast-hourly",
            Self::Stations => "stations",
            Self::Observation => "observation",
            Self::Geocode => "geocode",
        }
    }
}

pub struct CacheKey;

impl CacheKey {
    pub fn generate(data_type: DataType, params: &str) -> String {
        format!("{}:{}", data_type.tag(), params)
    }

    /// Coordinates are fixed to 4 decimal places (about 11 m).
    pub fn points(latitude: f64, longitude: f64) -> String {
        Self::generate(DataType::Points, &format_coordinates(latitude, longitude))
    }

    pub fn forecast(grid: &GridPoint) -> String {
        Self::generate(DataType::Forecast7Day, &format_grid(grid))
    }

    pub fn hourly(grid: &GridPoint) -> String {
        Self::generate(DataType::ForecastHourly, &format_grid(grid))
    }

    pub fn stations(grid: &GridPoint) -> String {
        Self::generate(DataType::Stations, &format_grid(grid))
    }

    pub fn observation(station_id: &str) -> String {
        Self::generate(DataType::Observation, station_id)
    }

    pub fn geocode(postal_code: &str) -> String {
        Self::generate(DataType::Geocode, postal_code)
    }
}

fn format_coordinates(latitude: f64, longitude: f64) -> String {
    format!("{:.4},{:.4}", latitude, longitude)
}

fn format_grid(grid: &GridPoint) -> String {
    format!("{}/{},{}", grid.office, grid.grid_x, grid.grid_y)
}
