//! Weather data service for Skycast
//!
//! Fetches forecasts, observations and alerts from the National Weather
//! Service API, resolves US postal codes through a geocoder, and keeps
//! everything in a shared in-process TTL cache that a background task
//! refreshes for known locations.

pub mod cache;
pub mod cache_key;
pub mod client;
pub mod error;
pub mod geocode;
pub mod location;
pub mod refresher;
pub mod retry;
pub mod service;
pub mod transport;
pub mod types;

pub use cache::{CacheEntry, CacheOptions, CacheStats, SweeperHandle, TtlCache, TtlStatus};
pub use cache_key::{CacheKey, DataType};
pub use client::{RequestStats, WeatherApiClient};
pub use error::{TransportError, WeatherError, WeatherResult};
pub use geocode::GeocodingClient;
pub use location::{LocationStore, MemoryLocationStore};
pub use refresher::{BackgroundRefresher, CycleReport, Prefetcher, RefresherHandle};
pub use retry::RetryConfig;
pub use service::{CacheTtls, WeatherService};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
pub use types::*;
