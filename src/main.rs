use std::sync::Arc;

use anyhow::{Context, Result};
use skycast_core::Config;
use skycast_weather::{BackgroundRefresher, MemoryLocationStore, WeatherService};

#[tokio::main]
async fn main() -> Result<()> {
    skycast_core::init()?;

    let (config, _) = Config::load_validated()?;
    let service = Arc::new(
        WeatherService::from_config(&config).context("Failed to build weather service")?,
    );

    // One-shot lookup: `skycast 75454`
    if let Some(postal_code) = std::env::args().nth(1) {
        let package = service
            .get_weather_for_postal_code(&postal_code)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!("{}", serde_json::to_string_pretty(&package)?);
        return Ok(());
    }

    let sweeper = service.cache().spawn_sweeper();

    let refresher = if config.refresh.enabled && config.refresh.interval_minutes > 0 {
        let store = Arc::new(MemoryLocationStore::with_codes(&config.refresh.postal_codes));
        Some(BackgroundRefresher::new(service.clone(), store, config.refresh.interval()).start())
    } else {
        tracing::info!("Background refresh disabled");
        None
    };

    tracing::info!("Skycast running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    if let Some(refresher) = refresher {
        refresher.stop().await;
    }
    if let Some(sweeper) = sweeper {
        sweeper.stop().await;
    }

    Ok(())
}
