//! Periodic cache warming for every known location.
//!
//! One task drives all cycles, so a cycle never overlaps the next one.
//! A failing location is logged and skipped; it never aborts the cycle.
//! Stopping takes effect between cycles: a started cycle always finishes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::WeatherResult;
use crate::location::LocationStore;
use crate::service::WeatherService;

/// Something that can warm the cache for one postal code.
#[async_trait]
pub trait Prefetcher: Send + Sync {
    async fn prefetch_postal_code(&self, postal_code: &str) -> WeatherResult<()>;
}

#[async_trait]
impl Prefetcher for WeatherService {
    async fn prefetch_postal_code(&self, postal_code: &str) -> WeatherResult<()> {
        let coords = self.geocode(postal_code).await?;
        self.prefetch_weather_data(coords.latitude, coords.longitude)
            .await
    }
}

/// Outcome of one refresh pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct BackgroundRefresher {
    prefetcher: Arc<dyn Prefetcher>,
    store: Arc<dyn LocationStore>,
    interval: Duration,
}

impl BackgroundRefresher {
    pub fn new(
        prefetcher: Arc<dyn Prefetcher>,
        store: Arc<dyn LocationStore>,
        interval: Duration,
    ) -> Self {
        Self {
            prefetcher,
            store,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Prefetch every known location once, sequentially.
    pub async fn run_cycle(&self) -> CycleReport {
        let codes = self.store.list();
        let mut report = CycleReport {
            attempted: codes.len(),
            ..CycleReport::default()
        };

        for code in &codes {
            match self.prefetcher.prefetch_postal_code(code).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Background refresh failed for {}: {}", code, e);
                }
            }
        }

        tracing::info!(
            "Background refresh complete: {}/{} locations refreshed, {} failed",
            report.succeeded,
            report.attempted,
            report.failed
        );
        report
    }

    /// Spawn the refresh loop. The first cycle runs one interval after start.
    pub fn start(self) -> RefresherHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        let period = self.interval;

        let join = tokio::spawn(async move {
            tracing::info!("Background refresher started, every {:?}", period);
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        self.run_cycle().await;
                    }
                }
            }
            tracing::info!("Background refresher stopped");
        });

        RefresherHandle { token, join }
    }
}

/// Stop handle for a running refresher
pub struct RefresherHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl RefresherHandle {
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Signal the loop and wait for it. A cycle in progress runs to
    /// completion first; no further cycle starts.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!("Background refresher ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WeatherError;
    use crate::location::MemoryLocationStore;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingPrefetcher {
        calls: Mutex<Vec<String>>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl Prefetcher for RecordingPrefetcher {
        async fn prefetch_postal_code(&self, postal_code: &str) -> WeatherResult<()> {
            self.calls.lock().push(postal_code.to_string());
            if self.failing.iter().any(|c| c == postal_code) {
                return Err(WeatherError::upstream("boom"));
            }
            Ok(())
        }
    }

    fn store(codes: &[&str]) -> Arc<dyn LocationStore> {
        Arc::new(MemoryLocationStore::with_codes(codes.iter().copied()))
    }

    #[tokio::test]
    async fn test_cycle_prefetches_each_location_once() {
        let prefetcher = Arc::new(RecordingPrefetcher::default());
        let refresher = BackgroundRefresher::new(
            prefetcher.clone(),
            store(&["75454", "10001"]),
            Duration::from_secs(300),
        );

        let report = refresher.run_cycle().await;

        assert_eq!(
            report,
            CycleReport {
                attempted: 2,
                succeeded: 2,
                failed: 0
            }
        );
        assert_eq!(*prefetcher.calls.lock(), vec!["10001", "75454"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_cycle() {
        let prefetcher = Arc::new(RecordingPrefetcher {
            failing: vec!["10001".to_string()],
            ..Default::default()
        });
        let refresher = BackgroundRefresher::new(
            prefetcher.clone(),
            store(&["10001", "75454", "90210"]),
            Duration::from_secs(300),
        );

        let report = refresher.run_cycle().await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(prefetcher.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_store_is_a_noop() {
        let prefetcher = Arc::new(RecordingPrefetcher::default());
        let refresher =
            BackgroundRefresher::new(prefetcher.clone(), store(&[]), Duration::from_secs(300));

        assert_eq!(refresher.run_cycle().await, CycleReport::default());
        assert!(prefetcher.calls.lock().is_empty());
    }

    struct SlowPrefetcher {
        completed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Prefetcher for SlowPrefetcher {
        async fn prefetch_postal_code(&self, postal_code: &str) -> WeatherResult<()> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            self.completed.lock().push(postal_code.to_string());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_started_cycle_finish() {
        let prefetcher = Arc::new(SlowPrefetcher {
            completed: Mutex::new(Vec::new()),
        });
        let refresher = BackgroundRefresher::new(
            prefetcher.clone(),
            store(&["75454", "10001"]),
            Duration::from_secs(300),
        );
        let handle = refresher.start();

        // First cycle starts at 300s; each location takes 10s
        tokio::time::sleep(Duration::from_secs(305)).await;
        assert!(prefetcher.completed.lock().is_empty());

        handle.stop().await;
        assert_eq!(*prefetcher.completed.lock(), vec!["10001", "75454"]);

        // No further cycle after stop
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(prefetcher.completed.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_interval_until_stopped() {
        let prefetcher = Arc::new(RecordingPrefetcher::default());
        let refresher = BackgroundRefresher::new(
            prefetcher.clone(),
            store(&["75454"]),
            Duration::from_secs(300),
        );
        let handle = refresher.start();

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(prefetcher.calls.lock().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(prefetcher.calls.lock().len(), 1);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(prefetcher.calls.lock().len(), 2);

        assert!(handle.is_running());
        handle.stop().await;

        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(prefetcher.calls.lock().len(), 2);
    }
}
