//! Integration tests for the background refresher against a mock upstream.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{hits, mount_location, service, MELISSA, NEW_YORK};
use skycast_weather::{
    BackgroundRefresher, CacheKey, CacheTtls, CycleReport, LocationStore, MemoryLocationStore,
};
use wiremock::MockServer;

#[tokio::test]
async fn test_cycle_warms_cache_for_every_location() {
    let server = MockServer::start().await;
    mount_location(&server, &MELISSA).await;
    mount_location(&server, &NEW_YORK).await;
    let service = Arc::new(service(&server, CacheTtls::default()));
    let store = Arc::new(MemoryLocationStore::with_codes(["75454", "10001"]));

    let refresher =
        BackgroundRefresher::new(service.clone(), store.clone(), Duration::from_secs(300));
    let report = refresher.run_cycle().await;

    assert_eq!(
        report,
        CycleReport {
            attempted: 2,
            succeeded: 2,
            failed: 0
        }
    );
    assert!(service
        .cache()
        .has(&CacheKey::points(MELISSA.latitude, MELISSA.longitude)));
    assert!(service
        .cache()
        .has(&CacheKey::points(NEW_YORK.latitude, NEW_YORK.longitude)));

    // A user request right after the cycle needs no upstream point lookup
    service
        .get_weather_for_postal_code("75454")
        .await
        .unwrap();
    assert_eq!(hits(&server, &MELISSA.point_path()).await, 1);
    assert_eq!(hits(&server, &MELISSA.geocode_path()).await, 1);
}

#[tokio::test]
async fn test_unknown_location_is_counted_as_failure() {
    let server = MockServer::start().await;
    mount_location(&server, &MELISSA).await;
    let service = Arc::new(service(&server, CacheTtls::default()));
    let store = Arc::new(MemoryLocationStore::new());
    store.add("75454").unwrap();
    store.add("99999").unwrap();

    let refresher = BackgroundRefresher::new(service, store, Duration::from_secs(300));
    let report = refresher.run_cycle().await;

    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
}
