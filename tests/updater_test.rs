mod common;

use common::{build_updater, create_test_dir, test_config, MockHttpClient, MockListingProvider};
use mapupdater::{ShutdownSignal, TriggerCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test]
async fn test_overlapping_checks_never_run_concurrently() {
    let temp_dir = create_test_dir();
    let maps_path = temp_dir.path();

    let client = Arc::new(MockHttpClient::new());
    let provider = Arc::new(MockListingProvider::with_delay(
        &["jump_a.bsp.bz2"],
        Duration::from_millis(30),
    ));
    let updater = Arc::new(build_updater(
        &test_config(maps_path),
        client.clone(),
        provider.clone(),
    ));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let updater = Arc::clone(&updater);
            tokio::spawn(async move { updater.check_maps(&[]).await })
        })
        .collect();

    let mut fetched = 0;
    for handle in handles {
        let result = handle.await.unwrap().expect("Should reconcile");
        fetched += result.fetched.len();
    }

    // Every trigger got its own pass, one at a time
    assert_eq!(provider.calls.total(), 3);
    assert_eq!(provider.calls.max_active(), 1);
    assert_eq!(fetched, 1);
    assert_eq!(client.downloads.total(), 1);
}

#[tokio::test]
async fn test_upload_notification_forces_the_uploaded_maps() {
    let temp_dir = create_test_dir();
    let maps_path = temp_dir.path();

    let client = Arc::new(MockHttpClient::new());
    let provider = Arc::new(MockListingProvider::new(&["jump_a.bsp.bz2"]));
    let updater = Arc::new(build_updater(&test_config(maps_path), client, provider));
    let coordinator = TriggerCoordinator::new(updater);

    coordinator
        .on_upload_finished(&[
            "jump_new.bsp".to_string(),
            "jump_new.nav".to_string(),
        ])
        .await
        .unwrap();

    assert!(maps_path.join("jump_a.bsp").exists());
    assert!(maps_path.join("jump_new.bsp").exists());
    assert!(!maps_path.join("jump_new.nav").exists());
}

#[tokio::test]
async fn test_connecting_runs_a_check() {
    let temp_dir = create_test_dir();
    let maps_path = temp_dir.path();

    let client = Arc::new(MockHttpClient::new());
    let provider = Arc::new(MockListingProvider::new(&["jump_a.bsp.bz2"]));
    let updater = Arc::new(build_updater(
        &test_config(maps_path),
        client,
        provider.clone(),
    ));
    let coordinator = TriggerCoordinator::new(updater);

    coordinator.on_connected().await.unwrap();

    assert_eq!(provider.calls.total(), 1);
    assert!(maps_path.join("jump_a.bsp").exists());
}

#[tokio::test]
async fn test_periodic_check_runs_immediately_and_stops_on_shutdown() {
    let temp_dir = create_test_dir();
    let maps_path = temp_dir.path();

    let client = Arc::new(MockHttpClient::new());
    let provider = Arc::new(MockListingProvider::new(&["jump_a.bsp.bz2"]));
    let updater = Arc::new(build_updater(
        &test_config(maps_path),
        client,
        provider.clone(),
    ));
    let coordinator = TriggerCoordinator::new(updater);

    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownSignal::None);
    let periodic = tokio::spawn(async move {
        coordinator
            .run_periodic(Duration::from_secs(3600), shutdown_rx)
            .await
    });

    let first_run = async {
        while provider.calls.total() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), first_run)
        .await
        .expect("First check should run without waiting for the interval");

    shutdown_tx.send(ShutdownSignal::Shutdown).unwrap();
    tokio::time::timeout(Duration::from_secs(5), periodic)
        .await
        .expect("Periodic loop should stop on shutdown")
        .unwrap();

    assert_eq!(provider.calls.total(), 1);
}
