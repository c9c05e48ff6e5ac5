// Tracking identifier uniqueness under concurrent allocation and registration

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

use shipment_sync::config::AllocatorConfig;
use shipment_sync::{
    InMemoryShipmentStore, ShipmentRegistrar, ShipmentStore, SyncError, TrackingIdAllocator,
};

fn allocator(store: Arc<InMemoryShipmentStore>, config: AllocatorConfig) -> TrackingIdAllocator {
    TrackingIdAllocator::new(store, &config)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_allocations_are_pairwise_distinct() {
    let store = Arc::new(InMemoryShipmentStore::new());
    let allocator = Arc::new(allocator(store, AllocatorConfig::default()));

    let calls = (0..100).map(|_| {
        let allocator = allocator.clone();
        async move { allocator.allocate().await }
    });
    let reservations: Vec<_> = join_all(calls)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("all allocations succeed");

    let distinct: HashSet<_> = reservations.iter().map(|r| r.as_str().to_string()).collect();
    assert_eq!(distinct.len(), reservations.len());
    assert_eq!(allocator.outstanding(), 100);

    drop(reservations);
    assert_eq!(allocator.outstanding(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_store_distinct_ids() {
    let store = Arc::new(InMemoryShipmentStore::new());
    let registrar = Arc::new(ShipmentRegistrar::new(
        store.clone(),
        allocator(store.clone(), AllocatorConfig::default()),
    ));

    let calls = (0..200).map(|_| {
        let registrar = registrar.clone();
        async move { registrar.register().await }
    });
    let shipments: Vec<_> = join_all(calls)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("all registrations succeed");

    let tracking: HashSet<_> = shipments.iter().map(|s| s.tracking_id.clone()).collect();
    let ids: HashSet<_> = shipments.iter().map(|s| s.id).collect();
    assert_eq!(tracking.len(), 200);
    assert_eq!(ids.len(), 200);
    assert_eq!(store.len().await, 200);
    assert_eq!(registrar.allocator().outstanding(), 0);
}

#[tokio::test]
async fn test_exhaustion_when_store_reports_everything_taken() {
    let store = Arc::new(InMemoryShipmentStore::new());
    let frozen = chrono::Local::now();
    let prefix = frozen.format("%Y%m%d%H%M%S").to_string();
    for suffix in 0..10 {
        store.occupy_tracking_id(&format!("{prefix}{suffix}")).await;
    }

    let allocator = allocator(
        store.clone(),
        AllocatorConfig {
            max_attempts: 7,
            suffix_digits: 1,
        },
    )
    .with_clock(move || frozen);

    let err = allocator.allocate().await.unwrap_err();
    assert!(matches!(err, SyncError::IdentifierSpaceExhausted { attempts: 7 }));
    assert_eq!(allocator.metrics().get_stats().allocation_collisions, 7);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_allocated_id_is_free_in_store() {
    let store = Arc::new(InMemoryShipmentStore::new());
    let allocator = allocator(store.clone(), AllocatorConfig::default());

    let reservation = allocator.allocate().await.unwrap();
    assert!(!store.exists_by_tracking_id(reservation.as_str()).await.unwrap());
}
