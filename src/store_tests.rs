// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::domain::ride_request::Waypoint;
use crate::domain::{ids, VehicleClass};

fn sample_request() -> RideRequest {
    RideRequest {
        id: ids::new_request_id(),
        rider_id: ids::RiderId::parse("USER_0000000A").expect("valid"),
        pickup: Waypoint { address: "A".to_owned(), lat: 28.6, lon: 77.2 },
        destination: Waypoint { address: "B".to_owned(), lat: 28.7, lon: 77.3 },
        requested_class: VehicleClass::Taxi,
        comfort_preference: 3,
        fare_preference: 3,
        estimated_distance_km: 5.0,
        estimated_duration_minutes: 15,
        status: RideStatus::Pending,
        bids: Vec::new(),
        accepted_bid: None,
        created_at_ms: 0,
        updated_at_ms: 0,
        cancelled_at_ms: None,
        cancellation_reason: None,
    }
}

#[tokio::test]
async fn create_then_snapshot_round_trips() {
    let store = RideStore::new(Arc::new(InMemoryRideRepository::default()));
    let request = sample_request();
    let id = request.id.clone();
    store.create(request).await;

    let snap = store.snapshot(&id).await.expect("present");
    assert_eq!(snap.id, id);
    assert_eq!(store.repository().load(&id).expect("persisted").id, id);
}

#[tokio::test]
async fn list_available_filters_by_bidding_status() {
    let store = RideStore::new(Arc::new(InMemoryRideRepository::default()));
    let mut bidding = sample_request();
    bidding.status = RideStatus::Bidding;
    let pending = sample_request();

    store.create(bidding.clone()).await;
    store.create(pending).await;

    let available = store.list_available().await;
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, bidding.id);
}

#[tokio::test]
async fn evict_removes_from_live_map_and_repository() {
    let store = RideStore::new(Arc::new(InMemoryRideRepository::default()));
    let request = sample_request();
    let id = request.id.clone();
    store.create(request).await;

    store.evict(&id).await;
    assert!(store.snapshot(&id).await.is_none());
    assert!(store.repository().load(&id).is_none());
}
