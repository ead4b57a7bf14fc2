// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::domain::{ids, DriverStatus, VehicleClass};
use crate::dispatcher::Dispatcher;
use crate::events::EventBus;
use crate::geo::GeoIndex;
use crate::identity::{IdentityRegistry, NewDriverProfile, NewRiderProfile};
use crate::store::{InMemoryRideRepository, RideStore};

async fn harness() -> (Arc<AuctionEngine>, Arc<IdentityRegistry>, Arc<GeoIndex>, Arc<EventBus>) {
    let identity = Arc::new(IdentityRegistry::new());
    let geo = Arc::new(GeoIndex::new(50.0));
    let events = Arc::new(EventBus::new(None));
    let store = Arc::new(RideStore::new(Arc::new(InMemoryRideRepository::default())));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&geo), Arc::clone(&events), 10.0, 50.0, 10));
    let engine = Arc::new(AuctionEngine::new(store, Arc::clone(&identity), dispatcher, Arc::clone(&events)));
    (engine, identity, geo, events)
}

async fn online_driver(identity: &IdentityRegistry, geo: &GeoIndex, lat: f64, lon: f64) -> DriverId {
    let profile = NewDriverProfile { name: "A".to_owned(), phone: format!("+1{lat}"), location: crate::domain::GeoPoint { lat, lon } };
    let (driver, ..) = identity.register_driver(format!("conn-{lat}-{lon}"), None, Some(profile), 0).await.unwrap();
    identity
        .register_vehicle(crate::domain::Vehicle {
            id: format!("veh-{}", driver.id),
            driver_id: driver.id.clone(),
            class: VehicleClass::Taxi,
            comfort_level: 3,
            price_value: 3,
            active: true,
            make: "Toyota".to_owned(),
            model: "Camry".to_owned(),
            year: 2020,
            plate: "DL1".to_owned(),
            color: "White".to_owned(),
        })
        .await
        .unwrap();
    let updated = identity.get_driver(&driver.id).await.unwrap();
    geo.upsert(crate::geo::GeoEntry {
        driver_id: updated.id.clone(),
        point: updated.location,
        classes: vec![(VehicleClass::Taxi, 3, 3)],
        rating: updated.rating,
    })
    .await;
    driver.id
}

fn new_request(rider_id: RiderId) -> NewRideRequest {
    NewRideRequest {
        rider_id,
        pickup: Waypoint { address: "A".to_owned(), lat: 28.6139, lon: 77.2090 },
        destination: Waypoint { address: "B".to_owned(), lat: 28.7, lon: 77.3 },
        requested_class: VehicleClass::Taxi,
        comfort_preference: 3,
        fare_preference: 3,
        estimated_distance_km: 5.0,
        estimated_duration_minutes: 15,
    }
}

#[tokio::test]
async fn create_transitions_to_bidding() {
    let (engine, identity, _geo, _events) = harness().await;
    let profile = NewRiderProfile { display_name: "R".to_owned(), phone: "+1000".to_owned() };
    let (rider, ..) = identity.register_rider("c1".to_owned(), None, Some(profile), 0).await.unwrap();

    let request = engine.create(new_request(rider.id), 1_000).await.unwrap();
    assert_eq!(request.status, RideStatus::Bidding);
}

#[tokio::test]
async fn create_rejects_out_of_range_coordinates() {
    let (engine, identity, _geo, _events) = harness().await;
    let profile = NewRiderProfile { display_name: "R".to_owned(), phone: "+1001".to_owned() };
    let (rider, ..) = identity.register_rider("c1".to_owned(), None, Some(profile), 0).await.unwrap();

    let mut req = new_request(rider.id);
    req.pickup.lat = 999.0;
    let err = engine.create(req, 1_000).await.unwrap_err();
    assert_eq!(err, DispatchError::InvalidCoordinates);
}

#[tokio::test]
async fn place_bid_then_accept_marks_driver_busy_and_rejects_others() {
    let (engine, identity, geo, _events) = harness().await;
    let profile = NewRiderProfile { display_name: "R".to_owned(), phone: "+1002".to_owned() };
    let (rider, ..) = identity.register_rider("c1".to_owned(), None, Some(profile), 0).await.unwrap();
    let driver_a = online_driver(&identity, &geo, 28.62, 77.21).await;
    let driver_b = online_driver(&identity, &geo, 28.63, 77.22).await;

    let request = engine.create(new_request(rider.id.clone()), 1_000).await.unwrap();

    let bid_a = engine.place_bid(&request.id, &driver_a, 100.0, 5, None, None, 1_001).await.unwrap();
    let _bid_b = engine.place_bid(&request.id, &driver_b, 90.0, 7, None, None, 1_002).await.unwrap();

    let accepted = engine.accept_bid(&request.id, &bid_a.id, &rider.id, 1_003).await.unwrap();
    assert_eq!(accepted.status, RideStatus::Accepted);
    assert_eq!(accepted.accepted_bid.unwrap().driver_id, driver_a);

    let driver_a_after = identity.get_driver(&driver_a).await.unwrap();
    assert_eq!(driver_a_after.status, DriverStatus::Busy);

    let rejected_bid = accepted
        .bids
        .iter()
        .find(|b| b.driver_id == driver_b)
        .expect("driver b bid present");
    assert_eq!(rejected_bid.status, crate::domain::BidStatus::Rejected);
}

#[tokio::test]
async fn accept_bid_is_idempotent_on_replay() {
    let (engine, identity, geo, _events) = harness().await;
    let profile = NewRiderProfile { display_name: "R".to_owned(), phone: "+1003".to_owned() };
    let (rider, ..) = identity.register_rider("c1".to_owned(), None, Some(profile), 0).await.unwrap();
    let driver_a = online_driver(&identity, &geo, 28.62, 77.21).await;

    let request = engine.create(new_request(rider.id.clone()), 1_000).await.unwrap();
    let bid = engine.place_bid(&request.id, &driver_a, 100.0, 5, None, None, 1_001).await.unwrap();

    let first = engine.accept_bid(&request.id, &bid.id, &rider.id, 1_002).await.unwrap();
    let second = engine.accept_bid(&request.id, &bid.id, &rider.id, 1_010).await.unwrap();
    assert_eq!(first.accepted_bid.unwrap().bid_id, second.accepted_bid.unwrap().bid_id);
}

#[tokio::test]
async fn place_bid_rejects_busy_driver() {
    let (engine, identity, geo, _events) = harness().await;
    let profile = NewRiderProfile { display_name: "R".to_owned(), phone: "+1004".to_owned() };
    let (rider, ..) = identity.register_rider("c1".to_owned(), None, Some(profile), 0).await.unwrap();
    let driver_a = online_driver(&identity, &geo, 28.62, 77.21).await;
    identity.update_driver(&driver_a, |d| d.status = DriverStatus::Busy).await;

    let request = engine.create(new_request(rider.id), 1_000).await.unwrap();
    let err = engine.place_bid(&request.id, &driver_a, 100.0, 5, None, None, 1_001).await.unwrap_err();
    assert_eq!(err, DispatchError::DriverBusy);
}

#[tokio::test]
async fn cancel_is_idempotent_and_frees_assigned_driver() {
    let (engine, identity, geo, _events) = harness().await;
    let profile = NewRiderProfile { display_name: "R".to_owned(), phone: "+1005".to_owned() };
    let (rider, ..) = identity.register_rider("c1".to_owned(), None, Some(profile), 0).await.unwrap();
    let driver_a = online_driver(&identity, &geo, 28.62, 77.21).await;

    let request = engine.create(new_request(rider.id.clone()), 1_000).await.unwrap();
    let bid = engine.place_bid(&request.id, &driver_a, 100.0, 5, None, None, 1_001).await.unwrap();
    engine.accept_bid(&request.id, &bid.id, &rider.id, 1_002).await.unwrap();

    let cancelled = engine.cancel(&request.id, Some("rider cancelled".to_owned()), 1_003).await.unwrap();
    assert_eq!(cancelled.status, RideStatus::Cancelled);
    let driver_after = identity.get_driver(&driver_a).await.unwrap();
    assert_eq!(driver_after.status, DriverStatus::Available);

    let replayed = engine.cancel(&request.id, None, 1_004).await.unwrap();
    assert_eq!(replayed.status, RideStatus::Cancelled);
    assert_eq!(replayed.cancellation_reason, cancelled.cancellation_reason);
}

#[tokio::test]
async fn complete_increments_ride_counts() {
    let (engine, identity, geo, _events) = harness().await;
    let profile = NewRiderProfile { display_name: "R".to_owned(), phone: "+1006".to_owned() };
    let (rider, ..) = identity.register_rider("c1".to_owned(), None, Some(profile), 0).await.unwrap();
    let driver_a = online_driver(&identity, &geo, 28.62, 77.21).await;

    let request = engine.create(new_request(rider.id.clone()), 1_000).await.unwrap();
    let bid = engine.place_bid(&request.id, &driver_a, 100.0, 5, None, None, 1_001).await.unwrap();
    engine.accept_bid(&request.id, &bid.id, &rider.id, 1_002).await.unwrap();
    engine.start(&request.id, 1_003).await.unwrap();

    let completed = engine.complete(&request.id, 1_004).await.unwrap();
    assert_eq!(completed.status, RideStatus::Completed);

    let driver_after = identity.get_driver(&driver_a).await.unwrap();
    assert_eq!(driver_after.total_rides, 1);
    assert_eq!(driver_after.status, DriverStatus::Available);
    let rider_after = identity.get_rider(&rider.id).await.unwrap();
    assert_eq!(rider_after.total_rides, 1);
}

#[tokio::test]
async fn query_bids_ranks_lowest_fare_first() {
    let (engine, identity, geo, _events) = harness().await;
    let profile = NewRiderProfile { display_name: "R".to_owned(), phone: "+1007".to_owned() };
    let (rider, ..) = identity.register_rider("c1".to_owned(), None, Some(profile), 0).await.unwrap();
    let driver_a = online_driver(&identity, &geo, 28.62, 77.21).await;
    let driver_b = online_driver(&identity, &geo, 28.63, 77.22).await;

    let request = engine.create(new_request(rider.id), 1_000).await.unwrap();
    engine.place_bid(&request.id, &driver_a, 120.0, 5, None, None, 1_001).await.unwrap();
    engine.place_bid(&request.id, &driver_b, 80.0, 7, None, None, 1_002).await.unwrap();

    let (ranked, stats) = engine
        .query_bids(&request.id, None, BidSortBy::FareAmount, SortOrder::Asc)
        .await
        .unwrap();
    assert_eq!(ranked[0].bid.driver_id, driver_b);
    assert!(ranked[0].is_lowest);
    let stats = stats.unwrap();
    assert_eq!(stats.min, 80.0);
    assert_eq!(stats.max, 120.0);
}

#[tokio::test]
async fn place_bid_fans_out_bid_update_to_rider_and_request_rooms() {
    use crate::events::Room;

    let (engine, identity, geo, events) = harness().await;
    let profile = NewRiderProfile { display_name: "R".to_owned(), phone: "+1008".to_owned() };
    let (rider, ..) = identity.register_rider("c1".to_owned(), None, Some(profile), 0).await.unwrap();
    let driver_a = online_driver(&identity, &geo, 28.62, 77.21).await;

    let request = engine.create(new_request(rider.id.clone()), 1_000).await.unwrap();

    let mut rider_rx = events.subscribe(&Room::Rider(rider.id.clone())).await;
    let mut request_rx = events.subscribe(&Room::Request(request.id.clone())).await;

    engine.place_bid(&request.id, &driver_a, 100.0, 5, None, None, 1_001).await.unwrap();

    let to_rider = rider_rx.recv().await.expect("rider room receives bidUpdate");
    let to_request = request_rx.recv().await.expect("request room receives bidUpdate");
    assert!(matches!(to_rider, DispatchEvent::RideBidUpdate { ref request_id, .. } if *request_id == request.id));
    assert!(matches!(to_request, DispatchEvent::RideBidUpdate { ref request_id, .. } if *request_id == request.id));
}

#[tokio::test]
async fn idempotency_window_detects_replay_within_ttl() {
    let window = IdempotencyWindow::new();
    assert!(!window.check_and_record("op:abc".to_owned(), 1_000).await);
    assert!(window.check_and_record("op:abc".to_owned(), 1_500).await);
    assert!(!window.check_and_record("op:abc".to_owned(), 1_000 + IDEMPOTENCY_WINDOW_MS + 1).await);
}
