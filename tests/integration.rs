// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios against the dispatch engine's public components,
//! wired exactly as `AppState::new` wires them for the live server but
//! driven directly rather than over the wire protocol.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ride_dispatch::auction::NewRideRequest;
use ride_dispatch::config::DispatchConfig;
use ride_dispatch::domain::{DriverStatus, GeoPoint, RideStatus, VehicleClass, Waypoint};
use ride_dispatch::error::DispatchError;
use ride_dispatch::identity::{NewDriverProfile, NewRiderProfile};
use ride_dispatch::state::AppState;

fn test_config() -> DispatchConfig {
    DispatchConfig {
        listen_address: "0.0.0.0:0".to_owned(),
        database_url: None,
        auth_token: None,
        auction_ttl_seconds: 120,
        heartbeat_interval_seconds: 30,
        session_idle_seconds: 300,
        driver_stale_seconds: 600,
        default_dispatch_radius_km: 10.0,
        max_dispatch_radius_km: 50.0,
        max_candidate_drivers: 10,
        retention_days: 30,
        nats_url: None,
        nats_prefix: "dispatch".to_owned(),
    }
}

fn test_state() -> Arc<AppState> {
    AppState::new(test_config(), None, CancellationToken::new())
}

async fn register_rider(state: &AppState, conn: &str, phone: &str) -> ride_dispatch::domain::Rider {
    state
        .identity
        .register_rider(
            conn.to_owned(),
            None,
            Some(NewRiderProfile { display_name: "Rider".to_owned(), phone: phone.to_owned() }),
            0,
        )
        .await
        .expect("rider registers")
        .0
}

async fn register_driver(
    state: &AppState,
    conn: &str,
    phone: &str,
    location: GeoPoint,
    comfort: u8,
    price: u8,
    rating: f64,
) -> ride_dispatch::domain::Driver {
    let (driver, ..) = state
        .identity
        .register_driver(
            conn.to_owned(),
            None,
            Some(NewDriverProfile { name: "Driver".to_owned(), phone: phone.to_owned(), location }),
            0,
        )
        .await
        .expect("driver registers");
    state.identity.update_driver(&driver.id, |d| d.rating = rating).await;
    state
        .identity
        .register_vehicle(ride_dispatch::domain::Vehicle {
            id: format!("veh-{}", driver.id),
            driver_id: driver.id.clone(),
            class: VehicleClass::Taxi,
            comfort_level: comfort,
            price_value: price,
            active: true,
            make: "Toyota".to_owned(),
            model: "Etios".to_owned(),
            year: 2020,
            plate: "DL1AB1234".to_owned(),
            color: "white".to_owned(),
        })
        .await
        .expect("vehicle registers");
    let updated = state.identity.get_driver(&driver.id).await.expect("driver exists");
    state.dispatcher.reindex_driver(&state.identity, &updated).await;
    updated
}

fn pickup() -> Waypoint {
    Waypoint { address: "Connaught Place".to_owned(), lat: 28.6139, lon: 77.2090 }
}

fn destination() -> Waypoint {
    Waypoint { address: "Airport".to_owned(), lat: 28.5562, lon: 77.1000 }
}

/// S1 — happy path: two drivers bid, rider accepts the cheaper one.
#[tokio::test]
async fn happy_path_accept_marks_winner_busy_and_rejects_others() {
    let state = test_state();
    let rider = register_rider(&state, "conn-rider", "+910000001").await;
    let driver_a =
        register_driver(&state, "conn-a", "+910000002", GeoPoint { lat: 28.62, lon: 77.21 }, 3, 3, 4.6).await;
    let driver_b =
        register_driver(&state, "conn-b", "+910000003", GeoPoint { lat: 28.61, lon: 77.20 }, 3, 2, 4.2).await;

    let request = state
        .auction
        .create(
            NewRideRequest {
                rider_id: rider.id.clone(),
                pickup: pickup(),
                destination: destination(),
                requested_class: VehicleClass::Taxi,
                comfort_preference: 3,
                fare_preference: 3,
                estimated_distance_km: 12.0,
                estimated_duration_minutes: 25,
            },
            1_000,
        )
        .await
        .expect("request created");
    assert_eq!(request.status, RideStatus::Bidding);

    let bid_a = state
        .auction
        .place_bid(&request.id, &driver_a.id, 180.0, 6, None, None, 2_000)
        .await
        .expect("bid a placed");
    let bid_b = state
        .auction
        .place_bid(&request.id, &driver_b.id, 160.0, 4, None, None, 2_100)
        .await
        .expect("bid b placed");

    let accepted = state
        .auction
        .accept_bid(&request.id, &bid_b.id, &rider.id, 3_000)
        .await
        .expect("accept succeeds");
    assert_eq!(accepted.status, RideStatus::Accepted);
    assert_eq!(accepted.accepted_bid.as_ref().unwrap().driver_id, driver_b.id);

    let rejected_a = accepted.bids.iter().find(|b| b.driver_id == driver_a.id).unwrap();
    assert_eq!(rejected_a.status, ride_dispatch::domain::BidStatus::Rejected);
    assert_eq!(rejected_a.id, bid_a.id);

    let winner = state.identity.get_driver(&driver_b.id).await.unwrap();
    assert_eq!(winner.status, DriverStatus::Busy);
    let loser = state.identity.get_driver(&driver_a.id).await.unwrap();
    assert_eq!(loser.status, DriverStatus::Available);
}

/// S2 — a bid placed after acceptance is rejected with `REQUEST_NOT_BIDDABLE`.
#[tokio::test]
async fn late_bid_after_acceptance_is_rejected() {
    let state = test_state();
    let rider = register_rider(&state, "conn-rider", "+910000004").await;
    let driver_a =
        register_driver(&state, "conn-a", "+910000005", GeoPoint { lat: 28.62, lon: 77.21 }, 3, 3, 4.6).await;
    let driver_late =
        register_driver(&state, "conn-late", "+910000006", GeoPoint { lat: 28.60, lon: 77.19 }, 3, 3, 4.0).await;

    let request = state
        .auction
        .create(
            NewRideRequest {
                rider_id: rider.id.clone(),
                pickup: pickup(),
                destination: destination(),
                requested_class: VehicleClass::Taxi,
                comfort_preference: 3,
                fare_preference: 3,
                estimated_distance_km: 12.0,
                estimated_duration_minutes: 25,
            },
            1_000,
        )
        .await
        .expect("request created");

    let bid_a = state
        .auction
        .place_bid(&request.id, &driver_a.id, 180.0, 6, None, None, 2_000)
        .await
        .expect("bid placed");
    state.auction.accept_bid(&request.id, &bid_a.id, &rider.id, 3_000).await.expect("accept succeeds");

    let late = state.auction.place_bid(&request.id, &driver_late.id, 140.0, 8, None, None, 4_000).await;
    assert_eq!(late.unwrap_err(), DispatchError::RequestNotBiddable);

    let snapshot = state.store.snapshot(&request.id).await.unwrap();
    assert_eq!(snapshot.bids.len(), 1);
}

/// S3 — a driver's second bid updates the existing entry rather than appending.
#[tokio::test]
async fn duplicate_bid_updates_in_place() {
    let state = test_state();
    let rider = register_rider(&state, "conn-rider", "+910000007").await;
    let driver =
        register_driver(&state, "conn-a", "+910000008", GeoPoint { lat: 28.62, lon: 77.21 }, 3, 3, 4.6).await;

    let request = state
        .auction
        .create(
            NewRideRequest {
                rider_id: rider.id.clone(),
                pickup: pickup(),
                destination: destination(),
                requested_class: VehicleClass::Taxi,
                comfort_preference: 3,
                fare_preference: 3,
                estimated_distance_km: 12.0,
                estimated_duration_minutes: 25,
            },
            1_000,
        )
        .await
        .expect("request created");

    state.auction.place_bid(&request.id, &driver.id, 200.0, 6, None, None, 2_000).await.expect("first bid");
    state.auction.place_bid(&request.id, &driver.id, 175.0, 5, None, None, 2_500).await.expect("second bid");

    let snapshot = state.store.snapshot(&request.id).await.unwrap();
    assert_eq!(snapshot.bids.len(), 1);
    assert_eq!(snapshot.bids[0].fare_amount, 175.0);
}

/// S5 — concurrent accept on the same request: exactly one wins.
#[tokio::test]
async fn concurrent_accept_has_exactly_one_winner() {
    let state = test_state();
    let rider = register_rider(&state, "conn-rider", "+910000009").await;
    let driver_a =
        register_driver(&state, "conn-a", "+910000010", GeoPoint { lat: 28.62, lon: 77.21 }, 3, 3, 4.6).await;
    let driver_b =
        register_driver(&state, "conn-b", "+910000011", GeoPoint { lat: 28.61, lon: 77.20 }, 3, 2, 4.2).await;

    let request = state
        .auction
        .create(
            NewRideRequest {
                rider_id: rider.id.clone(),
                pickup: pickup(),
                destination: destination(),
                requested_class: VehicleClass::Taxi,
                comfort_preference: 3,
                fare_preference: 3,
                estimated_distance_km: 12.0,
                estimated_duration_minutes: 25,
            },
            1_000,
        )
        .await
        .expect("request created");

    let bid_a = state
        .auction
        .place_bid(&request.id, &driver_a.id, 180.0, 6, None, None, 2_000)
        .await
        .expect("bid a placed");
    let bid_b = state
        .auction
        .place_bid(&request.id, &driver_b.id, 160.0, 4, None, None, 2_100)
        .await
        .expect("bid b placed");

    let (res_a, res_b) = tokio::join!(
        state.auction.accept_bid(&request.id, &bid_a.id, &rider.id, 3_000),
        state.auction.accept_bid(&request.id, &bid_b.id, &rider.id, 3_000),
    );

    let successes = [&res_a, &res_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one acceptance should succeed");
    let failure = if res_a.is_err() { res_a } else { res_b };
    assert_eq!(failure.unwrap_err(), DispatchError::BiddingClosed);

    let snapshot = state.store.snapshot(&request.id).await.unwrap();
    assert_eq!(snapshot.status, RideStatus::Accepted);
    let accepted_count = snapshot.bids.iter().filter(|b| b.status == ride_dispatch::domain::BidStatus::Accepted).count();
    assert_eq!(accepted_count, 1);
}

/// S6 — a driver disconnects after bidding but before acceptance; accepting
/// their bid fails with `DRIVER_NOT_AVAILABLE` and the rider may pick another.
#[tokio::test]
async fn accept_after_driver_goes_offline_fails_driver_not_available() {
    let state = test_state();
    let rider = register_rider(&state, "conn-rider", "+910000012").await;
    let driver_a =
        register_driver(&state, "conn-a", "+910000013", GeoPoint { lat: 28.62, lon: 77.21 }, 3, 3, 4.6).await;
    let driver_b =
        register_driver(&state, "conn-b", "+910000014", GeoPoint { lat: 28.61, lon: 77.20 }, 3, 2, 4.2).await;

    let request = state
        .auction
        .create(
            NewRideRequest {
                rider_id: rider.id.clone(),
                pickup: pickup(),
                destination: destination(),
                requested_class: VehicleClass::Taxi,
                comfort_preference: 3,
                fare_preference: 3,
                estimated_distance_km: 12.0,
                estimated_duration_minutes: 25,
            },
            1_000,
        )
        .await
        .expect("request created");

    let bid_a = state
        .auction
        .place_bid(&request.id, &driver_a.id, 180.0, 6, None, None, 2_000)
        .await
        .expect("bid a placed");
    let bid_b = state
        .auction
        .place_bid(&request.id, &driver_b.id, 160.0, 4, None, None, 2_100)
        .await
        .expect("bid b placed");

    state.identity.unregister("conn-a", 2_500).await;

    let failed = state.auction.accept_bid(&request.id, &bid_a.id, &rider.id, 3_000).await;
    assert_eq!(failed.unwrap_err(), DispatchError::DriverNotAvailable);

    let accepted = state
        .auction
        .accept_bid(&request.id, &bid_b.id, &rider.id, 3_100)
        .await
        .expect("second driver's bid still acceptable");
    assert_eq!(accepted.status, RideStatus::Accepted);
}

/// Acceptance idempotence: replaying the same accept returns the same state.
#[tokio::test]
async fn accept_bid_is_idempotent_on_replay() {
    let state = test_state();
    let rider = register_rider(&state, "conn-rider", "+910000015").await;
    let driver =
        register_driver(&state, "conn-a", "+910000016", GeoPoint { lat: 28.62, lon: 77.21 }, 3, 3, 4.6).await;

    let request = state
        .auction
        .create(
            NewRideRequest {
                rider_id: rider.id.clone(),
                pickup: pickup(),
                destination: destination(),
                requested_class: VehicleClass::Taxi,
                comfort_preference: 3,
                fare_preference: 3,
                estimated_distance_km: 12.0,
                estimated_duration_minutes: 25,
            },
            1_000,
        )
        .await
        .expect("request created");
    let bid = state.auction.place_bid(&request.id, &driver.id, 180.0, 6, None, None, 2_000).await.unwrap();

    let first = state.auction.accept_bid(&request.id, &bid.id, &rider.id, 3_000).await.unwrap();
    let second = state.auction.accept_bid(&request.id, &bid.id, &rider.id, 4_000).await.unwrap();
    assert_eq!(first.updated_at_ms, second.updated_at_ms);
    assert_eq!(first.accepted_bid.unwrap().bid_id, second.accepted_bid.unwrap().bid_id);
}

/// Cancellation idempotence: two cancels settle on the same final state.
#[tokio::test]
async fn cancel_is_idempotent() {
    let state = test_state();
    let rider = register_rider(&state, "conn-rider", "+910000017").await;

    let request = state
        .auction
        .create(
            NewRideRequest {
                rider_id: rider.id.clone(),
                pickup: pickup(),
                destination: destination(),
                requested_class: VehicleClass::Taxi,
                comfort_preference: 3,
                fare_preference: 3,
                estimated_distance_km: 12.0,
                estimated_duration_minutes: 25,
            },
            1_000,
        )
        .await
        .expect("request created");

    let first = state.auction.cancel(&request.id, Some("rider changed mind".to_owned()), 2_000).await.unwrap();
    let second = state.auction.cancel(&request.id, Some("different reason".to_owned()), 3_000).await.unwrap();
    assert_eq!(first.status, RideStatus::Cancelled);
    assert_eq!(second.status, RideStatus::Cancelled);
    assert_eq!(first.cancellation_reason, second.cancellation_reason);
    assert_eq!(first.cancelled_at_ms, second.cancelled_at_ms);
}

/// Geo Index radius bound: every candidate is within the requested radius.
#[tokio::test]
async fn dispatch_never_returns_candidates_outside_radius() {
    let state = test_state();
    let rider = register_rider(&state, "conn-rider", "+910000018").await;
    // Far away driver, well outside the default 10km dispatch radius.
    let far =
        register_driver(&state, "conn-far", "+910000019", GeoPoint { lat: 29.5, lon: 78.5 }, 3, 3, 4.5).await;
    let near =
        register_driver(&state, "conn-near", "+910000020", GeoPoint { lat: 28.615, lon: 77.21 }, 3, 3, 4.5).await;

    let request = state
        .auction
        .create(
            NewRideRequest {
                rider_id: rider.id.clone(),
                pickup: pickup(),
                destination: destination(),
                requested_class: VehicleClass::Taxi,
                comfort_preference: 3,
                fare_preference: 3,
                estimated_distance_km: 12.0,
                estimated_duration_minutes: 25,
            },
            1_000,
        )
        .await
        .expect("request created");

    // Only the near driver should have received the bidding request; verify
    // by confirming it can bid and the far one's bid would still be valid
    // only because the engine doesn't gate on candidacy at bid time, but the
    // Geo Index candidate set itself respects the radius bound.
    let candidates = state
        .geo
        .find_candidates(pickup().point(), VehicleClass::Taxi, 3, 3, 10.0, 10)
        .await;
    assert!(candidates.iter().all(|c| c.distance_km <= 10.0));
    assert!(candidates.iter().any(|c| c.driver_id == near.id));
    assert!(!candidates.iter().any(|c| c.driver_id == far.id));
    let _ = request.id;
}
