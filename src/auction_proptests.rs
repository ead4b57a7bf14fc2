// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Randomized bid/accept/cancel sequences checked against the invariants
//! every ride request and driver pool must hold regardless of the order
//! operations land in.

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

use super::*;
use crate::geo::GeoIndex;
use crate::identity::{NewDriverProfile, NewRiderProfile};
use crate::store::InMemoryRideRepository;

const DRIVER_POOL_SIZE: u8 = 3;

#[derive(Debug, Clone)]
enum Op {
    Bid { driver: u8, fare: u16 },
    Accept { driver: u8 },
    Cancel,
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        (0..DRIVER_POOL_SIZE, 1u16..500).prop_map(|(driver, fare)| Op::Bid { driver, fare }),
        (0..DRIVER_POOL_SIZE).prop_map(|driver| Op::Accept { driver }),
        Just(Op::Cancel),
    ];
    prop_vec(op, 0..16)
}

struct Harness {
    engine: Arc<AuctionEngine>,
    identity: Arc<IdentityRegistry>,
    drivers: Vec<DriverId>,
}

async fn build_harness() -> Harness {
    let identity = Arc::new(IdentityRegistry::new());
    let geo = Arc::new(GeoIndex::new(50.0));
    let events = Arc::new(EventBus::new(None));
    let store = Arc::new(RideStore::new(Arc::new(InMemoryRideRepository::default())));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&geo), Arc::clone(&events), 10.0, 50.0, 10));
    let engine = Arc::new(AuctionEngine::new(store, Arc::clone(&identity), dispatcher, Arc::clone(&events)));

    let mut drivers = Vec::new();
    for i in 0..DRIVER_POOL_SIZE {
        let lat = 28.60 + f64::from(i) * 0.01;
        let lon = 77.20 + f64::from(i) * 0.01;
        let profile = NewDriverProfile { name: format!("D{i}"), phone: format!("+1{i}"), location: crate::domain::GeoPoint { lat, lon } };
        let (driver, ..) = identity.register_driver(format!("conn-{i}"), None, Some(profile), 0).await.unwrap();
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
                plate: format!("P{i}"),
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
        drivers.push(driver.id);
    }

    let profile = NewRiderProfile { display_name: "R".to_owned(), phone: "+19999999".to_owned() };
    let (rider, ..) = identity.register_rider("rider-conn".to_owned(), None, Some(profile), 0).await.unwrap();
    engine
        .create(
            NewRideRequest {
                rider_id: rider.id,
                pickup: Waypoint { address: "A".to_owned(), lat: 28.6139, lon: 77.2090 },
                destination: Waypoint { address: "B".to_owned(), lat: 28.7, lon: 77.3 },
                requested_class: VehicleClass::Taxi,
                comfort_preference: 3,
                fare_preference: 3,
                estimated_distance_km: 5.0,
                estimated_duration_minutes: 15,
            },
            0,
        )
        .await
        .unwrap();

    Harness { engine, identity, drivers }
}

/// `COMPLETED` and `CANCELLED` never transition further, and every other
/// step must follow the request's allowed transition graph.
fn assert_monotone(prev: RideStatus, next: RideStatus) {
    if prev == next {
        return;
    }
    let allowed = matches!(
        (prev, next),
        (RideStatus::Bidding, RideStatus::Accepted)
            | (RideStatus::Bidding, RideStatus::Cancelled)
            | (RideStatus::Accepted, RideStatus::Cancelled)
    );
    assert!(allowed, "illegal ride status transition {prev:?} -> {next:?}");
    assert!(
        !matches!(prev, RideStatus::Completed | RideStatus::Cancelled),
        "terminal status {prev:?} transitioned to {next:?}"
    );
}

async fn run_and_check(ops: Vec<Op>) {
    let harness = build_harness().await;
    let request_id = harness.engine.store.all_ids().await.into_iter().next().expect("one request created");
    let mut prev_status = RideStatus::Bidding;
    let mut clock = 1_000u64;

    for op in ops {
        clock += 1;
        match op {
            Op::Bid { driver, fare } => {
                let driver_id = &harness.drivers[driver as usize];
                let _ = harness.engine.place_bid(&request_id, driver_id, f64::from(fare), 5, None, None, clock).await;
            }
            Op::Accept { driver } => {
                let Some(snapshot) = harness.engine.store.snapshot(&request_id).await else { continue };
                let driver_id = &harness.drivers[driver as usize];
                if let Some(bid) = snapshot.bids.iter().find(|b| b.driver_id == *driver_id) {
                    let _ = harness.engine.accept_bid(&request_id, &bid.id, &snapshot.rider_id, clock).await;
                }
            }
            Op::Cancel => {
                let _ = harness.engine.cancel(&request_id, None, clock).await;
            }
        }

        let snapshot = harness.engine.store.snapshot(&request_id).await.expect("request still tracked");
        assert_monotone(prev_status, snapshot.status);
        prev_status = snapshot.status;

        // Property 1: at most one accepted bid, and exactly one if set.
        let accepted_bids: Vec<_> = snapshot.bids.iter().filter(|b| b.status == crate::domain::BidStatus::Accepted).collect();
        assert!(accepted_bids.len() <= 1, "more than one accepted bid: {accepted_bids:?}");
        if let Some(accepted) = &snapshot.accepted_bid {
            assert_eq!(accepted_bids.len(), 1);
            assert_eq!(accepted_bids[0].id, accepted.bid_id);
        } else {
            assert!(accepted_bids.is_empty());
        }

        // Property 2: at most one live bid per driver.
        for driver_id in &harness.drivers {
            let count = snapshot.bids.iter().filter(|b| b.driver_id == *driver_id).count();
            assert!(count <= 1, "driver {driver_id} has {count} bids on one request");
        }

        // Property 4: a driver is BUSY iff it is this request's (non-terminal) winner.
        let terminal = matches!(snapshot.status, RideStatus::Completed | RideStatus::Cancelled);
        for driver_id in &harness.drivers {
            let driver = harness.identity.get_driver(driver_id).await.expect("driver registered");
            let should_be_busy = !terminal
                && snapshot.accepted_bid.as_ref().map(|a| &a.driver_id) == Some(driver_id);
            assert_eq!(driver.status == DriverStatus::Busy, should_be_busy, "driver {driver_id} busy flag mismatch");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn random_bid_accept_cancel_sequences_preserve_invariants(ops in ops_strategy()) {
        let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
        runtime.block_on(run_and_check(ops));
    }
}
