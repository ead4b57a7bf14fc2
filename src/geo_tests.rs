// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::domain::ids::DriverId;

fn driver(id: &str, lat: f64, lon: f64, comfort: u8, price: u8, rating: f64) -> GeoEntry {
    GeoEntry {
        driver_id: DriverId::parse(id).expect("valid"),
        point: GeoPoint { lat, lon },
        classes: vec![(VehicleClass::Taxi, comfort, price)],
        rating,
    }
}

#[tokio::test]
async fn finds_nearby_eligible_driver() {
    let index = GeoIndex::new(50.0);
    index.upsert(driver("DRIVER_11111111", 28.62, 77.21, 3, 3, 4.6)).await;

    let results = index
        .find_candidates(GeoPoint { lat: 28.6139, lon: 77.2090 }, VehicleClass::Taxi, 3, 3, 10.0, 10)
        .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].driver_id.as_str(), "DRIVER_11111111");
}

#[tokio::test]
async fn excludes_drivers_outside_radius() {
    let index = GeoIndex::new(50.0);
    // Roughly 600km north — well outside any reasonable dispatch radius.
    index.upsert(driver("DRIVER_22222222", 34.0, 77.21, 3, 3, 4.5)).await;

    let results = index
        .find_candidates(GeoPoint { lat: 28.6139, lon: 77.2090 }, VehicleClass::Taxi, 3, 3, 10.0, 10)
        .await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn excludes_ineligible_vehicle_class() {
    let index = GeoIndex::new(50.0);
    index.upsert(driver("DRIVER_33333333", 28.62, 77.21, 3, 3, 4.5)).await;

    let results = index
        .find_candidates(GeoPoint { lat: 28.6139, lon: 77.2090 }, VehicleClass::Bike, 3, 3, 10.0, 10)
        .await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn remove_drops_driver_from_queries() {
    let index = GeoIndex::new(50.0);
    let entry = driver("DRIVER_44444444", 28.62, 77.21, 3, 3, 4.5);
    index.upsert(entry.clone()).await;
    index.remove(&entry.driver_id).await;

    let results = index
        .find_candidates(GeoPoint { lat: 28.6139, lon: 77.2090 }, VehicleClass::Taxi, 3, 3, 10.0, 10)
        .await;
    assert!(results.is_empty());
    assert_eq!(index.len().await, 0);
}

#[test]
fn haversine_matches_known_distance() {
    // Delhi-ish two points roughly 1.3km apart.
    let a = GeoPoint { lat: 28.6139, lon: 77.2090 };
    let b = GeoPoint { lat: 28.62, lon: 77.21 };
    let d = haversine_km(a, b);
    assert!(d > 0.5 && d < 2.0, "unexpected distance: {d}");
}

#[test]
fn match_score_is_clamped_and_penalises_distance() {
    let near = match_score(5, 3, 1, 5, 4.9, 0.5);
    let far = match_score(5, 3, 1, 5, 4.9, 40.0);
    assert!(near > far);
    assert!(near <= 100.0);
    let floor = match_score(0, 5, 5, 1, 3.0, 1000.0);
    assert_eq!(floor, 0.0);
}
