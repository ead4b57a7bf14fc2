// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use super::driver::GeoPoint;
use super::ids::RiderId;
use super::vehicle::VehicleClass;

/// A rider's standing ride preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderPreferences {
    pub max_wait_seconds: u32,
    pub fare_band: u8,
    pub preferred_vehicle_class: VehicleClass,
    /// 1-5.
    pub comfort: u8,
    /// 1-5.
    pub fare: u8,
}

impl Default for RiderPreferences {
    fn default() -> Self {
        Self {
            max_wait_seconds: 300,
            fare_band: 3,
            preferred_vehicle_class: VehicleClass::Taxi,
            comfort: 3,
            fare: 3,
        }
    }
}

/// Persistent rider record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rider {
    pub id: RiderId,
    pub display_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub default_pickup: Option<GeoPoint>,
    pub preferences: RiderPreferences,
    pub rating: f64,
    pub total_rides: u64,
    pub online: bool,
    pub last_seen_ms: u64,
}

impl Rider {
    pub fn new(id: RiderId, display_name: String, phone: String, now_ms: u64) -> Self {
        Self {
            id,
            display_name,
            phone,
            email: None,
            default_pickup: None,
            preferences: RiderPreferences::default(),
            rating: 5.0,
            total_rides: 0,
            online: false,
            last_seen_ms: now_ms,
        }
    }
}

#[cfg(test)]
#[path = "rider_tests.rs"]
mod tests;
