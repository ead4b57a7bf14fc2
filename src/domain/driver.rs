// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use super::ids::DriverId;

/// A driver's current dispatch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Available,
    Busy,
    Offline,
}

/// A geographic point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Persistent driver record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: DriverId,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub location: GeoPoint,
    pub address: Option<String>,
    pub status: DriverStatus,
    pub online: bool,
    pub rating: f64,
    pub total_rides: u64,
    pub vehicle_ids: Vec<String>,
    pub last_location_update_ms: u64,
    pub last_seen_ms: u64,
}

impl Driver {
    pub fn new(id: DriverId, name: String, phone: String, location: GeoPoint, now_ms: u64) -> Self {
        Self {
            id,
            name,
            phone,
            email: None,
            location,
            address: None,
            status: DriverStatus::Offline,
            online: false,
            rating: 5.0,
            total_rides: 0,
            vehicle_ids: Vec::new(),
            last_location_update_ms: now_ms,
            last_seen_ms: now_ms,
        }
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
