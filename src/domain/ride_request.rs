// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use super::bid::Bid;
use super::driver::GeoPoint;
use super::ids::{RequestId, RiderId};
use super::vehicle::VehicleClass;

/// A ride request's lifecycle status.
///
/// Transition graph (spec.md 4.3):
/// `Pending -> Bidding -> Accepted -> InProgress -> Completed`, with
/// `Cancelled` reachable from every non-terminal state. `Completed` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Pending,
    Bidding,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn accepts_bids(self) -> bool {
        matches!(self, Self::Bidding)
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Bidding | Self::Accepted | Self::InProgress)
    }
}

/// A waypoint with an address and coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    pub address: String,
    pub lat: f64,
    pub lon: f64,
}

impl Waypoint {
    pub fn point(&self) -> GeoPoint {
        GeoPoint { lat: self.lat, lon: self.lon }
    }
}

/// An accepted bid reference embedded directly on the ride request, kept in
/// sync with the single `Bid` in `bids` whose status is `Accepted`
/// (invariant 1 in spec.md 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedBid {
    pub bid_id: super::ids::BidId,
    pub driver_id: super::ids::DriverId,
    pub fare_amount: f64,
    pub accepted_at_ms: u64,
}

/// A ride request, with its embedded ordered bid list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    pub id: RequestId,
    pub rider_id: RiderId,
    pub pickup: Waypoint,
    pub destination: Waypoint,
    pub requested_class: VehicleClass,
    /// 1-5.
    pub comfort_preference: u8,
    /// 1-5.
    pub fare_preference: u8,
    pub estimated_distance_km: f64,
    pub estimated_duration_minutes: u32,
    pub status: RideStatus,
    pub bids: Vec<Bid>,
    pub accepted_bid: Option<AcceptedBid>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub cancelled_at_ms: Option<u64>,
    pub cancellation_reason: Option<String>,
}

impl RideRequest {
    /// Index of the bid by the given driver, if one exists. Invariant 2 in
    /// spec.md 3: at most one entry can ever match.
    pub fn bid_index_for(&self, driver_id: &super::ids::DriverId) -> Option<usize> {
        self.bids.iter().position(|b| &b.driver_id == driver_id)
    }
}

#[cfg(test)]
#[path = "ride_request_tests.rs"]
mod tests;
