// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire message types for the Session Gateway's socket surface: the
//! `{type, data}` envelope from spec.md §6, modeled as explicit
//! `#[serde(tag = "type", content = "data")]` tagged-union enums validated
//! at the edge, the same shape the teacher uses for `MuxEvent` /
//! `ServerMessage`.

use serde::Deserialize;

use crate::domain::{BidSortBy, GeoPoint, SortOrder, VehicleClass, Waypoint};

/// Every inbound message the Session Gateway accepts.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InboundMessage {
    #[serde(rename = "user:register")]
    UserRegister(UserRegisterData),
    #[serde(rename = "driver:register")]
    DriverRegister(DriverRegisterData),
    #[serde(rename = "driver:updateStatus")]
    DriverUpdateStatus(DriverUpdateStatusData),
    #[serde(rename = "driver:updateLocation")]
    DriverUpdateLocation(DriverUpdateLocationData),
    #[serde(rename = "ride:newRequest")]
    RideNewRequest(RideNewRequestData),
    #[serde(rename = "ride:bidPlaced")]
    RideBidPlaced(RideBidPlacedData),
    #[serde(rename = "ride:bidAccepted")]
    RideBidAccepted(RideBidAcceptedData),
    #[serde(rename = "ride:cancel")]
    RideCancel(RideCancelData),
    #[serde(rename = "heartbeat_response")]
    HeartbeatResponse,
    #[serde(rename = "user:requestBidUpdate")]
    UserRequestBidUpdate(UserRequestBidUpdateData),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegisterData {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRegisterData {
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverUpdateStatusData {
    pub status: crate::domain::DriverStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverUpdateLocationData {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideNewRequestData {
    pub ride_type: VehicleClass,
    pub pickup_location: Waypoint,
    pub destination: Waypoint,
    #[serde(default)]
    pub comfort_preference: Option<u8>,
    #[serde(default)]
    pub fare_preference: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideBidPlacedData {
    pub request_id: String,
    pub fare_amount: f64,
    pub estimated_arrival: u32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub vehicle_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideBidAcceptedData {
    pub request_id: String,
    pub bid_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideCancelData {
    pub ride_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequestBidUpdateData {
    pub request_id: String,
}

/// Query parameters for `GET /ride-requests/{id}/bids`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidQueryParams {
    #[serde(default)]
    pub sort_by: Option<BidSortBy>,
    #[serde(default)]
    pub order: Option<SortOrder>,
    #[serde(default)]
    pub status: Option<crate::domain::BidStatus>,
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
