// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entity schemas shared by every engine component: riders, drivers,
//! vehicles, ride requests, bids, and the validated identifiers that bind
//! them together.

pub mod bid;
pub mod driver;
pub mod ids;
pub mod ride_request;
pub mod rider;
pub mod vehicle;

pub use bid::{Bid, BidSortBy, BidStatistics, BidStatus, RankedBid, SortOrder};
pub use driver::{Driver, DriverStatus, GeoPoint};
pub use ids::{BidId, DriverId, RequestId, RiderId};
pub use ride_request::{AcceptedBid, RideRequest, RideStatus, Waypoint};
pub use rider::{Rider, RiderPreferences};
pub use vehicle::{Vehicle, VehicleClass};
