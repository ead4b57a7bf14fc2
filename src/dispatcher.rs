// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher: selects candidate drivers for a newly-created request and
//! fans it out to them; removes it from their view once it leaves
//! `BIDDING`.

use std::sync::Arc;

use crate::domain::{Driver, DriverId, DriverStatus, RequestId, RideRequest};
use crate::events::{DispatchEvent, EventBus, Room};
use crate::geo::{GeoEntry, GeoIndex};
use crate::identity::IdentityRegistry;

/// Short delay before the single dispatch retry on a zero-candidate result.
const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(250);

pub struct Dispatcher {
    geo: Arc<GeoIndex>,
    events: Arc<EventBus>,
    default_radius_km: f64,
    max_radius_km: f64,
    max_candidates: usize,
}

impl Dispatcher {
    pub fn new(
        geo: Arc<GeoIndex>,
        events: Arc<EventBus>,
        default_radius_km: f64,
        max_radius_km: f64,
        max_candidates: usize,
    ) -> Self {
        Self { geo, events, default_radius_km, max_radius_km, max_candidates }
    }

    /// Query the Geo Index for candidates and emit `rideRequest:new` to each
    /// of them and to the global room. Retries once, after a short delay,
    /// if the first query returns zero candidates.
    pub async fn dispatch(&self, request: &RideRequest) -> Vec<DriverId> {
        let radius = self.default_radius_km.min(self.max_radius_km);
        let mut candidates = self.query(request, radius).await;
        if candidates.is_empty() {
            tokio::time::sleep(RETRY_DELAY).await;
            candidates = self.query(request, radius).await;
        }

        self.events.publish(Room::Global, DispatchEvent::RideRequestNew { request: request.clone() }).await;
        for driver_id in &candidates {
            self.events
                .publish(
                    Room::Driver(driver_id.clone()),
                    DispatchEvent::RideRequestNew { request: request.clone() },
                )
                .await;
        }
        candidates
    }

    async fn query(&self, request: &RideRequest, radius_km: f64) -> Vec<DriverId> {
        self.geo
            .find_candidates(
                request.pickup.point(),
                request.requested_class,
                request.comfort_preference,
                request.fare_preference,
                radius_km,
                self.max_candidates,
            )
            .await
            .into_iter()
            .map(|c| c.driver_id)
            .collect()
    }

    /// A request left `BIDDING` (accepted, cancelled, or expired) — tell
    /// clients to drop it from their lists.
    pub async fn notify_removed(&self, request_id: RequestId, candidates: &[DriverId]) {
        self.events
            .publish(Room::Global, DispatchEvent::RideRequestRemoved { request_id: request_id.clone() })
            .await;
        for driver_id in candidates {
            self.events
                .publish(
                    Room::Driver(driver_id.clone()),
                    DispatchEvent::RideRequestRemoved { request_id: request_id.clone() },
                )
                .await;
        }
    }

    /// Recompute a driver's Geo Index entry from its current location,
    /// status, and active vehicles. Called whenever any of those change.
    pub async fn reindex_driver(&self, identity: &IdentityRegistry, driver: &Driver) {
        if !driver.online || driver.status != DriverStatus::Available {
            self.geo.remove(&driver.id).await;
            return;
        }
        let classes = identity
            .vehicles_for_driver(&driver.id)
            .await
            .into_iter()
            .filter(|v| v.active)
            .map(|v| (v.class, v.comfort_level, v.price_value))
            .collect::<Vec<_>>();
        if classes.is_empty() {
            self.geo.remove(&driver.id).await;
            return;
        }
        self.geo
            .upsert(GeoEntry {
                driver_id: driver.id.clone(),
                point: driver.location,
                classes,
                rating: driver.rating,
            })
            .await;
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
