// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auction Engine: the per-request bid-collection state machine. Every
//! mutator acquires the request's exclusive lock first and, where a driver
//! transition is involved, the driver's stripe lock second — the request ->
//! driver -> vehicle order from the concurrency model, which forbids lock
//! cycles between concurrent operations on different requests.
//!
//! Transient failures (lock contention surfaced as a poisoned guard, a
//! repository write that bounces) are retried internally with exponential
//! backoff before surfacing as `INTERNAL_ERROR`; the in-memory repository
//! shipped here never actually produces one, but the retry path exists so a
//! future real backing store slots in without changing caller semantics.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::Mutex;

use crate::domain::{
    AcceptedBid, Bid, BidId, BidSortBy, BidStatistics, BidStatus, DriverId, DriverStatus, RankedBid,
    RequestId, RideRequest, RideStatus, RiderId, SortOrder, Waypoint, VehicleClass,
};
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::events::{DispatchEvent, EventBus, Room};
use crate::identity::IdentityRegistry;
use crate::store::RideStore;

const MAX_COMMIT_RETRIES: u32 = 3;
const IDEMPOTENCY_WINDOW_MS: u64 = 60_000;
const IDEMPOTENCY_CAPACITY: usize = 10_000;

/// Parameters for creating a new ride request.
pub struct NewRideRequest {
    pub rider_id: RiderId,
    pub pickup: Waypoint,
    pub destination: Waypoint,
    pub requested_class: VehicleClass,
    pub comfort_preference: u8,
    pub fare_preference: u8,
    pub estimated_distance_km: f64,
    pub estimated_duration_minutes: u32,
}

/// Deduplicates a replayed inbound operation within a short window, keyed
/// by `(operation, caller identity, payload hash)`.
pub struct IdempotencyWindow {
    seen: Mutex<IndexMap<String, u64>>,
}

impl IdempotencyWindow {
    pub fn new() -> Self {
        Self { seen: Mutex::new(IndexMap::new()) }
    }

    /// Returns `true` if this key was already recorded within the window
    /// (i.e. this call is a duplicate and should short-circuit to success).
    pub async fn check_and_record(&self, key: String, now_ms: u64) -> bool {
        let mut seen = self.seen.lock().await;
        while let Some((_, ts)) = seen.first() {
            if now_ms.saturating_sub(*ts) > IDEMPOTENCY_WINDOW_MS {
                seen.shift_remove_index(0);
            } else {
                break;
            }
        }
        if let Some(ts) = seen.get(&key) {
            if now_ms.saturating_sub(*ts) <= IDEMPOTENCY_WINDOW_MS {
                return true;
            }
        }
        if seen.len() >= IDEMPOTENCY_CAPACITY {
            seen.shift_remove_index(0);
        }
        seen.insert(key, now_ms);
        false
    }
}

impl Default for IdempotencyWindow {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AuctionEngine {
    store: Arc<RideStore>,
    identity: Arc<IdentityRegistry>,
    dispatcher: Arc<Dispatcher>,
    events: Arc<EventBus>,
    pub idempotency: IdempotencyWindow,
}

impl AuctionEngine {
    pub fn new(
        store: Arc<RideStore>,
        identity: Arc<IdentityRegistry>,
        dispatcher: Arc<Dispatcher>,
        events: Arc<EventBus>,
    ) -> Self {
        Self { store, identity, dispatcher, events, idempotency: IdempotencyWindow::new() }
    }

    /// Retry a fallible commit with exponential backoff, surfacing
    /// `INTERNAL_ERROR` only once retries are exhausted. Used to wrap both
    /// the ride-store CAS-then-persist step and the derived driver-status
    /// commit that follows it (accept-bid, cancel-with-reassignment).
    async fn commit_with_retry<F, Fut>(&self, mut attempt: F) -> Result<(), DispatchError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(), DispatchError>>,
    {
        let mut backoff = Duration::from_millis(20);
        for try_num in 0..=MAX_COMMIT_RETRIES {
            match attempt().await {
                Ok(()) => return Ok(()),
                Err(_) if try_num < MAX_COMMIT_RETRIES => {
                    tracing::debug!(try_num, "commit attempt failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(_) => return Err(DispatchError::InternalError),
            }
        }
        Ok(())
    }

    /// **Create**: validate, persist as `PENDING`, then dispatch to
    /// candidates. Transitions to `BIDDING` once dispatch has run,
    /// regardless of whether it found any candidates (late-joining drivers
    /// may still bid on an empty-candidate request).
    pub async fn create(&self, req: NewRideRequest, now_ms: u64) -> Result<RideRequest, DispatchError> {
        if !req.pickup.point().in_range() || !req.destination.point().in_range() {
            return Err(DispatchError::InvalidCoordinates);
        }
        if !(1..=5).contains(&req.comfort_preference) || !(1..=5).contains(&req.fare_preference) {
            return Err(DispatchError::ValidationError);
        }

        let request = RideRequest {
            id: crate::domain::ids::new_request_id(),
            rider_id: req.rider_id.clone(),
            pickup: req.pickup,
            destination: req.destination,
            requested_class: req.requested_class,
            comfort_preference: req.comfort_preference,
            fare_preference: req.fare_preference,
            estimated_distance_km: req.estimated_distance_km,
            estimated_duration_minutes: req.estimated_duration_minutes,
            status: RideStatus::Pending,
            bids: Vec::new(),
            accepted_bid: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            cancelled_at_ms: None,
            cancellation_reason: None,
        };

        let handle = self.store.create(request.clone()).await;
        self.events
            .publish(Room::Rider(req.rider_id.clone()), DispatchEvent::RideRequestCreated { request: request.clone() })
            .await;

        self.dispatcher.dispatch(&request).await;

        let mut guard = handle.lock().await;
        guard.status = RideStatus::Bidding;
        guard.updated_at_ms = now_ms;
        self.store.persist(&guard);
        Ok(guard.clone())
    }

    /// **Place bid**: append or update the caller's bid while the request
    /// accepts bids.
    pub async fn place_bid(
        &self,
        request_id: &RequestId,
        driver_id: &DriverId,
        fare_amount: f64,
        estimated_arrival_minutes: u32,
        vehicle_id: Option<String>,
        message: Option<String>,
        now_ms: u64,
    ) -> Result<Bid, DispatchError> {
        if fare_amount <= 0.0 {
            return Err(DispatchError::InvalidBidAmount);
        }
        let driver = self.identity.get_driver(driver_id).await.ok_or(DispatchError::DriverNotFound)?;
        if !driver.online {
            return Err(DispatchError::DriverNotOnline);
        }
        match driver.status {
            DriverStatus::Busy => return Err(DispatchError::DriverBusy),
            DriverStatus::Offline => return Err(DispatchError::DriverNotAvailable),
            DriverStatus::Available => {}
        }

        let handle = self.store.lock_for(request_id).await.ok_or(DispatchError::RequestNotFound)?;
        let mut guard = handle.lock().await;
        if !guard.status.accepts_bids() {
            return Err(DispatchError::RequestNotBiddable);
        }

        let bid = match guard.bid_index_for(driver_id) {
            Some(idx) => {
                let existing = &mut guard.bids[idx];
                existing.fare_amount = fare_amount;
                existing.estimated_arrival_minutes = estimated_arrival_minutes;
                existing.message = message;
                existing.vehicle_id = vehicle_id;
                existing.bid_time_ms = now_ms;
                existing.updated_at_ms = now_ms;
                existing.clone()
            }
            None => {
                let bid = Bid::new(driver_id.clone(), fare_amount, estimated_arrival_minutes, vehicle_id, message, now_ms);
                guard.bids.push(bid.clone());
                bid
            }
        };
        guard.updated_at_ms = now_ms;
        self.store.persist(&guard);
        let rider_id = guard.rider_id.clone();
        drop(guard);

        self.events
            .publish_many(
                [Room::Rider(rider_id), Room::Request(request_id.clone())],
                DispatchEvent::RideBidUpdate { request_id: request_id.clone(), bid: bid.clone() },
            )
            .await;
        Ok(bid)
    }

    /// **Accept bid**: the rider selects a winner; every other bid is
    /// rejected and the winning driver is marked `BUSY`.
    pub async fn accept_bid(
        &self,
        request_id: &RequestId,
        bid_id: &BidId,
        caller_rider_id: &RiderId,
        now_ms: u64,
    ) -> Result<RideRequest, DispatchError> {
        let handle = self.store.lock_for(request_id).await.ok_or(DispatchError::RequestNotFound)?;
        let mut guard = handle.lock().await;

        if &guard.rider_id != caller_rider_id {
            return Err(DispatchError::Unauthorized);
        }

        // Acceptance idempotence: replaying an already-committed acceptance
        // for this exact bid succeeds without altering state.
        if let Some(ref accepted) = guard.accepted_bid {
            if &accepted.bid_id == bid_id {
                return Ok(guard.clone());
            }
            return Err(DispatchError::BiddingClosed);
        }
        if guard.status != RideStatus::Bidding {
            return Err(DispatchError::BiddingClosed);
        }

        let winner_idx = guard.bid_index_for_bid(bid_id).ok_or(DispatchError::BidNotFound)?;
        let driver_id = guard.bids[winner_idx].driver_id.clone();

        // Lock order: request (already held) -> driver -> vehicle.
        let _driver_guard = self.identity.lock_driver(&driver_id).await;
        let driver = self.identity.get_driver(&driver_id).await.ok_or(DispatchError::DriverNotFound)?;
        if !driver.online || driver.status != DriverStatus::Available {
            return Err(DispatchError::DriverNotAvailable);
        }

        let fare_amount = guard.bids[winner_idx].fare_amount;
        for (idx, bid) in guard.bids.iter_mut().enumerate() {
            if idx == winner_idx {
                bid.status = BidStatus::Accepted;
                bid.accepted_at_ms = Some(now_ms);
            } else if bid.status == BidStatus::Pending {
                bid.status = BidStatus::Rejected;
                bid.rejected_at_ms = Some(now_ms);
            }
        }
        guard.accepted_bid =
            Some(AcceptedBid { bid_id: bid_id.clone(), driver_id: driver_id.clone(), fare_amount, accepted_at_ms: now_ms });
        guard.status = RideStatus::Accepted;
        guard.updated_at_ms = now_ms;
        self.commit_with_retry(|| {
            self.store.persist(&guard);
            std::future::ready(Ok(()))
        })
        .await?;

        let rider_id = guard.rider_id.clone();
        let rejected: Vec<(BidId, DriverId)> = guard
            .bids
            .iter()
            .filter(|b| b.status == BidStatus::Rejected && b.rejected_at_ms == Some(now_ms))
            .map(|b| (b.id.clone(), b.driver_id.clone()))
            .collect();
        let snapshot = guard.clone();
        drop(guard);

        self.commit_with_retry(|| async {
            self.identity.update_driver(&driver_id, |d| d.status = DriverStatus::Busy).await;
            Ok(())
        })
        .await?;
        if let Some(updated) = self.identity.get_driver(&driver_id).await {
            self.dispatcher.reindex_driver(&self.identity, &updated).await;
        }

        self.events
            .publish_many(
                [Room::Rider(rider_id), Room::Driver(driver_id.clone()), Room::Request(request_id.clone())],
                DispatchEvent::RideBidAccepted {
                    request_id: request_id.clone(),
                    bid_id: bid_id.clone(),
                    driver_id: driver_id.clone(),
                    fare_amount,
                },
            )
            .await;
        for (rejected_bid_id, rejected_driver_id) in rejected {
            // Losing drivers learn the outcome in their own room (spec.md
            // 4.5: "acceptance decision (win or loss)"), in addition to the
            // per-request room every bidder's client can observe.
            self.events
                .publish_many(
                    [Room::Request(request_id.clone()), Room::Driver(rejected_driver_id)],
                    DispatchEvent::RideBidRejected { request_id: request_id.clone(), bid_id: rejected_bid_id },
                )
                .await;
        }
        self.dispatcher.notify_removed(request_id.clone(), &[]).await;

        Ok(snapshot)
    }

    /// **Cancel**: idempotent — a second cancel on an already-cancelled
    /// request succeeds without changing state.
    pub async fn cancel(
        &self,
        request_id: &RequestId,
        reason: Option<String>,
        now_ms: u64,
    ) -> Result<RideRequest, DispatchError> {
        let handle = self.store.lock_for(request_id).await.ok_or(DispatchError::RequestNotFound)?;
        let mut guard = handle.lock().await;

        if guard.status == RideStatus::Cancelled {
            return Ok(guard.clone());
        }
        if !guard.status.is_cancellable() {
            return Err(DispatchError::InvalidStatus);
        }

        let freed_driver = guard.accepted_bid.as_ref().map(|a| a.driver_id.clone());
        guard.status = RideStatus::Cancelled;
        guard.cancelled_at_ms = Some(now_ms);
        guard.cancellation_reason = reason;
        guard.updated_at_ms = now_ms;
        for bid in guard.bids.iter_mut() {
            if bid.status == BidStatus::Pending {
                bid.status = BidStatus::Rejected;
                bid.rejected_at_ms = Some(now_ms);
            }
        }
        self.commit_with_retry(|| {
            self.store.persist(&guard);
            std::future::ready(Ok(()))
        })
        .await?;
        let rider_id = guard.rider_id.clone();
        let snapshot = guard.clone();
        drop(guard);

        if let Some(driver_id) = freed_driver {
            self.commit_with_retry(|| async {
                self.identity.update_driver(&driver_id, |d| d.status = DriverStatus::Available).await;
                Ok(())
            })
            .await?;
            if let Some(updated) = self.identity.get_driver(&driver_id).await {
                self.dispatcher.reindex_driver(&self.identity, &updated).await;
            }
        }

        self.events
            .publish_many(
                [Room::Rider(rider_id), Room::Request(request_id.clone())],
                DispatchEvent::RideCancelled { request_id: request_id.clone(), reason: snapshot.cancellation_reason.clone() },
            )
            .await;
        self.dispatcher.notify_removed(request_id.clone(), &[]).await;

        Ok(snapshot)
    }

    /// Transition `ACCEPTED` -> `IN_PROGRESS` once the driver starts the ride.
    pub async fn start(&self, request_id: &RequestId, now_ms: u64) -> Result<RideRequest, DispatchError> {
        let handle = self.store.lock_for(request_id).await.ok_or(DispatchError::RequestNotFound)?;
        let mut guard = handle.lock().await;
        if guard.status != RideStatus::Accepted {
            return Err(DispatchError::InvalidStatus);
        }
        guard.status = RideStatus::InProgress;
        guard.updated_at_ms = now_ms;
        self.store.persist(&guard);
        Ok(guard.clone())
    }

    /// **Complete**: allowed from `IN_PROGRESS` or `ACCEPTED` directly.
    pub async fn complete(&self, request_id: &RequestId, now_ms: u64) -> Result<RideRequest, DispatchError> {
        let handle = self.store.lock_for(request_id).await.ok_or(DispatchError::RequestNotFound)?;
        let mut guard = handle.lock().await;
        if !matches!(guard.status, RideStatus::InProgress | RideStatus::Accepted) {
            return Err(DispatchError::InvalidStatus);
        }
        let driver_id = guard.accepted_bid.as_ref().map(|a| a.driver_id.clone());
        guard.status = RideStatus::Completed;
        guard.updated_at_ms = now_ms;
        self.store.persist(&guard);
        let rider_id = guard.rider_id.clone();
        let snapshot = guard.clone();
        drop(guard);

        if let Some(driver_id) = driver_id {
            self.identity.update_driver(&driver_id, |d| {
                d.status = DriverStatus::Available;
                d.total_rides += 1;
            }).await;
            self.identity.update_rider(&rider_id, |r| r.total_rides += 1).await;
            if let Some(updated) = self.identity.get_driver(&driver_id).await {
                self.dispatcher.reindex_driver(&self.identity, &updated).await;
            }
        }

        self.events.publish(Room::Rider(rider_id), DispatchEvent::RideCompleted { request_id: request_id.clone() }).await;
        Ok(snapshot)
    }

    /// **Bid query**: filter, sort, rank, and compute fare statistics.
    pub async fn query_bids(
        &self,
        request_id: &RequestId,
        status_filter: Option<BidStatus>,
        sort_by: BidSortBy,
        order: SortOrder,
    ) -> Result<(Vec<RankedBid>, Option<BidStatistics>), DispatchError> {
        let request = self.store.snapshot(request_id).await.ok_or(DispatchError::RequestNotFound)?;
        let mut bids: Vec<Bid> = match status_filter {
            Some(status) => request.bids.into_iter().filter(|b| b.status == status).collect(),
            None => request.bids,
        };

        bids.sort_by(|a, b| {
            let ord = match sort_by {
                BidSortBy::FareAmount => a.fare_amount.partial_cmp(&b.fare_amount).unwrap_or(std::cmp::Ordering::Equal),
                BidSortBy::BidTime => a.bid_time_ms.cmp(&b.bid_time_ms),
                BidSortBy::EstimatedArrival => a.estimated_arrival_minutes.cmp(&b.estimated_arrival_minutes),
            };
            if order == SortOrder::Desc {
                ord.reverse()
            } else {
                ord
            }
        });

        let stats = BidStatistics::compute(&bids);
        let lowest = bids.iter().map(|b| b.fare_amount).fold(f64::INFINITY, f64::min);
        let highest = bids.iter().map(|b| b.fare_amount).fold(f64::NEG_INFINITY, f64::max);
        let ranked = bids
            .into_iter()
            .enumerate()
            .map(|(idx, bid)| {
                let is_lowest = bid.fare_amount == lowest;
                let is_highest = bid.fare_amount == highest;
                RankedBid { bid, rank: idx + 1, is_lowest, is_highest }
            })
            .collect();

        Ok((ranked, stats))
    }
}

impl RideRequest {
    fn bid_index_for_bid(&self, bid_id: &BidId) -> Option<usize> {
        self.bids.iter().position(|b| &b.id == bid_id)
    }
}

#[cfg(test)]
#[path = "auction_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "auction_proptests.rs"]
mod proptests;
