// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event Bus: single-process pub/sub of domain events to named rooms
//! (per-rider, per-driver, per-request, and a global room), with an
//! optional cross-server fan-out hook.
//!
//! Each room is a `tokio::sync::broadcast` channel, created lazily on first
//! subscribe or publish (double-checked against the room map's write lock,
//! the same pattern the Session Gateway uses for per-session WS bridges).
//! Delivery is best-effort: a send with no live receivers is not an error,
//! and a lagging receiver simply drops the events it missed — callers
//! reconcile via an explicit re-query rather than the bus replaying history.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::domain::{Bid, BidId, Driver, DriverId, DriverStatus, GeoPoint, RequestId, RideRequest, RiderId};

const ROOM_CHANNEL_CAPACITY: usize = 256;

/// A named delivery channel on the Event Bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Rider(RiderId),
    Driver(DriverId),
    Request(RequestId),
    /// Newly-available requests, for driver list views.
    Global,
}

impl Room {
    fn key(&self) -> String {
        match self {
            Room::Rider(id) => format!("rider:{id}"),
            Room::Driver(id) => format!("driver:{id}"),
            Room::Request(id) => format!("request:{id}"),
            Room::Global => "global".to_owned(),
        }
    }
}

/// Domain events delivered over the bus, tagged with their wire `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
#[allow(clippy::large_enum_variant)]
pub enum DispatchEvent {
    #[serde(rename = "ride:requestCreated")]
    RideRequestCreated { request: RideRequest },
    #[serde(rename = "ride:bidUpdate", rename_all = "camelCase")]
    RideBidUpdate { request_id: RequestId, bid: Bid },
    #[serde(rename = "ride:bidAccepted", rename_all = "camelCase")]
    RideBidAccepted { request_id: RequestId, bid_id: BidId, driver_id: DriverId, fare_amount: f64 },
    #[serde(rename = "ride:bidRejected", rename_all = "camelCase")]
    RideBidRejected { request_id: RequestId, bid_id: BidId },
    #[serde(rename = "ride:cancelled", rename_all = "camelCase")]
    RideCancelled { request_id: RequestId, reason: Option<String> },
    #[serde(rename = "ride:completed", rename_all = "camelCase")]
    RideCompleted { request_id: RequestId },
    #[serde(rename = "rideRequest:new")]
    RideRequestNew { request: RideRequest },
    #[serde(rename = "rideRequest:removed", rename_all = "camelCase")]
    RideRequestRemoved { request_id: RequestId },
    #[serde(rename = "driver:locationUpdate", rename_all = "camelCase")]
    DriverLocationUpdate { driver_id: DriverId, location: GeoPoint },
    #[serde(rename = "driver:statusUpdated")]
    DriverStatusUpdated { driver: Driver },
    #[serde(rename = "heartbeat")]
    Heartbeat { timestamp: u64 },
}

impl DispatchEvent {
    fn status_transition(&self) -> Option<(&DriverId, DriverStatus)> {
        match self {
            DispatchEvent::DriverStatusUpdated { driver } => Some((&driver.id, driver.status)),
            _ => None,
        }
    }
}

/// An outbound hook for cross-server fan-out. The in-process bus is
/// authoritative for its own node regardless of whether a sink is attached.
pub trait EventSink: Send + Sync {
    fn publish(&self, room_key: &str, event: &DispatchEvent);
}

pub struct EventBus {
    rooms: RwLock<HashMap<String, broadcast::Sender<DispatchEvent>>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl EventBus {
    pub fn new(sink: Option<Arc<dyn EventSink>>) -> Self {
        Self { rooms: RwLock::new(HashMap::new()), sink }
    }

    async fn sender_for(&self, room: &Room) -> broadcast::Sender<DispatchEvent> {
        let key = room.key();
        {
            let rooms = self.rooms.read().await;
            if let Some(tx) = rooms.get(&key) {
                return tx.clone();
            }
        }
        let mut rooms = self.rooms.write().await;
        if let Some(tx) = rooms.get(&key) {
            return tx.clone();
        }
        let (tx, _rx) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        rooms.insert(key, tx.clone());
        tx
    }

    /// Subscribe to a room, creating it if this is the first subscriber.
    pub async fn subscribe(&self, room: &Room) -> broadcast::Receiver<DispatchEvent> {
        self.sender_for(room).await.subscribe()
    }

    /// Deliver `event` to every live subscriber of `room`. A send with no
    /// receivers is not an error — broadcast failures are logged, never
    /// surfaced to the originating operation.
    pub async fn publish(&self, room: Room, event: DispatchEvent) {
        let key = room.key();
        let tx = self.sender_for(&room).await;
        if tx.send(event.clone()).is_err() {
            tracing::debug!(room = %key, "event published to empty room");
        }
        if let Some(ref sink) = self.sink {
            sink.publish(&key, &event);
        }
        if let Some((driver_id, status)) = event.status_transition() {
            tracing::debug!(%driver_id, ?status, "driver status transition broadcast");
        }
    }

    /// Publish the same event to several rooms in one call (e.g. a bid
    /// acceptance, which fans out to the rider, the winning driver, and the
    /// request room).
    pub async fn publish_many(&self, rooms: impl IntoIterator<Item = Room>, event: DispatchEvent) {
        for room in rooms {
            self.publish(room, event.clone()).await;
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
