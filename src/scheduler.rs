// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle Scheduler: the background sweeps that keep state honest without
//! a caller driving them — auction expiry, heartbeat/idle eviction, stale
//! driver reap, and retention cleanup. Each sweep runs on its own interval
//! in a spawned task under the server's `CancellationToken`, the same
//! shutdown-propagation pattern used for the transport listeners.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::auction::AuctionEngine;
use crate::config::DispatchConfig;
use crate::dispatcher::Dispatcher;
use crate::domain::{DriverStatus, RideStatus};
use crate::events::{DispatchEvent, EventBus, Room};
use crate::identity::IdentityRegistry;
use crate::store::RideStore;

const HEARTBEAT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const STALE_DRIVER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const AUCTION_EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(86_400);

pub struct Scheduler {
    store: Arc<RideStore>,
    identity: Arc<IdentityRegistry>,
    auction: Arc<AuctionEngine>,
    dispatcher: Arc<Dispatcher>,
    events: Arc<EventBus>,
    config: DispatchConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<RideStore>,
        identity: Arc<IdentityRegistry>,
        auction: Arc<AuctionEngine>,
        dispatcher: Arc<Dispatcher>,
        events: Arc<EventBus>,
        config: DispatchConfig,
    ) -> Self {
        Self { store, identity, auction, dispatcher, events, config }
    }

    /// Spawn every sweep as its own task, all tied to `shutdown`.
    pub fn spawn_all(self: Arc<Self>, shutdown: CancellationToken) {
        let this = Arc::clone(&self);
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(AUCTION_EXPIRY_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = sd.cancelled() => {
                        tracing::debug!(sweep = "auction_expiry", "scheduler sweep stopped on shutdown");
                        return;
                    }
                    _ = ticker.tick() => {
                        this.sweep_expired_auctions(crate::state::epoch_ms()).await;
                    }
                }
            }
        });

        let this = Arc::clone(&self);
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = sd.cancelled() => {
                        tracing::debug!(sweep = "heartbeat", "scheduler sweep stopped on shutdown");
                        return;
                    }
                    _ = ticker.tick() => {
                        this.sweep_idle_sessions(crate::state::epoch_ms()).await;
                    }
                }
            }
        });

        let this = Arc::clone(&self);
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STALE_DRIVER_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = sd.cancelled() => {
                        tracing::debug!(sweep = "stale_driver", "scheduler sweep stopped on shutdown");
                        return;
                    }
                    _ = ticker.tick() => {
                        this.sweep_stale_drivers(crate::state::epoch_ms()).await;
                    }
                }
            }
        });

        let this = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!(sweep = "retention", "scheduler sweep stopped on shutdown");
                        return;
                    }
                    _ = ticker.tick() => {
                        this.sweep_retention(crate::state::epoch_ms()).await;
                    }
                }
            }
        });
    }

    /// Requests stuck in `BIDDING` past the configured TTL auto-cancel with
    /// reason `AUCTION_EXPIRED`.
    async fn sweep_expired_auctions(&self, now_ms: u64) {
        let ttl_ms = self.config.auction_ttl().as_millis() as u64;
        for id in self.store.all_ids().await {
            let Some(snapshot) = self.store.snapshot(&id).await else { continue };
            if snapshot.status != RideStatus::Bidding {
                continue;
            }
            if now_ms.saturating_sub(snapshot.created_at_ms) < ttl_ms {
                continue;
            }
            match self.auction.cancel(&id, Some("AUCTION_EXPIRED".to_owned()), now_ms).await {
                Ok(_) => tracing::debug!(request_id = %id, "auction expired, request cancelled"),
                Err(err) => tracing::warn!(request_id = %id, %err, "failed to cancel expired auction"),
            }
        }
    }

    /// Connections that missed too many heartbeats are evicted; an offline
    /// transition for a driver is broadcast to the global room.
    async fn sweep_idle_sessions(&self, now_ms: u64) {
        let idle_ms = self.config.session_idle().as_millis() as u64;
        for (conn_id, _identity) in self.identity.idle_connections(now_ms, idle_ms).await {
            if let Some((identity, went_offline)) = self.identity.unregister(&conn_id, now_ms).await {
                if went_offline {
                    if let crate::identity::Identity::Driver(driver_id) = &identity {
                        if let Some(driver) = self.identity.get_driver(driver_id).await {
                            self.dispatcher.reindex_driver(&self.identity, &driver).await;
                            self.events
                                .publish(Room::Global, DispatchEvent::DriverStatusUpdated { driver })
                                .await;
                        }
                    }
                }
            }
        }
    }

    /// Drivers with no location update in `driver_stale_seconds` are forced
    /// offline and dropped from the Geo Index, regardless of heartbeat state.
    async fn sweep_stale_drivers(&self, now_ms: u64) {
        let stale_ms = self.config.driver_stale().as_millis() as u64;
        for driver in self.identity.all_drivers().await {
            if !driver.online || driver.status == DriverStatus::Offline {
                continue;
            }
            if now_ms.saturating_sub(driver.last_location_update_ms) < stale_ms {
                continue;
            }
            if let Some(updated) = self
                .identity
                .update_driver(&driver.id, |d| {
                    d.online = false;
                    d.status = DriverStatus::Offline;
                })
                .await
            {
                self.dispatcher.reindex_driver(&self.identity, &updated).await;
                self.events.publish(Room::Global, DispatchEvent::DriverStatusUpdated { driver: updated }).await;
            }
        }
    }

    /// Terminal requests older than `retention_days` are deleted from both
    /// the live map and the durable repository.
    async fn sweep_retention(&self, now_ms: u64) {
        let retention_ms = self.config.retention().as_millis() as u64;
        for id in self.store.all_ids().await {
            let Some(snapshot) = self.store.snapshot(&id).await else { continue };
            if !snapshot.status.is_terminal() {
                continue;
            }
            let reference_ms = snapshot.cancelled_at_ms.unwrap_or(snapshot.updated_at_ms);
            if now_ms.saturating_sub(reference_ms) >= retention_ms {
                self.store.evict(&id).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
