// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity Registry: binds a live connection to a rider or driver identity,
//! tracks online/last-seen, and answers identity -> connection lookups for
//! the Event Bus.
//!
//! Registry state (riders, drivers, sessions, reverse index) is guarded by
//! per-collection `RwLock`s. A fixed array of stripe locks additionally
//! serialises the read-modify-write register/unregister sequence per
//! identity string, so two concurrent registrations for the same identity
//! can't race each other across the several maps touched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::domain::{Driver, DriverId, DriverStatus, GeoPoint, Rider, RiderId, Vehicle};
use crate::error::DispatchError;

const STRIPE_COUNT: usize = 64;

/// The identity bound to a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Rider(RiderId),
    Driver(DriverId),
}

impl Identity {
    pub fn as_str(&self) -> &str {
        match self {
            Identity::Rider(id) => id.as_str(),
            Identity::Driver(id) => id.as_str(),
        }
    }
}

/// A live connection binding, tracked only for the duration of the socket.
pub struct SessionEntry {
    pub conn_id: String,
    pub identity: Identity,
    pub last_heartbeat_ms: std::sync::atomic::AtomicU64,
}

/// Profile fields supplied when registering a never-before-seen rider.
pub struct NewRiderProfile {
    pub display_name: String,
    pub phone: String,
}

/// Profile fields supplied when registering a never-before-seen driver.
pub struct NewDriverProfile {
    pub name: String,
    pub phone: String,
    pub location: GeoPoint,
}

pub struct IdentityRegistry {
    riders: RwLock<HashMap<RiderId, Rider>>,
    drivers: RwLock<HashMap<DriverId, Driver>>,
    vehicles: RwLock<HashMap<String, Vehicle>>,
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    by_identity: RwLock<HashMap<String, HashSet<String>>>,
    stripes: Vec<Mutex<()>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self {
            riders: RwLock::new(HashMap::new()),
            drivers: RwLock::new(HashMap::new()),
            vehicles: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            by_identity: RwLock::new(HashMap::new()),
            stripes: (0..STRIPE_COUNT).map(|_| Mutex::new(())).collect(),
        }
    }

    /// The stripe lock for an identity string. Used both to serialise the
    /// register/unregister sequence and, by the Auction Engine, as the
    /// per-driver exclusive lock acquired after a request's lock (see the
    /// request -> driver -> vehicle lock order).
    pub(crate) fn stripe_for(&self, identity: &str) -> &Mutex<()> {
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in identity.as_bytes() {
            hash ^= *b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        &self.stripes[(hash as usize) % STRIPE_COUNT]
    }

    /// `user:register` — bind `conn_id` to an existing or newly-created rider.
    pub async fn register_rider(
        &self,
        conn_id: String,
        rider_id: Option<RiderId>,
        new_profile: Option<NewRiderProfile>,
        now_ms: u64,
    ) -> Result<(Rider, bool), DispatchError> {
        let rider_id = match rider_id {
            Some(id) => id,
            None => crate::domain::ids::new_rider_id(),
        };
        let _stripe = self.stripe_for(rider_id.as_str()).lock().await;

        let (rider, is_new) = {
            let mut riders = self.riders.write().await;
            if let Some(existing) = riders.get_mut(&rider_id) {
                existing.online = true;
                existing.last_seen_ms = now_ms;
                (existing.clone(), false)
            } else {
                let profile = new_profile.ok_or(DispatchError::UserNotFound)?;
                if riders.values().any(|r| r.phone == profile.phone) {
                    return Err(DispatchError::PhoneExists);
                }
                let mut rider = Rider::new(rider_id.clone(), profile.display_name, profile.phone, now_ms);
                rider.online = true;
                riders.insert(rider_id.clone(), rider.clone());
                (rider, true)
            }
        };

        self.bind(conn_id, Identity::Rider(rider_id), now_ms).await;
        Ok((rider, is_new))
    }

    /// `driver:register` — bind `conn_id` to an existing or newly-created driver.
    pub async fn register_driver(
        &self,
        conn_id: String,
        driver_id: Option<DriverId>,
        new_profile: Option<NewDriverProfile>,
        now_ms: u64,
    ) -> Result<(Driver, bool, bool), DispatchError> {
        let driver_id = match driver_id {
            Some(id) => id,
            None => crate::domain::ids::new_driver_id(),
        };
        let _stripe = self.stripe_for(driver_id.as_str()).lock().await;

        let (driver, is_new, went_online) = {
            let mut drivers = self.drivers.write().await;
            if let Some(existing) = drivers.get_mut(&driver_id) {
                let went_online = !existing.online;
                existing.online = true;
                existing.last_seen_ms = now_ms;
                if existing.status == DriverStatus::Offline {
                    existing.status = DriverStatus::Available;
                }
                (existing.clone(), false, went_online)
            } else {
                let profile = new_profile.ok_or(DispatchError::DriverNotFound)?;
                if drivers.values().any(|d| d.phone == profile.phone) {
                    return Err(DispatchError::PhoneExists);
                }
                let mut driver =
                    Driver::new(driver_id.clone(), profile.name, profile.phone, profile.location, now_ms);
                driver.online = true;
                driver.status = DriverStatus::Available;
                drivers.insert(driver_id.clone(), driver.clone());
                (driver, true, true)
            }
        };

        self.bind(conn_id, Identity::Driver(driver_id), now_ms).await;
        Ok((driver, is_new, went_online))
    }

    async fn bind(&self, conn_id: String, identity: Identity, now_ms: u64) {
        let entry = Arc::new(SessionEntry {
            conn_id: conn_id.clone(),
            identity: identity.clone(),
            last_heartbeat_ms: std::sync::atomic::AtomicU64::new(now_ms),
        });
        self.sessions.write().await.insert(conn_id.clone(), entry);
        self.by_identity
            .write()
            .await
            .entry(identity.as_str().to_owned())
            .or_default()
            .insert(conn_id);
    }

    /// Idempotent lookup of the identity already bound to `conn_id`, if any.
    pub async fn session(&self, conn_id: &str) -> Option<Arc<SessionEntry>> {
        self.sessions.read().await.get(conn_id).cloned()
    }

    /// `unregister(conn)` — mark offline if this was the last live connection
    /// for the identity, stamp last-seen, clear the binding. Returns the
    /// identity that went offline, and whether it was a driver transition
    /// worth broadcasting.
    pub async fn unregister(&self, conn_id: &str, now_ms: u64) -> Option<(Identity, bool)> {
        let entry = self.sessions.write().await.remove(conn_id)?;
        let identity_str = entry.identity.as_str().to_owned();
        let _stripe = self.stripe_for(&identity_str).lock().await;

        let mut remaining_empty = false;
        {
            let mut by_identity = self.by_identity.write().await;
            if let Some(conns) = by_identity.get_mut(&identity_str) {
                conns.remove(conn_id);
                remaining_empty = conns.is_empty();
                if remaining_empty {
                    by_identity.remove(&identity_str);
                }
            }
        }

        let went_offline = if remaining_empty {
            match &entry.identity {
                Identity::Rider(id) => {
                    if let Some(r) = self.riders.write().await.get_mut(id) {
                        r.online = false;
                        r.last_seen_ms = now_ms;
                    }
                    false
                }
                Identity::Driver(id) => {
                    if let Some(d) = self.drivers.write().await.get_mut(id) {
                        d.online = false;
                        d.status = DriverStatus::Offline;
                        d.last_seen_ms = now_ms;
                    }
                    true
                }
            }
        } else {
            false
        };

        Some((entry.identity.clone(), went_offline))
    }

    /// `lookup(identity)` — live connection ids bound to an identity.
    pub async fn lookup(&self, identity: &Identity) -> HashSet<String> {
        self.by_identity.read().await.get(identity.as_str()).cloned().unwrap_or_default()
    }

    /// `touch(conn)` — heartbeat refresh.
    pub async fn touch(&self, conn_id: &str, now_ms: u64) {
        if let Some(entry) = self.sessions.read().await.get(conn_id) {
            entry.last_heartbeat_ms.store(now_ms, std::sync::atomic::Ordering::Relaxed);
        }
    }

    /// Connections whose last heartbeat predates `now_ms - idle_ms`.
    pub async fn idle_connections(&self, now_ms: u64, idle_ms: u64) -> Vec<(String, Identity)> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|e| {
                now_ms.saturating_sub(e.last_heartbeat_ms.load(std::sync::atomic::Ordering::Relaxed))
                    > idle_ms
            })
            .map(|e| (e.conn_id.clone(), e.identity.clone()))
            .collect()
    }

    pub async fn get_rider(&self, id: &RiderId) -> Option<Rider> {
        self.riders.read().await.get(id).cloned()
    }

    pub async fn get_driver(&self, id: &DriverId) -> Option<Driver> {
        self.drivers.read().await.get(id).cloned()
    }

    pub async fn update_driver<F>(&self, id: &DriverId, f: F) -> Option<Driver>
    where
        F: FnOnce(&mut Driver),
    {
        let mut drivers = self.drivers.write().await;
        let driver = drivers.get_mut(id)?;
        f(driver);
        Some(driver.clone())
    }

    pub async fn update_rider<F>(&self, id: &RiderId, f: F) -> Option<Rider>
    where
        F: FnOnce(&mut Rider),
    {
        let mut riders = self.riders.write().await;
        let rider = riders.get_mut(id)?;
        f(rider);
        Some(rider.clone())
    }

    pub async fn all_drivers(&self) -> Vec<Driver> {
        self.drivers.read().await.values().cloned().collect()
    }

    /// Acquire the per-driver exclusive lock. Callers that also hold a
    /// request lock must acquire it first (request -> driver -> vehicle).
    pub async fn lock_driver(&self, id: &DriverId) -> tokio::sync::MutexGuard<'_, ()> {
        self.stripe_for(id.as_str()).lock().await
    }

    /// Register a vehicle and attach it to its owning driver's `vehicle_ids`.
    pub async fn register_vehicle(&self, vehicle: Vehicle) -> Result<(), DispatchError> {
        let mut drivers = self.drivers.write().await;
        let driver = drivers.get_mut(&vehicle.driver_id).ok_or(DispatchError::DriverNotFound)?;
        if !driver.vehicle_ids.contains(&vehicle.id) {
            driver.vehicle_ids.push(vehicle.id.clone());
        }
        self.vehicles.write().await.insert(vehicle.id.clone(), vehicle);
        Ok(())
    }

    pub async fn vehicles_for_driver(&self, driver_id: &DriverId) -> Vec<Vehicle> {
        self.vehicles.read().await.values().filter(|v| &v.driver_id == driver_id).cloned().collect()
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
