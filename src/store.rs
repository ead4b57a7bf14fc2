// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ride Store: the durable record of ride requests, with one exclusive lock
//! per request id guarding every mutation (see concurrency notes on
//! [`crate::auction`]).
//!
//! Persistence is a trait boundary ([`RideRepository`]) so a real database
//! can be dropped in without touching the locking discipline above it; the
//! shipped [`InMemoryRideRepository`] is the only implementation and is
//! what `databaseUrl` would eventually be wired to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, RwLock};

use crate::domain::{RequestId, RideRequest, RideStatus, RiderId};

/// Durable storage for ride requests, independent of the in-process locking
/// that serialises concurrent mutation.
pub trait RideRepository: Send + Sync {
    fn save(&self, request: &RideRequest);
    fn load(&self, id: &RequestId) -> Option<RideRequest>;
    fn delete(&self, id: &RequestId);
    fn all(&self) -> Vec<RideRequest>;
}

/// In-memory repository. The only `RideRepository` this server ships;
/// `databaseUrl` is accepted and logged at startup but not wired to a real
/// backing store.
#[derive(Default)]
pub struct InMemoryRideRepository {
    data: StdMutex<HashMap<RequestId, RideRequest>>,
}

impl RideRepository for InMemoryRideRepository {
    fn save(&self, request: &RideRequest) {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).insert(request.id.clone(), request.clone());
    }

    fn load(&self, id: &RequestId) -> Option<RideRequest> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).get(id).cloned()
    }

    fn delete(&self, id: &RequestId) {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).remove(id);
    }

    fn all(&self) -> Vec<RideRequest> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).values().cloned().collect()
    }
}

/// Live ride requests, each behind its own exclusive lock. The `requests`
/// map itself is only ever touched to add a new request or drop a reaped
/// one — per-request mutation always goes through the inner `Mutex`.
pub struct RideStore {
    requests: RwLock<HashMap<RequestId, Arc<Mutex<RideRequest>>>>,
    repo: Arc<dyn RideRepository>,
}

impl RideStore {
    pub fn new(repo: Arc<dyn RideRepository>) -> Self {
        Self { requests: RwLock::new(HashMap::new()), repo }
    }

    /// Insert a freshly-created request and persist it.
    pub async fn create(&self, request: RideRequest) -> Arc<Mutex<RideRequest>> {
        self.repo.save(&request);
        let id = request.id.clone();
        let handle = Arc::new(Mutex::new(request));
        self.requests.write().await.insert(id, Arc::clone(&handle));
        handle
    }

    /// The per-request exclusive lock, for callers that need to hold it
    /// across a multi-step mutation (bid placement, acceptance, cancel).
    pub async fn lock_for(&self, id: &RequestId) -> Option<Arc<Mutex<RideRequest>>> {
        self.requests.read().await.get(id).cloned()
    }

    /// A consistent point-in-time copy, for read-side queries.
    pub async fn snapshot(&self, id: &RequestId) -> Option<RideRequest> {
        let handle = self.lock_for(id).await?;
        let guard = handle.lock().await;
        Some(guard.clone())
    }

    /// Write a mutated request through to the durable repository. Callers
    /// hold the per-request lock while calling this so the persisted copy
    /// never races a concurrent mutation of the same request.
    pub fn persist(&self, request: &RideRequest) {
        self.repo.save(request);
    }

    pub async fn list_by_rider(&self, rider_id: &RiderId) -> Vec<RideRequest> {
        let mut out = Vec::new();
        let requests = self.requests.read().await;
        for handle in requests.values() {
            let guard = handle.lock().await;
            if &guard.rider_id == rider_id {
                out.push(guard.clone());
            }
        }
        out
    }

    /// Requests currently open for bidding (the "available requests" room).
    pub async fn list_available(&self) -> Vec<RideRequest> {
        let mut out = Vec::new();
        let requests = self.requests.read().await;
        for handle in requests.values() {
            let guard = handle.lock().await;
            if guard.status == RideStatus::Bidding {
                out.push(guard.clone());
            }
        }
        out
    }

    pub async fn all_ids(&self) -> Vec<RequestId> {
        self.requests.read().await.keys().cloned().collect()
    }

    /// Drop a terminal request from the live map (retention cleanup). The
    /// durable copy is removed too.
    pub async fn evict(&self, id: &RequestId) {
        self.requests.write().await.remove(id);
        self.repo.delete(id);
    }

    pub fn repository(&self) -> &dyn RideRepository {
        self.repo.as_ref()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
