// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state: the eight named, lifecycle-owned components
//! from the system overview, constructed once and injected into the
//! transport layer. No global mutable statics.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auction::AuctionEngine;
use crate::config::DispatchConfig;
use crate::dispatcher::Dispatcher;
use crate::events::EventBus;
use crate::events::EventSink;
use crate::geo::GeoIndex;
use crate::identity::IdentityRegistry;
use crate::scheduler::Scheduler;
use crate::store::{InMemoryRideRepository, RideStore};

/// Everything the transport layer needs, wired once at startup.
pub struct AppState {
    pub config: DispatchConfig,
    pub identity: Arc<IdentityRegistry>,
    pub geo: Arc<GeoIndex>,
    pub store: Arc<RideStore>,
    pub events: Arc<EventBus>,
    pub dispatcher: Arc<Dispatcher>,
    pub auction: Arc<AuctionEngine>,
    pub scheduler: Arc<Scheduler>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Construct every component in dependency order and spawn the
    /// Lifecycle Scheduler's background sweeps.
    pub fn new(
        config: DispatchConfig,
        sink: Option<Arc<dyn EventSink>>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let identity = Arc::new(IdentityRegistry::new());
        let geo = Arc::new(GeoIndex::new(config.max_dispatch_radius_km));
        let repo = Arc::new(InMemoryRideRepository::default());
        let store = Arc::new(RideStore::new(repo));
        let events = Arc::new(EventBus::new(sink));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&geo),
            Arc::clone(&events),
            config.default_dispatch_radius_km,
            config.max_dispatch_radius_km,
            config.max_candidate_drivers,
        ));
        let auction = Arc::new(AuctionEngine::new(
            Arc::clone(&store),
            Arc::clone(&identity),
            Arc::clone(&dispatcher),
            Arc::clone(&events),
        ));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&identity),
            Arc::clone(&auction),
            Arc::clone(&dispatcher),
            Arc::clone(&events),
            config.clone(),
        ));

        let state = Arc::new(Self {
            config,
            identity,
            geo,
            store,
            events,
            dispatcher,
            auction,
            scheduler: Arc::clone(&scheduler),
            shutdown: shutdown.clone(),
        });

        scheduler.spawn_all(shutdown);
        state
    }
}

/// Current epoch milliseconds, the server's single time source for
/// timestamps stored on domain entities and compared by the scheduler.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
