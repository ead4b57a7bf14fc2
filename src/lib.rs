// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ride-dispatch: a real-time ride-auction dispatch server. Riders publish
//! ride requests; nearby drivers place competing bids in a short
//! open-auction window; the rider accepts exactly one bid; the chosen
//! driver then progresses the ride through a fixed lifecycle.

pub mod auction;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod events;
pub mod geo;
pub mod identity;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::DispatchConfig;
use crate::events::EventSink;
use crate::state::AppState;
use crate::transport::build_router;

/// Run the dispatch server until shutdown.
pub async fn run(config: DispatchConfig) -> anyhow::Result<()> {
    let addr = config.listen_address.clone();
    let shutdown = CancellationToken::new();

    if let Some(ref url) = config.database_url {
        tracing::info!(database_url = %url, "databaseUrl configured; in-memory store still authoritative");
    }

    let sink: Option<Arc<dyn EventSink>> = build_event_sink(&config).await?;

    let state = AppState::new(config, sink, shutdown.clone());

    tracing::info!(%addr, "ride-dispatch listening");
    let router = build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            serve_shutdown.cancel();
        })
        .await?;

    Ok(())
}

#[cfg(feature = "cross-server-fanout")]
async fn build_event_sink(config: &DispatchConfig) -> anyhow::Result<Option<Arc<dyn EventSink>>> {
    let Some(ref url) = config.nats_url else { return Ok(None) };
    let sink =
        crate::transport::nats_pub::NatsEventSink::connect(url, config.nats_prefix.clone()).await?;
    Ok(Some(Arc::new(sink)))
}

#[cfg(not(feature = "cross-server-fanout"))]
async fn build_event_sink(config: &DispatchConfig) -> anyhow::Result<Option<Arc<dyn EventSink>>> {
    if config.nats_url.is_some() {
        tracing::warn!("natsUrl configured but cross-server-fanout feature is not enabled; ignoring");
    }
    Ok(None)
}
