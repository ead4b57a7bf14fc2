// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the ride dispatch server.

pub mod auth;
pub mod http;
#[cfg(feature = "cross-server-fanout")]
pub mod nats_pub;
pub mod wire;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the axum `Router` with every REST and WebSocket route.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Ride requests
        .route("/ride-requests", post(http::create_ride_request))
        .route("/ride-requests/available", get(http::list_available))
        .route("/ride-requests/user/{userId}", get(http::list_for_rider))
        .route("/ride-requests/{id}", get(http::get_ride_request))
        .route("/ride-requests/{id}/bids", get(http::get_ride_request_bids))
        .route("/ride-requests/{id}/bids/{bidId}/accept", post(http::accept_bid))
        // Riders
        .route("/riders/register", post(http::register_rider))
        .route("/riders/{id}", get(http::get_rider))
        // Drivers
        .route("/drivers/register", post(http::register_driver))
        .route("/drivers/{id}", get(http::get_driver))
        .route("/drivers/{id}/location", patch(http::update_driver_location))
        .route("/drivers/{id}/status", patch(http::update_driver_status))
        // WebSocket session gateway
        .route("/ws", get(ws::ws_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
