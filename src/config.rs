// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed configuration for the dispatch server, recognising the environment
//! keys from the external interface surface.

use std::time::Duration;

/// Server configuration, parsed from CLI flags or environment variables.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "ride-dispatch")]
pub struct DispatchConfig {
    /// Address to bind the HTTP + WebSocket listener on.
    #[arg(long, default_value = "0.0.0.0:8080", env = "DISPATCH_LISTEN_ADDRESS")]
    pub listen_address: String,

    /// Backing store connection string. Accepted and logged; the shipped
    /// repository is in-memory regardless of what's configured here.
    #[arg(long, env = "DISPATCH_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Bearer token for the REST surface. If unset, auth is disabled.
    #[arg(long, env = "DISPATCH_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Seconds a request may stay in `BIDDING` before auto-cancelling.
    #[arg(long, default_value_t = 120, env = "DISPATCH_AUCTION_TTL_SECONDS")]
    pub auction_ttl_seconds: u64,

    /// Server heartbeat cadence sent to every connection.
    #[arg(long, default_value_t = 30, env = "DISPATCH_HEARTBEAT_INTERVAL_SECONDS")]
    pub heartbeat_interval_seconds: u64,

    /// Idle window after which a connection is evicted for missed heartbeats.
    #[arg(long, default_value_t = 300, env = "DISPATCH_SESSION_IDLE_SECONDS")]
    pub session_idle_seconds: u64,

    /// Window after which a driver with no location update is forced offline.
    #[arg(long, default_value_t = 600, env = "DISPATCH_DRIVER_STALE_SECONDS")]
    pub driver_stale_seconds: u64,

    /// Default dispatch radius when a request doesn't override it.
    #[arg(long, default_value_t = 10.0, env = "DISPATCH_DEFAULT_RADIUS_KM")]
    pub default_dispatch_radius_km: f64,

    /// Ceiling on dispatch radius; also sizes the Geo Index grid cell.
    #[arg(long, default_value_t = 50.0, env = "DISPATCH_MAX_RADIUS_KM")]
    pub max_dispatch_radius_km: f64,

    /// Max candidate drivers returned per dispatch.
    #[arg(long, default_value_t = 10, env = "DISPATCH_MAX_CANDIDATE_DRIVERS")]
    pub max_candidate_drivers: usize,

    /// Days a terminal ride request is retained before the daily cleanup
    /// sweep deletes it.
    #[arg(long, default_value_t = 30, env = "DISPATCH_RETENTION_DAYS")]
    pub retention_days: u64,

    /// NATS server URL for cross-server event fan-out (requires the
    /// `cross-server-fanout` feature).
    #[arg(long, env = "DISPATCH_NATS_URL")]
    pub nats_url: Option<String>,

    /// Subject prefix for fan-out events.
    #[arg(long, default_value = "dispatch", env = "DISPATCH_NATS_PREFIX")]
    pub nats_prefix: String,
}

impl DispatchConfig {
    pub fn auction_ttl(&self) -> Duration {
        Duration::from_secs(self.auction_ttl_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_seconds)
    }

    pub fn driver_stale(&self) -> Duration {
        Duration::from_secs(self.driver_stale_seconds)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 86_400)
    }
}
