// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-server fan-out: publishes every `DispatchEvent` the local Event Bus
//! delivers to a NATS subject as well, so a multi-process deployment behind
//! a shared event bus stays consistent without every node subscribing to
//! every other node directly.
//!
//! `EventSink::publish` is a synchronous trait method (the Event Bus must
//! never block or fail on a slow or unreachable fan-out target), so each
//! call hands its publish off to a detached task; a NATS outage degrades to
//! dropped fan-out, never a stalled dispatch.

use tracing::{info, warn};

use crate::events::{DispatchEvent, EventSink};

/// Publishes dispatch events to `{prefix}.events.<type>` on a NATS server.
pub struct NatsEventSink {
    client: async_nats::Client,
    prefix: String,
}

impl NatsEventSink {
    /// Connect to the NATS server and return a sink ready to attach to the
    /// Event Bus.
    pub async fn connect(url: &str, prefix: String) -> anyhow::Result<Self> {
        info!(%url, %prefix, "connecting NATS event sink");
        let client = async_nats::ConnectOptions::new().retry_on_initial_connect().connect(url).await?;
        info!("NATS event sink connected");
        Ok(Self { client, prefix })
    }
}

/// Subject a room key publishes under: `{prefix}.events.<room>`, with the
/// room key's `:` separators dotted to match NATS subject conventions.
fn subject_for(prefix: &str, room_key: &str) -> String {
    format!("{prefix}.events.{}", room_key.replace(':', "."))
}

impl EventSink for NatsEventSink {
    fn publish(&self, room_key: &str, event: &DispatchEvent) {
        let subject = subject_for(&self.prefix, room_key);
        let payload = match serde_json::to_vec(event) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to serialize event for NATS fan-out: {e}");
                return;
            }
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.publish(subject, payload.into()).await {
                warn!("NATS publish failed: {e}");
            }
        });
    }
}

#[cfg(test)]
#[path = "nats_pub_tests.rs"]
mod tests;
