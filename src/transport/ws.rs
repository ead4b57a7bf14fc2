// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Gateway: the WebSocket surface. One task pair per connection — a
//! reader forwarding inbound frames into a bounded queue (backpressure:
//! `SLOW_CONSUMER` on overflow, spec.md §5), and a driver loop that
//! dispatches inbound messages to the engine and forwards outbound room
//! events back to the client. Mirrors the teacher's per-session
//! `tokio::select!` bridge loop in `ws.rs`, generalized from one upstream
//! PTY session to the rider/driver room subscriptions this protocol needs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

use crate::auction::NewRideRequest;
use crate::domain::{BidId, DriverId, DriverStatus, RequestId, RiderId};
use crate::error::DispatchError;
use crate::events::{DispatchEvent, Room};
use crate::identity::{Identity, NewDriverProfile, NewRiderProfile};
use crate::state::{epoch_ms, AppState};
use crate::transport::auth;
use crate::transport::wire::*;

const INBOUND_QUEUE_CAPACITY: usize = 64;
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Query parameters for the WebSocket upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// `GET /ws` — WebSocket upgrade for the Session Gateway.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let query_str = query.token.as_ref().map(|t| format!("token={t}")).unwrap_or_default();
    if auth::validate_ws_query(&query_str, state.config.auth_token.as_deref()).is_err() {
        return axum::http::Response::builder()
            .status(401)
            .body(axum::body::Body::from("unauthorized"))
            .unwrap_or_default()
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_ws(socket, state)).into_response()
}

/// What a connection acquires on registration: its identity, and the
/// forwarder tasks feeding its subscribed rooms into the outbound queue.
struct Binding {
    identity: Identity,
    forwarders: Vec<tokio::task::JoinHandle<()>>,
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, ws_rx) = socket.split();

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<String>(INBOUND_QUEUE_CAPACITY);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<serde_json::Value>(OUTBOUND_QUEUE_CAPACITY);
    let slow_consumer = Arc::new(AtomicBool::new(false));

    let reader = tokio::spawn(reader_task(ws_rx, inbound_tx, Arc::clone(&slow_consumer)));
    let mut heartbeat = tokio::time::interval(state.config.heartbeat_interval());
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut binding: Option<Binding> = None;

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            _ = heartbeat.tick() => {
                let msg = serde_json::json!({"type": "heartbeat", "data": {"timestamp": epoch_ms()}});
                if ws_tx.send(Message::Text(msg.to_string().into())).await.is_err() {
                    break;
                }
            }

            msg = inbound_rx.recv() => {
                match msg {
                    Some(text) => {
                        let reply =
                            dispatch_inbound(&state, &conn_id, &text, &mut binding, &outbound_tx).await;
                        if let Some(reply) = reply {
                            if ws_tx.send(Message::Text(reply.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => {
                        if slow_consumer.load(Ordering::Relaxed) {
                            let err = DispatchError::SlowConsumer.to_ws_error("inbound queue overflow");
                            let _ = ws_tx.send(Message::Text(err.to_string().into())).await;
                        }
                        break;
                    }
                }
            }

            msg = outbound_rx.recv() => {
                match msg {
                    Some(value) => {
                        if ws_tx.send(Message::Text(value.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    reader.abort();
    if let Some(binding) = binding.take() {
        for handle in binding.forwarders {
            handle.abort();
        }
    }
    if let Some((identity, went_offline)) = state.identity.unregister(&conn_id, epoch_ms()).await {
        if went_offline {
            if let Identity::Driver(driver_id) = &identity {
                if let Some(driver) = state.identity.get_driver(driver_id).await {
                    state.dispatcher.reindex_driver(&state.identity, &driver).await;
                    state.events.publish(Room::Global, DispatchEvent::DriverStatusUpdated { driver }).await;
                }
            }
        }
    }
}

async fn reader_task(
    mut ws_rx: futures_util::stream::SplitStream<WebSocket>,
    inbound_tx: mpsc::Sender<String>,
    slow_consumer: Arc<AtomicBool>,
) {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(mpsc::error::TrySendError::Full(_)) = inbound_tx.try_send(text.to_string()) {
                    slow_consumer.store(true, Ordering::Relaxed);
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
}

/// Subscribe to the rooms an identity is entitled to observe, forwarding
/// each into the connection's outbound queue.
async fn spawn_forwarders(
    state: &Arc<AppState>,
    identity: &Identity,
    tx: mpsc::Sender<serde_json::Value>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let rooms = match identity {
        Identity::Rider(id) => vec![Room::Rider(id.clone())],
        Identity::Driver(id) => vec![Room::Driver(id.clone()), Room::Global],
    };
    let mut handles = Vec::with_capacity(rooms.len());
    for room in rooms {
        let rx = state.events.subscribe(&room).await;
        handles.push(tokio::spawn(forward_room(rx, tx.clone())));
    }
    handles
}

async fn forward_room(mut rx: broadcast::Receiver<DispatchEvent>, tx: mpsc::Sender<serde_json::Value>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let Ok(value) = serde_json::to_value(&event) else { continue };
                if tx.send(value).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(lagged = n, "connection dropped lagging broadcast events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Parse one inbound text frame and dispatch it to the engine, returning a
/// direct reply (ack or error) to send back to this connection, if any.
async fn dispatch_inbound(
    state: &Arc<AppState>,
    conn_id: &str,
    text: &str,
    binding: &mut Option<Binding>,
    outbound_tx: &mpsc::Sender<serde_json::Value>,
) -> Option<serde_json::Value> {
    let message: InboundMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => return Some(DispatchError::ValidationError.to_ws_error(format!("malformed message: {e}"))),
    };

    let now = epoch_ms();
    match message {
        InboundMessage::UserRegister(data) => match handle_user_register(state, conn_id, data, now).await {
            Ok(rider) => {
                let identity = Identity::Rider(rider.id.clone());
                let forwarders = spawn_forwarders(state, &identity, outbound_tx.clone()).await;
                *binding = Some(Binding { identity, forwarders });
                Some(serde_json::json!({"type": "user:registered", "data": {"rider": rider}}))
            }
            Err(e) => Some(e.to_ws_error("registration failed")),
        },

        InboundMessage::DriverRegister(data) => match handle_driver_register(state, conn_id, data, now).await {
            Ok(driver) => {
                let identity = Identity::Driver(driver.id.clone());
                let forwarders = spawn_forwarders(state, &identity, outbound_tx.clone()).await;
                *binding = Some(Binding { identity, forwarders });
                Some(serde_json::json!({"type": "driver:registered", "data": {"driver": driver}}))
            }
            Err(e) => Some(e.to_ws_error("registration failed")),
        },

        InboundMessage::DriverUpdateStatus(data) => {
            let Some(driver_id) = bound_driver(binding) else {
                return Some(DispatchError::Unauthorized.to_ws_error("not registered as a driver"));
            };
            match handle_driver_status(state, &driver_id, data.status).await {
                Ok(()) => None,
                Err(e) => Some(e.to_ws_error("status update failed")),
            }
        }

        InboundMessage::DriverUpdateLocation(data) => {
            let Some(driver_id) = bound_driver(binding) else {
                return Some(DispatchError::Unauthorized.to_ws_error("not registered as a driver"));
            };
            match handle_driver_location(state, &driver_id, data, now).await {
                Ok(ack) => Some(ack),
                Err(e) => Some(e.to_ws_error("location update failed")),
            }
        }

        InboundMessage::RideNewRequest(data) => {
            let Some(rider_id) = bound_rider(binding) else {
                return Some(DispatchError::Unauthorized.to_ws_error("not registered as a rider"));
            };
            match handle_new_request(state, rider_id, data, now).await {
                Ok(request) => Some(serde_json::json!({"type": "ride:requestCreated", "data": {"request": request}})),
                Err(e) => Some(e.to_ws_error("ride request failed")),
            }
        }

        InboundMessage::RideBidPlaced(data) => {
            let Some(driver_id) = bound_driver(binding) else {
                return Some(DispatchError::Unauthorized.to_ws_error("not registered as a driver"));
            };
            match handle_bid_placed(state, &driver_id, data, now).await {
                Ok(bid) => Some(serde_json::json!({"type": "ride:bidUpdate", "data": {"bid": bid}})),
                Err(e) => Some(e.to_ws_error("bid failed")),
            }
        }

        InboundMessage::RideBidAccepted(data) => {
            let Some(rider_id) = bound_rider(binding) else {
                return Some(DispatchError::Unauthorized.to_ws_error("not registered as a rider"));
            };
            match handle_bid_accepted(state, &rider_id, data, now).await {
                Ok(request) => Some(serde_json::json!({"type": "ride:bidAccepted", "data": {"request": request}})),
                Err(e) => Some(e.to_ws_error("acceptance failed")),
            }
        }

        InboundMessage::RideCancel(data) => match handle_cancel(state, data, now).await {
            Ok(request) => Some(serde_json::json!({"type": "ride:cancelled", "data": {"request": request}})),
            Err(e) => Some(e.to_ws_error("cancel failed")),
        },

        InboundMessage::HeartbeatResponse => {
            state.identity.touch(conn_id, now).await;
            None
        }

        InboundMessage::UserRequestBidUpdate(data) => {
            handle_bid_reconcile(state, data, outbound_tx).await;
            None
        }
    }
}

fn bound_rider(binding: &Option<Binding>) -> Option<RiderId> {
    match binding.as_ref()?.identity.clone() {
        Identity::Rider(id) => Some(id),
        Identity::Driver(_) => None,
    }
}

fn bound_driver(binding: &Option<Binding>) -> Option<DriverId> {
    match binding.as_ref()?.identity.clone() {
        Identity::Driver(id) => Some(id),
        Identity::Rider(_) => None,
    }
}

async fn handle_user_register(
    state: &Arc<AppState>,
    conn_id: &str,
    data: UserRegisterData,
    now: u64,
) -> Result<crate::domain::Rider, DispatchError> {
    let rider_id = data.user_id.map(RiderId::parse).transpose()?;
    let new_profile = match (&rider_id, data.display_name, data.phone) {
        (Some(_), _, _) => None,
        (None, Some(display_name), Some(phone)) => Some(NewRiderProfile { display_name, phone }),
        (None, _, _) => return Err(DispatchError::ValidationError),
    };
    let (rider, _is_new) =
        state.identity.register_rider(conn_id.to_owned(), rider_id, new_profile, now).await?;
    Ok(rider)
}

async fn handle_driver_register(
    state: &Arc<AppState>,
    conn_id: &str,
    data: DriverRegisterData,
    now: u64,
) -> Result<crate::domain::Driver, DispatchError> {
    let driver_id = data.driver_id.map(DriverId::parse).transpose()?;
    let new_profile = match (&driver_id, data.name, data.phone, data.location) {
        (Some(_), _, _, _) => None,
        (None, Some(name), Some(phone), Some(location)) => {
            if !location.in_range() {
                return Err(DispatchError::InvalidCoordinates);
            }
            Some(NewDriverProfile { name, phone, location })
        }
        (None, _, _, _) => return Err(DispatchError::ValidationError),
    };
    let (driver, _is_new, went_online) =
        state.identity.register_driver(conn_id.to_owned(), driver_id, new_profile, now).await?;
    if went_online {
        state.dispatcher.reindex_driver(&state.identity, &driver).await;
        state.events.publish(Room::Global, DispatchEvent::DriverStatusUpdated { driver: driver.clone() }).await;
    }
    Ok(driver)
}

async fn handle_driver_status(
    state: &Arc<AppState>,
    driver_id: &DriverId,
    status: DriverStatus,
) -> Result<(), DispatchError> {
    let driver = state
        .identity
        .update_driver(driver_id, |d| d.status = status)
        .await
        .ok_or(DispatchError::DriverNotFound)?;
    state.dispatcher.reindex_driver(&state.identity, &driver).await;
    state.events.publish(Room::Global, DispatchEvent::DriverStatusUpdated { driver }).await;
    Ok(())
}

async fn handle_driver_location(
    state: &Arc<AppState>,
    driver_id: &DriverId,
    data: DriverUpdateLocationData,
    now: u64,
) -> Result<serde_json::Value, DispatchError> {
    let location = crate::domain::GeoPoint { lat: data.latitude, lon: data.longitude };
    if !location.in_range() {
        return Err(DispatchError::InvalidCoordinates);
    }
    let driver = state
        .identity
        .update_driver(driver_id, |d| {
            d.location = location;
            d.address = data.address.clone();
            d.last_location_update_ms = now;
        })
        .await
        .ok_or(DispatchError::DriverNotFound)?;
    state.dispatcher.reindex_driver(&state.identity, &driver).await;
    state
        .events
        .publish(Room::Global, DispatchEvent::DriverLocationUpdate { driver_id: driver_id.clone(), location })
        .await;
    Ok(serde_json::json!({"type": "driver:locationUpdated", "data": {"driver": driver}}))
}

async fn handle_new_request(
    state: &Arc<AppState>,
    rider_id: RiderId,
    data: RideNewRequestData,
    now: u64,
) -> Result<crate::domain::RideRequest, DispatchError> {
    let distance_km = crate::geo::haversine_km(data.pickup_location.point(), data.destination.point());
    let duration_minutes = ((distance_km / 30.0) * 60.0).ceil().max(1.0) as u32;
    let req = NewRideRequest {
        rider_id,
        pickup: data.pickup_location,
        destination: data.destination,
        requested_class: data.ride_type,
        comfort_preference: data.comfort_preference.unwrap_or(3),
        fare_preference: data.fare_preference.unwrap_or(3),
        estimated_distance_km: distance_km,
        estimated_duration_minutes: duration_minutes,
    };
    state.auction.create(req, now).await
}

async fn handle_bid_placed(
    state: &Arc<AppState>,
    driver_id: &DriverId,
    data: RideBidPlacedData,
    now: u64,
) -> Result<crate::domain::Bid, DispatchError> {
    let request_id = RequestId::try_from(data.request_id)?;
    state
        .auction
        .place_bid(
            &request_id,
            driver_id,
            data.fare_amount,
            data.estimated_arrival,
            data.vehicle_id,
            data.message,
            now,
        )
        .await
}

async fn handle_bid_accepted(
    state: &Arc<AppState>,
    rider_id: &RiderId,
    data: RideBidAcceptedData,
    now: u64,
) -> Result<crate::domain::RideRequest, DispatchError> {
    let request_id = RequestId::try_from(data.request_id)?;
    let bid_id = BidId::from_raw(data.bid_id);
    let caller = RiderId::parse(data.user_id)?;
    if &caller != rider_id {
        return Err(DispatchError::Unauthorized);
    }
    state.auction.accept_bid(&request_id, &bid_id, rider_id, now).await
}

async fn handle_cancel(
    state: &Arc<AppState>,
    data: RideCancelData,
    now: u64,
) -> Result<crate::domain::RideRequest, DispatchError> {
    let request_id = RequestId::try_from(data.ride_id)?;
    state.auction.cancel(&request_id, data.reason, now).await
}

async fn handle_bid_reconcile(
    state: &Arc<AppState>,
    data: UserRequestBidUpdateData,
    outbound_tx: &mpsc::Sender<serde_json::Value>,
) {
    let Ok(request_id) = RequestId::try_from(data.request_id) else { return };
    let Some(request) = state.store.snapshot(&request_id).await else { return };
    for bid in request.bids {
        let value =
            serde_json::json!({"type": "ride:bidUpdate", "data": {"request_id": request.id, "bid": bid}});
        if outbound_tx.send(value).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
