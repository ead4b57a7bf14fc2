// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers for the dispatch server's read-side queries and the
//! non-realtime mirrors of the socket operations (spec.md §6).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auction::NewRideRequest;
use crate::domain::{BidId, DriverId, GeoPoint, RequestId, RiderId, VehicleClass, Waypoint};
use crate::error::{ApiEnvelope, DispatchError, Pagination};
use crate::events::{DispatchEvent, Room};
use crate::identity::{NewDriverProfile, NewRiderProfile};
use crate::state::{epoch_ms, AppState};
use crate::transport::wire::{BidQueryParams, DriverUpdateLocationData, DriverUpdateStatusData};

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 20;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub driver_count: usize,
    pub ride_request_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

fn paginate<T: Clone>(items: &[T], query: &PageQuery) -> (Vec<T>, Pagination) {
    let page = query.page.unwrap_or(DEFAULT_PAGE).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).max(1);
    let total_count = items.len() as u64;
    let total_pages = ((total_count as f64) / (limit as f64)).ceil().max(1.0) as u32;
    let start = ((page - 1) as usize) * (limit as usize);
    let page_items = items.get(start..).unwrap_or(&[]);
    let page_items = page_items.iter().take(limit as usize).cloned().collect();
    let pagination = Pagination {
        current_page: page,
        limit,
        total_count,
        total_pages,
        has_next_page: page < total_pages,
        has_prev_page: page > 1,
    };
    (page_items, pagination)
}

/// `GET /api/v1/health`
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let driver_count = state.identity.all_drivers().await.len();
    let ride_request_count = state.store.all_ids().await.len();
    Json(ApiEnvelope::ok(HealthResponse { status: "running".to_owned(), driver_count, ride_request_count }))
}

/// `GET /ride-requests/{id}`
pub async fn get_ride_request(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    let request_id = match RequestId::try_from(id) {
        Ok(id) => id,
        Err(e) => return e.to_http_response("invalid request id").into_response(),
    };
    match state.store.snapshot(&request_id).await {
        Some(request) => Json(ApiEnvelope::ok(request)).into_response(),
        None => DispatchError::RequestNotFound.to_http_response("ride request not found").into_response(),
    }
}

/// `GET /ride-requests/{id}/bids?sortBy=&order=&status=`
pub async fn get_ride_request_bids(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<BidQueryParams>,
) -> impl IntoResponse {
    let request_id = match RequestId::try_from(id) {
        Ok(id) => id,
        Err(e) => return e.to_http_response("invalid request id").into_response(),
    };
    let sort_by = params.sort_by.unwrap_or_default();
    let order = params.order.unwrap_or_default();
    match state.auction.query_bids(&request_id, params.status, sort_by, order).await {
        Ok((bids, stats)) => {
            Json(ApiEnvelope::ok(serde_json::json!({"bids": bids, "statistics": stats}))).into_response()
        }
        Err(e) => e.to_http_response("failed to query bids").into_response(),
    }
}

/// `GET /ride-requests/available`
pub async fn list_available(State(state): State<Arc<AppState>>, Query(page): Query<PageQuery>) -> impl IntoResponse {
    let available = state.store.list_available().await;
    let (items, pagination) = paginate(&available, &page);
    Json(ApiEnvelope::ok_paginated(items, pagination))
}

/// `GET /ride-requests/user/{userId}`
pub async fn list_for_rider(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> impl IntoResponse {
    let rider_id = match RiderId::parse(user_id) {
        Ok(id) => id,
        Err(e) => return e.to_http_response("invalid user id").into_response(),
    };
    let requests = state.store.list_by_rider(&rider_id).await;
    let (items, pagination) = paginate(&requests, &page);
    Json(ApiEnvelope::ok_paginated(items, pagination)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRideRequestBody {
    pub user_id: String,
    pub ride_type: VehicleClass,
    pub pickup_location: Waypoint,
    pub destination: Waypoint,
    #[serde(default)]
    pub comfort_preference: Option<u8>,
    #[serde(default)]
    pub fare_preference: Option<u8>,
}

/// `POST /ride-requests` — mirror of `ride:newRequest`.
pub async fn create_ride_request(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRideRequestBody>,
) -> impl IntoResponse {
    let rider_id = match RiderId::parse(body.user_id) {
        Ok(id) => id,
        Err(e) => return e.to_http_response("invalid user id").into_response(),
    };
    let distance_km = crate::geo::haversine_km(body.pickup_location.point(), body.destination.point());
    let duration_minutes = ((distance_km / 30.0) * 60.0).ceil().max(1.0) as u32;
    let req = NewRideRequest {
        rider_id,
        pickup: body.pickup_location,
        destination: body.destination,
        requested_class: body.ride_type,
        comfort_preference: body.comfort_preference.unwrap_or(3),
        fare_preference: body.fare_preference.unwrap_or(3),
        estimated_distance_km: distance_km,
        estimated_duration_minutes: duration_minutes,
    };
    match state.auction.create(req, epoch_ms()).await {
        Ok(request) => Json(ApiEnvelope::ok(request)).into_response(),
        Err(e) => e.to_http_response("failed to create ride request").into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBidBody {
    pub user_id: String,
}

/// `POST /ride-requests/{id}/bids/{bidId}/accept`
pub async fn accept_bid(
    State(state): State<Arc<AppState>>,
    Path((id, bid_id)): Path<(String, String)>,
    Json(body): Json<AcceptBidBody>,
) -> impl IntoResponse {
    let request_id = match RequestId::try_from(id) {
        Ok(id) => id,
        Err(e) => return e.to_http_response("invalid request id").into_response(),
    };
    let rider_id = match RiderId::parse(body.user_id) {
        Ok(id) => id,
        Err(e) => return e.to_http_response("invalid user id").into_response(),
    };
    let bid_id = BidId::from_raw(bid_id);
    match state.auction.accept_bid(&request_id, &bid_id, &rider_id, epoch_ms()).await {
        Ok(request) => Json(ApiEnvelope::ok(request)).into_response(),
        Err(e) => e.to_http_response("failed to accept bid").into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRiderBody {
    #[serde(default)]
    pub rider_id: Option<String>,
    pub display_name: String,
    pub phone: String,
}

/// `POST /riders/register`
pub async fn register_rider(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRiderBody>,
) -> impl IntoResponse {
    let rider_id = match body.rider_id.map(RiderId::parse).transpose() {
        Ok(id) => id,
        Err(e) => return e.to_http_response("invalid rider id").into_response(),
    };
    let new_profile = NewRiderProfile { display_name: body.display_name, phone: body.phone };
    let conn_id = format!("rest:{}", uuid::Uuid::new_v4());
    match state.identity.register_rider(conn_id, rider_id, Some(new_profile), epoch_ms()).await {
        Ok((rider, _is_new)) => Json(ApiEnvelope::ok(rider)).into_response(),
        Err(e) => e.to_http_response("registration failed").into_response(),
    }
}

/// `GET /riders/{id}`
pub async fn get_rider(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    let rider_id = match RiderId::parse(id) {
        Ok(id) => id,
        Err(e) => return e.to_http_response("invalid rider id").into_response(),
    };
    match state.identity.get_rider(&rider_id).await {
        Some(rider) => Json(ApiEnvelope::ok(rider)).into_response(),
        None => DispatchError::UserNotFound.to_http_response("rider not found").into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDriverBody {
    #[serde(default)]
    pub driver_id: Option<String>,
    pub name: String,
    pub phone: String,
    pub location: GeoPoint,
}

/// `POST /drivers/register`
pub async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterDriverBody>,
) -> impl IntoResponse {
    let driver_id = match body.driver_id.map(DriverId::parse).transpose() {
        Ok(id) => id,
        Err(e) => return e.to_http_response("invalid driver id").into_response(),
    };
    if !body.location.in_range() {
        return DispatchError::InvalidCoordinates.to_http_response("location out of range").into_response();
    }
    let new_profile = NewDriverProfile { name: body.name, phone: body.phone, location: body.location };
    let conn_id = format!("rest:{}", uuid::Uuid::new_v4());
    match state.identity.register_driver(conn_id, driver_id, Some(new_profile), epoch_ms()).await {
        Ok((driver, _is_new, went_online)) => {
            if went_online {
                state.dispatcher.reindex_driver(&state.identity, &driver).await;
                state
                    .events
                    .publish(Room::Global, DispatchEvent::DriverStatusUpdated { driver: driver.clone() })
                    .await;
            }
            Json(ApiEnvelope::ok(driver)).into_response()
        }
        Err(e) => e.to_http_response("registration failed").into_response(),
    }
}

/// `GET /drivers/{id}`
pub async fn get_driver(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    let driver_id = match DriverId::parse(id) {
        Ok(id) => id,
        Err(e) => return e.to_http_response("invalid driver id").into_response(),
    };
    match state.identity.get_driver(&driver_id).await {
        Some(driver) => Json(ApiEnvelope::ok(driver)).into_response(),
        None => DispatchError::DriverNotFound.to_http_response("driver not found").into_response(),
    }
}

/// `PATCH /drivers/{id}/location`
pub async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<DriverUpdateLocationData>,
) -> impl IntoResponse {
    let driver_id = match DriverId::parse(id) {
        Ok(id) => id,
        Err(e) => return e.to_http_response("invalid driver id").into_response(),
    };
    let location = GeoPoint { lat: body.latitude, lon: body.longitude };
    if !location.in_range() {
        return DispatchError::InvalidCoordinates.to_http_response("location out of range").into_response();
    }
    let now = epoch_ms();
    let address = body.address.clone();
    let updated = state
        .identity
        .update_driver(&driver_id, |d| {
            d.location = location;
            d.address = address.clone();
            d.last_location_update_ms = now;
        })
        .await;
    match updated {
        Some(driver) => {
            state.dispatcher.reindex_driver(&state.identity, &driver).await;
            state
                .events
                .publish(Room::Global, DispatchEvent::DriverLocationUpdate { driver_id, location })
                .await;
            Json(ApiEnvelope::ok(driver)).into_response()
        }
        None => DispatchError::DriverNotFound.to_http_response("driver not found").into_response(),
    }
}

/// `PATCH /drivers/{id}/status`
pub async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<DriverUpdateStatusData>,
) -> impl IntoResponse {
    let driver_id = match DriverId::parse(id) {
        Ok(id) => id,
        Err(e) => return e.to_http_response("invalid driver id").into_response(),
    };
    let updated = state.identity.update_driver(&driver_id, |d| d.status = body.status).await;
    match updated {
        Some(driver) => {
            state.dispatcher.reindex_driver(&state.identity, &driver).await;
            state
                .events
                .publish(Room::Global, DispatchEvent::DriverStatusUpdated { driver: driver.clone() })
                .await;
            Json(ApiEnvelope::ok(driver)).into_response()
        }
        None => DispatchError::DriverNotFound.to_http_response("driver not found").into_response(),
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
