// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed error code vocabulary shared by the REST and WebSocket
//! surfaces.

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the dispatch API. One flat enum, not a tree of
/// per-component error types — every caller-visible failure boils down to
/// one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchError {
    ValidationError,
    InvalidRequestId,
    InvalidDriverId,
    InvalidUserId,
    InvalidBidId,
    RequestNotFound,
    DriverNotFound,
    UserNotFound,
    BidNotFound,
    BiddingClosed,
    RequestNotBiddable,
    DriverNotOnline,
    DriverNotAvailable,
    DriverBusy,
    DriverOffline,
    BidAlreadyExists,
    InvalidBidAmount,
    Unauthorized,
    DuplicateResource,
    PhoneExists,
    EmailExists,
    InvalidStatus,
    InvalidCoordinates,
    InternalError,
    DeadlineExceeded,
    SlowConsumer,
}

impl DispatchError {
    pub fn http_status(&self) -> u16 {
        use DispatchError::*;
        match self {
            ValidationError
            | InvalidRequestId
            | InvalidDriverId
            | InvalidUserId
            | InvalidBidId
            | InvalidBidAmount
            | InvalidStatus
            | InvalidCoordinates => 400,
            Unauthorized => 401,
            RequestNotFound | DriverNotFound | UserNotFound | BidNotFound => 404,
            DeadlineExceeded => 408,
            BiddingClosed | RequestNotBiddable | DriverNotOnline | DriverNotAvailable
            | DriverBusy | DriverOffline | BidAlreadyExists | DuplicateResource | PhoneExists
            | EmailExists => 409,
            SlowConsumer => 429,
            InternalError => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use DispatchError::*;
        match self {
            ValidationError => "VALIDATION_ERROR",
            InvalidRequestId => "INVALID_REQUEST_ID",
            InvalidDriverId => "INVALID_DRIVER_ID",
            InvalidUserId => "INVALID_USER_ID",
            InvalidBidId => "INVALID_BID_ID",
            RequestNotFound => "REQUEST_NOT_FOUND",
            DriverNotFound => "DRIVER_NOT_FOUND",
            UserNotFound => "USER_NOT_FOUND",
            BidNotFound => "BID_NOT_FOUND",
            BiddingClosed => "BIDDING_CLOSED",
            RequestNotBiddable => "REQUEST_NOT_BIDDABLE",
            DriverNotOnline => "DRIVER_NOT_ONLINE",
            DriverNotAvailable => "DRIVER_NOT_AVAILABLE",
            DriverBusy => "DRIVER_BUSY",
            DriverOffline => "DRIVER_OFFLINE",
            BidAlreadyExists => "BID_ALREADY_EXISTS",
            InvalidBidAmount => "INVALID_BID_AMOUNT",
            Unauthorized => "UNAUTHORIZED",
            DuplicateResource => "DUPLICATE_RESOURCE",
            PhoneExists => "PHONE_EXISTS",
            EmailExists => "EMAIL_EXISTS",
            InvalidStatus => "INVALID_STATUS",
            InvalidCoordinates => "INVALID_COORDINATES",
            InternalError => "INTERNAL_ERROR",
            DeadlineExceeded => "DEADLINE_EXCEEDED",
            SlowConsumer => "SLOW_CONSUMER",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into(), details: None }
    }

    pub fn to_error_body_with_details(
        &self,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> ErrorBody {
        ErrorBody {
            code: self.as_str().to_owned(),
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ApiEnvelope<()>>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ApiEnvelope::error(self.to_error_body(message))))
    }

    /// Build the `error` event envelope sent over the WebSocket surface.
    pub fn to_ws_error(&self, message: impl Into<String>) -> serde_json::Value {
        serde_json::json!({
            "type": "error",
            "data": self.to_error_body(message),
        })
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for DispatchError {}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Top-level REST response envelope: `{success, data|message+code, meta}`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub meta: ApiMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiMeta {
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub limit: u32,
    pub total_count: u64,
    pub total_pages: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            code: None,
            details: None,
            meta: ApiMeta { timestamp: crate::state::epoch_ms(), pagination: None },
        }
    }

    pub fn ok_paginated(data: T, pagination: Pagination) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            code: None,
            details: None,
            meta: ApiMeta { timestamp: crate::state::epoch_ms(), pagination: Some(pagination) },
        }
    }
}

impl ApiEnvelope<()> {
    pub fn error(body: ErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(body.message),
            code: Some(body.code),
            details: body.details,
            meta: ApiMeta { timestamp: crate::state::epoch_ms(), pagination: None },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
