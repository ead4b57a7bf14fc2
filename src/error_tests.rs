// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn status_codes_match_spec_bands() {
    assert_eq!(DispatchError::ValidationError.http_status(), 400);
    assert_eq!(DispatchError::Unauthorized.http_status(), 401);
    assert_eq!(DispatchError::RequestNotFound.http_status(), 404);
    assert_eq!(DispatchError::BiddingClosed.http_status(), 409);
    assert_eq!(DispatchError::DeadlineExceeded.http_status(), 408);
    assert_eq!(DispatchError::SlowConsumer.http_status(), 429);
    assert_eq!(DispatchError::InternalError.http_status(), 500);
}

#[test]
fn as_str_round_trips_through_display() {
    assert_eq!(DispatchError::DriverNotOnline.to_string(), "DRIVER_NOT_ONLINE");
}

#[test]
fn error_envelope_marks_failure() {
    let body = DispatchError::BidNotFound.to_error_body("no such bid");
    let envelope = ApiEnvelope::error(body);
    assert!(!envelope.success);
    assert_eq!(envelope.code.as_deref(), Some("BID_NOT_FOUND"));
}

#[test]
fn ok_envelope_marks_success() {
    let envelope = ApiEnvelope::ok(42);
    assert!(envelope.success);
    assert_eq!(envelope.data, Some(42));
}
