// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn decodes_driver_update_location() {
    let raw = r#"{"type":"driver:updateLocation","data":{"latitude":28.6,"longitude":77.2}}"#;
    let msg: InboundMessage = serde_json::from_str(raw).expect("valid message");
    match msg {
        InboundMessage::DriverUpdateLocation(data) => {
            assert_eq!(data.latitude, 28.6);
            assert_eq!(data.longitude, 77.2);
            assert!(data.address.is_none());
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn decodes_ride_new_request() {
    let raw = r#"{
        "type": "ride:newRequest",
        "data": {
            "rideType": "TAXI",
            "pickupLocation": {"address": "A", "lat": 28.6, "lon": 77.2},
            "destination": {"address": "B", "lat": 28.7, "lon": 77.3}
        }
    }"#;
    let msg: InboundMessage = serde_json::from_str(raw).expect("valid message");
    match msg {
        InboundMessage::RideNewRequest(data) => {
            assert_eq!(data.ride_type, VehicleClass::Taxi);
            assert_eq!(data.pickup_location.address, "A");
            assert!(data.comfort_preference.is_none());
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn decodes_heartbeat_response_with_no_data() {
    let raw = r#"{"type":"heartbeat_response"}"#;
    let msg: InboundMessage = serde_json::from_str(raw).expect("valid message");
    assert!(matches!(msg, InboundMessage::HeartbeatResponse));
}

#[test]
fn decodes_bid_accepted() {
    let raw = r#"{
        "type": "ride:bidAccepted",
        "data": {"requestId": "abc123", "bidId": "bid-1", "userId": "USER_00000001"}
    }"#;
    let msg: InboundMessage = serde_json::from_str(raw).expect("valid message");
    match msg {
        InboundMessage::RideBidAccepted(data) => {
            assert_eq!(data.request_id, "abc123");
            assert_eq!(data.bid_id, "bid-1");
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn rejects_unknown_message_type() {
    let raw = r#"{"type":"not:a:real:type","data":{}}"#;
    let result: Result<InboundMessage, _> = serde_json::from_str(raw);
    assert!(result.is_err());
}

#[test]
fn bid_query_params_default_on_empty_object() {
    let parsed: BidQueryParams = serde_json::from_str("{}").expect("empty object parses");
    assert!(parsed.sort_by.is_none());
    assert!(parsed.order.is_none());
    assert!(parsed.status.is_none());
}

#[test]
fn bid_query_params_parses_sort_and_order() {
    let raw = r#"{"sortBy":"fareAmount","order":"desc"}"#;
    let parsed: BidQueryParams = serde_json::from_str(raw).expect("object parses");
    assert_eq!(parsed.sort_by, Some(BidSortBy::FareAmount));
    assert_eq!(parsed.order, Some(SortOrder::Desc));
}
