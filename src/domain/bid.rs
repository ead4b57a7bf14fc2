// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use super::ids::{BidId, DriverId};

/// A bid's lifecycle status within its owning ride request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

/// A driver's offer on a ride request, embedded in the request's bid list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: BidId,
    pub driver_id: DriverId,
    pub fare_amount: f64,
    pub estimated_arrival_minutes: u32,
    pub vehicle_id: Option<String>,
    pub message: Option<String>,
    pub status: BidStatus,
    pub bid_time_ms: u64,
    pub updated_at_ms: u64,
    pub accepted_at_ms: Option<u64>,
    pub rejected_at_ms: Option<u64>,
}

impl Bid {
    pub fn new(
        driver_id: DriverId,
        fare_amount: f64,
        estimated_arrival_minutes: u32,
        vehicle_id: Option<String>,
        message: Option<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: BidId::new(),
            driver_id,
            fare_amount,
            estimated_arrival_minutes,
            vehicle_id,
            message,
            status: BidStatus::Pending,
            bid_time_ms: now_ms,
            updated_at_ms: now_ms,
            accepted_at_ms: None,
            rejected_at_ms: None,
        }
    }
}

/// A bid annotated with its rank among siblings, for read-side queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedBid {
    #[serde(flatten)]
    pub bid: Bid,
    pub rank: usize,
    pub is_lowest: bool,
    pub is_highest: bool,
}

/// Summary statistics over a set of bids' fare amounts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BidStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub range: f64,
}

impl BidStatistics {
    pub fn compute(bids: &[Bid]) -> Option<Self> {
        if bids.is_empty() {
            return None;
        }
        let min = bids.iter().map(|b| b.fare_amount).fold(f64::INFINITY, f64::min);
        let max = bids.iter().map(|b| b.fare_amount).fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = bids.iter().map(|b| b.fare_amount).sum();
        let mean = sum / bids.len() as f64;
        Some(Self { min, max, mean, range: max - min })
    }
}

/// Sort key for bid queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BidSortBy {
    FareAmount,
    BidTime,
    EstimatedArrival,
}

impl Default for BidSortBy {
    fn default() -> Self {
        Self::FareAmount
    }
}

/// Sort order for bid queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::Asc
    }
}

#[cfg(test)]
#[path = "bid_tests.rs"]
mod tests;
