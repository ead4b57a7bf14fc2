// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Geo Index: an in-memory spatial structure over currently-online,
//! `AVAILABLE` drivers, answering bounded-radius candidate queries.
//!
//! Implemented as a uniform lat/lon grid sized to the configured maximum
//! dispatch radius. A driver's cell is `(floor(lat / cell_deg), floor(lon /
//! cell_deg))`. `cell_deg` is picked so one cell spans at least
//! `maxDispatchRadiusKm` of *latitude*, which bounds the `dlat` scan to -1..=1.
//! Longitude degrees shrink by `cos(lat)` away from the equator, so a fixed
//! `dlon` range would undercover at high latitude; the query instead widens
//! the longitude scan per-query to `ceil(radius_km / (cell_km * cos(lat)))`
//! cells, which always covers any point within `radius_km` of the center.
//! This gives near-O(1) insert/update/delete and a query cost proportional to
//! the candidate count, not the whole fleet.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::domain::{DriverId, GeoPoint, VehicleClass};

const EARTH_RADIUS_KM: f64 = 6371.0;
/// Degrees of latitude per kilometre, used to size grid cells.
const KM_PER_DEGREE_LAT: f64 = 111.0;

type Cell = (i64, i64);

/// A driver's eligibility snapshot as tracked by the index. Kept separate
/// from the full `Driver`/`Vehicle` records so the index only holds what a
/// candidate query needs.
#[derive(Debug, Clone)]
pub struct GeoEntry {
    pub driver_id: DriverId,
    pub point: GeoPoint,
    pub classes: Vec<(VehicleClass, u8, u8)>,
    pub rating: f64,
}

/// A single candidate returned by [`GeoIndex::find_candidates`].
#[derive(Debug, Clone)]
pub struct Candidate {
    pub driver_id: DriverId,
    pub distance_km: f64,
    pub score: f64,
}

struct Inner {
    cell_deg: f64,
    cells: HashMap<Cell, Vec<DriverId>>,
    entries: HashMap<DriverId, GeoEntry>,
}

impl Inner {
    fn cell_of(&self, p: &GeoPoint) -> Cell {
        ((p.lat / self.cell_deg).floor() as i64, (p.lon / self.cell_deg).floor() as i64)
    }
}

pub struct GeoIndex {
    inner: RwLock<Inner>,
}

impl GeoIndex {
    /// `max_radius_km` sizes the grid so one cell spans at least that many
    /// km of latitude, bounding the latitude scan to -1..=1 cells; the
    /// longitude scan is widened per-query in [`find_candidates`] to account
    /// for longitude contraction at latitude.
    pub fn new(max_radius_km: f64) -> Self {
        let cell_deg = (max_radius_km / KM_PER_DEGREE_LAT).max(0.01);
        Self {
            inner: RwLock::new(Inner {
                cell_deg,
                cells: HashMap::new(),
                entries: HashMap::new(),
            }),
        }
    }

    /// Insert or update a driver's indexed position and eligibility.
    pub async fn upsert(&self, entry: GeoEntry) {
        let mut inner = self.inner.write().await;
        let new_cell = inner.cell_of(&entry.point);

        if let Some(old) = inner.entries.get(&entry.driver_id) {
            let old_cell = inner.cell_of(&old.point);
            if old_cell != new_cell {
                if let Some(bucket) = inner.cells.get_mut(&old_cell) {
                    bucket.retain(|id| id != &entry.driver_id);
                }
            }
        }

        inner.cells.entry(new_cell).or_default().push(entry.driver_id.clone());
        // Avoid duplicate entries in the bucket when the cell is unchanged.
        if let Some(bucket) = inner.cells.get_mut(&new_cell) {
            bucket.dedup();
        }
        inner.entries.insert(entry.driver_id.clone(), entry);
    }

    /// Remove a driver from the index (goes offline, or becomes unavailable).
    pub async fn remove(&self, driver_id: &DriverId) {
        let mut inner = self.inner.write().await;
        if let Some(old) = inner.entries.remove(driver_id) {
            let cell = inner.cell_of(&old.point);
            if let Some(bucket) = inner.cells.get_mut(&cell) {
                bucket.retain(|id| id != driver_id);
            }
        }
    }

    /// `findCandidates(pickup, requestedClass, comfortMin, priceMax,
    /// radiusKm, limit)`.
    pub async fn find_candidates(
        &self,
        pickup: GeoPoint,
        requested_class: VehicleClass,
        comfort_min: u8,
        price_max: u8,
        radius_km: f64,
        limit: usize,
    ) -> Vec<Candidate> {
        let inner = self.inner.read().await;
        let center = inner.cell_of(&pickup);

        // Longitude degrees are `cos(lat)` narrower than latitude degrees away
        // from the equator, so the same `cell_deg` covers fewer km of
        // longitude at the pickup's latitude. Widen the longitude scan to
        // compensate; clamp the cosine away from zero so the scan stays
        // finite near the poles (irrelevant for ride dispatch, but a division
        // by a near-zero cosine would otherwise blow the range up).
        let cell_km = inner.cell_deg * KM_PER_DEGREE_LAT;
        let lat_cos = pickup.lat.to_radians().cos().max(0.01);
        let lon_cells = (radius_km / (cell_km * lat_cos)).ceil().max(1.0) as i64;

        let mut candidates = Vec::new();
        for dlat in -1..=1 {
            for dlon in -lon_cells..=lon_cells {
                let cell = (center.0 + dlat, center.1 + dlon);
                let Some(bucket) = inner.cells.get(&cell) else { continue };
                for driver_id in bucket {
                    let Some(entry) = inner.entries.get(driver_id) else { continue };
                    let distance_km = haversine_km(pickup, entry.point);
                    if distance_km > radius_km {
                        continue;
                    }
                    let Some(&(_, comfort, price)) = entry
                        .classes
                        .iter()
                        .find(|(class, comfort, price)| {
                            *class == requested_class && *comfort >= comfort_min && *price <= price_max
                        })
                    else {
                        continue;
                    };
                    let score = match_score(comfort, comfort_min, price, price_max, entry.rating, distance_km);
                    candidates.push(Candidate { driver_id: driver_id.clone(), distance_km, score });
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.distance_km.partial_cmp(&b.distance_km).unwrap_or(std::cmp::Ordering::Equal))
        });
        candidates.truncate(limit);
        candidates
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}

/// Haversine distance in kilometres between two points.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Match score formula from the dispatch eligibility spec, clamped to [0, 100].
pub fn match_score(comfort: u8, comfort_min: u8, price: u8, price_max: u8, rating: f64, distance_km: f64) -> f64 {
    let score = 50.0
        + (comfort as f64 - comfort_min as f64).max(0.0) * 10.0
        + (price_max as f64 - price as f64).max(0.0) * 5.0
        + (rating - 4.0).max(0.0) * 20.0
        - distance_km * 2.0;
    score.clamp(0.0, 100.0)
}

#[cfg(test)]
#[path = "geo_tests.rs"]
mod tests;
