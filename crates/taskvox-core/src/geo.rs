//! Great-circle distance and distance-based ranking of search results.
//!
//! Distances are kilometres throughout; converting for display is left to the UI.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Anything that can be placed on the map and ranked by distance.
pub trait Located {
    fn coords(&self) -> Option<Coordinate>;
    fn set_distance(&mut self, km: Option<f64>);
    fn distance(&self) -> Option<f64>;
}

/// Haversine distance between two coordinates, in kilometres.
///
/// Deltas are taken as absolute values so `distance_km(a, b)` and
/// `distance_km(b, a)` evaluate the exact same floating-point expression.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).abs().to_radians();
    let d_lon = (b.lng - a.lng).abs().to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);
    let d = 2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt());
    d.max(0.0)
}

/// Annotate every entry with its distance from `origin` and sort ascending.
///
/// Entries without coordinates keep `None`, sort after every located entry, and
/// are never dropped. The sort is stable, so ties keep their incoming order.
/// With no origin, distances are cleared and the order is left alone.
pub fn rank_by_distance<T: Located>(items: &mut [T], origin: Option<Coordinate>) {
    let Some(origin) = origin else {
        for item in items.iter_mut() {
            item.set_distance(None);
        }
        return;
    };

    for item in items.iter_mut() {
        let km = item.coords().map(|c| distance_km(origin, c));
        item.set_distance(km);
    }

    items.sort_by(|a, b| match (a.distance(), b.distance()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Drop located entries farther than `max_km` from `origin`. Entries without
/// coordinates always survive; with no origin nothing is filtered.
pub fn within_radius<T: Located>(items: Vec<T>, origin: Option<Coordinate>, max_km: f64) -> Vec<T> {
    let Some(origin) = origin else {
        return items;
    };
    items
        .into_iter()
        .filter(|item| match item.coords() {
            Some(c) => distance_km(origin, c) <= max_km,
            None => true,
        })
        .collect()
}
