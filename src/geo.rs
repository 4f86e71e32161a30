//! Great-circle distance and the flat-speed ETA model.
//!
//! Everything here is pure. Distances are kept at full precision; `round_km`
//! exists for presentation only and must not feed any ordering.

use crate::models::position::Position;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Planning speed for the coarse ETA, not traffic aware.
pub const AVERAGE_SPEED_KMH: f64 = 40.0;

pub fn haversine_km(a: Position, b: Position) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

pub fn estimate_eta_minutes(distance_km: f64) -> u32 {
    (distance_km / AVERAGE_SPEED_KMH * 60.0).round() as u32
}
