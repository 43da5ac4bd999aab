//! Great-circle distance on the WGS84 mean sphere.

use crate::types::GeoPoint;

/// Mean Earth radius in kilometers (IUGG).
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Haversine distance between two coordinates, in kilometers.
///
/// Accurate to well under the matcher's ranking granularity for
/// city-scale distances; the matcher is the only consumer, so a
/// spatial-index-backed range query can replace this scan without
/// touching the state machine.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}
