//! Great-circle math on a spherical Earth.
//!
//! Geofences are tens to hundreds of meters across, so a spherical model
//! with the mean Earth radius is accurate to well under a meter at that
//! scale. All angles are in degrees at the API boundary.

use trailhead_types::LatLng;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Bearing steps used for debug radius polygons.
pub const DEFAULT_POLYGON_STEPS: u32 = 80;

/// Great-circle distance between two points in meters (haversine).
pub fn haversine_distance_m(a: LatLng, b: LatLng) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Point reached by travelling `distance_m` from `origin` on the initial
/// `bearing_deg` (clockwise from north).
pub fn destination_point(origin: LatLng, bearing_deg: f64, distance_m: f64) -> LatLng {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let phi1 = origin.lat.to_radians();
    let lambda1 = origin.lng.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    LatLng::new(phi2.to_degrees(), normalize_longitude(lambda2.to_degrees()))
}

/// Closed ring approximating a circle of `radius_m` around `center`.
///
/// The ring has `steps` vertices swept clockwise from north plus the first
/// vertex repeated at the end. Fewer than three steps are raised to three.
/// Diagnostic only: geofence decisions never use the polygon.
pub fn radius_polygon(center: LatLng, radius_m: f64, steps: u32) -> Vec<LatLng> {
    let steps = steps.max(3);
    let mut ring: Vec<LatLng> = (0..steps)
        .map(|i| {
            let bearing = 360.0 * f64::from(i) / f64::from(steps);
            destination_point(center, bearing, radius_m)
        })
        .collect();
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
    ring
}

/// Wrap a longitude into `[-180, 180)`.
fn normalize_longitude(lng: f64) -> f64 {
    (lng + 540.0).rem_euclid(360.0) - 180.0
}
