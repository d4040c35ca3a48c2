//! Geographic utilities: great-circle distance, path length, formatting.

use chrono::{DateTime, Utc};
use geo::{algorithm::simplify::Simplify, Coord, LineString};

use crate::Coordinate;

/// Mean Earth radius in meters used by every distance calculation.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two coordinates in meters.
///
/// Symmetric, and exactly zero for identical inputs.
///
/// # Example
/// ```
/// use walk_tracker::{haversine_distance, Coordinate};
/// let london = Coordinate::new(51.5007, -0.1246);
/// let paris = Coordinate::new(48.8566, 2.3522);
/// let d = haversine_distance(&london, &paris);
/// assert!((d - 343_556.0).abs() < 500.0);
/// ```
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Total length of a path in meters (sum over consecutive pairs).
///
/// Returns 0 for fewer than two points.
pub fn path_length(coords: &[Coordinate]) -> f64 {
    coords
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Format a distance for display.
///
/// Below 1000 m: rounded whole meters ("742 m").
/// Otherwise kilometers with two decimals ("1.24 km").
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", meters.round())
    } else {
        format!("{:.2} km", meters / 1000.0)
    }
}

/// Format the time between two instants as "42 min" or "1h 5min".
///
/// Partial minutes are dropped; a negative span renders as "0 min".
pub fn format_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let minutes = (end - start).num_minutes().max(0);
    if minutes < 60 {
        return format!("{} min", minutes);
    }
    format!("{}h {}min", minutes / 60, minutes % 60)
}

/// Douglas-Peucker simplification of a trail.
///
/// `tolerance` is in degrees (0.0001 ≈ 11 m). The first and last point are
/// always kept; trails with fewer than three points are returned unchanged.
pub fn simplify_trail(coords: &[Coordinate], tolerance: f64) -> Vec<Coordinate> {
    if coords.len() < 3 || tolerance <= 0.0 {
        return coords.to_vec();
    }

    let line: LineString<f64> = coords
        .iter()
        .map(|c| Coord {
            x: c.longitude,
            y: c.latitude,
        })
        .collect::<Vec<_>>()
        .into();

    line.simplify(&tolerance)
        .0
        .iter()
        .map(|c| Coordinate::new(c.y, c.x))
        .collect()
}
