//! Spherical-earth helpers for circle objects and radius probes.

use geo::{coord, Point, Rect};

pub(crate) const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance in meters between two lon/lat points.
pub fn haversine(a: Point, b: Point) -> f64 {
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();
    let delta_lat = (b.y() - a.y()).to_radians();
    let delta_lon = (b.x() - a.x()).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Axis-aligned lon/lat window enclosing a circle of `meters` radius.
///
/// The longitude span widens with latitude; near the poles the window can
/// exceed the full globe, which only makes the enclosing probe coarser.
pub(crate) fn rect_from_center(center: Point, meters: f64) -> Rect {
    let lat_degrees = (meters / EARTH_RADIUS_METERS).to_degrees();
    let lon_degrees =
        (meters / (EARTH_RADIUS_METERS * center.y().to_radians().cos())).to_degrees();

    Rect::new(
        coord! { x: center.x() - lon_degrees, y: center.y() - lat_degrees },
        coord! { x: center.x() + lon_degrees, y: center.y() + lat_degrees },
    )
}

/// Point reached by travelling `meters` from `origin` along `bearing_deg`
/// (degrees clockwise from north).
pub(crate) fn destination(origin: Point, meters: f64, bearing_deg: f64) -> Point {
    let d = meters / EARTH_RADIUS_METERS;
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.y().to_radians();
    let lon1 = origin.x().to_radians();

    let lat2 = (lat1.sin() * d.cos() + lat1.cos() * d.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * d.sin() * lat1.cos()).atan2(d.cos() - lat1.sin() * lat2.sin());

    Point::new(lon2.to_degrees(), lat2.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        let nyc = Point::new(-74.0060, 40.7128);
        let london = Point::new(-0.1278, 51.5074);
        let distance = haversine(nyc, london);
        // Roughly 5,570 km; allow for the spherical model.
        assert!((distance - 5_570_000.0).abs() < 100_000.0);
    }

    #[test]
    fn test_haversine_zero() {
        let p = Point::new(13.4, 52.5);
        assert_eq!(haversine(p, p), 0.0);
    }

    #[test]
    fn test_rect_from_center_contains_center() {
        let center = Point::new(-74.0, 40.7);
        let rect = rect_from_center(center, 1000.0);
        assert!(rect.min().x < center.x() && center.x() < rect.max().x);
        assert!(rect.min().y < center.y() && center.y() < rect.max().y);
    }

    #[test]
    fn test_destination_round_trip() {
        let origin = Point::new(2.3522, 48.8566);
        let there = destination(origin, 5_000.0, 90.0);
        let back = haversine(origin, there);
        assert!((back - 5_000.0).abs() < 1.0);
    }
}
