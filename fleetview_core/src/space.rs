//! Map-space coordinate conversion.
//!
//! The engine interpolates in Web-Mercator world units: a square [0, 1]
//! space with x growing east and y growing south, the coordinate system the
//! host map engine's frame matrix projects from. Converting once at
//! snapshot ingestion keeps the per-tick interpolation math free of
//! trigonometry.

use nalgebra::Vector2;
use std::f64::consts::PI;

/// Latitude clamp for the Web-Mercator singularity at the poles.
const MAX_LATITUDE: f64 = 85.051_129;

/// Projects WGS84 longitude/latitude into [0, 1] Web-Mercator world units.
pub fn project(lon: f64, lat: f64) -> Vector2<f64> {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = (lon + 180.0) / 360.0;
    let sin_lat = (lat * PI / 180.0).sin();
    let y = 0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI);
    Vector2::new(x, y)
}

/// Heading of the movement vector `from -> to`, in radians.
///
/// Measured in world axes (x east, y south), so both renderer backends
/// rotate sprites identically.
pub fn heading(from: &Vector2<f64>, to: &Vector2<f64>) -> f64 {
    let delta = to - from;
    delta.y.atan2(delta.x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_origin() {
        let p = project(0.0, 0.0);
        assert_relative_eq!(p.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(p.y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_project_date_line() {
        assert_relative_eq!(project(-180.0, 0.0).x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(project(180.0, 0.0).x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_project_clamps_poles() {
        let north = project(0.0, 89.9);
        let south = project(0.0, -89.9);
        assert!(north.y.is_finite());
        assert!(south.y.is_finite());
        // North is "up" = smaller y in this orientation
        assert!(north.y < south.y);
    }

    #[test]
    fn test_heading_cardinal_directions() {
        let origin = Vector2::new(0.5, 0.5);
        let east = Vector2::new(0.6, 0.5);
        let south = Vector2::new(0.5, 0.6);

        assert_relative_eq!(heading(&origin, &east), 0.0, epsilon = 1e-12);
        assert_relative_eq!(heading(&origin, &south), PI / 2.0, epsilon = 1e-12);
    }
}
