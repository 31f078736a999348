//! Great-circle geometry for geofencing

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for all distance calculations
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// WGS84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Validated constructor; rejects non-finite and out-of-range values
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let point = Self { lat, lng };
        point.is_valid().then_some(point)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Haversine distance in meters
///
/// Symmetric in its arguments and zero for identical points.
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair outside [0, 1] for antipodal points
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMA: GeoPoint = GeoPoint {
        lat: -12.0464,
        lng: -77.0428,
    };

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(haversine_meters(LIMA, LIMA), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let other = GeoPoint::new(-12.1, -77.0).unwrap();
        assert_eq!(haversine_meters(LIMA, other), haversine_meters(other, LIMA));
    }

    #[test]
    fn test_one_millidegree_north_is_about_111m() {
        let north = GeoPoint::new(LIMA.lat + 0.001, LIMA.lng).unwrap();
        let d = haversine_meters(LIMA, north);
        assert!((105.45..=116.55).contains(&d), "got {d}");
    }

    #[test]
    fn test_quarter_meridian() {
        let equator = GeoPoint::new(0.0, 0.0).unwrap();
        let pole = GeoPoint::new(90.0, 0.0).unwrap();
        let expected = std::f64::consts::PI / 2.0 * EARTH_RADIUS_METERS;
        assert!((haversine_meters(equator, pole) - expected).abs() < 0.01);
    }

    #[test]
    fn test_point_validation() {
        assert!(GeoPoint::new(91.0, 0.0).is_none());
        assert!(GeoPoint::new(0.0, -180.5).is_none());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_none());
        assert!(GeoPoint::new(-90.0, 180.0).is_some());
    }
}
