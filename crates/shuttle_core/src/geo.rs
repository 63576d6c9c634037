use crate::Coordinate;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates, in kilometers.
///
/// Uses the Haversine formula on a spherical Earth.
pub fn distance_km(from: &Coordinate, to: &Coordinate) -> f64 {
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();

    // Rounding can push `a` just past 1 for antipodal points
    let a = ((d_lat / 2.0).sin().powi(2) + (d_lon / 2.0).sin().powi(2) * lat1.cos() * lat2.cos())
        .clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        let point = Coordinate::new(22.4637, 91.8035);
        assert_eq!(distance_km(&point, &point), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = Coordinate::new(22.35, 91.82);
        let b = Coordinate::new(22.47, 91.795);
        assert_eq!(distance_km(&a, &b), distance_km(&b, &a));
    }

    #[test]
    fn test_one_degree_of_latitude() {
        // One degree along a meridian is R * pi / 180
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(1.0, 0.0);
        let expected = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;
        assert!((distance_km(&a, &b) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_antipodal_points_are_half_a_circumference_apart() {
        let half = EARTH_RADIUS_KM * std::f64::consts::PI;
        for (a, b) in [
            (Coordinate::new(22.46, 91.80), Coordinate::new(-22.46, -88.20)),
            (Coordinate::new(90.0, 0.0), Coordinate::new(-90.0, 0.0)),
            (Coordinate::new(0.0, 180.0), Coordinate::new(0.0, 0.0)),
        ] {
            let distance = distance_km(&a, &b);
            assert!(distance.is_finite());
            assert!((distance - half).abs() < 1e-3, "got {distance}");
        }
    }

    #[test]
    fn test_short_campus_hop() {
        let own = Coordinate::new(22.46, 91.80);
        let tracker = Coordinate::new(22.47, 91.795);
        let distance = distance_km(&own, &tracker);
        assert!(distance > 1.1 && distance < 1.3, "got {distance}");
    }
}
