//! Geodetic primitives: wrap-aware rectangles, great-circle math

/// Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Inclusive tolerance for rectangle bounds; keeps boundary points from
/// flickering in and out at floating-point cell edges.
pub const EPS: f64 = 1e-12;

/// A point on the sphere in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Normalize a longitude into `[-180, 180)`
pub fn norm_lon(lon: f64) -> f64 {
    let mut x = (lon + 180.0) % 360.0;
    if x < 0.0 {
        x += 360.0;
    }
    x - 180.0
}

/// Axis-aligned rectangle on the sphere, in degrees.
///
/// If the normalized longitude interval has `lon_min > lon_max` the
/// rectangle wraps the antimeridian and membership tests use the union
/// `[lon_min, 180) ∪ [-180, lon_max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRect {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl TileRect {
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    /// Constant-time point-in-rectangle test with dateline support
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if lat < self.lat_min - EPS || lat > self.lat_max + EPS {
            return false;
        }
        let a = norm_lon(self.lon_min);
        let b = norm_lon(self.lon_max);
        let l = norm_lon(lon);
        if a <= b {
            l >= a - EPS && l <= b + EPS
        } else {
            // rectangle spans the dateline: interval is [a,180) U [-180,b]
            l >= a - EPS || l <= b + EPS
        }
    }

    /// Whether the normalized longitude interval crosses the antimeridian
    pub fn wraps(&self) -> bool {
        norm_lon(self.lon_min) > norm_lon(self.lon_max)
    }

    /// Center of the rectangle. When the longitude interval wraps the
    /// antimeridian the upper bound is unwrapped by 360° before averaging,
    /// so the center lands inside the rectangle rather than on the
    /// antipodal meridian.
    pub fn center(&self) -> GeoPoint {
        let lat = 0.5 * (self.lat_min + self.lat_max);
        let a = norm_lon(self.lon_min);
        let b = norm_lon(self.lon_max);
        let lon = if a > b {
            norm_lon(0.5 * (a + b + 360.0))
        } else {
            0.5 * (self.lon_min + self.lon_max)
        };
        GeoPoint::new(lat, lon)
    }
}

/// Great-circle distance between two points via the haversine formula (km)
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let h = (dlat / 2.0).sin().powi(2) + (dlon / 2.0).sin().powi(2) * lat1.cos() * lat2.cos();
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Forward azimuth from `from` to `to`, in degrees `[0, 360)`
pub fn bearing_deg(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let dlon = (to.lon - from.lon).to_radians();
    let y = dlon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlon.cos();
    let theta = y.atan2(x).to_degrees();
    (theta + 360.0) % 360.0
}

/// Ray-casting point-in-polygon test. Not on the hot path; kept for
/// non-rectangular inputs.
pub fn point_in_polygon(pts: &[GeoPoint], lat: f64, lon: f64) -> bool {
    let n = pts.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (pts[i].lon, pts[i].lat);
        let (xj, yj) = (pts[j].lon, pts[j].lat);
        if (yi > lat) != (yj > lat) {
            let x_int = xi + (lat - yi) * (xj - xi) / (yj - yi);
            if lon < x_int {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn norm_lon_wraps_into_half_open_interval() {
        assert_relative_eq!(norm_lon(0.0), 0.0);
        assert_relative_eq!(norm_lon(190.0), -170.0);
        assert_relative_eq!(norm_lon(-190.0), 170.0);
        assert_relative_eq!(norm_lon(540.0), -180.0);
        assert_relative_eq!(norm_lon(-180.0), -180.0);
        assert_relative_eq!(norm_lon(180.0), -180.0);
    }

    #[test]
    fn rect_contains_simple() {
        let r = TileRect::new(-5.0, 5.0, -10.0, 10.0);
        assert!(r.contains(0.0, 0.0));
        assert!(r.contains(5.0, 10.0));
        assert!(!r.contains(5.1, 0.0));
        assert!(!r.contains(0.0, 10.5));
    }

    #[test]
    fn rect_contains_dateline_wrap() {
        // spans 170E..170W across the antimeridian
        let r = TileRect::new(-5.0, 5.0, 170.0, -170.0);
        assert!(r.wraps());
        assert!(r.contains(0.0, 175.0));
        assert!(r.contains(0.0, -175.0));
        assert!(!r.contains(0.0, 0.0));
    }

    #[test]
    fn center_of_plain_rect_is_midpoint() {
        let r = TileRect::new(0.0, 10.0, 10.0, 20.0);
        let c = r.center();
        assert_relative_eq!(c.lat, 5.0);
        assert_relative_eq!(c.lon, 15.0);
    }

    #[test]
    fn center_of_wrapped_rect_sits_on_antimeridian() {
        let r = TileRect::new(-5.0, 5.0, 170.0, -170.0);
        let c = r.center();
        assert_relative_eq!(c.lat, 0.0);
        assert_relative_eq!(c.lon, -180.0);
        assert!(r.contains(c.lat, c.lon));
    }

    #[test]
    fn center_of_raw_bounds_straddling_dateline() {
        // unnormalized storage, as the center+size loader produces
        let r = TileRect::new(-1.0, 1.0, 179.85, 180.05);
        let c = r.center();
        assert_relative_eq!(c.lon, 179.95, epsilon = 1e-9);
        assert!(r.contains(0.0, -179.97));
    }

    #[test]
    fn rect_wrap_symmetry_under_lon_shift() {
        let r = TileRect::new(-5.0, 5.0, 170.0, -170.0);
        for lon in [-179.5, -175.0, 0.0, 30.0, 175.0, 179.9] {
            assert_eq!(
                r.contains(0.0, lon),
                r.contains(0.0, lon + 360.0),
                "lon {}",
                lon
            );
        }
    }

    #[test]
    fn haversine_known_distance() {
        // Paris to London, roughly 344 km
        let paris = GeoPoint::new(48.8566, 2.3522);
        let london = GeoPoint::new(51.5074, -0.1278);
        let d = haversine_km(&paris, &london);
        assert!((d - 344.0).abs() < 2.0, "got {}", d);
    }

    #[test]
    fn haversine_zero_for_same_point() {
        let p = GeoPoint::new(12.3, -45.6);
        assert_relative_eq!(haversine_km(&p, &p), 0.0);
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = GeoPoint::new(0.0, 0.0);
        assert_relative_eq!(
            bearing_deg(&origin, &GeoPoint::new(1.0, 0.0)),
            0.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            bearing_deg(&origin, &GeoPoint::new(0.0, 1.0)),
            90.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            bearing_deg(&origin, &GeoPoint::new(-1.0, 0.0)),
            180.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            bearing_deg(&origin, &GeoPoint::new(0.0, -1.0)),
            270.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn polygon_ray_cast() {
        let square = [
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 10.0),
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(10.0, 0.0),
        ];
        assert!(point_in_polygon(&square, 5.0, 5.0));
        assert!(!point_in_polygon(&square, 15.0, 5.0));
        assert!(!point_in_polygon(&square, 5.0, -1.0));
    }
}
