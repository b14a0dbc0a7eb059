use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Sphere radius used by every geodesic computation, in kilometers.
///
/// Stored routes were authored against this radius; changing it would shift
/// every previously placed anchor.
pub const EARTH_RADIUS_KM: f64 = 6378.1;

/// An absolute device or anchor location: latitude/longitude in degrees,
/// altitude in meters above the WGS84 ellipsoid, heading in degrees clockwise
/// from true north.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub heading_degrees: f64,
}

impl GeoCoordinate {
    /// Constructs a coordinate, normalizing the heading into `[0, 360)`.
    pub fn new(latitude: f64, longitude: f64, altitude: f64, heading_degrees: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            heading_degrees: normalize_heading(heading_degrees),
        }
    }
}

/// Wraps a heading in degrees into `[0, 360)`.
pub fn normalize_heading(heading_degrees: f64) -> f64 {
    heading_degrees.rem_euclid(360.0)
}

/// Solves the direct geodesic problem on the sphere: the coordinate reached
/// by travelling `distance_meters` along `bearing_degrees` from `origin`.
///
/// Altitude and heading carry over from the origin unchanged; a zero distance
/// returns the origin (up to heading normalization).
pub fn destination_point(
    origin: &GeoCoordinate,
    bearing_degrees: f64,
    distance_meters: f64,
) -> GeoCoordinate {
    let bearing = normalize_heading(bearing_degrees).to_radians();
    let lat = origin.latitude.to_radians();
    let lng = origin.longitude.to_radians();
    let angular = distance_meters / 1000.0 / EARTH_RADIUS_KM;

    let new_lat =
        (lat.sin() * angular.cos() + lat.cos() * angular.sin() * bearing.cos()).asin();
    let new_lng = lng
        + (bearing.sin() * angular.sin() * lat.cos())
            .atan2(angular.cos() - lat.sin() * new_lat.sin());

    GeoCoordinate::new(
        new_lat.to_degrees(),
        new_lng.to_degrees(),
        origin.altitude,
        origin.heading_degrees,
    )
}

/// Haversine great-circle distance between two coordinates, in meters.
pub fn great_circle_distance_m(a: &GeoCoordinate, b: &GeoCoordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c * 1000.0
}

/// Converts a planar local-frame displacement into world coordinates.
///
/// Composition order is load-bearing: the lateral leg along `heading + 90°`
/// is applied FIRST, then the forward leg along `heading`, both measured
/// against the original origin's heading. Routes stored by earlier builds
/// were computed in this order; swapping the legs drifts every marker for
/// headings away from the cardinal axes.
pub fn local_offset_to_geo(
    origin: &GeoCoordinate,
    heading_degrees: f64,
    forward_m: f64,
    right_m: f64,
) -> GeoCoordinate {
    let lateral = destination_point(origin, normalize_heading(heading_degrees + 90.0), right_m);
    destination_point(&lateral, heading_degrees, forward_m)
}

/// Initial great-circle bearing from `a` towards `b`, degrees in `[0, 360)`.
pub fn initial_bearing_degrees(a: &GeoCoordinate, b: &GeoCoordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let y = d_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lng.cos();
    normalize_heading(y.atan2(x).to_degrees())
}

/// Approximate east-north-up displacement from `from` to `to`, in meters,
/// expressed in render-space axes (x = east, y = up, z = south).
///
/// Valid for the short ranges the session works at (a few hundred meters),
/// where the flat-earth approximation is well under render tolerance.
pub fn geo_to_local_enu(from: &GeoCoordinate, to: &GeoCoordinate) -> Vector3<f32> {
    let distance = great_circle_distance_m(from, to);
    let bearing = initial_bearing_degrees(from, to).to_radians();
    let east = distance * bearing.sin();
    let north = distance * bearing.cos();
    Vector3::new(
        east as f32,
        (to.altitude - from.altitude) as f32,
        -north as f32,
    )
}

/// Straight-line distance between two render-space points.
pub fn euclidean_distance(a: &Vector3<f32>, b: &Vector3<f32>) -> f32 {
    (b - a).norm()
}
