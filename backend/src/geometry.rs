use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::models::Coordinate;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Share of the theoretical maximum offset actually used, so that rounding on
/// the sphere never pushes a synthetic waypoint past the detour bound.
const OFFSET_SAFETY: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetSide {
    /// Left of the direction of travel.
    #[default]
    Left,
    Right,
}

/// `min_lon > max_lon` marks a box that wraps across the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lon > self.max_lon
    }

    pub fn contains(&self, coord: Coordinate) -> bool {
        let in_lon = if self.crosses_antimeridian() {
            coord.lon >= self.min_lon || coord.lon <= self.max_lon
        } else {
            coord.lon >= self.min_lon && coord.lon <= self.max_lon
        };
        coord.lat >= self.min_lat && coord.lat <= self.max_lat && in_lon
    }

    /// Create a bounding box from two points with a margin in kilometers.
    /// When the short way between them crosses 180° the box wraps instead of
    /// spanning the whole globe.
    pub fn from_route(start: Coordinate, end: Coordinate, margin_km: f64) -> Self {
        // Approximate: 1 degree latitude ≈ 111 km
        let lat_margin = margin_km / 111.0;
        let avg_lat = (start.lat + end.lat) / 2.0;
        let lon_margin = margin_km / (111.0 * avg_lat.to_radians().cos().max(0.01));
        let min_lat = (start.lat.min(end.lat) - lat_margin).max(-90.0);
        let max_lat = (start.lat.max(end.lat) + lat_margin).min(90.0);

        let (west, east) = (start.lon.min(end.lon), start.lon.max(end.lon));
        if east - west <= 180.0 {
            return Self {
                min_lat,
                max_lat,
                min_lon: (west - lon_margin).max(-180.0),
                max_lon: (east + lon_margin).min(180.0),
            };
        }

        // wrapped span runs from `east` eastwards over 180° to `west`
        if east - west <= 2.0 * lon_margin {
            return Self {
                min_lat,
                max_lat,
                min_lon: -180.0,
                max_lon: 180.0,
            };
        }
        Self {
            min_lat,
            max_lat,
            min_lon: east - lon_margin,
            max_lon: west + lon_margin,
        }
    }

    /// Boxes that never wrap, for APIs that reject `west > east`.
    pub fn split(&self) -> Vec<BoundingBox> {
        if !self.crosses_antimeridian() {
            return vec![*self];
        }
        vec![
            BoundingBox {
                max_lon: 180.0,
                ..*self
            },
            BoundingBox {
                min_lon: -180.0,
                ..*self
            },
        ]
    }
}

pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    haversine_km(a, b) * 1000.0
}

pub fn approximate_distance_km(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|w| haversine_km(w[0], w[1])).sum()
}

/// Relative extra length of `via_km` over `direct_km`.
pub fn detour_ratio(direct_km: f64, via_km: f64) -> f64 {
    if direct_km <= f64::EPSILON {
        return 0.0;
    }
    (via_km - direct_km) / direct_km
}

/// Initial great-circle bearing from `from` to `to`, radians clockwise from north.
pub fn initial_bearing(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlon = (to.lon - from.lon).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x)
}

pub fn destination_point(start: Coordinate, distance_km: f64, bearing_rad: f64) -> Coordinate {
    let angular_distance = distance_km / EARTH_RADIUS_KM;
    let lat1 = start.lat.to_radians();
    let lon1 = start.lon.to_radians();

    let lat2 = f64::asin(
        (lat1.sin() * angular_distance.cos()
            + lat1.cos() * angular_distance.sin() * bearing_rad.cos())
        .clamp(-1.0, 1.0),
    );
    let lon2 = lon1
        + f64::atan2(
            bearing_rad.sin() * angular_distance.sin() * lat1.cos(),
            angular_distance.cos() - lat1.sin() * lat2.sin(),
        );

    Coordinate {
        lat: lat2.to_degrees(),
        lon: normalize_longitude(lon2.to_degrees()),
    }
}

/// Point at fraction `t` of the great circle between `a` and `b`.
pub fn intermediate_point(a: Coordinate, b: Coordinate, t: f64) -> Coordinate {
    let distance = haversine_km(a, b);
    if distance <= f64::EPSILON {
        return a;
    }
    destination_point(a, distance * t, initial_bearing(a, b))
}

pub fn midpoint(a: Coordinate, b: Coordinate) -> Coordinate {
    intermediate_point(a, b, 0.5)
}

/// Point at fraction `t` along `a → b`, pushed `offset_km` sideways.
pub fn offset_point(
    a: Coordinate,
    b: Coordinate,
    t: f64,
    offset_km: f64,
    side: OffsetSide,
) -> Coordinate {
    let base = intermediate_point(a, b, t);
    let heading = initial_bearing(base, b);
    let perpendicular = match side {
        OffsetSide::Left => heading - PI / 2.0,
        OffsetSide::Right => heading + PI / 2.0,
    };
    destination_point(base, offset_km, perpendicular)
}

/// Shortest distance from `point` to the great-circle segment `a → b`.
pub fn distance_to_segment_km(point: Coordinate, a: Coordinate, b: Coordinate) -> f64 {
    let segment = haversine_km(a, b);
    let to_point = haversine_km(a, point);
    if segment <= f64::EPSILON {
        return to_point;
    }
    let delta13 = to_point / EARTH_RADIUS_KM;
    let theta = initial_bearing(a, point) - initial_bearing(a, b);
    let cross_track = (delta13.sin() * theta.sin()).clamp(-1.0, 1.0).asin();

    if theta.cos() < 0.0 {
        return to_point;
    }
    let along_track =
        (delta13.cos() / cross_track.cos()).clamp(-1.0, 1.0).acos() * EARTH_RADIUS_KM;
    if along_track > segment {
        return haversine_km(b, point);
    }
    cross_track.abs() * EARTH_RADIUS_KM
}

/// Signed position of `point` projected onto `a → b`, as a fraction of its length.
pub fn along_track_fraction(point: Coordinate, a: Coordinate, b: Coordinate) -> f64 {
    let segment = haversine_km(a, b);
    if segment <= f64::EPSILON {
        return 0.0;
    }
    let to_point = haversine_km(a, point);
    let delta13 = to_point / EARTH_RADIUS_KM;
    let theta = initial_bearing(a, point) - initial_bearing(a, b);
    let cross_track = (delta13.sin() * theta.sin()).clamp(-1.0, 1.0).asin();
    let along = (delta13.cos() / cross_track.cos()).clamp(-1.0, 1.0).acos() * EARTH_RADIUS_KM;
    let signed = if theta.cos() < 0.0 { -along } else { along };
    signed / segment
}

/// Largest sideways offset (km) at fraction `t` keeping the two-leg planar
/// path within `(1 + ratio) × length`.
pub fn max_offset_for_ratio(length_km: f64, t: f64, ratio: f64) -> f64 {
    if length_km <= f64::EPSILON || ratio <= 0.0 {
        return 0.0;
    }
    let t = t.clamp(0.0, 1.0);
    let budget = length_km * (1.0 + ratio);
    let legs = |h: f64| {
        ((t * length_km).powi(2) + h * h).sqrt() + (((1.0 - t) * length_km).powi(2) + h * h).sqrt()
    };

    let mut low = 0.0;
    let mut high = budget;
    for _ in 0..64 {
        let mid = (low + high) / 2.0;
        if legs(mid) <= budget {
            low = mid;
        } else {
            high = mid;
        }
    }
    low
}

/// Two-leg great-circle detour ratio of going `origin → via → destination`.
pub fn via_detour_ratio(origin: Coordinate, via: Coordinate, destination: Coordinate) -> f64 {
    detour_ratio(
        haversine_km(origin, destination),
        haversine_km(origin, via) + haversine_km(via, destination),
    )
}

/// Offset a point sideways from fraction `t` of the route, bounded so that the
/// detour through it stays under `max_ratio`.
pub fn bounded_offset_point(
    origin: Coordinate,
    destination: Coordinate,
    t: f64,
    desired_offset_km: f64,
    max_ratio: f64,
    side: OffsetSide,
) -> Coordinate {
    let length = haversine_km(origin, destination);
    let limit = max_offset_for_ratio(length, t, max_ratio) * OFFSET_SAFETY;
    let mut offset = desired_offset_km.clamp(0.0, limit);

    let mut point = offset_point(origin, destination, t, offset, side);
    for _ in 0..16 {
        if via_detour_ratio(origin, point, destination) <= max_ratio * OFFSET_SAFETY {
            break;
        }
        offset /= 2.0;
        point = offset_point(origin, destination, t, offset, side);
    }
    point
}

/// Geometric waypoint: the route midpoint pushed perpendicular to the
/// origin–destination bearing by `offset_fraction` of the route length.
pub fn geometric_fallback_waypoint(
    origin: Coordinate,
    destination: Coordinate,
    offset_fraction: f64,
    max_ratio: f64,
    side: OffsetSide,
) -> Coordinate {
    let length = haversine_km(origin, destination);
    bounded_offset_point(
        origin,
        destination,
        0.5,
        length * offset_fraction.max(0.0),
        max_ratio,
        side,
    )
}

pub fn normalize_longitude(lon: f64) -> f64 {
    let mut normalized = lon;
    while normalized < -180.0 {
        normalized += 360.0;
    }
    while normalized > 180.0 {
        normalized -= 360.0;
    }
    normalized
}
