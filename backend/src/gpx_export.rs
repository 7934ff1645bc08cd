use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use geo_types::Point;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};

use crate::error::RouteError;
use crate::models::{Coordinate, RouteResult};

const CREATOR: &str = "trip-routing";

/// GPX 1.1 document with the route geometry as a single-segment track and
/// the chosen waypoints as `<wpt>` entries, base64-encoded.
pub fn encode_route_as_gpx(route: &RouteResult) -> Result<String, RouteError> {
    let mut gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(CREATOR.into()),
        ..Default::default()
    };

    for waypoint in &route.waypoints_used {
        let mut wpt = to_waypoint(&waypoint.coordinate);
        wpt.name = waypoint.label.clone();
        gpx.waypoints.push(wpt);
    }

    let mut track = Track {
        name: Some(format!("{:.1} km", route.distance_meters / 1000.0)),
        source: Some(route.routing_provider_id.clone()),
        ..Default::default()
    };
    let mut segment = TrackSegment::new();
    for point in route.geometry.iter().map(to_waypoint) {
        segment.points.push(point);
    }
    track.segments.push(segment);
    gpx.tracks.push(track);

    let mut buffer = Vec::new();
    gpx::write(&gpx, &mut buffer)?;
    Ok(BASE64.encode(buffer))
}

fn to_waypoint(coord: &Coordinate) -> Waypoint {
    Waypoint::new(Point::new(coord.lon, coord.lat))
}
