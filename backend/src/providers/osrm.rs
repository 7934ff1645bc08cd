use async_trait::async_trait;
use serde::Deserialize;

use super::{send_json, ProviderError};
use crate::engine::RoutingProvider;
use crate::models::{Coordinate, RouteLeg, TransportMode};

pub const PROVIDER_ID: &str = "osrm";

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: GeoJsonLine,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeoJsonLine {
    pub coordinates: Vec<[f64; 2]>,
}

impl GeoJsonLine {
    /// GeoJSON positions are `[lon, lat]`.
    pub(crate) fn into_coordinates(self) -> Vec<Coordinate> {
        self.coordinates
            .into_iter()
            .map(|[lon, lat]| Coordinate::new(lat, lon))
            .collect()
    }
}

fn profile(mode: TransportMode) -> &'static str {
    match mode {
        TransportMode::Driving => "driving",
        TransportMode::Cycling => "bike",
        TransportMode::Walking => "foot",
    }
}

pub fn route_url(base: &str, waypoints: &[Coordinate], mode: TransportMode) -> String {
    let points = waypoints
        .iter()
        .map(|c| format!("{:.6},{:.6}", c.lon, c.lat))
        .collect::<Vec<_>>()
        .join(";");
    format!(
        "{}/route/v1/{}/{}?overview=full&geometries=geojson",
        base.trim_end_matches('/'),
        profile(mode),
        points
    )
}

pub fn parse_route(body: &str) -> Result<RouteLeg, ProviderError> {
    let response: OsrmResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))?;
    leg_from(response)
}

fn leg_from(response: OsrmResponse) -> Result<RouteLeg, ProviderError> {
    match response.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" => return Err(ProviderError::NotFound),
        other => {
            return Err(ProviderError::Unavailable(format!(
                "osrm error {other}: {}",
                response.message.unwrap_or_default()
            )))
        }
    }
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or(ProviderError::NotFound)?;
    let geometry = route.geometry.into_coordinates();
    if geometry.len() < 2 {
        return Err(ProviderError::Unavailable("route geometry too short".into()));
    }
    Ok(RouteLeg {
        geometry,
        distance_meters: route.distance,
        duration_seconds: route.duration,
    })
}

/// Routing provider on an OSRM HTTP server.
pub struct Osrm {
    client: reqwest::Client,
    base_url: String,
}

impl Osrm {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl RoutingProvider for Osrm {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn route(
        &self,
        waypoints: &[Coordinate],
        mode: TransportMode,
    ) -> Result<RouteLeg, ProviderError> {
        let url = route_url(&self.base_url, waypoints, mode);
        let response: OsrmResponse = send_json(self.client.get(url)).await?;
        leg_from(response)
    }
}
