use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::osrm::GeoJsonLine;
use super::{send_json, ProviderError};
use crate::engine::RoutingProvider;
use crate::models::{Coordinate, RouteLeg, TransportMode};

pub const PROVIDER_ID: &str = "openrouteservice";

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: GeoJsonLine,
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Properties {
    summary: Summary,
}

/// ORS omits zero-valued fields from the summary.
#[derive(Debug, Default, Deserialize)]
struct Summary {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

fn profile(mode: TransportMode) -> &'static str {
    match mode {
        TransportMode::Driving => "driving-car",
        TransportMode::Cycling => "cycling-regular",
        TransportMode::Walking => "foot-walking",
    }
}

pub fn parse_directions(body: &str) -> Result<RouteLeg, ProviderError> {
    let collection: FeatureCollection = serde_json::from_str(body)
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))?;
    leg_from(collection)
}

fn leg_from(collection: FeatureCollection) -> Result<RouteLeg, ProviderError> {
    let feature = collection
        .features
        .into_iter()
        .next()
        .ok_or(ProviderError::NotFound)?;
    let geometry = feature.geometry.into_coordinates();
    if geometry.len() < 2 {
        return Err(ProviderError::Unavailable("route geometry too short".into()));
    }
    Ok(RouteLeg {
        geometry,
        distance_meters: feature.properties.summary.distance,
        duration_seconds: feature.properties.summary.duration,
    })
}

/// Alternate routing provider, enabled when an API key is configured.
pub struct OpenRouteService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenRouteService {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl RoutingProvider for OpenRouteService {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn route(
        &self,
        waypoints: &[Coordinate],
        mode: TransportMode,
    ) -> Result<RouteLeg, ProviderError> {
        let url = format!(
            "{}/v2/directions/{}/geojson",
            self.base_url.trim_end_matches('/'),
            profile(mode)
        );
        let coordinates: Vec<[f64; 2]> = waypoints.iter().map(|c| [c.lon, c.lat]).collect();
        let request = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .json(&json!({ "coordinates": coordinates }));
        let collection: FeatureCollection = send_json(request).await?;
        leg_from(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_geojson_directions() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"summary": {"distance": 851000.5, "duration": 33000.0}},
                "geometry": {"type": "LineString",
                    "coordinates": [[-123.1207, 49.2827], [-115.5708, 51.1784]]}
            }]
        }"#;
        let leg = parse_directions(body).unwrap();
        assert_eq!(leg.distance_meters, 851000.5);
        assert_eq!(leg.geometry[1], Coordinate::new(51.1784, -115.5708));
    }

    #[test]
    fn empty_collection_is_not_found() {
        let body = r#"{"type": "FeatureCollection", "features": []}"#;
        assert_eq!(parse_directions(body), Err(ProviderError::NotFound));
    }
}
