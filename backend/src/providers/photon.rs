use async_trait::async_trait;
use serde::Deserialize;

use super::{send_json, ProviderError};
use crate::geocode::GeocodingProvider;
use crate::models::{Coordinate, GeocodeMatch};

pub const PROVIDER_ID: &str = "photon";

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Point,
    #[serde(default)]
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Point {
    coordinates: [f64; 2],
}

#[derive(Debug, Default, Deserialize)]
struct Properties {
    name: Option<String>,
    city: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

/// Photon has no importance score; rank order is turned into one in (0, 1].
fn matches_from(collection: FeatureCollection) -> Vec<GeocodeMatch> {
    let total = collection.features.len() as f64;
    collection
        .features
        .into_iter()
        .enumerate()
        .filter_map(|(rank, feature)| {
            let [lon, lat] = feature.geometry.coordinates;
            let coordinate = Coordinate::new(lat, lon);
            if !coordinate.is_valid() {
                return None;
            }
            let props = feature.properties;
            let display_name = [&props.name, &props.city, &props.state, &props.country]
                .into_iter()
                .flatten()
                .fold(Vec::<&str>::new(), |mut parts, part| {
                    if !parts.contains(&part.as_str()) {
                        parts.push(part.as_str());
                    }
                    parts
                })
                .join(", ");
            Some(GeocodeMatch {
                coordinate,
                display_name,
                country: props.country.clone().unwrap_or_default(),
                region: props.state.clone().or(props.county.clone()),
                importance: (total - rank as f64) / total,
            })
        })
        .collect()
}

pub fn parse_search(body: &str) -> Result<Vec<GeocodeMatch>, ProviderError> {
    let collection: FeatureCollection = serde_json::from_str(body)
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))?;
    Ok(matches_from(collection))
}

/// Secondary geocoder (komoot Photon, OSM-based).
pub struct Photon {
    client: reqwest::Client,
    base_url: String,
}

impl Photon {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl GeocodingProvider for Photon {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn query(&self, name: &str) -> Result<Vec<GeocodeMatch>, ProviderError> {
        let url = format!("{}/api/", self.base_url.trim_end_matches('/'));
        let request = self.client.get(url).query(&[("q", name), ("limit", "10")]);
        let collection: FeatureCollection = send_json(request).await?;
        Ok(matches_from(collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_features_and_ranks_importance() {
        let body = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [153.07, -26.65]},
             "properties": {"name": "Sunshine Coast", "state": "Queensland", "country": "Australia"}},
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [-123.9, 49.6]},
             "properties": {"name": "Sunshine Coast", "state": "British Columbia", "country": "Canada"}}
        ]}"#;
        let matches = parse_search(body).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].display_name, "Sunshine Coast, Queensland, Australia");
        assert_eq!(matches[0].importance, 1.0);
        assert_eq!(matches[1].importance, 0.5);
        assert_eq!(matches[1].coordinate, Coordinate::new(49.6, -123.9));
        assert_eq!(matches[1].region.as_deref(), Some("British Columbia"));
    }

    #[test]
    fn repeated_name_parts_are_collapsed() {
        let body = r#"{"features": [
            {"geometry": {"coordinates": [2.35, 48.85]},
             "properties": {"name": "Paris", "city": "Paris", "country": "France"}}
        ]}"#;
        assert_eq!(parse_search(body).unwrap()[0].display_name, "Paris, France");
    }
}
